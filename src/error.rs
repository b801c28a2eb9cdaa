//! Error types for the compositing pipeline.

/// Errors surfaced to callers of the request pipeline.
///
/// Placement failures never show up here: the resolver absorbs them and
/// falls back to the default placement.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Missing fields, a body that is not a JSON object, or an image that
    /// cannot be decoded.
    #[error("{0}")]
    Input(String),

    /// Anything that fails while compositing or encoding.
    #[error("Внутренняя ошибка: {0}")]
    Processing(String),
}

impl ProcessError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing(message.into())
    }

    /// Returns true for client-side problems.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }

    /// HTTP status code the adapters report for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Input(_) => 400,
            Self::Processing(_) => 500,
        }
    }
}

impl From<image::ImageError> for ProcessError {
    fn from(err: image::ImageError) -> Self {
        Self::Processing(err.to_string())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ProcessError>;
