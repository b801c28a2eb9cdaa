pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Encoded image bytes handed to a vision model.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub display_name: Option<String>,
}

impl MediaFile {
    pub fn new(bytes: Vec<u8>, mime_type: String, display_name: Option<String>) -> Self {
        Self {
            bytes,
            mime_type,
            display_name,
        }
    }

    /// Builds an image attachment, sniffing the MIME type from magic bytes.
    pub fn image(bytes: Vec<u8>, display_name: &str) -> Self {
        let mime_type = detect_mime_type(&bytes)
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or_else(|| "image/png".to_string());
        Self::new(bytes, mime_type, Some(display_name.to_string()))
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or("image")
    }
}
