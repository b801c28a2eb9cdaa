use std::sync::Arc;

use crate::compositor::CompositeOptions;
use crate::config::{Config, PLACEMENT_PROMPT};
use crate::llm::GeminiVisionModel;
use crate::placement::PlacementResolver;

/// Shared, read-only state handed to every adapter.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<PlacementResolver>,
    pub options: CompositeOptions,
    pub prompt: Arc<str>,
}

impl AppState {
    pub fn new(resolver: PlacementResolver, options: CompositeOptions) -> Self {
        Self {
            resolver: Arc::new(resolver),
            options,
            prompt: Arc::from(PLACEMENT_PROMPT),
        }
    }

    /// Builds the production state: a Gemini-backed resolver and the
    /// compositing options from the environment.
    pub fn from_config(config: &Config) -> Self {
        let resolver = if config.gemini_api_key.is_empty() {
            PlacementResolver::offline()
        } else {
            let model = GeminiVisionModel::from_config(config);
            PlacementResolver::new(Arc::new(model)).with_timeout(config.gemini_timeout())
        };
        Self::new(resolver, config.composite_options())
    }
}
