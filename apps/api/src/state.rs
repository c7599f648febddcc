use std::sync::Arc;

use crate::chat::ChatService;
use crate::config::Config;
use crate::model::ModelManager;
use crate::models::profile::Profile;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub profile: Arc<Profile>,
    /// Unified chat. Holds the model-backed assistant when one is configured.
    pub chat: Arc<ChatService>,
    pub models: Arc<ModelManager>,
}
