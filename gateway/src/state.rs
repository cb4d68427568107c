use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::session::SessionRegistry;
use crate::core::upstream::{GeminiConnector, UpstreamConnector};

/// Application state shared by every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    pub connector: Arc<dyn UpstreamConnector>,
}

impl AppState {
    /// Build state with the Gemini connector derived from `config`.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let connector: Arc<dyn UpstreamConnector> =
            Arc::new(GeminiConnector::new(config.gemini_config()));
        Self::with_connector(config, connector)
    }

    /// Build state around an existing connector.
    pub fn with_connector(config: ServerConfig, connector: Arc<dyn UpstreamConnector>) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            connector,
        })
    }
}
