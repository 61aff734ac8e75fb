use std::sync::Arc;
use transmute_core::{Config, Converter, EventStore, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    converter: Arc<dyn Converter>,
    event_store: Option<Arc<dyn EventStore>>,
}

impl AppState {
    pub fn new(
        config: Config,
        converter: Arc<dyn Converter>,
        event_store: Option<Arc<dyn EventStore>>,
    ) -> Self {
        Self {
            config,
            converter,
            event_store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn converter(&self) -> &dyn Converter {
        self.converter.as_ref()
    }

    /// `None` when event persistence is disabled.
    pub fn event_store(&self) -> Option<&dyn EventStore> {
        self.event_store.as_deref()
    }
}
