//! Settings-driven construction of Ollama adapters.

use std::sync::Arc;

use llm_relay::config::{ProviderFactory, ProviderSettings};
use llm_relay::provider::DynProvider;
use llm_relay::RelayError;

use crate::config::OllamaConfig;
use crate::provider::OllamaProvider;

/// [`ProviderFactory`] for the `"ollama"` family.
///
/// Hand one of these to the manager builder and settings entries with
/// `family = "ollama"` become [`OllamaProvider`] registrations.
#[derive(Debug, Default, Clone, Copy)]
pub struct OllamaFactory;

impl ProviderFactory for OllamaFactory {
    fn family(&self) -> &str {
        "ollama"
    }

    fn build(&self, settings: &ProviderSettings) -> Result<Arc<dyn DynProvider>, RelayError> {
        if settings.model.is_empty() {
            return Err(RelayError::InvalidRequest(format!(
                "provider '{}': model must not be empty",
                settings.id
            )));
        }
        let defaults = OllamaConfig::default();
        let config = OllamaConfig {
            model: settings.model.clone(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or(defaults.base_url),
            timeout: settings.timeout(),
            client: None,
        };
        Ok(Arc::new(OllamaProvider::new(config)?))
    }
}
