//! Settings-driven construction of OpenAI-compatible adapters.

use std::sync::Arc;

use llm_relay::config::{ProviderFactory, ProviderSettings};
use llm_relay::provider::DynProvider;
use llm_relay::RelayError;

use crate::config::OpenAiConfig;
use crate::provider::OpenAiProvider;

/// [`ProviderFactory`] for the `"openai"` family.
///
/// Covers the hosted OpenAI API and local `/v1` servers alike: point
/// `base_url` at the server and omit `api_key` for ones that need no
/// auth.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiFactory;

impl ProviderFactory for OpenAiFactory {
    fn family(&self) -> &str {
        "openai"
    }

    fn build(&self, settings: &ProviderSettings) -> Result<Arc<dyn DynProvider>, RelayError> {
        if settings.model.is_empty() {
            return Err(RelayError::InvalidRequest(format!(
                "provider '{}': model must not be empty",
                settings.id
            )));
        }
        let defaults = OpenAiConfig::default();
        let config = OpenAiConfig {
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or(defaults.base_url),
            organization: None,
            timeout: settings.timeout(),
            client: None,
        };
        Ok(Arc::new(OpenAiProvider::new(config)?))
    }
}
