//! The Ollama [`Provider`] implementation.

use std::collections::HashSet;
use std::time::Duration;

use llm_relay::provider::{
    ChatMessage, Completion, CompletionParams, Feature, ModelInfo, Provider,
    ProviderCapabilities, ResponseFormat,
};
use llm_relay::stream::CompletionStream;
use llm_relay::RelayError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use crate::config::OllamaConfig;
use crate::convert;
use crate::stream;
use crate::types::{ChatResponse, GenerateResponse, TagsResponse};

/// Availability probes must answer fast; they gate dispatch.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Adapter for a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Builds an adapter from `config`, constructing an HTTP client
    /// unless one was supplied for pooling.
    pub fn new(config: OllamaConfig) -> Result<Self, RelayError> {
        let client = match &config.client {
            Some(client) => client.clone(),
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = config.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build().map_err(|e| RelayError::Http {
                    status: None,
                    message: format!("failed to build HTTP client: {e}"),
                    retryable: false,
                })?
            }
        };
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn effective_timeout(&self, params: &CompletionParams) -> Option<Duration> {
        params.timeout.or(self.config.timeout)
    }

    /// POSTs `body` and returns the response after status checking.
    /// Non-2xx responses become [`RelayError::Http`] via the error body.
    async fn post_json<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, RelayError> {
        let mut request = self.client.post(url).json(body);
        if let Some(limit) = timeout {
            request = request.timeout(limit);
        }
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(convert::convert_error(status, &body));
        }
        Ok(response)
    }

    async fn post_parsed<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<R, RelayError> {
        let response = self.post_json(url, body, timeout).await?;
        let raw = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        serde_json::from_str(&raw).map_err(|e| RelayError::ResponseFormat {
            message: e.to_string(),
            raw,
        })
    }
}

fn map_transport_error(error: reqwest::Error, timeout: Option<Duration>) -> RelayError {
    if error.is_timeout() {
        let elapsed_ms = timeout
            .and_then(|t| u64::try_from(t.as_millis()).ok())
            .unwrap_or(0);
        return RelayError::Timeout { elapsed_ms };
    }
    RelayError::Http {
        status: error.status(),
        message: error.to_string(),
        retryable: error.is_connect(),
    }
}

impl Provider for OllamaProvider {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate(&self, params: &CompletionParams) -> Result<Completion, RelayError> {
        let body = convert::build_generate_request(params, &self.config.model, false);
        let response: GenerateResponse = self
            .post_parsed(
                &self.url("/api/generate"),
                &body,
                self.effective_timeout(params),
            )
            .await?;
        Ok(convert::convert_generate_response(
            response,
            params,
            &self.config.model,
        ))
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate_chat(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<Completion, RelayError> {
        let body = convert::build_chat_request(messages, params, &self.config.model, false);
        let response: ChatResponse = self
            .post_parsed(
                &self.url("/api/chat"),
                &body,
                self.effective_timeout(params),
            )
            .await?;
        Ok(convert::convert_chat_response(
            response,
            params,
            &self.config.model,
        ))
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn stream(&self, params: &CompletionParams) -> Result<CompletionStream, RelayError> {
        let body = convert::build_generate_request(params, &self.config.model, true);
        let response = self
            .post_json(
                &self.url("/api/generate"),
                &body,
                self.effective_timeout(params),
            )
            .await?;
        Ok(stream::into_stream(response))
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<CompletionStream, RelayError> {
        let body = convert::build_chat_request(messages, params, &self.config.model, true);
        let response = self
            .post_json(
                &self.url("/api/chat"),
                &body,
                self.effective_timeout(params),
            )
            .await?;
        Ok(stream::into_stream(response))
    }

    async fn is_available(&self) -> bool {
        let url = self.url("/api/tags");
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, RelayError> {
        let url = self.url("/api/tags");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.config.timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(convert::convert_error(status, &body));
        }
        let raw = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, self.config.timeout))?;
        let tags: TagsResponse =
            serde_json::from_str(&raw).map_err(|e| RelayError::ResponseFormat {
                message: e.to_string(),
                raw,
            })?;
        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name,
                owned_by: None,
            })
            .collect())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "ollama".into(),
            model: self.config.model.clone(),
            max_context_tokens: 128_000,
            supported_formats: HashSet::from([ResponseFormat::Text, ResponseFormat::Json]),
            features: HashSet::from([
                Feature::Streaming,
                Feature::Temperature,
                Feature::TopP,
                Feature::Penalties,
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str) -> OllamaProvider {
        OllamaProvider::new(OllamaConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_url_joins_cleanly() {
        assert_eq!(
            provider("http://localhost:11434").url("/api/generate"),
            "http://localhost:11434/api/generate"
        );
        // Trailing slash must not double up.
        assert_eq!(
            provider("http://localhost:11434/").url("/api/tags"),
            "http://localhost:11434/api/tags"
        );
    }

    #[test]
    fn test_effective_timeout_prefers_request() {
        let p = OllamaProvider::new(OllamaConfig {
            timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        })
        .unwrap();
        let params = CompletionParams {
            prompt: "hi".into(),
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        assert_eq!(p.effective_timeout(&params), Some(Duration::from_secs(5)));
        assert_eq!(
            p.effective_timeout(&CompletionParams::new("hi")),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_capabilities() {
        let caps = provider("http://localhost:11434").capabilities();
        assert_eq!(caps.name, "ollama");
        assert_eq!(caps.model, "llama3.2");
        assert!(caps.supports_streaming());
        assert!(caps.supported_formats.contains(&ResponseFormat::Json));
    }

    #[test]
    fn test_client_reuse() {
        let shared = reqwest::Client::new();
        let p = OllamaProvider::new(OllamaConfig {
            client: Some(shared),
            ..Default::default()
        });
        assert!(p.is_ok());
    }
}
