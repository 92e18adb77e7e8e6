//! The OpenAI-compatible [`Provider`] implementation.

use std::collections::HashSet;
use std::time::Duration;

use llm_relay::provider::{
    ChatMessage, Completion, CompletionParams, Feature, ModelInfo, Provider,
    ProviderCapabilities, ResponseFormat,
};
use llm_relay::stream::CompletionStream;
use llm_relay::RelayError;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use crate::config::OpenAiConfig;
use crate::convert;
use crate::stream;
use crate::types::{ChatResponse, CompletionResponse, ModelsResponse};

/// Availability probes must answer fast; they gate dispatch.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Adapter for the OpenAI API and any server speaking its `/v1` dialect.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Builds an adapter from `config`, constructing an HTTP client
    /// unless one was supplied for pooling.
    pub fn new(config: OpenAiConfig) -> Result<Self, RelayError> {
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

    /// Auth and organization headers. Local servers run without a key,
    /// so no `authorization` header is sent when none is configured.
    fn default_headers(&self) -> Result<HeaderMap, RelayError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.config.api_key {
            let value = format!("Bearer {api_key}");
            headers.insert(
                "authorization",
                HeaderValue::from_str(&value).map_err(|_| {
                    RelayError::InvalidRequest(
                        "API key contains invalid header characters".into(),
                    )
                })?,
            );
        }
        if let Some(org) = &self.config.organization {
            headers.insert(
                "openai-organization",
                HeaderValue::from_str(org).map_err(|_| {
                    RelayError::InvalidRequest(
                        "organization ID contains invalid header characters".into(),
                    )
                })?,
            );
        }
        Ok(headers)
    }

    async fn post_json<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, RelayError> {
        let mut request = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .json(body);
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

impl Provider for OpenAiProvider {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate(&self, params: &CompletionParams) -> Result<Completion, RelayError> {
        let body = convert::build_completion_request(params, &self.config.model, false);
        let response: CompletionResponse = self
            .post_parsed(
                &self.url("/completions"),
                &body,
                self.effective_timeout(params),
            )
            .await?;
        convert::convert_completion_response(response, params, &self.config.model)
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
                &self.url("/chat/completions"),
                &body,
                self.effective_timeout(params),
            )
            .await?;
        convert::convert_chat_response(response, params, &self.config.model)
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn stream(&self, params: &CompletionParams) -> Result<CompletionStream, RelayError> {
        let body = convert::build_completion_request(params, &self.config.model, true);
        let response = self
            .post_json(
                &self.url("/completions"),
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
                &self.url("/chat/completions"),
                &body,
                self.effective_timeout(params),
            )
            .await?;
        Ok(stream::into_stream(response))
    }

    async fn is_available(&self) -> bool {
        let Ok(headers) = self.default_headers() else {
            return false;
        };
        let request = self
            .client
            .get(self.url("/models"))
            .headers(headers)
            .timeout(PROBE_TIMEOUT);
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, RelayError> {
        let request = self
            .client
            .get(self.url("/models"))
            .headers(self.default_headers()?);
        let response = request
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
        let models: ModelsResponse =
            serde_json::from_str(&raw).map_err(|e| RelayError::ResponseFormat {
                message: e.to_string(),
                raw,
            })?;
        Ok(models
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                owned_by: m.owned_by,
            })
            .collect())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "openai".into(),
            model: self.config.model.clone(),
            max_context_tokens: 128_000,
            supported_formats: HashSet::from([ResponseFormat::Text, ResponseFormat::Json]),
            features: HashSet::from([
                Feature::Streaming,
                Feature::Temperature,
                Feature::TopP,
                Feature::Penalties,
                Feature::Retries,
            ]),
        }
    }
}
