//! OpenAI-compatible adapter configuration.

use std::time::Duration;

/// Configuration for the OpenAI-compatible adapter.
///
/// Works against the real OpenAI API and against any server speaking
/// the `/v1` dialect (LM Studio, vLLM, llama.cpp's server). Local
/// servers typically need no API key.
///
/// ```rust
/// use llm_relay_openai::OpenAiConfig;
///
/// let config = OpenAiConfig {
///     base_url: "http://localhost:1234/v1".into(),
///     model: "qwen2.5".into(),
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token. `None` sends no auth header,
    /// which local servers accept.
    pub api_key: Option<String>,
    /// Model identifier (e.g. `"gpt-4o-mini"`).
    pub model: String,
    /// Base URL for the API. Override for proxies or local servers.
    pub base_url: String,
    /// Optional organization ID for the hosted OpenAI API.
    pub organization: Option<String>,
    /// Request timeout. `None` uses reqwest's default.
    pub timeout: Option<Duration>,
    /// Pre-configured HTTP client for connection pooling.
    /// When `None`, a new client is created.
    pub client: Option<reqwest::Client>,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("timeout", &self.timeout)
            .field("client", &self.client.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            organization: None,
            timeout: None,
            client: None,
        }
    }
}
