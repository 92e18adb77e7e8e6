//! Provider trait and request/response types.
//!
//! Two core abstractions live here:
//!
//! - **[`Provider`]** — the trait every backend adapter implements. It
//!   uses Rust 2024's native async-fn-in-traits (AFIT), so adapters are
//!   plain `async fn`s with no macro overhead.
//!
//! - **[`DynProvider`]** — an object-safe mirror of `Provider` using
//!   boxed futures. A blanket `impl<T: Provider> DynProvider for T`
//!   bridges the two, so any concrete adapter can be stored as
//!   `Arc<dyn DynProvider>` with zero boilerplate — which is how the
//!   [`ProviderManager`](crate::ProviderManager) holds them.
//!
//! Adapters translate backend-specific parameter vocabulary
//! (`num_predict` vs `max_tokens`, penalty field names) internally;
//! orchestration code only ever sees [`CompletionParams`].

use std::borrow::Cow;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::event::unix_millis;
use crate::request::Priority;
use crate::stream::CompletionStream;

/// The core trait every backend adapter implements.
///
/// `Provider` is **not** object-safe because AFIT returns `impl Future`.
/// For dynamic dispatch use [`DynProvider`] — every `Provider`
/// automatically implements it via a blanket impl.
pub trait Provider: Send + Sync {
    /// Sends a completion request and returns the full response.
    fn generate(
        &self,
        params: &CompletionParams,
    ) -> impl Future<Output = Result<Completion, RelayError>> + Send;

    /// Sends a chat completion request over an explicit message history.
    fn generate_chat(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> impl Future<Output = Result<Completion, RelayError>> + Send;

    /// Sends a completion request and returns a stream of events.
    fn stream(
        &self,
        params: &CompletionParams,
    ) -> impl Future<Output = Result<CompletionStream, RelayError>> + Send;

    /// Streaming counterpart of [`generate_chat`](Self::generate_chat).
    fn stream_chat(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> impl Future<Output = Result<CompletionStream, RelayError>> + Send;

    /// Probes the backend with a lightweight request (typically its
    /// list-models endpoint) under a short timeout.
    ///
    /// Must not error or panic: any network or parse failure is `false`.
    fn is_available(&self) -> impl Future<Output = bool> + Send;

    /// Lists the models the backend currently serves.
    fn list_models(
        &self,
    ) -> impl Future<Output = Result<Vec<ModelInfo>, RelayError>> + Send;

    /// Returns static metadata describing this adapter instance.
    fn capabilities(&self) -> ProviderCapabilities;
}

/// Object-safe counterpart of [`Provider`] for dynamic dispatch.
///
/// You rarely implement this directly — the blanket
/// `impl<T: Provider> DynProvider for T` does it for you.
pub trait DynProvider: Send + Sync {
    /// Boxed-future version of [`Provider::generate`].
    fn generate_boxed<'a>(
        &'a self,
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, RelayError>> + Send + 'a>>;

    /// Boxed-future version of [`Provider::generate_chat`].
    fn generate_chat_boxed<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, RelayError>> + Send + 'a>>;

    /// Boxed-future version of [`Provider::stream`].
    fn stream_boxed<'a>(
        &'a self,
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionStream, RelayError>> + Send + 'a>>;

    /// Boxed-future version of [`Provider::stream_chat`].
    fn stream_chat_boxed<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionStream, RelayError>> + Send + 'a>>;

    /// Boxed-future version of [`Provider::is_available`].
    fn is_available_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    /// Boxed-future version of [`Provider::list_models`].
    fn list_models_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ModelInfo>, RelayError>> + Send + 'a>>;

    /// Returns static metadata describing this adapter instance.
    fn capabilities(&self) -> ProviderCapabilities;
}

impl<T: Provider> DynProvider for T {
    fn generate_boxed<'a>(
        &'a self,
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, RelayError>> + Send + 'a>> {
        Box::pin(self.generate(params))
    }

    fn generate_chat_boxed<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, RelayError>> + Send + 'a>> {
        Box::pin(self.generate_chat(messages, params))
    }

    fn stream_boxed<'a>(
        &'a self,
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionStream, RelayError>> + Send + 'a>>
    {
        Box::pin(self.stream(params))
    }

    fn stream_chat_boxed<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: &'a CompletionParams,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionStream, RelayError>> + Send + 'a>>
    {
        Box::pin(self.stream_chat(messages, params))
    }

    fn is_available_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(self.is_available())
    }

    fn list_models_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ModelInfo>, RelayError>> + Send + 'a>>
    {
        Box::pin(self.list_models())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        Provider::capabilities(self)
    }
}

/// Static metadata describing an adapter instance.
///
/// The `name` field uses [`Cow<'static, str>`] so built-in adapters can
/// use `"ollama"` (zero-alloc) while dynamic adapters use owned strings.
/// The manager consults [`features`](Self::features) to reject operations
/// the backend cannot serve (e.g. streaming) before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Backend family name (e.g. `"ollama"`, `"openai"`).
    pub name: Cow<'static, str>,
    /// The model this adapter instance is configured for.
    pub model: String,
    /// Maximum context window size in tokens.
    pub max_context_tokens: u64,
    /// Response formats the backend can be asked for.
    pub supported_formats: HashSet<ResponseFormat>,
    /// Feature flags for operations and tunables the backend supports.
    pub features: HashSet<Feature>,
}

impl ProviderCapabilities {
    /// Whether the backend supports streamed responses.
    pub fn supports_streaming(&self) -> bool {
        self.features.contains(&Feature::Streaming)
    }
}

/// A tunable or operation a backend may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Feature {
    /// Chunked/streamed responses.
    Streaming,
    /// Image inputs.
    Multimodal,
    /// The `temperature` sampling parameter.
    Temperature,
    /// The `top_p` sampling parameter.
    TopP,
    /// Presence/frequency penalty parameters.
    Penalties,
    /// Safe to retry failed requests (idempotent backend).
    Retries,
}

/// Output format a completion can be requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ResponseFormat {
    /// Free-form text.
    Text,
    /// A single JSON value.
    Json,
}

/// Info about one model a backend serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier as the backend reports it.
    pub id: String,
    /// Owning organization or runtime, when reported.
    pub owned_by: Option<String>,
}

/// Parameters for a completion request.
///
/// Only [`prompt`](Self::prompt) is required — use struct-update syntax:
///
/// ```rust
/// use llm_relay::CompletionParams;
///
/// let params = CompletionParams {
///     prompt: "Explain ownership in Rust".into(),
///     max_tokens: Some(512),
///     temperature: Some(0.7),
///     ..Default::default()
/// };
/// ```
///
/// # Serialization
///
/// `CompletionParams` serializes for logging and replay, except
/// [`timeout`](Self::timeout), which is a transport concern and is
/// `#[serde(skip)]`'d.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionParams {
    /// The prompt text. Also the offline-cache key, verbatim.
    pub prompt: String,
    /// Model override. `None` uses the adapter's configured model.
    pub model: Option<String>,
    /// System prompt, for backends that accept one separately.
    pub system: Option<String>,
    /// Sampling temperature, `0.0..=2.0`.
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff, `0.0..=1.0`.
    pub top_p: Option<f32>,
    /// Presence penalty, `-2.0..=2.0`.
    pub presence_penalty: Option<f32>,
    /// Frequency penalty, `-2.0..=2.0`.
    pub frequency_penalty: Option<f32>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    pub stop: Option<Vec<String>>,
    /// Requested output format.
    pub format: Option<ResponseFormat>,
    /// Scheduling priority recorded on the request.
    pub priority: Priority,
    /// Per-request deadline, armed when dispatch starts. Skipped during
    /// serialization.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl CompletionParams {
    /// A request with just a prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Validates field ranges, returning
    /// [`RelayError::InvalidRequest`] on the first violation.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.prompt.is_empty() {
            return Err(RelayError::InvalidRequest("prompt must not be empty".into()));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(RelayError::InvalidRequest(format!(
                    "temperature must be in 0.0..=2.0, got {t}"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(RelayError::InvalidRequest(format!(
                    "top_p must be in 0.0..=1.0, got {p}"
                )));
            }
        }
        for (field, value) in [
            ("presence_penalty", self.presence_penalty),
            ("frequency_penalty", self.frequency_penalty),
        ] {
            if let Some(v) = value {
                if !(-2.0..=2.0).contains(&v) {
                    return Err(RelayError::InvalidRequest(format!(
                        "{field} must be in -2.0..=2.0, got {v}"
                    )));
                }
            }
        }
        if self.max_tokens == Some(0) {
            return Err(RelayError::InvalidRequest(
                "max_tokens must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions to the model.
    System,
    /// The human side of the conversation.
    User,
    /// The model side of the conversation.
    Assistant,
}

/// One turn of a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who authored the message.
    pub role: ChatRole,
    /// The message text.
    pub content: String,
}

impl ChatMessage {
    /// A system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// A user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant-role message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token counts for one request/response pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens produced by the response.
    pub output_tokens: u64,
}

/// A finished completion — the terminal result of a request.
///
/// Produced exactly once per non-cancelled request. For streaming
/// requests this is the aggregation of every delta in delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Unique id of this completion.
    pub id: String,
    /// The request this completion answers, once the manager binds it.
    /// Adapters leave this `None`.
    pub request_id: Option<String>,
    /// The full response text.
    pub content: String,
    /// The model that produced the response.
    pub model: String,
    /// The prompt the response answers, verbatim.
    pub prompt: String,
    /// When the completion was produced, in Unix milliseconds.
    pub timestamp_ms: u64,
    /// Token accounting, when the backend reported it.
    pub usage: Option<TokenUsage>,
    /// The format the response was produced in, when known.
    pub format: Option<ResponseFormat>,
}

impl Completion {
    /// Builds a completion stamped with the current time and a fresh id.
    pub fn new(
        content: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: crate::request::next_id("cmp"),
            request_id: None,
            content: content.into(),
            model: model.into(),
            prompt: prompt.into(),
            timestamp_ms: unix_millis(),
            usage: None,
            format: None,
        }
    }
}
