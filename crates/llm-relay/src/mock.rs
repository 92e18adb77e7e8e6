//! Mock provider for testing.
//!
//! [`MockProvider`] is a queue-based fake that lets tests control
//! exactly what responses and errors a provider returns, without
//! touching the network. It implements [`Provider`], so it works
//! anywhere a real adapter does — including behind
//! `Arc<dyn DynProvider>` via the blanket impl, which is how the
//! [`ProviderManager`](crate::ProviderManager) holds it.
//!
//! Available under `#[cfg(test)]` inside this crate and behind the
//! `test-utils` feature for downstream test suites.
//!
//! # Why `MockError` instead of `RelayError`?
//!
//! [`RelayError`] is not `Clone`, so it can't sit in a queue that tests
//! also want to inspect. [`MockError`] mirrors the common variants in a
//! cloneable form and converts at dequeue time.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::RelayError;
use crate::provider::{
    ChatMessage, ChatRole, Completion, CompletionParams, Feature, ModelInfo, Provider,
    ProviderCapabilities, ResponseFormat,
};
use crate::stream::{CompletionStream, StreamEvent};

/// A queue-based mock provider for unit and integration tests.
///
/// Push responses with [`queue_response`](Self::queue_response) and
/// errors with [`queue_error`](Self::queue_error). Each `generate` or
/// `stream` call pops from the front of the respective queue and
/// records its [`CompletionParams`] for later assertion via
/// [`recorded_calls`](Self::recorded_calls).
///
/// # Panics
///
/// `generate` and `stream` panic when their queue is empty — a test
/// that makes an unplanned call should fail loudly.
pub struct MockProvider {
    model: String,
    responses: Mutex<VecDeque<Result<String, MockError>>>,
    stream_responses: Mutex<VecDeque<Result<Vec<StreamEvent>, MockError>>>,
    calls: Mutex<Vec<CompletionParams>>,
    available: AtomicBool,
    delay: Mutex<Option<Duration>>,
    features: HashSet<Feature>,
}

/// Cloneable error subset for mock queuing, converted to
/// [`RelayError`] at dequeue time.
#[derive(Debug, Clone)]
pub enum MockError {
    /// Maps to [`RelayError::Http`].
    Http {
        /// HTTP status code, if any.
        status: Option<http::StatusCode>,
        /// Error message.
        message: String,
        /// Whether the error is retryable.
        retryable: bool,
    },
    /// Maps to [`RelayError::Unavailable`].
    Unavailable(String),
    /// Maps to [`RelayError::InvalidRequest`].
    InvalidRequest(String),
    /// Maps to [`RelayError::Timeout`].
    Timeout {
        /// Elapsed milliseconds.
        elapsed_ms: u64,
    },
    /// Maps to [`RelayError::ResponseFormat`].
    ResponseFormat {
        /// What went wrong during parsing.
        message: String,
        /// The raw response body.
        raw: String,
    },
}

impl MockError {
    fn into_relay_error(self) -> RelayError {
        match self {
            Self::Http {
                status,
                message,
                retryable,
            } => RelayError::Http {
                status,
                message,
                retryable,
            },
            Self::Unavailable(provider) => RelayError::Unavailable { provider },
            Self::InvalidRequest(msg) => RelayError::InvalidRequest(msg),
            Self::Timeout { elapsed_ms } => RelayError::Timeout { elapsed_ms },
            Self::ResponseFormat { message, raw } => RelayError::ResponseFormat { message, raw },
        }
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response_len = self.responses.lock().unwrap().len();
        let stream_len = self.stream_responses.lock().unwrap().len();
        let call_count = self.calls.lock().unwrap().len();
        f.debug_struct("MockProvider")
            .field("model", &self.model)
            .field("queued_responses", &response_len)
            .field("queued_streams", &stream_len)
            .field("recorded_calls", &call_count)
            .finish()
    }
}

impl MockProvider {
    /// Creates a new mock serving the given model, with empty queues,
    /// availability on, and streaming supported.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            responses: Mutex::new(VecDeque::new()),
            stream_responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            delay: Mutex::new(None),
            features: HashSet::from([
                Feature::Streaming,
                Feature::Temperature,
                Feature::TopP,
                Feature::Penalties,
            ]),
        }
    }

    /// A mock whose capabilities report no streaming support.
    #[must_use]
    pub fn without_streaming(mut self) -> Self {
        self.features.remove(&Feature::Streaming);
        self
    }

    /// Enqueues a successful response for the next `generate` call.
    pub fn queue_response(&self, content: impl Into<String>) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(content.into()));
        self
    }

    /// Enqueues an error for the next `generate` call.
    pub fn queue_error(&self, error: MockError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Enqueues stream events for the next `stream` call.
    pub fn queue_stream(&self, events: Vec<StreamEvent>) -> &Self {
        self.stream_responses.lock().unwrap().push_back(Ok(events));
        self
    }

    /// Enqueues an error for the next `stream` call, returned before
    /// any event is yielded.
    pub fn queue_stream_error(&self, error: MockError) -> &Self {
        self.stream_responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Flips the availability probe result.
    pub fn set_available(&self, available: bool) -> &Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Makes every `generate`/`stream` call sleep first, for timeout
    /// and cancellation tests.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Returns a clone of all params passed to `generate`,
    /// `generate_chat`, `stream`, or `stream_chat`, in call order.
    pub fn recorded_calls(&self) -> Vec<CompletionParams> {
        self.calls.lock().unwrap().clone()
    }

    /// Total calls recorded, including the availability-free reads.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record_call(&self, params: &CompletionParams) {
        self.calls.lock().unwrap().push(params.clone());
    }

    async fn apply_delay(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn pop_response(&self, prompt: &str) -> Result<Completion, RelayError> {
        let result = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockProvider: no queued responses remaining");
        result
            .map(|content| Completion::new(content, self.model.clone(), prompt))
            .map_err(MockError::into_relay_error)
    }
}

impl Provider for MockProvider {
    async fn generate(&self, params: &CompletionParams) -> Result<Completion, RelayError> {
        self.record_call(params);
        self.apply_delay().await;
        self.pop_response(&params.prompt)
    }

    async fn generate_chat(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<Completion, RelayError> {
        self.record_call(params);
        self.apply_delay().await;
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map_or("", |m| m.content.as_str());
        self.pop_response(prompt)
    }

    async fn stream(&self, params: &CompletionParams) -> Result<CompletionStream, RelayError> {
        self.record_call(params);
        self.apply_delay().await;
        let result = self
            .stream_responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockProvider: no queued stream responses remaining");
        let events = result.map_err(MockError::into_relay_error)?;
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }

    async fn stream_chat(
        &self,
        _messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<CompletionStream, RelayError> {
        self.stream(params).await
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, RelayError> {
        Ok(vec![ModelInfo {
            id: self.model.clone(),
            owned_by: Some("mock".into()),
        }])
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "mock".into(),
            model: self.model.clone(),
            max_context_tokens: 128_000,
            supported_formats: HashSet::from([ResponseFormat::Text, ResponseFormat::Json]),
            features: self.features.clone(),
        }
    }
}
