//! Unified error type for all relay operations.
//!
//! Every adapter maps its native failures into [`RelayError`], giving
//! callers a single type to match against regardless of which backend
//! served the request. Registry lookups ("no such provider id") are
//! deliberately *not* errors — those report through `bool` / `Option`
//! returns so the hot read path stays exception-free. Only dispatch-class
//! operations produce a `RelayError`.
//!
//! # Retryability
//!
//! Transport variants carry a `retryable` flag set from the upstream
//! response (HTTP 429/5xx, connect failures). Callers that implement
//! their own retry loops can inspect [`RelayError::is_retryable`].

use serde_json::Value;

/// The unified error type returned by all dispatch-class operations.
///
/// Variants are `#[non_exhaustive]` — new kinds may be added in minor
/// releases without breaking downstream matches.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RelayError {
    /// The manager has no registered provider to dispatch to.
    #[error("no active provider is registered")]
    NoActiveProvider,

    /// The selected adapter's availability probe failed.
    #[error("provider '{provider}' is unavailable")]
    Unavailable {
        /// The registration id of the unreachable provider.
        provider: String,
    },

    /// An HTTP-level failure (transport error, unexpected status code).
    ///
    /// `status` is `None` when the request never received a response
    /// (e.g. DNS failure, connection reset).
    #[error("HTTP error (status={status:?}): {message}")]
    Http {
        /// The HTTP status code, if one was received.
        status: Option<http::StatusCode>,
        /// A human-readable description of the failure.
        message: String,
        /// Whether the caller should retry this request.
        retryable: bool,
    },

    /// A response body or frame could not be parsed.
    ///
    /// Individual malformed *stream* frames never surface as this error —
    /// the decoder logs and skips them. This variant is for non-streamed
    /// bodies and unrecoverable stream-level failures.
    #[error("response format error: {message}")]
    ResponseFormat {
        /// What went wrong during parsing.
        message: String,
        /// The raw response body, for diagnostics.
        raw: String,
    },

    /// The request was malformed (empty prompt, out-of-range sampling
    /// parameters, streaming against a non-streaming provider).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request exceeded its deadline.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before the timeout fired.
        elapsed_ms: u64,
    },

    /// The caller cancelled the request before it completed.
    #[error("request was cancelled")]
    Cancelled,
}

impl RelayError {
    /// Returns `true` if the error is transient and the request may
    /// succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { retryable, .. } => *retryable,
            Self::Timeout { .. } | Self::Unavailable { .. } => true,
            _ => false,
        }
    }

    /// Structured details for diagnostics, when the variant carries any.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Http { status, .. } => status
                .map(|s| serde_json::json!({ "status": s.as_u16() })),
            Self::Timeout { elapsed_ms } => {
                Some(serde_json::json!({ "elapsed_ms": elapsed_ms }))
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::ResponseFormat {
            message: err.to_string(),
            raw: String::new(),
        }
    }
}
