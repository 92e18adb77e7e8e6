//! Streaming completion events.
//!
//! A streaming request yields an ordered, finite sequence of
//! [`StreamEvent`]s through a [`CompletionStream`]. Every event before the
//! last carries an incremental text delta; the last event has
//! [`is_complete`](StreamEvent::is_complete) set and carries the *full*
//! aggregated text, so a consumer that only wants the final answer can
//! ignore everything else.
//!
//! # Collecting a stream
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use llm_relay::{CompletionStream, StreamEvent};
//!
//! async fn print_stream(mut stream: CompletionStream) {
//!     while let Some(event) = stream.next().await {
//!         match event {
//!             Ok(StreamEvent { is_complete: false, content, .. }) => print!("{content}"),
//!             Ok(event) => println!("\n[done: {} tokens]", event.token_count.unwrap_or(0)),
//!             Err(e) => eprintln!("stream error: {e}"),
//!         }
//!     }
//! }
//! ```

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// A pinned, boxed, `Send` stream of [`StreamEvent`] results.
///
/// Consume it with [`StreamExt`](futures::StreamExt) from the `futures`
/// crate. The sequence is finite and non-restartable; events arrive in
/// source order and no event follows the one with `is_complete = true`.
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, RelayError>> + Send>>;

/// One frame of a streaming response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Incremental text. On the final event this is the full aggregated
    /// response rather than a delta.
    pub content: String,
    /// `true` exactly once, on the last event of the stream.
    pub is_complete: bool,
    /// Output token count, when the backend reported one (final event).
    pub token_count: Option<u64>,
    /// When the event was produced, in Unix milliseconds. Set on the
    /// final event.
    pub timestamp_ms: Option<u64>,
}

impl StreamEvent {
    /// An intermediate delta event.
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_complete: false,
            token_count: None,
            timestamp_ms: None,
        }
    }

    /// The terminal event carrying the aggregated text.
    pub fn complete(content: impl Into<String>, token_count: Option<u64>) -> Self {
        Self {
            content: content.into(),
            is_complete: true,
            token_count,
            timestamp_ms: Some(crate::event::unix_millis()),
        }
    }
}
