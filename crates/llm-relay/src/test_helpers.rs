//! Pre-built helpers for testing code that uses `llm-relay` types.
//!
//! Available when the `test-utils` feature is enabled, allowing
//! downstream crates to reuse these utilities in their own test
//! suites. Also compiled during `#[cfg(test)]` for this crate's own
//! tests. Provides sample completions, stream-event sequences, stream
//! collectors, and a quick [`MockProvider`] factory.

use futures::StreamExt;

use crate::error::RelayError;
use crate::mock::MockProvider;
use crate::provider::{Completion, TokenUsage};
use crate::stream::{CompletionStream, StreamEvent};

/// Builds a [`Completion`] answering `prompt` with `content`, with
/// sample usage attached.
pub fn sample_completion(prompt: &str, content: &str) -> Completion {
    Completion {
        usage: Some(sample_usage()),
        ..Completion::new(content, "test-model", prompt)
    }
}

/// Returns a [`TokenUsage`] with 100 input / 50 output tokens.
pub fn sample_usage() -> TokenUsage {
    TokenUsage {
        input_tokens: 100,
        output_tokens: 50,
    }
}

/// Splits `text` into per-word delta events followed by the terminal
/// event carrying the full text.
pub fn delta_events(text: &str) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(' ') {
        events.push(StreamEvent::delta(&rest[..=pos]));
        rest = &rest[pos + 1..];
    }
    if !rest.is_empty() {
        events.push(StreamEvent::delta(rest));
    }
    events.push(StreamEvent::complete(text, None));
    events
}

/// Collect stream events, returning results including errors.
pub async fn collect_stream_results(
    stream: CompletionStream,
) -> Vec<Result<StreamEvent, RelayError>> {
    stream.collect::<Vec<_>>().await
}

/// Collect stream events, panicking on any error.
/// Use [`collect_stream_results`] when testing error scenarios.
pub async fn collect_stream(stream: CompletionStream) -> Vec<StreamEvent> {
    stream
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|r| r.expect("stream event should be Ok"))
        .collect()
}

/// Creates a [`MockProvider`] for `model` with one queued response.
pub fn mock_with_response(model: &str, content: &str) -> MockProvider {
    let mock = MockProvider::new(model);
    mock.queue_response(content);
    mock
}
