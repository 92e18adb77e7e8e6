//! Streamed response decoding.
//!
//! The `/v1` dialect streams as server-sent events: `data: ` payloads
//! separated by blank lines, closed by `data: [DONE]`. Chat deltas ride
//! `choices[0].delta.content`; legacy completion streams use
//! `choices[0].text`. When the caller asked for usage accounting the
//! final data chunk carries a `usage` object.

use llm_relay::decode::{decode_stream, Frame, FrameSyntax};
use llm_relay::stream::CompletionStream;

use crate::types::StreamChunk;

/// Interprets one SSE payload as a stream frame. The `[DONE]` sentinel
/// never reaches this function; the decoder consumes it.
pub(crate) fn extract_frame(payload: &str) -> Frame {
    let chunk: StreamChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return Frame::Malformed(e.to_string()),
    };
    let content = chunk.choices.into_iter().next().and_then(|choice| {
        choice
            .delta
            .and_then(|delta| delta.content)
            .or(choice.text)
            .filter(|text| !text.is_empty())
    });
    // A usage chunk is the last data before the sentinel; finishing here
    // captures the token count.
    if let Some(usage) = chunk.usage {
        return Frame::Done {
            content,
            token_count: Some(usage.completion_tokens),
        };
    }
    content.map_or(Frame::Empty, Frame::Delta)
}

/// Decodes the body of a streamed completion response into events.
pub(crate) fn into_stream(response: reqwest::Response) -> CompletionStream {
    decode_stream(response.bytes_stream(), FrameSyntax::sse(), extract_frame)
}
