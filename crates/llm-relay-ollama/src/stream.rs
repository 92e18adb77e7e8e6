//! Streamed response decoding.
//!
//! Ollama streams completions as JSON Lines: one object per line, text
//! in `response` (generate) or `message.content` (chat), and a final
//! line with `done: true` carrying token counts.

use llm_relay::decode::{decode_stream, Frame, FrameSyntax};
use llm_relay::stream::CompletionStream;

use crate::types::StreamChunk;

/// Interprets one JSON line as a stream frame.
pub(crate) fn extract_frame(payload: &str) -> Frame {
    let chunk: StreamChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return Frame::Malformed(e.to_string()),
    };
    let content = chunk
        .response
        .or_else(|| chunk.message.map(|m| m.content))
        .filter(|text| !text.is_empty());
    if chunk.done {
        Frame::Done {
            content,
            token_count: chunk.eval_count,
        }
    } else {
        content.map_or(Frame::Empty, Frame::Delta)
    }
}

/// Decodes the body of a streamed `/api/generate` or `/api/chat`
/// response into completion events.
pub(crate) fn into_stream(response: reqwest::Response) -> CompletionStream {
    decode_stream(response.bytes_stream(), FrameSyntax::json_lines(), extract_frame)
}
