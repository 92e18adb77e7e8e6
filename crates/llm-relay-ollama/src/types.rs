//! Wire types for the Ollama HTTP API.
//!
//! These mirror the JSON bodies of `/api/generate`, `/api/chat` and
//! `/api/tags`. They are `pub(crate)`: callers only ever see the
//! `llm-relay` request/response vocabulary.

use serde::{Deserialize, Serialize};

/// Body for `POST /api/generate`.
#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

/// Body for `POST /api/chat`.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

/// One chat turn on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Message {
    pub role: String,
    pub content: String,
}

/// Sampling options. Ollama nests these under `options` and calls the
/// token cap `num_predict`.
#[derive(Debug, Default, Serialize)]
pub(crate) struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl Options {
    pub(crate) fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.presence_penalty.is_none()
            && self.frequency_penalty.is_none()
            && self.num_predict.is_none()
            && self.stop.is_none()
    }
}

/// Non-streamed response from `/api/generate`.
#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    pub model: Option<String>,
    pub response: String,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
}

/// Non-streamed response from `/api/chat`.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub model: Option<String>,
    pub message: Message,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
}

/// One JSON line of a streamed `/api/generate` or `/api/chat` response.
///
/// Generate streams carry text in `response`, chat streams in
/// `message.content`; the final line has `done: true` and token counts.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: Option<u64>,
}

/// Response from `GET /api/tags`.
#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagModel>,
}

/// One installed model as `/api/tags` reports it.
#[derive(Debug, Deserialize)]
pub(crate) struct TagModel {
    pub name: String,
}

/// Error body Ollama returns on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}
