//! Translation between the relay vocabulary and the Ollama wire format.

use http::StatusCode;
use llm_relay::provider::{
    ChatMessage, ChatRole, Completion, CompletionParams, ResponseFormat, TokenUsage,
};
use llm_relay::RelayError;

use crate::types::{
    ChatRequest, ChatResponse, ErrorResponse, GenerateRequest, GenerateResponse,
    Message, Options,
};

/// Picks the model for a request: the per-request override wins over the
/// configured default.
pub(crate) fn resolve_model(params: &CompletionParams, configured: &str) -> String {
    params
        .model
        .clone()
        .unwrap_or_else(|| configured.to_owned())
}

fn wire_format(format: Option<ResponseFormat>) -> Option<&'static str> {
    match format {
        Some(ResponseFormat::Json) => Some("json"),
        // Text is Ollama's default; sending nothing keeps older servers happy.
        Some(ResponseFormat::Text) | Some(_) | None => None,
    }
}

/// Maps sampling parameters into Ollama's nested `options` object.
/// `max_tokens` becomes `num_predict`. Returns `None` when nothing is set
/// so the field is omitted entirely.
fn wire_options(params: &CompletionParams) -> Option<Options> {
    let options = Options {
        temperature: params.temperature,
        top_p: params.top_p,
        presence_penalty: params.presence_penalty,
        frequency_penalty: params.frequency_penalty,
        num_predict: params.max_tokens,
        stop: params.stop.clone(),
    };
    if options.is_empty() { None } else { Some(options) }
}

pub(crate) fn build_generate_request(
    params: &CompletionParams,
    configured_model: &str,
    stream: bool,
) -> GenerateRequest {
    GenerateRequest {
        model: resolve_model(params, configured_model),
        prompt: params.prompt.clone(),
        system: params.system.clone(),
        stream,
        format: wire_format(params.format),
        options: wire_options(params),
    }
}

fn wire_role(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

pub(crate) fn build_chat_request(
    messages: &[ChatMessage],
    params: &CompletionParams,
    configured_model: &str,
    stream: bool,
) -> ChatRequest {
    let mut wire_messages = Vec::with_capacity(messages.len() + 1);
    // A system param goes first, ahead of any history.
    if let Some(system) = &params.system {
        wire_messages.push(Message {
            role: "system".into(),
            content: system.clone(),
        });
    }
    wire_messages.extend(messages.iter().map(|m| Message {
        role: wire_role(m.role).into(),
        content: m.content.clone(),
    }));
    ChatRequest {
        model: resolve_model(params, configured_model),
        messages: wire_messages,
        stream,
        format: wire_format(params.format),
        options: wire_options(params),
    }
}

fn usage_from_counts(prompt: Option<u64>, eval: Option<u64>) -> Option<TokenUsage> {
    if prompt.is_none() && eval.is_none() {
        return None;
    }
    Some(TokenUsage {
        input_tokens: prompt.unwrap_or(0),
        output_tokens: eval.unwrap_or(0),
    })
}

pub(crate) fn convert_generate_response(
    response: GenerateResponse,
    params: &CompletionParams,
    configured_model: &str,
) -> Completion {
    let model = response
        .model
        .unwrap_or_else(|| resolve_model(params, configured_model));
    let mut completion = Completion::new(response.response, model, params.prompt.clone());
    completion.usage = usage_from_counts(response.prompt_eval_count, response.eval_count);
    completion.format = params.format;
    completion
}

pub(crate) fn convert_chat_response(
    response: ChatResponse,
    params: &CompletionParams,
    configured_model: &str,
) -> Completion {
    let model = response
        .model
        .unwrap_or_else(|| resolve_model(params, configured_model));
    let mut completion =
        Completion::new(response.message.content, model, params.prompt.clone());
    completion.usage = usage_from_counts(response.prompt_eval_count, response.eval_count);
    completion.format = params.format;
    completion
}

/// Maps a non-2xx status and body into a [`RelayError`].
///
/// Ollama reports errors as `{"error": "..."}`; an unparseable body
/// falls back to the raw text. 429 and 5xx are retryable.
pub(crate) fn convert_error(status: StatusCode, body: &str) -> RelayError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_owned());
    RelayError::Http {
        status: Some(status),
        message,
        retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
    }
}
