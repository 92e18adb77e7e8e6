//! Translation between the relay vocabulary and the `/v1` wire format.

use http::StatusCode;
use llm_relay::provider::{
    ChatMessage, ChatRole, Completion, CompletionParams, ResponseFormat, TokenUsage,
};
use llm_relay::RelayError;

use crate::types::{
    ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, ErrorResponse,
    Message, Usage, WireResponseFormat,
};

pub(crate) fn resolve_model(params: &CompletionParams, configured: &str) -> String {
    params
        .model
        .clone()
        .unwrap_or_else(|| configured.to_owned())
}

pub(crate) fn build_completion_request(
    params: &CompletionParams,
    configured_model: &str,
    stream: bool,
) -> CompletionRequest {
    // The legacy endpoint has no system slot; a system param is folded
    // into the prompt text.
    let prompt = match &params.system {
        Some(system) => format!("{system}\n\n{}", params.prompt),
        None => params.prompt.clone(),
    };
    CompletionRequest {
        model: resolve_model(params, configured_model),
        prompt,
        stream,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        top_p: params.top_p,
        presence_penalty: params.presence_penalty,
        frequency_penalty: params.frequency_penalty,
        stop: params.stop.clone(),
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
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        top_p: params.top_p,
        presence_penalty: params.presence_penalty,
        frequency_penalty: params.frequency_penalty,
        stop: params.stop.clone(),
        response_format: match params.format {
            Some(ResponseFormat::Json) => Some(WireResponseFormat {
                kind: "json_object",
            }),
            Some(ResponseFormat::Text) | Some(_) | None => None,
        },
    }
}

fn convert_usage(usage: Option<Usage>) -> Option<TokenUsage> {
    usage.map(|u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    })
}

pub(crate) fn convert_completion_response(
    response: CompletionResponse,
    params: &CompletionParams,
    configured_model: &str,
) -> Result<Completion, RelayError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::ResponseFormat {
            message: "response carried no choices".into(),
            raw: String::new(),
        })?;
    let model = response
        .model
        .unwrap_or_else(|| resolve_model(params, configured_model));
    let mut completion = Completion::new(choice.text, model, params.prompt.clone());
    completion.usage = convert_usage(response.usage);
    completion.format = params.format;
    Ok(completion)
}

pub(crate) fn convert_chat_response(
    response: ChatResponse,
    params: &CompletionParams,
    configured_model: &str,
) -> Result<Completion, RelayError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::ResponseFormat {
            message: "response carried no choices".into(),
            raw: String::new(),
        })?;
    let model = response
        .model
        .unwrap_or_else(|| resolve_model(params, configured_model));
    let mut completion =
        Completion::new(choice.message.content, model, params.prompt.clone());
    completion.usage = convert_usage(response.usage);
    completion.format = params.format;
    Ok(completion)
}

/// Maps a non-2xx status and body into a [`RelayError`].
///
/// The dialect nests errors as `{"error": {"message": ...}}`; an
/// unparseable body falls back to the raw text. 429 and 5xx are
/// retryable.
pub(crate) fn convert_error(status: StatusCode, body: &str) -> RelayError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_owned());
    RelayError::Http {
        status: Some(status),
        message,
        retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
    }
}
