//! Route handlers
//!
//! `POST /v1/messages` runs, in order: validate, obtain a token, recall
//! cached thinking, repair, debug log, report estimated input, forward, then
//! convert or pass the response through, record thinking and report the
//! upstream-counted input and output tokens.

use super::AppState;
use crate::anthropic::AnthropicResponse;
use crate::convert::{
    convert_response, relay_stream, upstream_events, StreamConverter, StreamMode, StreamOutcome,
};
use crate::core_types::{capability, ConversionRequest};
use crate::error::{RelayError, RelayResult};
use crate::logging::{log_debug, log_info, log_warn};
use crate::store::conversation::{conversation_key, signed_thinking_before_tools};
use crate::store::CachedThinking;
use crate::usage::{spawn_input_estimate, spawn_report, UsageKind, UsageReport};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-request context carried to the response path.
#[derive(Debug, Clone)]
struct Exchange {
    request_id: String,
    model: String,
    conversation: Option<String>,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Models with a known capability entry, in OpenAI list format.
pub async fn list_models() -> Json<Value> {
    let data: Vec<Value> = capability::known_models()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "owned_by": "anthropic",
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

pub async fn messages(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match relay_messages(state, body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// Boundary validation: a JSON object with a string `model` and an array
/// `messages`, decodable as a request.
pub fn parse_request(body: &[u8]) -> RelayResult<ConversionRequest> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RelayError::malformed_request(format!("Body is not valid JSON: {e}")))?;
    let Some(object) = value.as_object() else {
        return Err(RelayError::malformed_request("Body must be a JSON object"));
    };
    if !object.get("model").is_some_and(Value::is_string) {
        return Err(RelayError::malformed_request("'model' must be a string"));
    }
    if !object.get("messages").is_some_and(Value::is_array) {
        return Err(RelayError::malformed_request("'messages' must be an array"));
    }
    serde_json::from_value(value)
        .map_err(|e| RelayError::malformed_request(format!("Unsupported request shape: {e}")))
}

async fn relay_messages(state: Arc<AppState>, body: Bytes) -> RelayResult<Response> {
    let inbound = parse_request(&body)?;
    let access_token = state.tokens.ensure_valid_access_token().await?;

    let exchange = Exchange {
        request_id: uuid::Uuid::new_v4().to_string(),
        model: inbound.model.clone(),
        conversation: conversation_key(&inbound),
    };
    let recalled = recall(&state, &inbound).await;

    let outcome =
        state
            .repairer
            .repair_with_recalled(inbound, capability::lookup(&exchange.model), &recalled);
    let request = outcome.request;
    let translate = outcome.needs_protocol_translation;

    log_info!(
        request_id = %exchange.request_id,
        model = %exchange.model,
        stream = request.stream,
        translate = translate,
        "Relaying request"
    );

    if let Some(log) = &state.request_log {
        log.append(&exchange.request_id, &request, translate).await;
    }
    spawn_input_estimate(
        state.usage.clone(),
        state.estimator.clone(),
        exchange.request_id.clone(),
        request.clone(),
    );

    if request.stream {
        relay_streaming(state, exchange, request, &access_token, translate).await
    } else {
        relay_buffered(state, exchange, request, &access_token, translate).await
    }
}

async fn recall(state: &AppState, request: &ConversionRequest) -> HashMap<String, CachedThinking> {
    let Some(cache) = &state.cache else {
        return HashMap::new();
    };
    match cache.recall(request).await {
        Ok(recalled) => recalled,
        Err(e) => {
            log_warn!(error = %e, "Conversation cache unavailable, healing with placeholders");
            HashMap::new()
        }
    }
}

async fn relay_buffered(
    state: Arc<AppState>,
    exchange: Exchange,
    request: ConversionRequest,
    access_token: &str,
    translate: bool,
) -> RelayResult<Response> {
    if translate {
        let response = state.upstream.create_message(access_token, &request).await?;
        finish(&state, &exchange, &response);
        return Ok(Json(convert_response(&response)).into_response());
    }

    let upstream = state.upstream.send(access_token, &request).await?;
    let raw = upstream.bytes().await.map_err(|e| {
        RelayError::upstream_transport(format!("Failed to read upstream body: {e}"))
    })?;
    match serde_json::from_slice::<AnthropicResponse>(&raw) {
        Ok(response) => finish(&state, &exchange, &response),
        Err(e) => log_debug!(error = %e, "Pass-through body not observable"),
    }
    Ok(([(header::CONTENT_TYPE, "application/json")], raw).into_response())
}

async fn relay_streaming(
    state: Arc<AppState>,
    exchange: Exchange,
    request: ConversionRequest,
    access_token: &str,
    translate: bool,
) -> RelayResult<Response> {
    let upstream = state.upstream.send(access_token, &request).await?;

    let mode = if translate {
        StreamMode::Translate(StreamConverter::new(&exchange.model))
    } else {
        StreamMode::Passthrough
    };
    let completion_state = state.clone();
    let stream = relay_stream(
        upstream_events(upstream.bytes_stream()),
        mode,
        move |outcome: StreamOutcome| {
            record(
                &completion_state,
                &exchange,
                outcome.usage.input_tokens,
                outcome.usage.output_tokens,
                outcome.thinking,
            );
        },
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(|e| RelayError::configuration(format!("Failed to build stream response: {e}")))
}

fn finish(state: &Arc<AppState>, exchange: &Exchange, response: &AnthropicResponse) {
    record(
        state,
        exchange,
        response.usage.total_input_tokens(),
        response.usage.output_tokens,
        signed_thinking_before_tools(&response.content),
    );
}

/// Post-response bookkeeping, all of it off the response path.
fn record(
    state: &Arc<AppState>,
    exchange: &Exchange,
    input_tokens: u32,
    output_tokens: u32,
    thinking: Vec<(String, CachedThinking)>,
) {
    if let (Some(cache), Some(key)) = (state.cache.clone(), exchange.conversation.clone()) {
        if !thinking.is_empty() {
            tokio::spawn(async move {
                if let Err(e) = cache.remember(&key, thinking).await {
                    log_warn!(conversation = %key, error = %e, "Failed to record thinking blocks");
                }
            });
        }
    }

    for (kind, tokens) in [(UsageKind::Input, input_tokens), (UsageKind::Output, output_tokens)] {
        spawn_report(
            state.usage.clone(),
            UsageReport {
                request_id: exchange.request_id.clone(),
                model: exchange.model.clone(),
                kind,
                tokens,
                estimated: false,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_rejects_missing_model() {
        let result = parse_request(br#"{"messages": []}"#);

        match result {
            Err(RelayError::MalformedRequest { message }) => assert!(message.contains("model")),
            other => panic!("Expected MalformedRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_request_rejects_non_array_messages() {
        let result = parse_request(br#"{"model": "claude-sonnet-4", "messages": "hi"}"#);

        assert!(matches!(result, Err(RelayError::MalformedRequest { .. })));
    }

    #[test]
    fn test_parse_request_rejects_non_object_body() {
        assert!(matches!(
            parse_request(b"[1, 2]"),
            Err(RelayError::MalformedRequest { .. })
        ));
        assert!(matches!(
            parse_request(b"not json"),
            Err(RelayError::MalformedRequest { .. })
        ));
    }

    #[test]
    fn test_parse_request_accepts_minimal_body() {
        let request = parse_request(
            br#"{"model": "claude-sonnet-4", "messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .unwrap();

        assert_eq!(request.model, "claude-sonnet-4");
        assert_eq!(request.messages.len(), 1);
        assert!(!request.stream);
    }
}
