use crate::app::AppState;
use crate::chat::{self, ChatMessage, ChatRequest, ResolvedRequest, Role};
use crate::error::{AppResult, ChatError};
use crate::model_registry::FALLBACK_MODEL;
use crate::relay::{self, StreamEvent};
use crate::upstream;
use axum::Json;
use axum::extract::{Query, State};
use axum::response::sse::KeepAlive;
use axum::response::{IntoResponse, Response, Sse};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "models": state.models.labels(),
        "fallback": FALLBACK_MODEL,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "credential_configured": state.runtime.provider.has_credential(),
    }))
}

pub async fn chat(State(state): State<AppState>, body: Bytes) -> AppResult<Json<ChatMessage>> {
    ensure_credential(&state)?;
    let resolved = normalize_body(&state, &body)?;
    metrics::counter!("chatrelay_chat_requests_total", "mode" => "sync").increment(1);
    tracing::debug!(
        model = %resolved.model,
        messages = resolved.input.len(),
        "forwarding chat request"
    );

    let value = upstream::call_responses(
        &state.http,
        &state.runtime.provider,
        &resolved.to_upstream_body(false),
    )
    .await
    .map_err(|err| {
        metrics::counter!("chatrelay_upstream_errors_total").increment(1);
        tracing::warn!(model = %resolved.model, "chat request failed: {}", err.message);
        ChatError::from(err)
    })?;

    Ok(Json(ChatMessage::new(
        Role::Assistant,
        upstream::extract_output_text(&value),
    )))
}

pub async fn chat_stream(State(state): State<AppState>, body: Bytes) -> AppResult<Response> {
    ensure_credential(&state)?;
    let resolved = normalize_body(&state, &body)?;
    metrics::counter!("chatrelay_chat_requests_total", "mode" => "stream").increment(1);
    Ok(stream_response(&state, resolved).await)
}

pub async fn init_stream(State(state): State<AppState>, body: Bytes) -> AppResult<Json<Value>> {
    ensure_credential(&state)?;
    let resolved = normalize_body(&state, &body)?;
    let stream_id = state.handoffs.register(resolved);
    Ok(Json(json!({ "streamId": stream_id })))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "streamId")]
    pub stream_id: Option<String>,
    pub payload: Option<String>,
    pub messages: Option<String>,
    pub model: Option<String>,
    pub system: Option<String>,
}

pub async fn subscribe_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> AppResult<Response> {
    ensure_credential(&state)?;
    let resolved = match (query.stream_id, query.payload) {
        (Some(stream_id), _) => state.handoffs.redeem(&stream_id)?,
        (None, Some(payload)) => {
            let request = ChatRequest::from_json_str(&payload)?;
            chat::normalize(&request, &state.models)?
        }
        (None, None) => {
            let request = ChatRequest::from_query_fields(
                query.messages.as_deref(),
                query.model,
                query.system,
            );
            chat::normalize(&request, &state.models)?
        }
    };
    metrics::counter!("chatrelay_chat_requests_total", "mode" => "subscribe").increment(1);
    Ok(stream_response(&state, resolved).await)
}

fn ensure_credential(state: &AppState) -> Result<(), ChatError> {
    if state.runtime.provider.has_credential() {
        Ok(())
    } else {
        Err(ChatError::MissingCredential)
    }
}

fn normalize_body(state: &AppState, body: &[u8]) -> Result<ResolvedRequest, ChatError> {
    let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    chat::normalize(&ChatRequest::from_value(&value), &state.models)
}

async fn stream_response(state: &AppState, request: ResolvedRequest) -> Response {
    match relay::open(&state.http, &state.runtime.provider, request).await {
        Ok(events) => Sse::new(events.map(|event| Ok::<_, Infallible>(event.to_sse())))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(err) => error_to_sse_response(err),
    }
}

fn error_to_sse_response(err: ChatError) -> Response {
    let status = err.status();
    let event = StreamEvent::Error(err.to_string()).to_sse();
    let stream = futures_util::stream::iter([Ok::<_, Infallible>(event)]);
    (status, Sse::new(stream)).into_response()
}
