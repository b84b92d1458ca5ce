use crate::chat::ResolvedRequest;
use crate::config::ProviderConfig;
use crate::error::ChatError;
use crate::upstream;
use axum::response::sse::Event;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const RELAY_CHANNEL_CAPACITY: usize = 64;
const GENERIC_STREAM_ERROR: &str = "stream error";
const STREAM_TRUNCATED: &str = "upstream stream ended before completion";

/// Event sent to the client. `Done` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Done,
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta(_))
    }

    pub fn to_wire(&self) -> Value {
        match self {
            StreamEvent::Delta(text) => json!({ "delta": text }),
            StreamEvent::Done => json!({ "done": true }),
            StreamEvent::Error(message) => json!({ "error": message }),
        }
    }

    pub fn to_sse(&self) -> Event {
        Event::default().data(self.to_wire().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    TextDelta(String),
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    Failed,
    Truncated,
    ClientGone,
}

impl RelayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayOutcome::Completed => "completed",
            RelayOutcome::Failed => "failed",
            RelayOutcome::Truncated => "truncated",
            RelayOutcome::ClientGone => "client_gone",
        }
    }
}

pub fn decode_upstream_event(event: &str, data: &str) -> Option<UpstreamEvent> {
    if data.trim() == "[DONE]" {
        return Some(UpstreamEvent::Completed);
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("skipping unparsable upstream stream frame: {err}");
            return None;
        }
    };
    let kind = if event.is_empty() || event == "message" {
        value.get("type").and_then(|v| v.as_str()).unwrap_or("")
    } else {
        event
    };
    match kind {
        "response.output_text.delta" => {
            let delta = value
                .get("delta")
                .and_then(|v| v.as_str())
                .or_else(|| value.get("text").and_then(|v| v.as_str()))?;
            Some(UpstreamEvent::TextDelta(delta.to_string()))
        }
        "response.completed" => Some(UpstreamEvent::Completed),
        "response.error" | "response.failed" | "error" => {
            Some(UpstreamEvent::Failed(stream_error_message(&value)))
        }
        _ => None,
    }
}

fn stream_error_message(value: &Value) -> String {
    upstream::error_message_from_value(value)
        .or_else(|| {
            value
                .get("response")
                .and_then(upstream::error_message_from_value)
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| GENERIC_STREAM_ERROR.to_string())
}

pub fn upstream_events<S, E>(
    bytes: S,
) -> impl Stream<Item = Result<UpstreamEvent, String>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    bytes.eventsource().filter_map(|result| async move {
        match result {
            Ok(ev) => decode_upstream_event(&ev.event, &ev.data).map(Ok),
            Err(err) => Some(Err(err.to_string())),
        }
    })
}

/// Forwards `events` to `tx` until a terminal event has been sent or the
/// receiving side goes away. Exactly one terminal event is sent unless the
/// client disconnects first.
pub async fn relay<S>(events: S, tx: mpsc::Sender<StreamEvent>) -> RelayOutcome
where
    S: Stream<Item = Result<UpstreamEvent, String>>,
{
    let mut events = std::pin::pin!(events);
    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => return RelayOutcome::ClientGone,
            next = events.next() => next,
        };
        let mut outcome = RelayOutcome::Failed;
        let event = match next {
            Some(Ok(UpstreamEvent::TextDelta(text))) => StreamEvent::Delta(text),
            Some(Ok(UpstreamEvent::Completed)) => {
                outcome = RelayOutcome::Completed;
                StreamEvent::Done
            }
            Some(Ok(UpstreamEvent::Failed(message))) | Some(Err(message)) => {
                StreamEvent::Error(message)
            }
            None => {
                outcome = RelayOutcome::Truncated;
                StreamEvent::Error(STREAM_TRUNCATED.to_string())
            }
        };
        let terminal = event.is_terminal();
        if tx.send(event).await.is_err() {
            return RelayOutcome::ClientGone;
        }
        if terminal {
            return outcome;
        }
    }
}

pub async fn open(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    request: ResolvedRequest,
) -> Result<ReceiverStream<StreamEvent>, ChatError> {
    let body = request.to_upstream_body(true);
    let resp = upstream::open_responses_stream(client, provider, &body)
        .await
        .map_err(|err| {
            metrics::counter!("chatrelay_upstream_errors_total").increment(1);
            tracing::warn!(model = %request.model, "upstream stream failed to open: {}", err.message);
            ChatError::from(err)
        })?;

    let (tx, rx) = mpsc::channel::<StreamEvent>(RELAY_CHANNEL_CAPACITY);
    let model = request.model;
    tokio::spawn(async move {
        let started_at = std::time::Instant::now();
        let outcome = relay(upstream_events(resp.bytes_stream()), tx).await;
        metrics::counter!("chatrelay_stream_outcomes_total", "outcome" => outcome.as_str())
            .increment(1);
        tracing::debug!(
            model = %model,
            outcome = outcome.as_str(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "stream relay finished"
        );
    });
    Ok(ReceiverStream::new(rx))
}
