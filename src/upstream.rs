use crate::config::ProviderConfig;
use crate::error::ChatError;
use axum::http::StatusCode;
use serde_json::Value;

pub const RESPONSES_PATH: &str = "/v1/responses";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Config,
    Network,
    Http,
    Decode,
}

#[derive(Debug, Clone)]
pub struct UpstreamCallError {
    pub kind: UpstreamErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,
}

impl UpstreamCallError {
    pub fn new(kind: UpstreamErrorKind, status: Option<StatusCode>, message: String) -> Self {
        Self {
            kind,
            status,
            message,
        }
    }
}

const GENERIC_UPSTREAM_ERROR: &str = "Unknown error occurred";

impl From<UpstreamCallError> for ChatError {
    fn from(err: UpstreamCallError) -> Self {
        match err.kind {
            UpstreamErrorKind::Config => ChatError::MissingCredential,
            _ if err.message.trim().is_empty() => {
                ChatError::Upstream(GENERIC_UPSTREAM_ERROR.to_string())
            }
            _ => ChatError::Upstream(err.message),
        }
    }
}

pub async fn call_responses(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    body: &Value,
) -> Result<Value, UpstreamCallError> {
    let resp = call_upstream_raw(
        client,
        provider,
        RESPONSES_PATH,
        body,
        Some(provider.request_timeout_ms),
    )
    .await?;
    let status = resp.status();
    let text = resp.text().await.map_err(|err| {
        UpstreamCallError::new(UpstreamErrorKind::Network, Some(status), err.to_string())
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|err| {
        UpstreamCallError::new(
            UpstreamErrorKind::Decode,
            Some(status),
            format!("invalid upstream response: {err}"),
        )
    })?;
    if let Some(message) = error_message_from_value(&value) {
        return Err(UpstreamCallError::new(
            UpstreamErrorKind::Http,
            Some(status),
            message,
        ));
    }
    Ok(value)
}

pub async fn open_responses_stream(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    body: &Value,
) -> Result<reqwest::Response, UpstreamCallError> {
    call_upstream_raw(client, provider, RESPONSES_PATH, body, None).await
}

pub async fn call_upstream_raw(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    path: &str,
    body: &Value,
    timeout_ms: Option<u64>,
) -> Result<reqwest::Response, UpstreamCallError> {
    let api_key = provider.api_key.as_deref().ok_or_else(|| {
        UpstreamCallError::new(UpstreamErrorKind::Config, None, "missing api key".to_string())
    })?;
    let url = join_url(&provider.base_url, path);
    let mut req = client.post(url).bearer_auth(api_key).json(body);
    if let Some(timeout_ms) = timeout_ms {
        req = req.timeout(std::time::Duration::from_millis(timeout_ms));
    }
    let resp = req
        .send()
        .await
        .map_err(|err| UpstreamCallError::new(UpstreamErrorKind::Network, None, err.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = extract_error_message(&text)
            .unwrap_or_else(|| format!("upstream status {}", status));
        return Err(UpstreamCallError::new(
            UpstreamErrorKind::Http,
            Some(status),
            message,
        ));
    }
    Ok(resp)
}

pub fn extract_output_text(value: &Value) -> String {
    if let Some(text) = value.get("output_text").and_then(|v| v.as_str()) {
        return text.to_string();
    }
    let mut out = String::new();
    let Some(items) = value.get("output").and_then(|v| v.as_array()) else {
        return out;
    };
    for item in items {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        let Some(parts) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for part in parts {
            if part.get("type").and_then(|v| v.as_str()) == Some("output_text") {
                if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                    out.push_str(text);
                }
            }
        }
    }
    out
}

pub fn error_message_from_value(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if let Some(message) = error.get("message").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }
    error.as_str().map(|s| s.to_string())
}

fn extract_error_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    error_message_from_value(&value)
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut path = path.trim_start_matches('/');
    if base.ends_with("/v1") {
        if path == "v1" {
            path = "";
        } else if let Some(stripped) = path.strip_prefix("v1/") {
            path = stripped;
        }
    }
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_url_does_not_double_the_version_segment() {
        assert_eq!(
            join_url("https://api.openai.com/v1", RESPONSES_PATH),
            "https://api.openai.com/v1/responses"
        );
        assert_eq!(
            join_url("http://127.0.0.1:9000/", RESPONSES_PATH),
            "http://127.0.0.1:9000/v1/responses"
        );
    }

    #[test]
    fn output_text_field_wins() {
        let value = json!({ "output_text": "direct", "output": [] });
        assert_eq!(extract_output_text(&value), "direct");
    }

    #[test]
    fn output_text_is_collected_from_message_items() {
        let value = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        { "type": "output_text", "text": "Hel" },
                        { "type": "refusal", "refusal": "no" },
                        { "type": "output_text", "text": "lo" }
                    ]
                }
            ]
        });
        assert_eq!(extract_output_text(&value), "Hello");
        assert_eq!(extract_output_text(&json!({})), "");
    }

    #[test]
    fn error_messages_are_read_from_either_shape() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"bad key","code":"invalid_api_key"}}"#),
            Some("bad key".to_string())
        );
        assert_eq!(
            extract_error_message(r#"{"error":"plain"}"#),
            Some("plain".to_string())
        );
        assert_eq!(extract_error_message("<html>"), None);
        assert_eq!(error_message_from_value(&json!({ "error": null })), None);
    }

    #[test]
    fn call_errors_map_onto_the_chat_taxonomy() {
        let missing = UpstreamCallError::new(UpstreamErrorKind::Config, None, "x".to_string());
        assert_eq!(ChatError::from(missing), ChatError::MissingCredential);

        let blank = UpstreamCallError::new(
            UpstreamErrorKind::Http,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            String::new(),
        );
        assert_eq!(
            ChatError::from(blank),
            ChatError::Upstream(GENERIC_UPSTREAM_ERROR.to_string())
        );

        let network =
            UpstreamCallError::new(UpstreamErrorKind::Network, None, "refused".to_string());
        assert_eq!(ChatError::from(network), ChatError::Upstream("refused".to_string()));
    }
}
