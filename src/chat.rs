use crate::error::ChatError;
use crate::model_registry::ModelRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn from_client(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Value>,
    pub model: Option<String>,
    pub system: Option<String>,
}

impl ChatRequest {
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        Self {
            messages: obj
                .get("messages")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            model: obj
                .get("model")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            system: obj
                .get("system")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ChatError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| ChatError::InvalidPayload)?;
        Ok(Self::from_value(&value))
    }

    // `messages` arrives JSON-encoded; anything that is not an array counts
    // as no messages, same as in a body.
    pub fn from_query_fields(
        messages: Option<&str>,
        model: Option<String>,
        system: Option<String>,
    ) -> Self {
        let messages = messages
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|value| match value {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default();
        Self {
            messages,
            model,
            system,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub input: Vec<ChatMessage>,
    pub model: String,
}

impl ResolvedRequest {
    pub fn to_upstream_body(&self, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "input": self.input,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }
}

pub fn build_input(request: &ChatRequest) -> Vec<ChatMessage> {
    let mut input = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = request.system.as_deref() {
        let trimmed = system.trim();
        if !trimmed.is_empty() {
            input.push(ChatMessage::new(Role::System, trimmed));
        }
    }

    for message in &request.messages {
        let Some(obj) = message.as_object() else {
            continue;
        };
        let role = obj.get("role").and_then(|v| v.as_str());
        let content = obj.get("content").and_then(|v| v.as_str());
        let (Some(role), Some(content)) = (role, content) else {
            continue;
        };
        let Some(role) = Role::from_client(role) else {
            continue;
        };
        input.push(ChatMessage::new(role, content));
    }

    input
}

pub fn normalize(
    request: &ChatRequest,
    models: &ModelRegistry,
) -> Result<ResolvedRequest, ChatError> {
    let input = build_input(request);
    if input.is_empty() {
        return Err(ChatError::EmptyInput);
    }
    Ok(ResolvedRequest {
        input,
        model: models.resolve(request.model.as_deref()),
    })
}
