use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
}

impl ProviderConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ModelMapEntry {
    pub label: String,
    pub upstream_model: String,
}

pub fn parse_model_map(raw: &str) -> Result<Vec<ModelMapEntry>, String> {
    let entries: Vec<ModelMapEntry> =
        serde_json::from_str(raw).map_err(|err| format!("model_map_invalid: {err}"))?;
    for entry in &entries {
        if entry.label.trim().is_empty() || entry.upstream_model.trim().is_empty() {
            return Err("model_map_invalid: label and upstream_model must be non-empty".into());
        }
    }
    Ok(entries)
}

pub fn default_request_timeout_ms() -> u64 {
    120_000
}

pub fn default_handoff_ttl_secs() -> u64 {
    60
}
