use crate::config::ModelMapEntry;
use std::collections::HashMap;
use std::sync::Arc;

pub const FALLBACK_MODEL: &str = "gpt-5-mini";

const BUILTIN_MODELS: &[(&str, &str)] = &[
    ("GPT-5", "gpt-5"),
    ("GPT-5-mini", "gpt-5-mini"),
    ("GPT-5-nano", "gpt-5-nano"),
    ("GPT-4.1", "gpt-4.1"),
];

/// Maps client-facing model labels to provider model ids.
#[derive(Clone)]
pub struct ModelRegistry {
    inner: Arc<HashMap<String, String>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::with_entries(Vec::new())
    }

    pub fn with_entries(entries: Vec<ModelMapEntry>) -> Self {
        let mut map: HashMap<String, String> = BUILTIN_MODELS
            .iter()
            .map(|(label, id)| (label.to_string(), id.to_string()))
            .collect();
        for entry in entries {
            map.insert(
                entry.label.trim().to_string(),
                entry.upstream_model.trim().to_string(),
            );
        }
        Self {
            inner: Arc::new(map),
        }
    }

    pub fn resolve(&self, label: Option<&str>) -> String {
        label
            .and_then(|label| self.inner.get(label))
            .cloned()
            .unwrap_or_else(|| FALLBACK_MODEL.to_string())
    }

    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.inner.keys().cloned().collect();
        labels.sort();
        labels
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
