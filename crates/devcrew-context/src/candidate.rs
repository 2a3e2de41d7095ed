use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextCandidate {
    pub id: String,
    pub source_kind: String,
    pub title: String,
    pub content: String,
    pub tokens: u32,
    pub metadata: serde_json::Value,
    /// Populated by the curator once ranking has run.
    pub score: f64,
}

impl ContextCandidate {
    pub fn new(id: impl Into<String>, source_kind: impl Into<String>, title: impl Into<String>, content: String) -> Self {
        let tokens = estimate_tokens(&content);
        Self {
            id: id.into(),
            source_kind: source_kind.into(),
            title: title.into(),
            content,
            tokens,
            metadata: serde_json::Value::Null,
            score: 0.0,
        }
    }

    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub fn estimate_tokens(content: &str) -> u32 {
    (content.len() as u32 / 4).max(1)
}
