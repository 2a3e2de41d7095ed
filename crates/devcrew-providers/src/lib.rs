use std::sync::Arc;

use async_trait::async_trait;
use devcrew_types::{estimate_tokens, ChatMessage};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no provider configured")]
    NoProviderConfigured,
    #[error("provider {0} not found")]
    NotFound(String),
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub id: String,
    pub default_model: String,
}

/// `generate(model, messages) -> {text, tokens_in, tokens_out}` — the only
/// contract the Job Execution Engine and Context Engine depend on. Wire
/// formats for any concrete upstream are intentionally not specified
/// beyond this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    fn info(&self) -> ProviderInfo;

    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<LlmResponse, ProviderError>;

    /// Token counting for hard-cap enforcement. Providers that can't count
    /// exactly fall back to the `len/4` heuristic.
    fn count_tokens(&self, messages: &[ChatMessage]) -> u32 {
        messages.iter().map(|m| estimate_tokens(&m.content)).sum()
    }
}

/// Echoes the combined message content, truncated, and reports the
/// heuristic token estimate for both directions. Used whenever a job runs
/// with `dry_run=true` so tests and local runs never touch the network.
pub struct DryRunProvider;

#[async_trait]
impl Provider for DryRunProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "dry-run".to_string(),
            default_model: "dry-run".to_string(),
        }
    }

    async fn generate(
        &self,
        _model: &str,
        messages: &[ChatMessage],
    ) -> Result<LlmResponse, ProviderError> {
        let combined: String = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let text: String = combined.chars().take(2000).collect();
        let tokens_in = self.count_tokens(messages);
        let tokens_out = estimate_tokens(&text);
        Ok(LlmResponse {
            text,
            tokens_in,
            tokens_out,
        })
    }
}

/// OpenAI-compatible chat-completions client: a thin `reqwest` POST with
/// just enough shape to satisfy the `Provider` contract.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "openai-compatible".to_string(),
            default_model: self.default_model.clone(),
        }
    }

    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<LlmResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProviderError::Upstream(format!(
                "upstream returned status {}",
                resp.status()
            )));
        }

        let parsed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;

        let text = parsed["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let tokens_in = parsed["usage"]["prompt_tokens"]
            .as_u64()
            .map(|v| v as u32)
            .unwrap_or_else(|| self.count_tokens(messages));
        let tokens_out = parsed["usage"]["completion_tokens"]
            .as_u64()
            .map(|v| v as u32)
            .unwrap_or_else(|| estimate_tokens(&text));

        Ok(LlmResponse {
            text,
            tokens_in,
            tokens_out,
        })
    }
}

/// Holds the configured providers and resolves which one answers a call:
/// explicit id, else the registry default, else the first registered.
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn Provider>>>,
    default_provider: RwLock<Option<String>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn Provider>>, default_provider: Option<String>) -> Self {
        Self {
            providers: RwLock::new(providers),
            default_provider: RwLock::new(default_provider),
        }
    }

    pub async fn list(&self) -> Vec<ProviderInfo> {
        self.providers.read().await.iter().map(|p| p.info()).collect()
    }

    async fn select_provider(&self, id: Option<&str>) -> Result<Arc<dyn Provider>, ProviderError> {
        let providers = self.providers.read().await;
        if providers.is_empty() {
            return Err(ProviderError::NoProviderConfigured);
        }
        if let Some(id) = id {
            if let Some(p) = providers.iter().find(|p| p.info().id == id) {
                return Ok(p.clone());
            }
            return Err(ProviderError::NotFound(id.to_string()));
        }
        if let Some(default_id) = self.default_provider.read().await.as_ref() {
            if let Some(p) = providers.iter().find(|p| p.info().id == *default_id) {
                return Ok(p.clone());
            }
        }
        Ok(providers[0].clone())
    }

    pub async fn generate(
        &self,
        provider_id: Option<&str>,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<LlmResponse, ProviderError> {
        let provider = self.select_provider(provider_id).await?;
        provider.generate(model, messages).await
    }

    pub async fn count_tokens(&self, provider_id: Option<&str>, messages: &[ChatMessage]) -> u32 {
        match self.select_provider(provider_id).await {
            Ok(provider) => provider.count_tokens(messages),
            Err(_) => messages.iter().map(|m| estimate_tokens(&m.content)).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_echoes_input() {
        let provider = DryRunProvider;
        let messages = vec![ChatMessage::user("hello world")];
        let resp = provider.generate("any-model", &messages).await.unwrap();
        assert!(resp.text.contains("hello world"));
        assert!(resp.tokens_out > 0);
    }

    #[tokio::test]
    async fn registry_falls_back_to_first_provider() {
        let registry = ProviderRegistry::new(vec![Arc::new(DryRunProvider)], None);
        let messages = vec![ChatMessage::user("ping")];
        let resp = registry.generate(None, "m", &messages).await.unwrap();
        assert!(resp.text.contains("ping"));
    }
}
