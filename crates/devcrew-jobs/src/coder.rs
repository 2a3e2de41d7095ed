use devcrew_providers::{Provider, ProviderError};
use devcrew_types::ChatMessage;

pub struct StepResult {
    pub diff: String,
    pub summary: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Implements one plan step, returning the unified diff the provider
/// produced. Dry-run mode returns an empty diff with a canned summary so
/// the worker loop still exercises commit/PR bookkeeping against a
/// scratch directory.
pub async fn implement_step(
    provider: &dyn Provider,
    model: &str,
    messages: &[ChatMessage],
    dry_run: bool,
) -> Result<StepResult, ProviderError> {
    if dry_run {
        return Ok(StepResult {
            diff: String::new(),
            summary: "dry run: no changes produced".to_string(),
            tokens_in: 0,
            tokens_out: 0,
        });
    }

    let response = provider.generate(model, messages).await?;
    let summary = response.text.lines().next().unwrap_or("").to_string();
    Ok(StepResult {
        diff: response.text,
        summary,
        tokens_in: response.tokens_in,
        tokens_out: response.tokens_out,
    })
}
