use serde::{Deserialize, Serialize};

use devcrew_providers::{Provider, ProviderError};
use devcrew_types::ChatMessage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub title: String,
    pub rationale: String,
    pub acceptance: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

pub struct PlanResult {
    pub steps: Vec<PlanStep>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub raw_text: String,
}

/// Decomposes the task into an ordered plan. In dry-run mode, skips the
/// provider call entirely and synthesizes a single "Analyse Task" step.
pub async fn create_plan(
    provider: &dyn Provider,
    model: &str,
    messages: &[ChatMessage],
    dry_run: bool,
) -> Result<PlanResult, ProviderError> {
    if dry_run {
        return Ok(PlanResult {
            steps: vec![PlanStep {
                title: "Analyse Task".to_string(),
                rationale: "dry run synthesizes a single analysis step".to_string(),
                acceptance: "task has been reviewed".to_string(),
                files: Vec::new(),
                commands: Vec::new(),
            }],
            tokens_in: 0,
            tokens_out: 0,
            raw_text: String::new(),
        });
    }

    let response = provider.generate(model, messages).await?;
    Ok(PlanResult {
        steps: Vec::new(),
        tokens_in: response.tokens_in,
        tokens_out: response.tokens_out,
        raw_text: response.text,
    })
}

/// Parses a planner response as a JSON array of step objects. Kept
/// separate from `create_plan` so the worker can distinguish a provider
/// failure (`ProviderError`) from a parse failure (`PlanParseError`).
pub fn parse_plan(raw_text: &str) -> Result<Vec<PlanStep>, serde_json::Error> {
    serde_json::from_str(raw_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_plan() {
        let raw = r#"[{"title":"Add test","rationale":"coverage","acceptance":"tests pass"}]"#;
        let steps = parse_plan(raw).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].title, "Add test");
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_plan("not json").is_err());
    }
}
