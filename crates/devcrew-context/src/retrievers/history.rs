use devcrew_core::MessageSummary;

use crate::candidate::ContextCandidate;

/// Up to 10 most-recent MessageSummaries for the job.
pub fn collect_history(history: &[MessageSummary]) -> Vec<ContextCandidate> {
    history
        .iter()
        .rev()
        .take(10)
        .enumerate()
        .map(|(i, summary)| {
            ContextCandidate::new(
                format!("history:{i}"),
                "history",
                summary.role.clone(),
                summary.summary.clone(),
            )
            .with_tokens(summary.tokens)
        })
        .collect()
}
