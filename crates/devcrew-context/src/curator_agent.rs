use crate::candidate::ContextCandidate;

/// Renders each selected candidate as
/// `[source score=X.YY] [title] <first 3 non-empty lines joined>`.
pub fn build_hints(candidates: &[ContextCandidate]) -> Vec<String> {
    candidates
        .iter()
        .map(|c| {
            let preview: String = c
                .content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .take(3)
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "[{} score={:.2}] [{}] {}",
                c.source_kind, c.score, c.title, preview
            )
        })
        .collect()
}
