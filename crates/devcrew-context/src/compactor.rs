use crate::candidate::{estimate_tokens, ContextCandidate};

/// Extracts lines that fall inside fenced code blocks (between ``` markers)
/// first; if none are present, falls back to the leading prefix of the
/// content.
fn preferred_excerpt(content: &str, char_budget: usize) -> String {
    let mut fenced = String::new();
    let mut in_fence = false;
    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            fenced.push_str(line);
            fenced.push('\n');
            if fenced.len() >= char_budget {
                break;
            }
        }
    }
    if !fenced.is_empty() {
        return truncate_chars(&fenced, char_budget);
    }
    truncate_chars(content, char_budget)
}

fn truncate_chars(content: &str, char_budget: usize) -> String {
    if content.len() <= char_budget {
        return content.to_string();
    }
    content.chars().take(char_budget).collect()
}

/// For every candidate whose token count exceeds `threshold`, compresses it
/// toward `max(threshold, tokens * 0.5)`. Returns the (possibly mutated)
/// candidates plus the number of compaction operations performed.
pub fn compact_candidates(
    mut candidates: Vec<ContextCandidate>,
    available_tokens: u32,
    threshold_ratio: f64,
) -> (Vec<ContextCandidate>, u32) {
    let threshold = ((available_tokens as f64) * threshold_ratio).floor() as u32;
    let mut ops = 0;

    for candidate in candidates.iter_mut() {
        if candidate.tokens <= threshold {
            continue;
        }
        let target_tokens = threshold.max((candidate.tokens as f64 * 0.5).floor() as u32);
        let char_budget = (target_tokens as usize) * 4;
        candidate.content = preferred_excerpt(&candidate.content, char_budget);
        candidate.tokens = estimate_tokens(&candidate.content);
        ops += 1;
    }

    (candidates, ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_large_fenced_candidate() {
        let body = "```\n".to_string() + &"x".repeat(1000) + "\n```\n";
        let candidate = ContextCandidate::new("c1", "repo", "big", body).with_tokens(1000);
        let (compacted, ops) = compact_candidates(vec![candidate], 200, 0.5);
        assert_eq!(ops, 1);
        assert!(compacted[0].tokens < 1000);
    }

    #[test]
    fn leaves_small_candidates_untouched() {
        let candidate = ContextCandidate::new("c1", "repo", "small", "hello".to_string());
        let (compacted, ops) = compact_candidates(vec![candidate], 200, 0.5);
        assert_eq!(ops, 0);
        assert_eq!(compacted[0].content, "hello");
    }
}
