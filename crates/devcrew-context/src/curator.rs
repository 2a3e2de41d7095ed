use std::collections::HashMap;
use std::sync::Arc;

use crate::candidate::ContextCandidate;
use crate::embeddings::{cosine_similarity, EmbeddingProvider};

const K1: f64 = 1.2;
const B: f64 = 0.25;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase().split_whitespace().map(|s| s.to_string()).collect()
}

/// BM25-lite: the document-length normalizer collapses `avg|doc| = |doc|`
/// by design, so no corpus-wide statistics are needed to score a single
/// candidate against a query.
fn bm25_light(query_tokens: &[String], doc_tokens: &[String]) -> f64 {
    if doc_tokens.is_empty() || query_tokens.is_empty() {
        return 0.0;
    }
    let mut term_freq: HashMap<&str, usize> = HashMap::new();
    for t in doc_tokens {
        *term_freq.entry(t.as_str()).or_insert(0) += 1;
    }
    let doc_len = doc_tokens.len() as f64;
    let avg_doc_len = doc_len;

    let mut score = 0.0;
    for q in query_tokens {
        let tf = *term_freq.get(q.as_str()).unwrap_or(&0) as f64;
        if tf == 0.0 {
            continue;
        }
        let numerator = (K1 + 1.0) * tf;
        let denominator = tf + K1 * (B + (1.0 - B) * (doc_len / avg_doc_len));
        score += numerator / denominator;
    }
    score
}

/// Ranks candidates by `0.6 * lex + 0.4 * cos`, drops anything below
/// `min_score`, and keeps the top `top_k`.
pub struct Curator {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Curator {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    pub async fn rank(
        &self,
        query: &str,
        mut candidates: Vec<ContextCandidate>,
        min_score: f64,
        top_k: usize,
    ) -> Vec<ContextCandidate> {
        if candidates.is_empty() {
            return candidates;
        }
        let query_tokens = tokenize(query);

        let mut texts: Vec<String> = vec![query.to_string()];
        texts.extend(candidates.iter().map(|c| c.content.clone()));
        let vectors = self.embedder.embed(&texts).await;
        let query_vec = &vectors[0];

        for (candidate, vector) in candidates.iter_mut().zip(vectors.iter().skip(1)) {
            let doc_tokens = tokenize(&candidate.content);
            let lex = bm25_light(&query_tokens, &doc_tokens);
            let cos = cosine_similarity(query_vec, vector);
            candidate.score = 0.6 * lex + 0.4 * cos;
        }

        candidates.retain(|c| c.score >= min_score);
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(top_k);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddingProvider;

    fn candidate(id: &str, content: &str) -> ContextCandidate {
        ContextCandidate::new(id, "repo", id, content.to_string())
    }

    #[tokio::test]
    async fn prefers_lexically_relevant_candidate() {
        let curator = Curator::new(Arc::new(HashEmbeddingProvider));
        let candidates = vec![
            candidate("http", "the http client retries requests with exponential backoff"),
            candidate("css", "body { margin: 0; padding: 0; color: blue; }"),
        ];
        let ranked = curator.rank("http client retry backoff", candidates, 0.0, 10).await;
        assert_eq!(ranked[0].id, "http");
    }

    #[tokio::test]
    async fn filters_below_min_score() {
        let curator = Curator::new(Arc::new(HashEmbeddingProvider));
        let candidates = vec![candidate("only", "completely unrelated filler text")];
        let ranked = curator.rank("http client retry backoff", candidates, 10.0, 10).await;
        assert!(ranked.is_empty());
    }
}
