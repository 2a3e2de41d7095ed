use std::sync::Arc;

use devcrew_core::EmbeddingRecord;

use crate::candidate::ContextCandidate;
use crate::embeddings::{cosine_similarity, EmbeddingProvider};

const DOC_SCOPE: &str = "doc";
const TOP_N: usize = 5;

/// Top-5 similarity hits in the `doc` scope against a query synthesized
/// from task + step title/rationale/acceptance. Only runs when JIT
/// retrieval is enabled by configuration.
pub async fn collect_external_docs(
    embedder: &Arc<dyn EmbeddingProvider>,
    docs: Vec<EmbeddingRecord>,
    query: &str,
) -> Vec<ContextCandidate> {
    if docs.is_empty() {
        return Vec::new();
    }
    let query_vec = embedder.embed(&[query.to_string()]).await.remove(0);

    let mut scored: Vec<(f64, EmbeddingRecord)> = docs
        .into_iter()
        .filter(|d| d.scope == DOC_SCOPE)
        .map(|d| {
            let score = cosine_similarity(&query_vec, &d.vector);
            (score, d)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(TOP_N);

    scored
        .into_iter()
        .map(|(score, doc)| {
            ContextCandidate::new(format!("external:{}", doc.ref_id), "external_doc", doc.ref_id.clone(), doc.text)
                .with_metadata(serde_json::json!({ "similarity": score }))
        })
        .collect()
}
