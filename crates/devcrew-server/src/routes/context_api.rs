use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use devcrew_core::EmbeddingRecord;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestDocRequest {
    pub ref_id: String,
    pub text: String,
}

#[derive(Serialize)]
pub struct IngestDocResponse {
    pub ref_id: String,
}

/// Stores a vector for the `doc` scope. The embedding provider's wire
/// format is out of scope; here the vector is produced by the same
/// deterministic hash fallback the context engine uses when hermetic
/// behavior is required, keeping this endpoint usable without a live
/// embedding provider configured.
pub async fn ingest_doc(
    State(state): State<AppState>,
    Json(req): Json<IngestDocRequest>,
) -> (StatusCode, Json<IngestDocResponse>) {
    let vector = devcrew_context::embeddings::HashEmbeddingProvider;
    use devcrew_context::embeddings::EmbeddingProvider;
    let embedded = vector.embed(&[req.text.clone()]).await.remove(0);

    state
        .store
        .upsert_embedding(EmbeddingRecord {
            scope: "doc".to_string(),
            ref_id: req.ref_id.clone(),
            text: req.text,
            vector: embedded,
        })
        .await;

    (StatusCode::CREATED, Json(IngestDocResponse { ref_id: req.ref_id }))
}
