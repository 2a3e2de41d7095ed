use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use devcrew_core::{MemoryFile, MemoryNote, MemoryNoteKind};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddNoteRequest {
    pub kind: MemoryNoteKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub step_id: Option<Uuid>,
}

pub async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddNoteRequest>,
) -> Result<StatusCode, StatusCode> {
    let note = MemoryNote {
        id: Uuid::new_v4(),
        job_id: id,
        kind: req.kind,
        title: req.title,
        body: req.body,
        tags: req.tags,
        step_id: req.step_id,
        created_at: chrono::Utc::now(),
    };
    state
        .store
        .add_note(id, note, state.memory_max_items_per_job, state.memory_max_bytes_per_item)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(StatusCode::CREATED)
}

#[derive(Serialize)]
pub struct MemoryView {
    pub notes: Vec<MemoryNote>,
    pub files: Vec<MemoryFile>,
}

pub async fn get_memory(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<MemoryView>, StatusCode> {
    let job = state.store.get_job(id).await.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(MemoryView {
        notes: job.notes,
        files: job.files,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AddFileRequest {
    pub path: String,
    pub content_base64: String,
}

#[derive(Serialize)]
pub struct AddFileResponse {
    pub path: String,
    pub bytes: u64,
}

pub async fn add_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddFileRequest>,
) -> Result<(StatusCode, Json<AddFileResponse>), StatusCode> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.content_base64)
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let memory_dir = state.data_root.join("memory").join(id.to_string());
    tokio::fs::create_dir_all(&memory_dir).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let full_path = memory_dir.join(&req.path);
    tokio::fs::write(&full_path, &bytes).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let record = MemoryFile {
        job_id: id,
        path: req.path.clone(),
        bytes: bytes.len() as u64,
        created_at: chrono::Utc::now(),
    };
    state
        .store
        .mutate_job(id, |job| job.files.push(record))
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    Ok((
        StatusCode::CREATED,
        Json(AddFileResponse {
            path: req.path,
            bytes: bytes.len() as u64,
        }),
    ))
}
