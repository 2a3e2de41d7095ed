use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use devcrew_types::JobView;

use crate::AppState;

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobView>> {
    let jobs = state.store.list_jobs().await;
    Json(jobs.iter().map(|j| j.view()).collect())
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<JobView>, StatusCode> {
    state
        .store
        .get_job(id)
        .await
        .map(|j| Json(j.view()))
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub status: &'static str,
}

pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<CancelResponse>, StatusCode> {
    state.store.request_cancel(id).await.map_err(|_| StatusCode::NOT_FOUND)?;
    if let Some(job) = state.store.get_job(id).await {
        state.events.publish(devcrew_types::EngineEvent::new(
            devcrew_types::EngineEventType::JobCancelled,
            job.view(),
        ));
    }
    Ok(Json(CancelResponse { status: "cancelled" }))
}

pub async fn get_latest_context(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<devcrew_core::ContextDiagnostic>, StatusCode> {
    let job = state.store.get_job(id).await.ok_or(StatusCode::NOT_FOUND)?;
    job.diagnostics.last().cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}
