use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use devcrew_core::NewJob;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub task: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch_base: String,
    #[serde(rename = "budgetUsd")]
    pub budget_usd: f64,
    #[serde(rename = "maxRequests")]
    pub max_requests: u32,
    #[serde(rename = "maxMinutes")]
    pub max_minutes: u64,
    #[serde(rename = "modelCTO", default)]
    pub model_cto: Option<String>,
    #[serde(rename = "modelCoder", default)]
    pub model_coder: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub job_id: uuid::Uuid,
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> (StatusCode, Json<CreateTaskResponse>) {
    let job = state
        .store
        .create_job(NewJob {
            task: req.task,
            repo_owner: req.repo_owner,
            repo_name: req.repo_name,
            branch_base: req.branch_base,
            budget_usd_max: req.budget_usd,
            max_requests: req.max_requests,
            max_wallclock_minutes: req.max_minutes,
            planner_model: req.model_cto.unwrap_or_else(|| "gpt-4o".to_string()),
            coder_model: req.model_coder.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            dry_run: req.dry_run,
        })
        .await;

    let engine = state.engine.clone();
    let job_id = job.id;
    tokio::spawn(async move {
        if let Err(err) = engine.run_job(job_id).await {
            tracing::warn!(error = %err, job_id = %job_id, "job terminated with an error");
        }
    });

    (StatusCode::ACCEPTED, Json(CreateTaskResponse { job_id: job.id }))
}
