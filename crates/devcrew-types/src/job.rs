use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Plan,
    Execution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A snapshot of a job suitable for JSON serialization to API clients and
/// websocket subscribers. Field order and naming mirror `serialize_job`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub task: String,
    pub status: JobStatus,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch: String,
    pub dry_run: bool,
    pub requests_made: u32,
    pub cost_usd: f64,
    pub budget_usd: f64,
    pub max_requests: u32,
    pub deadline_seconds: u64,
    pub progress: f64,
    pub last_action: Option<String>,
    pub pr_links: Vec<String>,
    pub planner_model: String,
    pub coder_model: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Computes `completed_steps / total_steps`, matching `_calculate_progress`:
/// a job with zero steps reports 1.0 once it reaches a terminal Completed
/// status, otherwise 0.0.
pub fn calculate_progress(status: JobStatus, completed_steps: usize, total_steps: usize) -> f64 {
    if total_steps == 0 {
        return if status == JobStatus::Completed { 1.0 } else { 0.0 };
    }
    completed_steps as f64 / total_steps as f64
}
