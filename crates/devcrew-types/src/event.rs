use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::JobView;

/// A job lifecycle event broadcast on the event bus. `payload` always
/// carries the full job snapshot, matching the original's `JobEvent(type,
/// payload)` frozen dataclass where `payload = serialize_job(job)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    #[serde(rename = "type")]
    pub event_type: EngineEventType,
    pub job_id: Uuid,
    pub payload: JobView,
    pub emitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEventType {
    JobCreated,
    JobUpdated,
    JobCompleted,
    JobFailed,
    JobCancelled,
}

impl EngineEvent {
    pub fn new(event_type: EngineEventType, job: JobView) -> Self {
        Self {
            event_type,
            job_id: job.id,
            payload: job,
            emitted_at: Utc::now(),
        }
    }
}
