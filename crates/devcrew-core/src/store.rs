use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use devcrew_types::{calculate_progress, JobStatus, JobView, StepKind, StepStatus};

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStep {
    pub id: Uuid,
    pub job_id: Uuid,
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub details: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub job_id: Uuid,
    pub provider: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryNoteKind {
    Decision,
    Constraint,
    Todo,
    Glossary,
    Link,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNote {
    pub id: Uuid,
    pub job_id: Uuid,
    pub kind: MemoryNoteKind,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub step_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFile {
    pub job_id: Uuid,
    pub path: String,
    pub bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSummary {
    pub job_id: Uuid,
    pub step_id: Option<Uuid>,
    pub role: String,
    pub summary: String,
    pub tokens: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSourceRef {
    pub id: String,
    pub source_kind: String,
    pub score: f64,
    pub tokens: u32,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDiagnostic {
    pub job_id: Uuid,
    pub role: String,
    pub tokens_final: u32,
    pub tokens_clipped: u32,
    pub compact_ops: u32,
    pub budget_tokens: u32,
    pub output_reserve_tokens: u32,
    pub hard_cap_tokens: u32,
    pub selected: Vec<ContextSourceRef>,
    pub dropped: Vec<ContextSourceRef>,
    pub hints: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub scope: String,
    pub ref_id: String,
    pub text: String,
    pub vector: Vec<f32>,
}

/// The in-memory record for a Job plus everything it owns. Mirrors the
/// relational Job/JobStep/CostEntry/... tables as owned vectors on a
/// single parent struct rather than a literal foreign-key schema, per the
/// "model as parent-owned children with back-references by id" guidance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub task: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch_base: String,
    pub status: JobStatus,
    pub budget_usd_max: f64,
    pub max_requests: u32,
    pub max_wallclock_minutes: u64,
    pub planner_model: String,
    pub coder_model: String,
    pub dry_run: bool,
    pub cost_usd: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub requests_made: u32,
    pub last_action: Option<String>,
    pub pr_links: Vec<String>,
    pub agents_hash: Option<String>,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    pub steps: Vec<JobStep>,
    pub costs: Vec<CostEntry>,
    pub notes: Vec<MemoryNote>,
    pub files: Vec<MemoryFile>,
    pub history: Vec<MessageSummary>,
    pub diagnostics: Vec<ContextDiagnostic>,

    /// Monotonic start instant, not serialized: wall-clock deadline checks
    /// must not be skewed by system clock adjustments.
    #[serde(skip)]
    pub started_instant: Option<Instant>,
}

impl JobRecord {
    pub fn view(&self) -> JobView {
        let completed_steps = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        JobView {
            id: self.id,
            task: self.task.clone(),
            status: self.status,
            repo_owner: self.repo_owner.clone(),
            repo_name: self.repo_name.clone(),
            branch: self.branch_base.clone(),
            dry_run: self.dry_run,
            requests_made: self.requests_made,
            cost_usd: self.cost_usd,
            budget_usd: self.budget_usd_max,
            max_requests: self.max_requests,
            deadline_seconds: self.max_wallclock_minutes * 60,
            progress: calculate_progress(self.status, completed_steps, self.steps.len()),
            last_action: self.last_action.clone(),
            pr_links: self.pr_links.clone(),
            planner_model: self.planner_model.clone(),
            coder_model: self.coder_model.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

pub struct NewJob {
    pub task: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch_base: String,
    pub budget_usd_max: f64,
    pub max_requests: u32,
    pub max_wallclock_minutes: u64,
    pub planner_model: String,
    pub coder_model: String,
    pub dry_run: bool,
}

/// Checks the three fatal limits against a monotonic clock. All three are
/// terminal for the job; none are retried.
pub fn check_limits(job: &JobRecord) -> Result<(), CoreError> {
    if job.cost_usd >= job.budget_usd_max {
        return Err(CoreError::BudgetExceeded {
            cost_usd: job.cost_usd,
            max_usd: job.budget_usd_max,
        });
    }
    if job.requests_made >= job.max_requests {
        return Err(CoreError::RequestsExceeded {
            requests_made: job.requests_made,
            max_requests: job.max_requests,
        });
    }
    if let Some(started) = job.started_instant {
        let elapsed_minutes = started.elapsed().as_secs_f64() / 60.0;
        if elapsed_minutes > job.max_wallclock_minutes as f64 {
            return Err(CoreError::DeadlineExceeded {
                elapsed_minutes,
                max_wallclock_minutes: job.max_wallclock_minutes,
            });
        }
    }
    Ok(())
}

/// In-process job store: `RwLock<HashMap<...>>` held in memory, flushed to
/// pretty-printed JSON under `state_dir` on every mutation. No SQL engine
/// is introduced; sessions and their metadata live and die with this
/// in-memory map plus its JSON mirror.
pub struct JobStore {
    state_dir: PathBuf,
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
    embeddings: RwLock<HashMap<(String, String), EmbeddingRecord>>,
}

impl JobStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            jobs: RwLock::new(HashMap::new()),
            embeddings: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_job(&self, new: NewJob) -> JobRecord {
        let record = JobRecord {
            id: Uuid::new_v4(),
            task: new.task,
            repo_owner: new.repo_owner,
            repo_name: new.repo_name,
            branch_base: new.branch_base,
            status: JobStatus::Pending,
            budget_usd_max: new.budget_usd_max,
            max_requests: new.max_requests,
            max_wallclock_minutes: new.max_wallclock_minutes,
            planner_model: new.planner_model,
            coder_model: new.coder_model,
            dry_run: new.dry_run,
            cost_usd: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            requests_made: 0,
            last_action: None,
            pr_links: Vec::new(),
            agents_hash: None,
            cancelled: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            steps: Vec::new(),
            costs: Vec::new(),
            notes: Vec::new(),
            files: Vec::new(),
            history: Vec::new(),
            diagnostics: Vec::new(),
            started_instant: None,
        };
        let mut jobs = self.jobs.write().await;
        jobs.insert(record.id, record.clone());
        drop(jobs);
        self.flush().await;
        record
    }

    pub async fn get_job(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn list_jobs(&self) -> Vec<JobRecord> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn mutate_job<F, R>(&self, id: Uuid, f: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut JobRecord) -> R,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(CoreError::JobNotFound(id))?;
        let result = f(job);
        drop(jobs);
        self.flush().await;
        Ok(result)
    }

    pub async fn request_cancel(&self, id: Uuid) -> Result<(), CoreError> {
        self.mutate_job(id, |job| {
            if !job.status.is_terminal() {
                job.cancelled = true;
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(Utc::now());
            }
        })
        .await
    }

    pub async fn record_cost(
        &self,
        id: Uuid,
        provider: &str,
        model: &str,
        tokens_in: u32,
        tokens_out: u32,
        cost_usd: f64,
    ) -> Result<(), CoreError> {
        self.mutate_job(id, |job| {
            job.costs.push(CostEntry {
                job_id: id,
                provider: provider.to_string(),
                model: model.to_string(),
                tokens_in,
                tokens_out,
                cost_usd,
                recorded_at: Utc::now(),
            });
            job.cost_usd += cost_usd;
            job.tokens_in += tokens_in as u64;
            job.tokens_out += tokens_out as u64;
            job.requests_made += 1;
        })
        .await
    }

    pub async fn add_note(&self, id: Uuid, note: MemoryNote, max_items: usize, max_bytes: usize) -> Result<(), CoreError> {
        self.mutate_job(id, move |job| {
            if note.body.len() > max_bytes {
                return Err(CoreError::MemoryCapExceeded(format!(
                    "note body {} bytes exceeds per-item cap {}",
                    note.body.len(),
                    max_bytes
                )));
            }
            if job.notes.len() >= max_items {
                return Err(CoreError::MemoryCapExceeded(format!(
                    "job already holds {} notes (cap {})",
                    job.notes.len(),
                    max_items
                )));
            }
            job.notes.push(note);
            Ok(())
        })
        .await?
    }

    pub async fn upsert_embedding(&self, record: EmbeddingRecord) {
        let key = (record.scope.clone(), record.ref_id.clone());
        self.embeddings.write().await.insert(key, record);
        self.flush_embeddings().await;
    }

    pub async fn embeddings_in_scope(&self, scope: &str) -> Vec<EmbeddingRecord> {
        self.embeddings
            .read()
            .await
            .values()
            .filter(|r| r.scope == scope)
            .cloned()
            .collect()
    }

    async fn flush(&self) {
        let jobs = self.jobs.read().await;
        let snapshot: Vec<&JobRecord> = jobs.values().collect();
        if let Err(err) = self.write_json("jobs.json", &snapshot).await {
            tracing::warn!(error = %err, "failed to flush job store");
        }
    }

    async fn flush_embeddings(&self) {
        let embeddings = self.embeddings.read().await;
        let snapshot: Vec<&EmbeddingRecord> = embeddings.values().collect();
        if let Err(err) = self.write_json("embeddings.json", &snapshot).await {
            tracing::warn!(error = %err, "failed to flush embedding store");
        }
    }

    async fn write_json<T: Serialize>(&self, filename: &str, value: &T) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let path = self.state_dir.join(filename);
        let body = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> NewJob {
        NewJob {
            task: "demo task".to_string(),
            repo_owner: "demo".to_string(),
            repo_name: "demo-repo".to_string(),
            branch_base: "main".to_string(),
            budget_usd_max: 5.0,
            max_requests: 10,
            max_wallclock_minutes: 60,
            planner_model: "gpt-4o".to_string(),
            coder_model: "gpt-4o-mini".to_string(),
            dry_run: true,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().to_path_buf());
        let created = store.create_job(new_job()).await;
        let fetched = store.get_job(created.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.task, "demo task");
    }

    #[tokio::test]
    async fn cost_sum_matches_running_counter() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().to_path_buf());
        let job = store.create_job(new_job()).await;
        store
            .record_cost(job.id, "openai", "gpt-4o", 1000, 500, 0.02)
            .await
            .unwrap();
        store
            .record_cost(job.id, "openai", "gpt-4o", 2000, 500, 0.03)
            .await
            .unwrap();
        let fetched = store.get_job(job.id).await.unwrap();
        let sum: f64 = fetched.costs.iter().map(|c| c.cost_usd).sum();
        assert!((sum - fetched.cost_usd).abs() < 1e-9);
        assert_eq!(fetched.requests_made, 2);
    }

    #[tokio::test]
    async fn note_insert_rejected_beyond_item_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().to_path_buf());
        let job = store.create_job(new_job()).await;
        let note = MemoryNote {
            id: Uuid::new_v4(),
            job_id: job.id,
            kind: MemoryNoteKind::Decision,
            title: "t".to_string(),
            body: "b".to_string(),
            tags: vec![],
            step_id: None,
            created_at: Utc::now(),
        };
        store.add_note(job.id, note.clone(), 1, 20_000).await.unwrap();
        let err = store.add_note(job.id, note, 1, 20_000).await.unwrap_err();
        assert!(matches!(err, CoreError::MemoryCapExceeded(_)));
        let fetched = store.get_job(job.id).await.unwrap();
        assert_eq!(fetched.notes.len(), 1);
    }

    #[tokio::test]
    async fn limit_checks_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().to_path_buf());
        let job = store.create_job(new_job()).await;
        store
            .mutate_job(job.id, |j| {
                j.started_instant = Some(Instant::now());
                j.budget_usd_max = 0.01;
            })
            .await
            .unwrap();
        store
            .record_cost(job.id, "openai", "gpt-4o", 10_000, 10_000, 0.05)
            .await
            .unwrap();
        let fetched = store.get_job(job.id).await.unwrap();
        assert!(check_limits(&fetched).is_err());
        // a further check against the same over-budget state still fails
        assert!(check_limits(&fetched).is_err());
    }
}
