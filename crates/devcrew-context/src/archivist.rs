use std::path::Path;

use chrono::Utc;
use devcrew_core::{JobStore, MemoryNote};
use uuid::Uuid;

/// Before gathering, if the job's MemoryNote count has reached 80% of the
/// per-job cap, snapshots all notes except the most recent 10 to a
/// timestamped JSON artifact and deletes them from the store. Bounds
/// memory growth; has no effect on the current call's context beyond
/// freeing capacity for future notes.
pub async fn maintain(store: &JobStore, job_id: Uuid, artifacts_root: &Path, cap: usize) -> anyhow::Result<()> {
    let Some(job) = store.get_job(job_id).await else {
        return Ok(());
    };
    if job.notes.len() < (cap as f64 * 0.8) as usize {
        return Ok(());
    }
    if job.notes.len() <= 10 {
        return Ok(());
    }

    let to_archive: Vec<MemoryNote> = job.notes[..job.notes.len() - 10].to_vec();
    let job_artifacts_dir = artifacts_root.join(job_id.to_string());
    tokio::fs::create_dir_all(&job_artifacts_dir).await?;
    let filename = format!("memory_snapshot_{}.json", Utc::now().format("%Y%m%dT%H%M%S%.f"));
    let path = job_artifacts_dir.join(filename);
    let body = serde_json::to_string_pretty(&to_archive)?;
    tokio::fs::write(&path, body).await?;

    let archived_ids: std::collections::HashSet<Uuid> = to_archive.iter().map(|n| n.id).collect();
    store
        .mutate_job(job_id, |job| {
            job.notes.retain(|n| !archived_ids.contains(&n.id));
        })
        .await?;
    Ok(())
}
