use std::path::Path;

use crate::candidate::ContextCandidate;

const MAX_FILE_BYTES: u64 = 50_000;

/// Reads files under `artifacts/<job_id>/`, skipping anything larger than
/// 50 KB.
pub fn collect_artifacts(artifacts_dir: &Path) -> Vec<ContextCandidate> {
    let Ok(entries) = std::fs::read_dir(artifacts_dir) else {
        return Vec::new();
    };
    let mut candidates = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.len() > MAX_FILE_BYTES {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        candidates.push(ContextCandidate::new(
            format!("artifact:{name}"),
            "artifact",
            name,
            content,
        ));
    }
    candidates
}
