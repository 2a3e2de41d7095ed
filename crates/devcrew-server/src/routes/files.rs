use std::path::{Path, PathBuf};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: &'static str,
    pub size: u64,
    #[serde(rename = "modifiedAt")]
    pub modified_at: String,
}

/// Read-only browser over `data_root`: lists a directory or stats a single
/// file. Resolves the requested path and rejects anything that escapes
/// the root, matching `app/routers/files.py::_resolve_path`.
pub async fn list_or_read(
    State(state): State<AppState>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<Vec<FileEntry>>, StatusCode> {
    let root = state
        .data_root
        .canonicalize()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let target = resolve_path(&root, &query.path)?;

    if !target.exists() {
        return Err(StatusCode::NOT_FOUND);
    }

    if target.is_file() {
        let entry = entry_for(&root, &target).ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
        return Ok(Json(vec![entry]));
    }

    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(&target)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    while let Ok(Some(item)) = read_dir.next_entry().await {
        if let Some(entry) = entry_for(&root, &item.path()) {
            entries.push(entry);
        }
    }
    entries.sort_by(|a, b| (a.entry_type == "file", a.name.to_lowercase()).cmp(&(b.entry_type == "file", b.name.to_lowercase())));
    Ok(Json(entries))
}

fn resolve_path(root: &Path, requested: &str) -> Result<PathBuf, StatusCode> {
    let trimmed = requested.trim_matches('/');
    let candidate = if trimmed.is_empty() {
        root.to_path_buf()
    } else {
        root.join(trimmed)
    };
    // The candidate need not exist yet for components() checks, but we
    // still require it to stay under root once lexically normalized.
    let normalized = normalize(&candidate);
    if !normalized.starts_with(root) {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(normalized)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn entry_for(root: &Path, path: &Path) -> Option<FileEntry> {
    let meta = std::fs::metadata(path).ok()?;
    let rel = path.strip_prefix(root).unwrap_or(path);
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let modified_at: DateTime<Utc> = meta.modified().ok().map(DateTime::<Utc>::from).unwrap_or_else(Utc::now);
    Some(FileEntry {
        path: rel.display().to_string(),
        name,
        entry_type: if meta.is_file() { "file" } else { "directory" },
        size: meta.len(),
        modified_at: modified_at.to_rfc3339(),
    })
}
