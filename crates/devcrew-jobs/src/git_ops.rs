use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::JobError;

/// Shells out to the system `git` binary for the working-copy lifecycle
/// rather than binding `git2`/`libgit2`.
pub fn clone_or_update_repo(
    workdir_root: &Path,
    owner: &str,
    repo: &str,
    base_branch: &str,
    clone_url: &str,
) -> Result<PathBuf, JobError> {
    let path = workdir_root.join(format!("{owner}-{repo}"));
    if path.join(".git").exists() {
        run_git(&path, &["fetch", "origin"])?;
        if run_git(&path, &["checkout", base_branch]).is_err() {
            run_git(&path, &["checkout", "-b", base_branch, &format!("origin/{base_branch}")])?;
        }
        run_git(&path, &["reset", "--hard", &format!("origin/{base_branch}")])?;
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        run_git_in(workdir_root, &["clone", "--branch", base_branch, clone_url, path.to_str().unwrap_or_default()])?;
    }
    Ok(path)
}

pub fn create_branch(repo_path: &Path, branch: &str) -> Result<(), JobError> {
    run_git(repo_path, &["checkout", "-b", branch])
}

/// No-op (logged, not an error) if the working tree is clean.
pub fn commit_all(repo_path: &Path, message: &str) -> Result<bool, JobError> {
    run_git(repo_path, &["add", "-A"])?;
    let status = Command::new("git")
        .arg("status")
        .arg("--porcelain")
        .current_dir(repo_path)
        .output()
        .map_err(|e| JobError::Git(e.to_string()))?;
    if status.stdout.is_empty() {
        tracing::info!("commit_all: nothing to commit");
        return Ok(false);
    }
    run_git(repo_path, &["commit", "-m", message])?;
    Ok(true)
}

pub fn push_branch(repo_path: &Path, branch: &str) -> Result<(), JobError> {
    run_git(repo_path, &["push", "origin", branch])
}

fn run_git(repo_path: &Path, args: &[&str]) -> Result<(), JobError> {
    run_git_in(repo_path, args)
}

fn run_git_in(cwd: &Path, args: &[&str]) -> Result<(), JobError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| JobError::Git(e.to_string()))?;
    if !output.status.success() {
        return Err(JobError::Git(format!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

pub fn feature_branch_name(job_id: &uuid::Uuid) -> String {
    let hex = job_id.simple().to_string();
    format!("auto/{}", &hex[..8])
}

/// Opens a pull request via the GitHub REST API. The request body is
/// intentionally minimal, covering just title/head/base/body.
pub async fn open_pull_request(
    client: &reqwest::Client,
    token: &str,
    owner: &str,
    repo: &str,
    title: &str,
    body: &str,
    head: &str,
    base: &str,
) -> Result<String, JobError> {
    let url = format!("https://api.github.com/repos/{owner}/{repo}/pulls");
    let resp = client
        .post(url)
        .bearer_auth(token)
        .header("User-Agent", "devcrew-engine")
        .json(&serde_json::json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
        }))
        .send()
        .await
        .map_err(|e| JobError::Git(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(JobError::Git(format!("PR open failed with status {}", resp.status())));
    }

    let parsed: serde_json::Value = resp.json().await.map_err(|e| JobError::Git(e.to_string()))?;
    parsed["html_url"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| JobError::Git("PR response missing html_url".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_branch_uses_first_eight_hex_chars() {
        let id = uuid::Uuid::parse_str("abcdef12-3456-7890-abcd-ef1234567890").unwrap();
        assert_eq!(feature_branch_name(&id), "auto/abcdef12");
    }
}
