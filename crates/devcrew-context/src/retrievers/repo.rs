use std::path::Path;

use crate::candidate::ContextCandidate;

const MAX_FILE_BYTES: usize = 50_000;

/// Either the step's listed files, or a bounded walk of the working copy up
/// to `max_files`. Each file's first ≤ 50 KB are rendered with 4-digit
/// line numbers; total rendered characters are capped at
/// `max_snippet_tokens * 4`.
pub fn collect_repo_snippets(
    repo_path: &Path,
    step_files: Option<&[String]>,
    max_files: usize,
    max_snippet_tokens: u32,
) -> Vec<ContextCandidate> {
    let files = match step_files {
        Some(files) => files.iter().map(|f| repo_path.join(f)).collect::<Vec<_>>(),
        None => walk_repo(repo_path, max_files),
    };

    let char_budget = (max_snippet_tokens as usize) * 4;
    let mut candidates = Vec::new();
    for file in files {
        let Ok(bytes) = std::fs::read(&file) else {
            continue;
        };
        let bytes = if bytes.len() > MAX_FILE_BYTES {
            &bytes[..MAX_FILE_BYTES]
        } else {
            &bytes[..]
        };
        let Ok(text) = std::str::from_utf8(bytes) else {
            continue;
        };
        let rendered = render_with_line_numbers(text, char_budget);
        let rel = file
            .strip_prefix(repo_path)
            .unwrap_or(&file)
            .display()
            .to_string();
        candidates.push(ContextCandidate::new(
            format!("repo:{rel}"),
            "repo",
            rel,
            rendered,
        ));
    }
    candidates
}

fn render_with_line_numbers(text: &str, char_budget: usize) -> String {
    let mut out = String::new();
    for (i, line) in text.lines().enumerate() {
        out.push_str(&format!("{:04} {}\n", i + 1, line));
        if out.len() >= char_budget {
            break;
        }
    }
    out.chars().take(char_budget).collect()
}

fn walk_repo(repo_path: &Path, max_files: usize) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![repo_path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if files.len() >= max_files {
            break;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.components().any(|c| c.as_os_str() == ".git") {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
                if files.len() >= max_files {
                    break;
                }
            }
        }
    }
    files
}
