use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const FULL_FILE_MARKER: &str = "::FULL";

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("malformed diff: {0}")]
    Malformed(String),
}

static HUNK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@\s*-(\d+)(?:,(\d+))?\s*\+(\d+)(?:,(\d+))?\s*@@.*$").unwrap()
});

struct Hunk {
    old_start: usize,
    lines: Vec<String>,
}

/// Parses a unified-diff-like text and returns `(path, new_content)` pairs.
/// Supports both whole-file replacement (via the `::FULL` path marker) and
/// standard hunk-based reconstruction. `read_source` supplies the current
/// working-tree content of a path (empty string if the file doesn't exist
/// yet); the engine never touches disk itself.
pub fn apply_unified_diff<F>(diff_text: &str, mut read_source: F) -> Result<Vec<(PathBuf, String)>, DiffError>
where
    F: FnMut(&Path) -> String,
{
    let lines: Vec<&str> = diff_text.lines().collect();
    let mut results = Vec::new();
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i];
        if !line.starts_with("--- ") {
            i += 1;
            continue;
        }
        let old_path_raw = line[4..].trim();
        i += 1;
        if i >= lines.len() || !lines[i].starts_with("+++ ") {
            return Err(DiffError::Malformed(format!(
                "missing '+++' header after '--- {old_path_raw}'"
            )));
        }
        let new_path_raw = lines[i][4..].trim();
        // Strip the conventional `b/` prefix before anything else, same as
        // the original: the target path never carries it.
        let new_path_raw = new_path_raw.strip_prefix("b/").unwrap_or(new_path_raw);
        i += 1;

        if new_path_raw.contains(FULL_FILE_MARKER) {
            let real_path = new_path_raw.replace(FULL_FILE_MARKER, "");
            let (content, next_i) = collect_full_file(&lines, i);
            i = next_i;
            results.push((PathBuf::from(real_path.trim()), content));
            continue;
        }

        let source = if old_path_raw == "/dev/null" {
            String::new()
        } else {
            let source_path = old_path_raw.strip_prefix("a/").unwrap_or(old_path_raw);
            read_source(Path::new(source_path))
        };
        let ends_with_newline_in_diff = diff_text.ends_with('\n');
        let source_ends_with_newline = source.ends_with('\n') || source.is_empty();

        let mut hunks = Vec::new();
        while i < lines.len() && !lines[i].starts_with("--- ") {
            if !lines[i].starts_with("@@") {
                i += 1;
                continue;
            }
            let (hunk, next_i) = parse_hunk(&lines, i)?;
            hunks.push(hunk);
            i = next_i;
        }

        let new_path = if new_path_raw == "/dev/null" {
            old_path_raw.strip_prefix("a/").unwrap_or(old_path_raw).to_string()
        } else {
            new_path_raw.to_string()
        };
        let content = reconstruct(&source, &hunks);
        let content = if source_ends_with_newline || ends_with_newline_in_diff {
            ensure_trailing_newline(content)
        } else {
            content
        };
        results.push((PathBuf::from(new_path), content));
    }

    Ok(results)
}

fn collect_full_file(lines: &[&str], mut i: usize) -> (String, usize) {
    // Skip to and past the first `@@` header.
    while i < lines.len() && !lines[i].starts_with("@@") {
        i += 1;
    }
    if i < lines.len() {
        i += 1;
    }
    let mut buf = Vec::new();
    while i < lines.len() && !lines[i].starts_with("--- ") {
        let line = lines[i];
        if line.starts_with('+') {
            buf.push(line[1..].to_string());
        } else if !line.starts_with('-') && !line.starts_with("@@") {
            buf.push(line.to_string());
        }
        i += 1;
    }
    let mut content = buf.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    (content, i)
}

fn parse_hunk(lines: &[&str], start: usize) -> Result<(Hunk, usize), DiffError> {
    let header = lines[start];
    let old_start = if header.trim() == "@@" {
        0
    } else if let Some(caps) = HUNK_RE.captures(header) {
        caps.get(1)
            .map(|m| m.as_str().parse::<usize>().unwrap_or(0))
            .unwrap_or(0)
    } else {
        return Err(DiffError::Malformed(format!("unparseable hunk header: {header}")));
    };

    let mut i = start + 1;
    let mut body = Vec::new();
    while i < lines.len() && !lines[i].starts_with("@@") && !lines[i].starts_with("--- ") {
        body.push(lines[i].to_string());
        i += 1;
    }
    Ok((
        Hunk {
            old_start,
            lines: body,
        },
        i,
    ))
}

fn reconstruct(source: &str, hunks: &[Hunk]) -> String {
    let source_lines: Vec<&str> = if source.is_empty() {
        Vec::new()
    } else {
        source.lines().collect()
    };
    let mut out: Vec<String> = Vec::new();
    let mut cursor = 0usize;

    for hunk in hunks {
        let target = if hunk.old_start == 0 { cursor } else { hunk.old_start - 1 };
        while cursor < target && cursor < source_lines.len() {
            out.push(source_lines[cursor].to_string());
            cursor += 1;
        }
        for body_line in &hunk.lines {
            if body_line.is_empty() {
                continue;
            }
            let (prefix, rest) = body_line.split_at(1);
            match prefix {
                " " => {
                    out.push(rest.to_string());
                    cursor += 1;
                }
                "-" => {
                    cursor += 1;
                }
                "+" => {
                    out.push(rest.to_string());
                }
                _ => {
                    tracing::warn!(line = %body_line, "ignoring diff line with unknown prefix");
                }
            }
        }
    }
    while cursor < source_lines.len() {
        out.push(source_lines[cursor].to_string());
        cursor += 1;
    }
    out.join("\n")
}

fn ensure_trailing_newline(mut content: String) -> String {
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content
}

/// Writes `content` to `path`, creating parent directories as needed. The
/// diff engine itself never touches disk; this is the caller's half of the
/// contract.
pub fn safe_write(root: &Path, path: &Path, content: &str) -> std::io::Result<()> {
    let full_path = root.join(path);
    if let Some(parent) = full_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(full_path, content)
}

/// Produces a minimal unified diff between `before` and `after` for a
/// single file, used only by round-trip tests.
pub fn generate_unified_diff(path: &str, before: &str, after: &str) -> String {
    let before_lines: Vec<&str> = before.lines().collect();
    let after_lines: Vec<&str> = after.lines().collect();
    let mut body = Vec::new();
    for line in &before_lines {
        body.push(format!("-{line}"));
    }
    for line in &after_lines {
        body.push(format!("+{line}"));
    }
    format!(
        "--- {path}\n+++ {path}\n@@ -1,{} +1,{} @@\n{}\n",
        before_lines.len().max(1),
        after_lines.len().max(1),
        body.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_sound() {
        let before = "fn main() {\n    println!(\"a\");\n}\n";
        let after = "fn main() {\n    println!(\"b\");\n}\n";
        let diff = generate_unified_diff("src/main.rs", before, after);
        let result = apply_unified_diff(&diff, |_| before.to_string()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1, after);
    }

    #[test]
    fn full_file_marker_replaces_whole_file() {
        let diff = "--- a/src/lib.rs\n+++ b/src/lib.rs::FULL\n@@ -0,0 +1,2 @@\n+fn a() {}\n+fn b() {}\n";
        let result = apply_unified_diff(diff, |_| String::new()).unwrap();
        assert_eq!(result[0].0, PathBuf::from("src/lib.rs"));
        assert_eq!(result[0].1, "fn a() {}\nfn b() {}\n");
    }

    #[test]
    fn strips_a_b_prefixes_for_existing_file_edits() {
        let diff = "--- a/foo.txt\n+++ b/foo.txt\n@@ -1,1 +1,1 @@\n-old\n+new\n";
        let mut read_calls = Vec::new();
        let result = apply_unified_diff(diff, |p| {
            read_calls.push(p.to_path_buf());
            "old\n".to_string()
        })
        .unwrap();
        assert_eq!(read_calls, vec![PathBuf::from("foo.txt")]);
        assert_eq!(result[0].0, PathBuf::from("foo.txt"));
        assert_eq!(result[0].1, "new\n");
    }

    #[test]
    fn s6_whole_file_diff_writes_exact_contents() {
        let diff = "--- /dev/null\n+++ b/foo.txt::FULL\n@@\n+hello\n+world\n";
        let result = apply_unified_diff(diff, |_| String::new()).unwrap();
        assert_eq!(result[0].0, PathBuf::from("foo.txt"));
        assert_eq!(result[0].1, "hello\nworld\n");
    }

    #[test]
    fn tolerates_header_without_space_after_prefix() {
        let diff = "--- /dev/null\n+++ newfile.txt\n@@-0,0 +1 @@\n+hello\n";
        let result = apply_unified_diff(diff, |_| String::new()).unwrap();
        assert_eq!(result[0].1, "hello\n");
    }

    #[test]
    fn tolerates_header_with_trailing_context_suffix() {
        let diff = "--- greet.py\n+++ greet.py\n@@ -1,2 +1,2 @@ def greet():\n-    print(\"hi\")\n+    print(\"hello\")\n     return None\n";
        let result = apply_unified_diff(diff, |_| "def greet():\n    print(\"hi\")\n    return None\n".to_string()).unwrap();
        assert!(result[0].1.contains("print(\"hello\")"));
    }

    #[test]
    fn tolerates_bare_hunk_header() {
        let diff = "--- file.txt\n+++ file.txt\n@@\n+appended line\n";
        let result = apply_unified_diff(diff, |_| "original line\n".to_string()).unwrap();
        assert!(result[0].1.contains("appended line"));
    }

    #[test]
    fn missing_plus_plus_header_is_malformed() {
        let diff = "--- file.txt\n@@ -1,1 +1,1 @@\n+x\n";
        let err = apply_unified_diff(diff, |_| String::new()).unwrap_err();
        assert!(matches!(err, DiffError::Malformed(_)));
    }
}
