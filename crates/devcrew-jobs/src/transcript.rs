use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub model: String,
    pub messages: Vec<devcrew_types::ChatMessage>,
    pub response_text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub summary: Option<String>,
}

enum RecorderState {
    Buffering(Vec<TranscriptEntry>),
    Attached(PathBuf),
}

/// Buffers every model call until the working-copy path is known, then
/// flushes to `<workdir>/.autodev/llm_calls.jsonl` as JSON Lines. Entries
/// recorded before `set_base_path` flush atomically on attach; entries
/// recorded afterward append-then-flush immediately.
pub struct LlmTranscriptRecorder {
    state: Mutex<RecorderState>,
}

impl LlmTranscriptRecorder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RecorderState::Buffering(Vec::new())),
        }
    }

    pub async fn record(&self, entry: TranscriptEntry) {
        let mut state = self.state.lock().await;
        match &mut *state {
            RecorderState::Buffering(buffer) => buffer.push(entry),
            RecorderState::Attached(path) => {
                if let Err(err) = append_line(path, &entry) {
                    tracing::warn!(error = %err, "failed to append llm transcript entry");
                }
            }
        }
    }

    pub async fn set_base_path(&self, workdir: &std::path::Path) {
        let path = workdir.join(".autodev").join("llm_calls.jsonl");
        let mut state = self.state.lock().await;
        if let RecorderState::Buffering(buffer) = &*state {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            for entry in buffer {
                if let Err(err) = append_line(&path, entry) {
                    tracing::warn!(error = %err, "failed to flush buffered llm transcript entry");
                }
            }
        }
        *state = RecorderState::Attached(path);
    }
}

impl Default for LlmTranscriptRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn append_line(path: &std::path::Path, entry: &TranscriptEntry) -> std::io::Result<()> {
    use std::io::Write;
    let line = serde_json::to_string(entry)?;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use devcrew_types::ChatMessage;

    fn entry() -> TranscriptEntry {
        TranscriptEntry {
            role: "planner-plan".to_string(),
            model: "dry-run".to_string(),
            messages: vec![ChatMessage::user("hi")],
            response_text: "ok".to_string(),
            tokens_in: 1,
            tokens_out: 1,
            summary: None,
        }
    }

    #[tokio::test]
    async fn buffered_entries_flush_on_attach() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = LlmTranscriptRecorder::new();
        recorder.record(entry()).await;
        recorder.record(entry()).await;
        recorder.set_base_path(dir.path()).await;

        let path = dir.path().join(".autodev").join("llm_calls.jsonl");
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn entries_after_attach_append_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = LlmTranscriptRecorder::new();
        recorder.set_base_path(dir.path()).await;
        recorder.record(entry()).await;

        let path = dir.path().join(".autodev").join("llm_calls.jsonl");
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
