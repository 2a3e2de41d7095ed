use std::path::Path;
use std::sync::Arc;

use devcrew_core::{ContextDiagnostic, ContextSourceRef, JobRecord, JobStep, JobStore};
use devcrew_types::ChatMessage;
use uuid::Uuid;

use crate::archivist;
use crate::candidate::ContextCandidate;
use crate::compactor::compact_candidates;
use crate::curator::Curator;
use crate::curator_agent::build_hints;
use crate::embeddings::EmbeddingProvider;
use crate::error::ContextError;
use crate::retrievers::{artifacts, external, history, repo};

pub struct ContextEngineConfig {
    pub curator_min_score: f64,
    pub curator_topk: usize,
    pub context_budget_tokens: u32,
    pub context_output_reserve_tokens: u32,
    pub context_hard_cap_tokens: u32,
    pub context_compact_threshold_ratio: f64,
    pub retriever_max_files: usize,
    pub retriever_max_snippet_tokens: u32,
    pub jit_enable: bool,
    pub memory_max_items_per_job: usize,
}

pub struct ContextBuildResult {
    pub messages: Vec<ChatMessage>,
    pub diagnostic: ContextDiagnostic,
}

/// Planner-step metadata the persisted `JobStep` doesn't carry (it only
/// stores title/status/summary). Callers that have the originating
/// `cto::PlanStep` at hand pass it through so the repo retriever can target
/// the step's listed files and the external-doc query can fold in rationale
/// and acceptance criteria.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub rationale: String,
    pub acceptance: String,
    pub files: Vec<String>,
}

pub struct ContextEngine {
    store: Arc<JobStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    curator: Curator,
    artifacts_root: std::path::PathBuf,
    config: ContextEngineConfig,
}

impl ContextEngine {
    pub fn new(
        store: Arc<JobStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        artifacts_root: std::path::PathBuf,
        config: ContextEngineConfig,
    ) -> Self {
        let curator = Curator::new(embedder.clone());
        Self {
            store,
            embedder,
            curator,
            artifacts_root,
            config,
        }
    }

    /// Builds a token-bounded context window for one model call. `count_tokens`
    /// stands in for "ask the provider for a total token count" (§4.3.5);
    /// callers pass a closure backed by the selected `Provider`.
    #[allow(clippy::too_many_arguments)]
    pub async fn build_context<F>(
        &self,
        job_id: Uuid,
        step: Option<&JobStep>,
        role: &str,
        task: &str,
        base_messages: Vec<ChatMessage>,
        repo_path: Option<&Path>,
        step_ctx: Option<&StepContext>,
        count_tokens: F,
    ) -> Result<ContextBuildResult, ContextError>
    where
        F: Fn(&[ChatMessage]) -> u32,
    {
        archivist::maintain(&self.store, job_id, &self.artifacts_root, self.config.memory_max_items_per_job)
            .await
            .map_err(|_| ContextError::JobNotFound(job_id))?;

        let job = self
            .store
            .get_job(job_id)
            .await
            .ok_or(ContextError::JobNotFound(job_id))?;

        let candidates = self.gather_candidates(&job, step, task, repo_path, step_ctx).await;
        let query = build_query(task, step, step_ctx);

        let ranked = self
            .curator
            .rank(&query, candidates, self.config.curator_min_score, self.config.curator_topk)
            .await;

        let available = self
            .config
            .context_budget_tokens
            .saturating_sub(self.config.context_output_reserve_tokens);
        let (compacted, compact_ops) = compact_candidates(ranked, available, self.config.context_compact_threshold_ratio);

        let (mut selected, dropped, mut tokens_clipped) = select_within_budget(compacted, available);

        let hints = build_hints(&selected);
        let mut context_message = render_context_message(&selected, &hints);
        let mut messages = prepend(context_message.clone(), &base_messages);
        let mut total_tokens = count_tokens(&messages);

        while total_tokens > self.config.context_hard_cap_tokens && !selected.is_empty() {
            let evicted = selected.pop().unwrap();
            tokens_clipped += evicted.tokens;
            let hints = build_hints(&selected);
            context_message = render_context_message(&selected, &hints);
            messages = prepend(context_message.clone(), &base_messages);
            total_tokens = count_tokens(&messages);
        }

        let tokens_final = total_tokens.min(self.config.context_hard_cap_tokens);

        let diagnostic = ContextDiagnostic {
            job_id,
            role: role.to_string(),
            tokens_final,
            tokens_clipped,
            compact_ops,
            budget_tokens: self.config.context_budget_tokens,
            output_reserve_tokens: self.config.context_output_reserve_tokens,
            hard_cap_tokens: self.config.context_hard_cap_tokens,
            selected: selected.iter().map(to_source_ref).collect(),
            dropped: dropped.iter().map(to_source_ref).collect(),
            hints: build_hints(&selected),
            recorded_at: chrono::Utc::now(),
        };

        self.persist_diagnostics(job_id, role, &diagnostic).await;

        Ok(ContextBuildResult { messages, diagnostic })
    }

    async fn gather_candidates(
        &self,
        job: &JobRecord,
        step: Option<&JobStep>,
        task: &str,
        repo_path: Option<&Path>,
        step_ctx: Option<&StepContext>,
    ) -> Vec<ContextCandidate> {
        let mut candidates = Vec::new();

        candidates.push(ContextCandidate::new("task", "task", "task", task.to_string()));

        if let Some(step) = step {
            let body = serde_json::to_string_pretty(step).unwrap_or_default();
            candidates.push(ContextCandidate::new(
                format!("step:{}", step.id),
                "step",
                step.name.clone(),
                body,
            ));
        }

        for note in &job.notes {
            candidates.push(
                ContextCandidate::new(format!("memory:{}", note.id), "memory", note.title.clone(), note.body.clone())
                    .with_metadata(serde_json::json!({ "kind": note.kind })),
            );
        }

        if let Some(repo_path) = repo_path {
            let step_files = step_ctx.filter(|ctx| !ctx.files.is_empty()).map(|ctx| ctx.files.as_slice());
            candidates.extend(repo::collect_repo_snippets(
                repo_path,
                step_files,
                self.config.retriever_max_files,
                self.config.retriever_max_snippet_tokens,
            ));
        }

        let artifacts_dir = self.artifacts_root.join(job.id.to_string());
        candidates.extend(artifacts::collect_artifacts(&artifacts_dir));

        candidates.extend(history::collect_history(&job.history));

        if self.config.jit_enable {
            let query = build_query(task, step, step_ctx);
            let docs = self.store.embeddings_in_scope("doc").await;
            candidates.extend(external::collect_external_docs(&self.embedder, docs, &query).await);
        }

        candidates
    }

    async fn persist_diagnostics(&self, job_id: Uuid, role: &str, diagnostic: &ContextDiagnostic) {
        let result = self
            .store
            .mutate_job(job_id, |job| {
                job.diagnostics.push(diagnostic.clone());
            })
            .await;
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist context diagnostic row");
        }

        let dir = self.artifacts_root.join(job_id.to_string());
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(error = %err, "failed to create artifacts dir for context diagnostic");
            return;
        }
        let path = dir.join(format!("context_{role}.json"));
        match serde_json::to_string_pretty(diagnostic) {
            Ok(body) => {
                if let Err(err) = tokio::fs::write(&path, body).await {
                    tracing::warn!(error = %err, "failed to write context diagnostic artifact");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize context diagnostic"),
        }
    }
}

fn build_query(task: &str, step: Option<&JobStep>, step_ctx: Option<&StepContext>) -> String {
    let mut query = match step {
        Some(step) => format!("{task} {}", step.name),
        None => task.to_string(),
    };
    if let Some(ctx) = step_ctx {
        if !ctx.rationale.is_empty() {
            query.push(' ');
            query.push_str(&ctx.rationale);
        }
        if !ctx.acceptance.is_empty() {
            query.push(' ');
            query.push_str(&ctx.acceptance);
        }
    }
    query
}

fn select_within_budget(
    candidates: Vec<ContextCandidate>,
    available: u32,
) -> (Vec<ContextCandidate>, Vec<ContextCandidate>, u32) {
    let mut selected = Vec::new();
    let mut dropped = Vec::new();
    let mut used = 0u32;
    let mut tokens_clipped = 0u32;
    let mut iter = candidates.into_iter();

    for candidate in iter.by_ref() {
        if used + candidate.tokens <= available {
            used += candidate.tokens;
            selected.push(candidate);
        } else {
            let remaining = available.saturating_sub(used);
            let char_budget = (remaining as usize) * 4;
            let mut truncated = candidate;
            let original_tokens = truncated.tokens;
            truncated.content = truncated.content.chars().take(char_budget).collect();
            truncated.tokens = remaining;
            tokens_clipped += original_tokens.saturating_sub(remaining);
            if remaining > 0 {
                selected.push(truncated);
            } else {
                dropped.push(truncated);
            }
            break;
        }
    }
    for candidate in iter {
        tokens_clipped += candidate.tokens;
        dropped.push(candidate);
    }

    (selected, dropped, tokens_clipped)
}

fn render_context_message(selected: &[ContextCandidate], hints: &[String]) -> String {
    let mut out = String::new();
    for candidate in selected {
        out.push_str(&format!(
            "# {} (score={:.2}) [{}]\n{}\n\n",
            candidate.source_kind, candidate.score, candidate.title, candidate.content
        ));
    }
    out.push_str("Curator Hints:\n");
    for hint in hints {
        out.push_str(&format!("- {hint}\n"));
    }
    out
}

fn prepend(context_message: String, base_messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(base_messages.len() + 1);
    messages.push(ChatMessage::system(context_message));
    messages.extend(base_messages.iter().cloned());
    messages
}

fn to_source_ref(candidate: &ContextCandidate) -> ContextSourceRef {
    ContextSourceRef {
        id: candidate.id.clone(),
        source_kind: candidate.source_kind.clone(),
        score: candidate.score,
        tokens: candidate.tokens,
        metadata: candidate.metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devcrew_core::NewJob;

    fn config() -> ContextEngineConfig {
        ContextEngineConfig {
            curator_min_score: 0.0,
            curator_topk: 20,
            context_budget_tokens: 64_000,
            context_output_reserve_tokens: 8_000,
            context_hard_cap_tokens: 200,
            context_compact_threshold_ratio: 0.6,
            retriever_max_files: 200,
            retriever_max_snippet_tokens: 2_000,
            jit_enable: false,
            memory_max_items_per_job: 2_000,
        }
    }

    #[tokio::test]
    async fn hard_cap_is_enforced_with_many_notes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::new(dir.path().join("state")));
        let job = store
            .create_job(NewJob {
                task: "demo".to_string(),
                repo_owner: "demo".to_string(),
                repo_name: "repo".to_string(),
                branch_base: "main".to_string(),
                budget_usd_max: 5.0,
                max_requests: 10,
                max_wallclock_minutes: 60,
                planner_model: "gpt-4o".to_string(),
                coder_model: "gpt-4o-mini".to_string(),
                dry_run: true,
            })
            .await;

        for i in 0..20 {
            let note = devcrew_core::MemoryNote {
                id: Uuid::new_v4(),
                job_id: job.id,
                kind: devcrew_core::MemoryNoteKind::Decision,
                title: format!("note {i}"),
                body: "x".repeat(1000),
                tags: vec![],
                step_id: None,
                created_at: chrono::Utc::now(),
            };
            store.add_note(job.id, note, 2_000, 20_000).await.unwrap();
        }

        let engine = ContextEngine::new(
            store.clone(),
            Arc::new(crate::embeddings::HashEmbeddingProvider),
            dir.path().join("artifacts"),
            config(),
        );

        let result = engine
            .build_context(job.id, None, "planner-plan", "demo task", Vec::new(), None, None, |messages| {
                messages.iter().map(|m| crate::candidate::estimate_tokens(&m.content)).sum()
            })
            .await
            .unwrap();

        assert!(result.diagnostic.tokens_final <= 200);
        assert!(!result.diagnostic.dropped.is_empty() || result.diagnostic.tokens_clipped > 0);
    }
}
