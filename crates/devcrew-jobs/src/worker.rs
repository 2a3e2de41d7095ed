use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::Level;
use uuid::Uuid;

use devcrew_context::ContextEngine;
use devcrew_core::{
    check_limits, CoreError, EventBus, JobStep, JobStore, MessageSummary, PricingTable,
};
use devcrew_observability::{log_job_event, JobLogEvent};
use devcrew_providers::ProviderRegistry;
use devcrew_types::{
    ChatMessage, EngineEvent, EngineEventType, JobStatus, StepKind, StepStatus,
};

use crate::agents::{build_prompt, AgentsSpec};
use crate::coder::implement_step;
use crate::cto::{create_plan, parse_plan};
use crate::error::JobError;
use crate::git_ops;
use crate::transcript::{LlmTranscriptRecorder, TranscriptEntry};

pub struct JobExecutionEngine {
    pub store: Arc<JobStore>,
    pub events: Arc<EventBus>,
    pub providers: Arc<ProviderRegistry>,
    pub context_engine: Arc<ContextEngine>,
    pub pricing: Arc<PricingTable>,
    pub agents: Arc<AgentsSpec>,
    pub http_client: reqwest::Client,
    pub repos_root: PathBuf,
    pub github_token: Option<String>,
    pub merge_conflict_behavior: String,
    /// Skips real git clone/commit/push/PR plumbing even for non-dry-run
    /// jobs, using the scratch workdir instead. Exists only so tests can
    /// exercise the real-provider path without a live remote; production
    /// wiring always sets this `false`.
    pub skip_git: bool,
}

impl JobExecutionEngine {
    async fn emit_updated(&self, job_id: Uuid) {
        if let Some(job) = self.store.get_job(job_id).await {
            self.events
                .publish(EngineEvent::new(EngineEventType::JobUpdated, job.view()));
        }
    }

    async fn finish(&self, job_id: Uuid, status: JobStatus, event_type: EngineEventType) {
        let _ = self
            .store
            .mutate_job(job_id, |job| {
                job.status = status;
                job.finished_at = Some(chrono::Utc::now());
            })
            .await;
        let level = if status == JobStatus::Failed { Level::ERROR } else { Level::INFO };
        log_job_event(
            level,
            JobLogEvent {
                event: "job.finished",
                job_id: &job_id.to_string(),
                status: Some(status.as_str()),
                detail: None,
            },
        );
        if let Some(job) = self.store.get_job(job_id).await {
            self.events.publish(EngineEvent::new(event_type, job.view()));
        }
    }

    /// Drives one job end-to-end: plan, working-copy prep, per-step
    /// execution, finalize. Mirrors the five numbered phases of the
    /// original worker loop exactly, including its duplicate `job.updated`
    /// emission right after the plan-phase status flip and again after
    /// the plan's steps are persisted.
    pub async fn run_job(&self, job_id: Uuid) -> Result<(), JobError> {
        let job = self.store.get_job(job_id).await.ok_or(JobError::Store(CoreError::JobNotFound(job_id)))?;
        if job.cancelled {
            return Ok(());
        }

        self.store
            .mutate_job(job_id, |job| {
                job.status = JobStatus::Running;
                job.started_at = Some(chrono::Utc::now());
                job.started_instant = Some(Instant::now());
            })
            .await?;
        log_job_event(
            Level::INFO,
            JobLogEvent {
                event: "job.started",
                job_id: &job_id.to_string(),
                status: Some(JobStatus::Running.as_str()),
                detail: None,
            },
        );
        self.emit_updated(job_id).await;

        let result = self.run_job_inner(job_id).await;
        match result {
            Ok(()) => {
                self.finish(job_id, JobStatus::Completed, EngineEventType::JobCompleted).await;
                Ok(())
            }
            Err(JobError::Cancelled) => {
                self.finish(job_id, JobStatus::Cancelled, EngineEventType::JobCancelled).await;
                Ok(())
            }
            Err(err) => {
                self.finish(job_id, JobStatus::Failed, EngineEventType::JobFailed).await;
                Err(err)
            }
        }
    }

    async fn run_job_inner(&self, job_id: Uuid) -> Result<(), JobError> {
        let job = self.store.get_job(job_id).await.ok_or(JobError::Store(CoreError::JobNotFound(job_id)))?;
        let recorder = LlmTranscriptRecorder::new();

        // Phase 3: plan.
        let planner_section = self.agents.section("CTO-AI").unwrap_or_default();
        let planner_prompt = build_prompt(planner_section, &job.task);
        let base_messages = vec![ChatMessage::system(planner_prompt), ChatMessage::user(job.task.clone())];

        let built = self
            .context_engine
            .build_context(job_id, None, "planner-plan", &job.task, base_messages, None, None, |messages| {
                messages.iter().map(|m| devcrew_types::estimate_tokens(&m.content)).sum()
            })
            .await
            .map_err(|e| JobError::Git(e.to_string()))?;

        let plan_text;
        let tokens_in;
        let tokens_out;
        let parsed_steps;
        if job.dry_run {
            let plan = create_plan(&devcrew_providers::DryRunProvider, &job.planner_model, &built.messages, true)
                .await
                .map_err(JobError::Provider)?;
            plan_text = plan.raw_text.clone();
            tokens_in = plan.tokens_in;
            tokens_out = plan.tokens_out;
            parsed_steps = Ok(plan.steps);
        } else {
            let response = self
                .providers
                .generate(None, &job.planner_model, &built.messages)
                .await
                .map_err(JobError::Provider)?;
            plan_text = response.text.clone();
            tokens_in = response.tokens_in;
            tokens_out = response.tokens_out;
            parsed_steps = parse_plan(&response.text);
        }

        // Cost and a MessageSummary are recorded for the call itself,
        // independent of whether the response parses as a valid plan —
        // the provider call happened and consumed budget either way.
        let summary_text = match &parsed_steps {
            Ok(steps) => format!("planned {} steps", steps.len()),
            Err(_) => "planner response could not be parsed as a step plan".to_string(),
        };

        recorder
            .record(TranscriptEntry {
                role: "planner-plan".to_string(),
                model: job.planner_model.clone(),
                messages: built.messages.clone(),
                response_text: plan_text,
                tokens_in,
                tokens_out,
                summary: Some(summary_text.clone()),
            })
            .await;

        let cost = self.pricing.get(&job.planner_model).cost(tokens_in, tokens_out);
        self.store
            .record_cost(job_id, "llm", &job.planner_model, tokens_in, tokens_out, cost)
            .await?;
        self.store
            .mutate_job(job_id, |job| {
                job.history.push(MessageSummary {
                    job_id,
                    step_id: None,
                    role: "planner-plan".to_string(),
                    summary: summary_text,
                    tokens: tokens_out,
                    created_at: chrono::Utc::now(),
                });
            })
            .await?;

        let steps = parsed_steps.map_err(|e| JobError::PlanParseError(e.to_string()))?;

        self.store
            .mutate_job(job_id, |job| {
                for step in &steps {
                    job.steps.push(JobStep {
                        id: Uuid::new_v4(),
                        job_id,
                        name: step.title.clone(),
                        kind: StepKind::Plan,
                        status: StepStatus::Completed,
                        details: Some(step.rationale.clone()),
                        started_at: Some(chrono::Utc::now()),
                        finished_at: Some(chrono::Utc::now()),
                    });
                }
            })
            .await?;
        log_job_event(
            Level::INFO,
            JobLogEvent {
                event: "job.planned",
                job_id: &job_id.to_string(),
                status: None,
                detail: Some(&format!("{} steps", steps.len())),
            },
        );
        self.emit_updated(job_id).await;

        // Phase 4: working copy preparation.
        let workdir = if job.dry_run || self.skip_git {
            let dir = self.repos_root.join("scratch").join(job_id.to_string());
            std::fs::create_dir_all(&dir)?;
            dir
        } else {
            let clone_url = format!("https://github.com/{}/{}.git", job.repo_owner, job.repo_name);
            let path = git_ops::clone_or_update_repo(
                &self.repos_root,
                &job.repo_owner,
                &job.repo_name,
                &job.branch_base,
                &clone_url,
            )?;
            let branch = git_ops::feature_branch_name(&job_id);
            git_ops::create_branch(&path, &branch)?;
            path
        };
        recorder.set_base_path(&workdir).await;

        // Phase 5: execution.
        let coder_section = self.agents.section("CODER-AI").unwrap_or_default();
        for step in steps {
            let job_snapshot = self.store.get_job(job_id).await.ok_or(JobError::Store(CoreError::JobNotFound(job_id)))?;
            check_limits(&job_snapshot).map_err(|e| match e {
                CoreError::BudgetExceeded { .. } => JobError::BudgetExceeded,
                CoreError::RequestsExceeded { .. } => JobError::RequestsExceeded,
                CoreError::DeadlineExceeded { .. } => JobError::DeadlineExceeded,
                other => JobError::Store(other),
            })?;
            if job_snapshot.cancelled {
                return Err(JobError::Cancelled);
            }

            let exec_step_id = Uuid::new_v4();
            self.store
                .mutate_job(job_id, |job| {
                    job.steps.push(JobStep {
                        id: exec_step_id,
                        job_id,
                        name: step.title.clone(),
                        kind: StepKind::Execution,
                        status: StepStatus::Running,
                        details: None,
                        started_at: Some(chrono::Utc::now()),
                        finished_at: None,
                    });
                })
                .await?;

            let step_json = serde_json::to_string_pretty(&serde_json::json!({
                "title": step.title,
                "rationale": step.rationale,
                "acceptance": step.acceptance,
                "files": step.files,
                "commands": step.commands,
            }))
            .unwrap_or_default();
            let coder_prompt = build_prompt(coder_section, &format!("{}\n\n{}", job.task, step_json));
            let step_for_context = JobStep {
                id: exec_step_id,
                job_id,
                name: step.title.clone(),
                kind: StepKind::Execution,
                status: StepStatus::Running,
                details: None,
                started_at: None,
                finished_at: None,
            };
            let base_messages = vec![ChatMessage::system(coder_prompt)];
            let step_ctx = devcrew_context::StepContext {
                rationale: step.rationale.clone(),
                acceptance: step.acceptance.clone(),
                files: step.files.clone(),
            };
            let built = self
                .context_engine
                .build_context(
                    job_id,
                    Some(&step_for_context),
                    "implementer-step",
                    &job.task,
                    base_messages,
                    Some(&workdir),
                    Some(&step_ctx),
                    |messages| messages.iter().map(|m| devcrew_types::estimate_tokens(&m.content)).sum(),
                )
                .await
                .map_err(|e| JobError::Git(e.to_string()))?;

            let result = if job.dry_run {
                implement_step(&devcrew_providers::DryRunProvider, &job.coder_model, &built.messages, true).await
            } else {
                let provider_result = self.providers.generate(None, &job.coder_model, &built.messages).await;
                match provider_result {
                    Ok(resp) => Ok(crate::coder::StepResult {
                        summary: resp.text.lines().next().unwrap_or("").to_string(),
                        diff: resp.text,
                        tokens_in: resp.tokens_in,
                        tokens_out: resp.tokens_out,
                    }),
                    Err(e) => Err(e),
                }
            }
            .map_err(JobError::Provider)?;

            recorder
                .record(TranscriptEntry {
                    role: "implementer-step".to_string(),
                    model: job.coder_model.clone(),
                    messages: built.messages.clone(),
                    response_text: result.diff.clone(),
                    tokens_in: result.tokens_in,
                    tokens_out: result.tokens_out,
                    summary: Some(result.summary.clone()),
                })
                .await;

            let cost = self.pricing.get(&job.coder_model).cost(result.tokens_in, result.tokens_out);
            self.store
                .record_cost(job_id, "llm", &job.coder_model, result.tokens_in, result.tokens_out, cost)
                .await?;

            if !result.diff.trim().is_empty() {
                let applied = devcrew_diff::apply_unified_diff(&result.diff, |path| {
                    std::fs::read_to_string(workdir.join(path)).unwrap_or_default()
                })?;
                for (path, content) in &applied {
                    devcrew_diff::safe_write(&workdir, path, content)?;
                }
                if !job.dry_run && !self.skip_git {
                    let message = format!("{}\n\n{}", step.title, result.summary);
                    git_ops::commit_all(&workdir, &message)?;
                }
            }

            self.store
                .mutate_job(job_id, |job| {
                    job.last_action = Some(format!("completed step: {}", step.title));
                    job.history.push(MessageSummary {
                        job_id,
                        step_id: Some(exec_step_id),
                        role: "implementer-step".to_string(),
                        summary: result.summary.clone(),
                        tokens: result.tokens_out,
                        created_at: chrono::Utc::now(),
                    });
                    if let Some(s) = job.steps.iter_mut().find(|s| s.id == exec_step_id) {
                        s.status = StepStatus::Completed;
                        s.details = Some(result.summary.clone());
                        s.finished_at = Some(chrono::Utc::now());
                    }
                })
                .await?;
            log_job_event(
                Level::INFO,
                JobLogEvent {
                    event: "job.step_completed",
                    job_id: &job_id.to_string(),
                    status: None,
                    detail: Some(&step.title),
                },
            );
            self.emit_updated(job_id).await;
        }

        // Phase 6: finalize.
        if !job.dry_run && !self.skip_git {
            let branch = git_ops::feature_branch_name(&job_id);
            git_ops::push_branch(&workdir, &branch)?;

            let token = self
                .github_token
                .clone()
                .ok_or_else(|| JobError::Git("no github token configured".to_string()))?;
            let latest_job = self.store.get_job(job_id).await.ok_or(JobError::Store(CoreError::JobNotFound(job_id)))?;
            let body = format_context_report(&latest_job, &self.merge_conflict_behavior);
            let pr_url = git_ops::open_pull_request(
                &self.http_client,
                &token,
                &job.repo_owner,
                &job.repo_name,
                &format!("devcrew: {}", job.task),
                &body,
                &branch,
                &job.branch_base,
            )
            .await?;
            self.store
                .mutate_job(job_id, |job| job.pr_links.push(pr_url.clone()))
                .await?;
            log_job_event(
                Level::INFO,
                JobLogEvent {
                    event: "job.pr_opened",
                    job_id: &job_id.to_string(),
                    status: None,
                    detail: Some(&pr_url),
                },
            );
        }

        Ok(())
    }
}

/// Renders the PR body's "Context Report" section from the job's most
/// recent diagnostic: tokens final/clipped, compact op count, budget
/// triple, hard-cap drop count, and the top 5 selected sources.
fn format_context_report(job: &devcrew_core::JobRecord, merge_strategy: &str) -> String {
    let mut out = format!(
        "Job `{}`\n\nMerge strategy: `{merge_strategy}`\n\n",
        job.id
    );
    if let Some(diagnostic) = job.diagnostics.last() {
        out.push_str("## Context Report\n\n");
        out.push_str(&format!(
            "- tokens_final: {}\n- tokens_clipped: {}\n- compact_ops: {}\n- budget: {}/{}/{}\n\n",
            diagnostic.tokens_final,
            diagnostic.tokens_clipped,
            diagnostic.compact_ops,
            diagnostic.budget_tokens,
            diagnostic.output_reserve_tokens,
            diagnostic.hard_cap_tokens,
        ));
        out.push_str("Top sources:\n");
        for source in diagnostic.selected.iter().take(5) {
            out.push_str(&format!(
                "- {} (score={:.2}, tokens={})\n",
                source.id, source.score, source.tokens
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_report_lists_top_sources() {
        let mut job = devcrew_core::JobRecord {
            id: Uuid::new_v4(),
            task: "demo".to_string(),
            repo_owner: "demo".to_string(),
            repo_name: "repo".to_string(),
            branch_base: "main".to_string(),
            status: JobStatus::Running,
            budget_usd_max: 5.0,
            max_requests: 10,
            max_wallclock_minutes: 60,
            planner_model: "gpt-4o".to_string(),
            coder_model: "gpt-4o-mini".to_string(),
            dry_run: false,
            cost_usd: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            requests_made: 0,
            last_action: None,
            pr_links: Vec::new(),
            agents_hash: None,
            cancelled: false,
            created_at: chrono::Utc::now(),
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
        job.diagnostics.push(devcrew_core::ContextDiagnostic {
            job_id: job.id,
            role: "implementer-step".to_string(),
            tokens_final: 100,
            tokens_clipped: 20,
            compact_ops: 1,
            budget_tokens: 64_000,
            output_reserve_tokens: 8_000,
            hard_cap_tokens: 70_000,
            selected: vec![devcrew_core::ContextSourceRef {
                id: "task".to_string(),
                source_kind: "task".to_string(),
                score: 1.0,
                tokens: 10,
                metadata: serde_json::Value::Null,
            }],
            dropped: Vec::new(),
            hints: Vec::new(),
            recorded_at: chrono::Utc::now(),
        });
        let body = format_context_report(&job, "fail");
        assert!(body.contains("tokens_final: 100"));
        assert!(body.contains("task"));
    }
}
