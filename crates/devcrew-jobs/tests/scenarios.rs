use std::sync::Arc;

use async_trait::async_trait;

use devcrew_context::embeddings::HashEmbeddingProvider;
use devcrew_context::{ContextEngine, ContextEngineConfig};
use devcrew_core::{EventBus, JobStore, NewJob, PricingTable};
use devcrew_jobs::{parse_agents_str, JobExecutionEngine};
use devcrew_providers::{DryRunProvider, LlmResponse, Provider, ProviderError, ProviderInfo, ProviderRegistry};
use devcrew_types::{ChatMessage, JobStatus};

fn context_config() -> ContextEngineConfig {
    ContextEngineConfig {
        curator_min_score: 0.1,
        curator_topk: 8,
        context_budget_tokens: 4_000,
        context_output_reserve_tokens: 500,
        context_hard_cap_tokens: 4_500,
        context_compact_threshold_ratio: 0.6,
        retriever_max_files: 10,
        retriever_max_snippet_tokens: 200,
        jit_enable: false,
        memory_max_items_per_job: 100,
    }
}

fn build_engine(store: Arc<JobStore>, events: Arc<EventBus>, provider: Arc<dyn Provider>, repos_root: std::path::PathBuf) -> JobExecutionEngine {
    build_engine_with_pricing(store, events, provider, repos_root, PricingTable::with_entries(Default::default()), false)
}

fn build_engine_with_pricing(
    store: Arc<JobStore>,
    events: Arc<EventBus>,
    provider: Arc<dyn Provider>,
    repos_root: std::path::PathBuf,
    pricing: PricingTable,
    skip_git: bool,
) -> JobExecutionEngine {
    let id = provider.info().id;
    let context_engine = Arc::new(ContextEngine::new(
        store.clone(),
        Arc::new(HashEmbeddingProvider),
        repos_root.join("artifacts"),
        context_config(),
    ));
    JobExecutionEngine {
        store,
        events,
        providers: Arc::new(ProviderRegistry::new(vec![provider], Some(id))),
        context_engine,
        pricing: Arc::new(pricing),
        agents: Arc::new(parse_agents_str("# CTO-AI\nplan.\n# CODER-AI\nimplement.\n")),
        http_client: reqwest::Client::new(),
        repos_root: repos_root.join("repos"),
        github_token: None,
        merge_conflict_behavior: "fail".to_string(),
        skip_git,
    }
}

fn new_job(dry_run: bool) -> NewJob {
    NewJob {
        task: "Demo".to_string(),
        repo_owner: "demo".to_string(),
        repo_name: "demo-repo".to_string(),
        branch_base: "main".to_string(),
        budget_usd_max: 5.0,
        max_requests: 10,
        max_wallclock_minutes: 60,
        planner_model: "gpt-4o".to_string(),
        coder_model: "gpt-4o-mini".to_string(),
        dry_run,
    }
}

/// S1 — dry-run happy path: a single synthesized "Analyse Task" step,
/// job completes with no PR links and near-zero cost.
#[tokio::test]
async fn s1_dry_run_happy_path() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(JobStore::new(tmp.path().to_path_buf()));
    let events = Arc::new(EventBus::new());
    let job = store.create_job(new_job(true)).await;

    let engine = build_engine(store.clone(), events, Arc::new(DryRunProvider), tmp.path().to_path_buf());
    engine.run_job(job.id).await.unwrap();

    let finished = store.get_job(job.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert!(finished.pr_links.is_empty());
    assert!(finished.steps.len() >= 1);
    assert!(finished.cost_usd < 0.01);
}

/// A planner provider that always answers with non-JSON text, used to
/// drive S2 without ever reaching the working-copy phase.
struct NonJsonPlanner;

#[async_trait]
impl Provider for NonJsonPlanner {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "non-json-planner".to_string(),
            default_model: "test-model".to_string(),
        }
    }

    async fn generate(&self, _model: &str, _messages: &[ChatMessage]) -> Result<LlmResponse, ProviderError> {
        Ok(LlmResponse {
            text: "not json".to_string(),
            tokens_in: 10,
            tokens_out: 5,
        })
    }
}

/// S2 — plan parse failure: the planner's response cannot be parsed as a
/// JSON step array, so the job fails before any working copy is touched.
#[tokio::test]
async fn s2_plan_parse_failure_fails_job_before_working_copy() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(JobStore::new(tmp.path().to_path_buf()));
    let events = Arc::new(EventBus::new());
    let job = store.create_job(new_job(false)).await;

    let engine = build_engine(store.clone(), events, Arc::new(NonJsonPlanner), tmp.path().to_path_buf());
    let result = engine.run_job(job.id).await;
    assert!(result.is_err());

    let finished = store.get_job(job.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Failed);
    assert_eq!(finished.history.len(), 1);
    assert!(finished.steps.is_empty());
    assert!(!tmp.path().join("repos").exists());
}

/// S4 — cancellation: a job cancelled before the worker ever picks it up
/// is a no-op run that leaves the store's own `request_cancel` transition
/// untouched, with no steps ever created.
#[tokio::test]
async fn s4_cancelled_before_start_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(JobStore::new(tmp.path().to_path_buf()));
    let events = Arc::new(EventBus::new());
    let job = store.create_job(new_job(true)).await;
    store.request_cancel(job.id).await.unwrap();

    let engine = build_engine(store.clone(), events, Arc::new(DryRunProvider), tmp.path().to_path_buf());
    engine.run_job(job.id).await.unwrap();

    let finished = store.get_job(job.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Cancelled);
    assert!(finished.cancelled);
    assert!(finished.steps.is_empty());
}

/// A two-step planner whose coder response is priced to blow through a
/// tiny budget on the first execution step, used to drive S3.
struct BudgetBustingProvider {
    calls: tokio::sync::Mutex<u32>,
}

impl BudgetBustingProvider {
    fn new() -> Self {
        Self { calls: tokio::sync::Mutex::new(0) }
    }
}

#[async_trait]
impl Provider for BudgetBustingProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "budget-busting".to_string(),
            default_model: "test-model".to_string(),
        }
    }

    async fn generate(&self, _model: &str, _messages: &[ChatMessage]) -> Result<LlmResponse, ProviderError> {
        let mut n = self.calls.lock().await;
        *n += 1;
        if *n == 1 {
            Ok(LlmResponse {
                text: r#"[{"title":"Step One","rationale":"r1","acceptance":"a1"},{"title":"Step Two","rationale":"r2","acceptance":"a2"}]"#.to_string(),
                tokens_in: 10,
                tokens_out: 10,
            })
        } else {
            // An oversized response whose output-token cost alone exceeds
            // the job's max_usd once priced.
            Ok(LlmResponse {
                text: String::new(),
                tokens_in: 10,
                tokens_out: 10_000,
            })
        }
    }
}

/// S3 — budget trip mid-execution: a two-step plan where step one's cost
/// alone exceeds `max_usd`. Step two's limit check fires before it is
/// ever created, the job fails, and no PR is opened.
#[tokio::test]
async fn s3_budget_trip_stops_before_second_step() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(JobStore::new(tmp.path().to_path_buf()));
    let events = Arc::new(EventBus::new());
    let mut job_spec = new_job(false);
    job_spec.budget_usd_max = 0.01;
    let job = store.create_job(job_spec).await;

    let mut pricing_entries = std::collections::HashMap::new();
    pricing_entries.insert(
        "default".to_string(),
        devcrew_core::Pricing {
            input_price_per_1k: 0.0,
            output_price_per_1k: 0.01,
        },
    );
    let pricing = PricingTable::with_entries(pricing_entries);

    let engine = build_engine_with_pricing(
        store.clone(),
        events,
        Arc::new(BudgetBustingProvider::new()),
        tmp.path().to_path_buf(),
        pricing,
        true,
    );
    let result = engine.run_job(job.id).await;
    assert!(result.is_err());

    let finished = store.get_job(job.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Failed);
    assert!(finished.cost_usd >= 0.01);
    assert_eq!(finished.steps.iter().filter(|s| s.kind == devcrew_types::StepKind::Execution).count(), 1);
    assert!(finished.pr_links.is_empty());
}
