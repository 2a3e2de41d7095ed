pub mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use devcrew_core::{EventBus, JobStore};
use devcrew_jobs::JobExecutionEngine;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub events: Arc<EventBus>,
    pub engine: Arc<JobExecutionEngine>,
    pub data_root: PathBuf,
    pub memory_max_items_per_job: usize,
    pub memory_max_bytes_per_item: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(routes::tasks::create_task))
        .route("/jobs", get(routes::jobs::list_jobs))
        .route("/jobs/:id", get(routes::jobs::get_job))
        .route("/jobs/:id/cancel", post(routes::jobs::cancel_job))
        .route("/jobs/:id/context", get(routes::jobs::get_latest_context))
        .route("/memory/:id/notes", post(routes::memory::add_note))
        .route("/memory/:id", get(routes::memory::get_memory))
        .route("/memory/:id/files", post(routes::memory::add_file))
        .route("/context/docs", post(routes::context_api::ingest_doc))
        .route("/health", get(routes::health::health))
        .route("/api/files", get(routes::files::list_or_read))
        .route("/ws/jobs", get(routes::events::ws_jobs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves the HTTP/WS API until the process is interrupted.
pub async fn serve(state: AppState, hostname: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{hostname}:{port}").parse()?;
    let app = router(state);
    tracing::info!(%addr, "devcrew-engine listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use uuid::Uuid;

    use devcrew_context::embeddings::HashEmbeddingProvider;
    use devcrew_context::{ContextEngine, ContextEngineConfig};
    use devcrew_core::PricingTable;
    use devcrew_jobs::parse_agents_str;

    fn test_state() -> AppState {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::new(tmp.path().join("jobs")));
        let events = Arc::new(EventBus::new());
        let context_engine = Arc::new(ContextEngine::new(
            store.clone(),
            Arc::new(HashEmbeddingProvider),
            tmp.path().join("artifacts"),
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
            },
        ));
        let engine = Arc::new(JobExecutionEngine {
            store: store.clone(),
            events: events.clone(),
            providers: Arc::new(devcrew_providers::ProviderRegistry::new(
                vec![Arc::new(devcrew_providers::DryRunProvider)],
                Some("dry-run".to_string()),
            )),
            context_engine,
            pricing: Arc::new(PricingTable::with_entries(Default::default())),
            agents: Arc::new(parse_agents_str("# CTO-AI\nplan.\n# CODER-AI\nimplement.\n")),
            http_client: reqwest::Client::new(),
            repos_root: tmp.path().join("repos"),
            github_token: None,
            merge_conflict_behavior: "fail".to_string(),
            skip_git: false,
        });
        std::mem::forget(tmp);
        AppState {
            store,
            events,
            engine,
            data_root: std::env::temp_dir(),
            memory_max_items_per_job: 100,
            memory_max_bytes_per_item: 20_000,
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_job_returns_not_found() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/jobs/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
