use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use devcrew_context::{ContextEngine, ContextEngineConfig};
use devcrew_context::embeddings::HashEmbeddingProvider;
use devcrew_core::{Config, EventBus, JobStore, Pricing, PricingTable};
use devcrew_jobs::{parse_agents_file, parse_agents_str, AgentsSpec, JobExecutionEngine};
use devcrew_jobs::agents::DEFAULT_AGENTS_MD;
use devcrew_providers::{DryRunProvider, OpenAiCompatibleProvider, Provider, ProviderRegistry};
use devcrew_server::AppState;

#[derive(Parser, Debug)]
#[command(name = "devcrew-engine")]
#[command(about = "Headless devcrew orchestrator backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boots the HTTP/WS API and starts accepting jobs.
    Serve {
        #[arg(long, alias = "host", default_value = "127.0.0.1")]
        hostname: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long)]
        state_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            hostname,
            port,
            state_dir,
        } => {
            let mut config = Config::from_env();
            if let Some(dir) = state_dir {
                config.state_dir = PathBuf::from(dir);
            }

            let (_logging_info, _guard) = devcrew_observability::init_tracing(&config.state_dir, &config.log_level)
                .context("failed to initialize tracing")?;

            let data_root = config.state_dir.join("data");
            let artifacts_root = config.state_dir.join("artifacts");
            let repos_root = config.state_dir.join("repos");
            tokio::fs::create_dir_all(&data_root).await?;
            tokio::fs::create_dir_all(&artifacts_root).await?;
            tokio::fs::create_dir_all(&repos_root).await?;

            let store = Arc::new(JobStore::new(config.state_dir.join("jobs")));
            let events = Arc::new(EventBus::new());

            let pricing = Arc::new(load_pricing(&config));
            let agents = Arc::new(load_agents(&config));
            let embedder = Arc::new(HashEmbeddingProvider);
            let context_engine = Arc::new(ContextEngine::new(
                store.clone(),
                embedder,
                artifacts_root,
                ContextEngineConfig {
                    curator_min_score: config.curator_min_score,
                    curator_topk: config.curator_topk,
                    context_budget_tokens: config.context_budget_tokens,
                    context_output_reserve_tokens: config.context_output_reserve_tokens,
                    context_hard_cap_tokens: config.context_hard_cap_tokens,
                    context_compact_threshold_ratio: config.context_compact_threshold_ratio,
                    retriever_max_files: config.retriever_max_files,
                    retriever_max_snippet_tokens: config.retriever_max_snippet_tokens,
                    jit_enable: config.jit_enable,
                    memory_max_items_per_job: config.memory_max_items_per_job,
                },
            ));

            let providers = Arc::new(build_provider_registry(&config));

            let engine = Arc::new(JobExecutionEngine {
                store: store.clone(),
                events: events.clone(),
                providers,
                context_engine,
                pricing,
                agents,
                http_client: reqwest::Client::new(),
                repos_root,
                github_token: config.github_token.clone(),
                merge_conflict_behavior: config.merge_conflict_behavior.clone(),
                skip_git: false,
            });

            let state = AppState {
                store,
                events,
                engine,
                data_root,
                memory_max_items_per_job: config.memory_max_items_per_job,
                memory_max_bytes_per_item: config.memory_max_bytes_per_item,
            };

            info!(%hostname, port, state_dir = %config.state_dir.display(), "starting devcrew-engine");
            devcrew_server::serve(state, &hostname, port).await?;
        }
    }

    Ok(())
}

/// Loads the model pricing table from `config.pricing_table_path`, falling
/// back to a small embedded default covering the configured planner/coder
/// models plus a `default` catch-all, matching `app/core/pricing.py`'s
/// static-table-plus-fallback shape.
fn load_pricing(config: &Config) -> PricingTable {
    if let Some(path) = &config.pricing_table_path {
        match PricingTable::load(path) {
            Ok(table) => return table,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "failed to load pricing table, using defaults");
            }
        }
    }
    let mut entries = HashMap::new();
    entries.insert(
        "default".to_string(),
        Pricing {
            input_price_per_1k: 0.005,
            output_price_per_1k: 0.015,
        },
    );
    entries.insert(
        config.model_cto.clone(),
        Pricing {
            input_price_per_1k: 0.0025,
            output_price_per_1k: 0.01,
        },
    );
    entries.insert(
        config.model_coder.clone(),
        Pricing {
            input_price_per_1k: 0.00015,
            output_price_per_1k: 0.0006,
        },
    );
    PricingTable::with_entries(entries)
}

/// Loads `AGENTS.md`-style planner/implementer prompt sections from
/// `config.agents_md_path`, falling back to the built-in default so the
/// engine boots without any on-disk prompt spec.
fn load_agents(config: &Config) -> AgentsSpec {
    if let Some(path) = &config.agents_md_path {
        match parse_agents_file(path) {
            Ok(spec) => return spec,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "failed to load agents spec, using defaults");
            }
        }
    }
    parse_agents_str(DEFAULT_AGENTS_MD)
}

/// Wires the provider registry: an OpenAI-compatible HTTP client when an
/// API key is configured, with the dry-run provider always registered so
/// jobs created with `dry_run=true` never depend on network access.
fn build_provider_registry(config: &Config) -> ProviderRegistry {
    let mut providers: Vec<Arc<dyn Provider>> = vec![Arc::new(DryRunProvider)];
    let mut default_provider = Some("dry-run".to_string());

    if let Some(api_key) = &config.openai_api_key {
        let base_url = config
            .openai_base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        providers.push(Arc::new(OpenAiCompatibleProvider::new(
            base_url,
            api_key.clone(),
            config.model_cto.clone(),
        )));
        default_provider = Some("openai-compatible".to_string());
    }

    ProviderRegistry::new(providers, default_provider)
}
