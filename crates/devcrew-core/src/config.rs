use std::path::PathBuf;

/// Process-wide configuration, assembled once at startup and threaded
/// through every component as `Arc<Config>`. There is deliberately no
/// lazily-initialized global settings singleton here: every constructor
/// that needs a setting takes it (or the whole `Config`) as an argument.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub pricing_table_path: Option<PathBuf>,
    pub agents_md_path: Option<PathBuf>,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub model_cto: String,
    pub model_coder: String,

    pub github_token: Option<String>,
    pub github_owner: Option<String>,
    pub github_repo: Option<String>,
    pub allow_unsafe_automerge: bool,

    pub budget_usd_max: f64,
    pub max_requests: u32,
    pub max_wallclock_minutes: u64,

    pub dry_run: bool,

    pub context_engine_enabled: bool,
    pub embedding_model: Option<String>,
    pub context_budget_tokens: u32,
    pub context_output_reserve_tokens: u32,
    pub context_hard_cap_tokens: u32,
    pub context_compact_threshold_ratio: f64,

    pub memory_max_items_per_job: usize,
    pub memory_max_bytes_per_item: usize,

    pub retriever_max_files: usize,
    pub retriever_max_snippet_tokens: u32,

    pub jit_enable: bool,
    pub curator_topk: usize,
    pub curator_min_score: f64,

    pub merge_conflict_behavior: String,
    pub allow_direct_push: bool,

    pub log_level: String,
    pub app_port: u16,
}

impl Config {
    /// Builds configuration from process environment variables, applying
    /// the same defaults the original settings module shipped.
    pub fn from_env() -> Self {
        Self {
            state_dir: env_path("DEVCREW_STATE_DIR", ".devcrew"),
            pricing_table_path: env_opt("DEVCREW_PRICING_TABLE").map(PathBuf::from),
            agents_md_path: env_opt("DEVCREW_AGENTS_MD").map(PathBuf::from),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_base_url: env_opt("OPENAI_BASE_URL"),
            model_cto: env_str("MODEL_CTO", "gpt-4o"),
            model_coder: env_str("MODEL_CODER", "gpt-4o-mini"),
            github_token: env_opt("GITHUB_TOKEN"),
            github_owner: env_opt("GITHUB_OWNER"),
            github_repo: env_opt("GITHUB_REPO"),
            allow_unsafe_automerge: env_bool("ALLOW_UNSAFE_AUTOMERGE", false),
            budget_usd_max: env_f64("BUDGET_USD_MAX", 5.0),
            max_requests: env_u32("MAX_REQUESTS", 40),
            max_wallclock_minutes: env_u64("MAX_WALLCLOCK_MINUTES", 60),
            dry_run: env_bool("DRY_RUN", false),
            context_engine_enabled: env_bool("CONTEXT_ENGINE_ENABLED", true),
            embedding_model: env_opt("EMBEDDING_MODEL"),
            context_budget_tokens: env_u32("CONTEXT_BUDGET_TOKENS", 64_000),
            context_output_reserve_tokens: env_u32("CONTEXT_OUTPUT_RESERVE_TOKENS", 8_000),
            context_hard_cap_tokens: env_u32("CONTEXT_HARD_CAP_TOKENS", 70_000),
            context_compact_threshold_ratio: env_f64("CONTEXT_COMPACT_THRESHOLD_RATIO", 0.6),
            memory_max_items_per_job: env_u32("MEMORY_MAX_ITEMS_PER_JOB", 2_000) as usize,
            memory_max_bytes_per_item: env_u32("MEMORY_MAX_BYTES_PER_ITEM", 20_000) as usize,
            retriever_max_files: env_u32("RETRIEVER_MAX_FILES", 200) as usize,
            retriever_max_snippet_tokens: env_u32("RETRIEVER_MAX_SNIPPET_TOKENS", 2_000),
            jit_enable: env_bool("JIT_ENABLE", true),
            curator_topk: env_u32("CURATOR_TOPK", 12) as usize,
            curator_min_score: env_f64("CURATOR_MIN_SCORE", 0.12),
            merge_conflict_behavior: env_str("MERGE_CONFLICT_BEHAVIOR", "fail"),
            allow_direct_push: env_bool("ALLOW_DIRECT_PUSH", false),
            log_level: env_str("LOG_LEVEL", "info"),
            app_port: env_u32("APP_PORT", 8080) as u16,
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_str(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env_str(key, default))
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key) {
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
