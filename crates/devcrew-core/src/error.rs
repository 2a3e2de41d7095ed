use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("job {0} not found")]
    JobNotFound(uuid::Uuid),

    #[error("memory cap exceeded: {0}")]
    MemoryCapExceeded(String),

    #[error("budget exceeded: cost {cost_usd:.4} >= limit {max_usd:.4}")]
    BudgetExceeded { cost_usd: f64, max_usd: f64 },

    #[error("request count exceeded: {requests_made} >= {max_requests}")]
    RequestsExceeded { requests_made: u32, max_requests: u32 },

    #[error("wallclock deadline exceeded: {elapsed_minutes:.2} > {max_wallclock_minutes}")]
    DeadlineExceeded {
        elapsed_minutes: f64,
        max_wallclock_minutes: u64,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
