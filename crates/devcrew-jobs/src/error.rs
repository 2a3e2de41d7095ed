use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("budget exceeded")]
    BudgetExceeded,
    #[error("requests exceeded")]
    RequestsExceeded,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("planner response did not parse as a JSON array of steps: {0}")]
    PlanParseError(String),
    #[error("diff could not be applied: {0}")]
    MalformedDiff(#[from] devcrew_diff::DiffError),
    #[error("provider call failed: {0}")]
    Provider(#[from] devcrew_providers::ProviderError),
    #[error("git operation failed: {0}")]
    Git(String),
    #[error("job was cancelled")]
    Cancelled,
    #[error("job store error: {0}")]
    Store(#[from] devcrew_core::CoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

