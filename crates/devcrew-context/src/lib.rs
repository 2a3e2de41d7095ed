pub mod archivist;
pub mod candidate;
pub mod compactor;
pub mod curator;
pub mod curator_agent;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod retrievers;

pub use candidate::ContextCandidate;
pub use engine::{ContextBuildResult, ContextEngine, ContextEngineConfig, StepContext};
pub use error::ContextError;
