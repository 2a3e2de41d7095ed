pub mod agents;
pub mod coder;
pub mod cto;
pub mod error;
pub mod git_ops;
pub mod transcript;
pub mod worker;

pub use agents::{parse_agents_file, parse_agents_str, AgentsSpec};
pub use error::JobError;
pub use worker::JobExecutionEngine;
