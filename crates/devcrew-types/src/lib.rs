pub mod chat;
pub mod event;
pub mod job;

pub use chat::*;
pub use event::*;
pub use job::*;
