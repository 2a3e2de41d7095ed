pub mod config;
pub mod error;
pub mod event_bus;
pub mod pricing;
pub mod store;

pub use config::Config;
pub use error::CoreError;
pub use event_bus::EventBus;
pub use pricing::{Pricing, PricingTable};
pub use store::*;
