pub mod config;
pub mod error;
pub mod gate;
pub mod model;
pub mod orchestrator;
pub mod platform;
pub mod queue;
pub mod rate_limit;
pub mod retry;
pub mod session;
pub mod store;

pub use error::{Error, Result};
