pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod mirror;
pub mod orchestrator;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod store;

pub use error::{OrchestratorError, Result};
