// Core modules
pub mod api;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod models;
pub mod output;
pub mod scheduler;
pub mod store;
pub mod strategy;

// Re-export commonly used types
pub use engine::{EngineConfig, PollingOrchestrator};
pub use error::{EngineError, GatewayErrorKind};
pub use models::*;
pub use output::{EngineEvent, OutputSink};

// Error handling
pub type Result<T> = std::result::Result<T, error::EngineError>;
