//! Shared utilities and types for Playcade backend services

// Re-export common dependencies
pub use anyhow;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tracing;
pub use uuid;

pub mod observability;
pub mod types;

pub use types::error::SandboxError;

pub type Result<T> = std::result::Result<T, SandboxError>;
