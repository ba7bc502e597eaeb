//! Tracker-Harvest: a concurrent issue tracker scanner
//!
//! This crate discovers issue references across a paginated listing, resolves each
//! reference into a full structured record through a rendering capability, and
//! persists the records idempotently into SQLite. Fetches run in a bounded worker
//! pool with per-worker rate limiting, retries and graceful cancellation.

pub mod config;
pub mod output;
pub mod render;
pub mod scan;
pub mod session;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for scan operations
///
/// Only `SessionInvalid` and store failures escalate to the orchestrator; every
/// other variant is contained at the task boundary of the worker pool.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    #[error("Navigation timeout for {url}")]
    NavigationTimeout { url: String },

    #[error("Render error for {url}: {message}")]
    Render { url: String, message: String },

    #[error("Unexpected page structure at {url}: {message}")]
    ParseMismatch { url: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunState,
        to: state::RunState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Returns true if another attempt of the same fetch may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NavigationTimeout { .. } | Self::Render { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for scan operations
pub type Result<T> = std::result::Result<T, ScanError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use scan::{Note, Record, Reference};
pub use state::RunState;
