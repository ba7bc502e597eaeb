//! Configuration module for Tracker-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use tracker_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Issue workers: {}", config.scanner.issue_workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BackoffKind, Config, ExecutionStrategy, ListingConfig, OutputConfig, RenderConfig,
    ScannerConfig, SessionConfig, TerminationPolicy,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
