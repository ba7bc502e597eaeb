//! Output module for run summaries and store reports
//!
//! This module handles:
//! - The end-of-run summary logged and stored with each run
//! - Statistics over the issue store for the `--stats` report

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, StoreStatistics};
pub use summary::RunSummary;
