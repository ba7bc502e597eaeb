//! State module for tracking scan progress
//!
//! # Components
//!
//! - `RunState`: the orchestrator lifecycle (init, collecting, extracting, done, failed)
//! - `WorkerState`: per-worker fetch pacing used for rate limiting

mod run_state;
mod worker_state;

// Re-export main types
pub use run_state::RunState;
pub use worker_state::WorkerState;
