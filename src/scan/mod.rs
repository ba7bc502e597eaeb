//! Scan pipeline
//!
//! This module contains the concurrent scan of a tracker:
//! - Collecting issue references from the paginated listing
//! - Resolving references into records on a bounded worker pool
//! - Retry policy, per-worker pacing and cancellation
//! - The run orchestrator sequencing collection, extraction and persistence

mod collector;
mod context;
mod coordinator;
mod extractor;
mod model;
mod parser;
mod retry;
mod scheduler;

pub use collector::{
    should_terminate, CollectionReport, ListingJob, PageOutcome, ReferenceCollector,
};
pub use context::ScanContext;
pub use coordinator::{list_projects, Orchestrator, RunOutcome};
pub use extractor::{record_from_model, DetailExtractor};
pub use model::{derive_project_name, Field, FieldSet, Note, Record, Reference};
pub use parser::{
    parse_listing, parse_projects, selected_project, IssuePage, ListingPage, PageModel,
    ProjectEntry,
};
pub use retry::{Backoff, RetryPolicy};
pub use scheduler::{
    Completion, Job, PoolConfig, PoolHandle, PoolStats, PoolStatsSnapshot, WorkerPool,
};
