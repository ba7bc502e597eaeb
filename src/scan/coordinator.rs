//! Run orchestrator - sequences a full scan
//!
//! This module drives one run through its lifecycle:
//! - Establishing the session and probing the tracker
//! - Opening the store and registering the run
//! - Streaming references from the collector into the extraction pool
//! - Streaming records into the batch writer on a blocking thread
//! - Handling interrupts and deadlines, then producing the run summary

use super::collector::{CollectionReport, ReferenceCollector};
use super::context::ScanContext;
use super::extractor::DetailExtractor;
use super::model::Record;
use super::parser::{parse_projects, selected_project, ProjectEntry};
use super::scheduler::{Completion, PoolConfig, PoolStatsSnapshot, WorkerPool};
use crate::config::Config;
use crate::output::RunSummary;
use crate::render::Renderer;
use crate::session::{SessionContext, SessionProvider};
use crate::state::RunState;
use crate::storage::{open_storage, BatchWriter, RunStatus, SqliteStorage, Storage, WriterReport};
use crate::ScanError;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Capacity of the reference channel between collector and pool
const REFERENCE_CHANNEL_CAPACITY: usize = 10_000;

/// Capacity of the record channel between pool and writer
const RECORD_CHANNEL_CAPACITY: usize = 1_000;

/// Records between two progress lines
const PROGRESS_INTERVAL: u64 = 50;

/// Final result of a run that got past initialization
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: i64,
    pub summary: RunSummary,
}

/// What the forwarding loop saw
#[derive(Debug, Default, Clone, Copy)]
struct ForwardReport {
    records: u64,
    partial: u64,
}

/// Drives a scan run from session setup to the final flush
pub struct Orchestrator {
    config: Arc<Config>,
    renderer: Arc<dyn Renderer>,
    provider: Arc<dyn SessionProvider>,
    config_hash: String,
    cancel: CancellationToken,
    deadline: Option<Duration>,
    handle_interrupts: bool,
    state: RunState,
}

impl Orchestrator {
    /// Creates an orchestrator for one run
    ///
    /// # Arguments
    ///
    /// * `config` - The scan configuration
    /// * `renderer` - Rendering capability used for every remote fetch
    /// * `provider` - Source of the authenticated session
    /// * `config_hash` - Hash of the configuration file, stored with the run
    pub fn new(
        config: Arc<Config>,
        renderer: Arc<dyn Renderer>,
        provider: Arc<dyn SessionProvider>,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            config,
            renderer,
            provider,
            config_hash: config_hash.into(),
            cancel: CancellationToken::new(),
            deadline: None,
            handle_interrupts: true,
            state: RunState::Init,
        }
    }

    /// Cancels the run gracefully once `deadline` has elapsed
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Disables the Ctrl-C handler
    pub fn without_interrupt_handler(mut self) -> Self {
        self.handle_interrupts = false;
        self
    }

    /// Token that interrupts the run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) -> Result<(), ScanError> {
        if !self.state.can_transition_to(next) {
            return Err(ScanError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::info!("Run state: {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Runs the scan
    ///
    /// Fails only during initialization, leaving the run in `Failed`. Every
    /// later problem is contained and reflected in the summary.
    pub async fn run(&mut self) -> Result<RunOutcome, ScanError> {
        let started = Instant::now();

        let (context, storage, run_id) = match self.initialize().await {
            Ok(ready) => ready,
            Err(e) => {
                tracing::error!("Initialization failed: {}", e);
                self.transition(RunState::Failed)?;
                return Err(e);
            }
        };

        let watchers = self.start_watchers();
        let result = self.scan(context, storage, run_id, started).await;
        for watcher in watchers {
            watcher.abort();
        }

        result
    }

    /// Establishes the session, probes the tracker and registers the run
    async fn initialize(&self) -> Result<(Arc<ScanContext>, SqliteStorage, i64), ScanError> {
        let session = self.provider.establish().await?;
        let context = Arc::new(ScanContext::new(
            Arc::clone(&self.config),
            Arc::clone(&self.renderer),
            session,
            self.cancel.clone(),
        )?);

        probe(&context).await?;

        let mut storage = open_storage(Path::new(&self.config.output.database_path))?;
        let run_id = storage.create_run(&self.config_hash, context.scope())?;
        tracing::info!(
            "Started run {} (scope: {})",
            run_id,
            context.scope().unwrap_or("all projects")
        );

        Ok((context, storage, run_id))
    }

    /// Cancels the run on Ctrl-C or when the deadline passes
    fn start_watchers(&self) -> Vec<JoinHandle<()>> {
        let mut watchers = Vec::new();

        if self.handle_interrupts {
            let cancel = self.cancel.clone();
            watchers.push(tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, finishing in-flight work");
                    cancel.cancel();
                }
            }));
        }

        if let Some(deadline) = self.deadline {
            let cancel = self.cancel.clone();
            watchers.push(tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                tracing::warn!("Deadline of {:?} reached, stopping the run", deadline);
                cancel.cancel();
            }));
        }

        watchers
    }

    /// Pipelined collection, extraction and persistence
    async fn scan(
        &mut self,
        context: Arc<ScanContext>,
        storage: SqliteStorage,
        run_id: i64,
        started: Instant,
    ) -> Result<RunOutcome, ScanError> {
        let config = Arc::clone(&self.config);
        let scanner = &config.scanner;
        self.transition(RunState::Collecting)?;

        let (reference_tx, reference_rx) = mpsc::channel(REFERENCE_CHANNEL_CAPACITY);
        let collector = ReferenceCollector::new(Arc::clone(&context));
        let max_pages = scanner.max_pages;
        let collecting =
            tokio::spawn(async move { collector.collect_into(max_pages, reference_tx).await });

        let extractor = Arc::new(DetailExtractor::new(Arc::clone(&context)));
        let pool = WorkerPool::new(
            PoolConfig::from_scanner(scanner, scanner.issue_workers),
            Arc::clone(&extractor),
            self.cancel.clone(),
        );
        let (completions, pool_handle) = pool.spawn(reference_rx);

        let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let writer = BatchWriter::from_config(storage, &config.output);
        let writing = tokio::task::spawn_blocking(move || writer.run_blocking(record_rx));

        let forwarding = tokio::spawn(forward_records(completions, record_tx, started));

        let collection = match collecting.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Collector task failed: {}", e);
                CollectionReport::default()
            }
        };
        self.transition(RunState::Extracting)?;
        tracing::info!(
            "Collection finished with {} references, draining extraction",
            collection.references
        );

        let forwarded = match forwarding.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Forwarding task failed: {}", e);
                ForwardReport::default()
            }
        };
        let pool_stats = pool_handle.join().await;

        let (mut storage, writer_report) = writing
            .await
            .map_err(|e| ScanError::Persistence(format!("writer thread failed: {}", e)))?;

        let interrupted = self.cancel.is_cancelled();
        let summary = build_summary(
            &collection,
            forwarded,
            &pool_stats,
            &writer_report,
            extractor.parse_mismatches(),
            interrupted,
            started.elapsed(),
        );

        let status = if interrupted {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        if let Err(e) = storage.complete_run(run_id, status, &summary) {
            tracing::error!("Failed to record summary of run {}: {}", run_id, e);
        }

        self.transition(RunState::Done)?;
        summary.log();

        Ok(RunOutcome { run_id, summary })
    }
}

/// Opens the base URL and checks that the session is accepted
async fn probe(context: &ScanContext) -> Result<(), ScanError> {
    let rendered = context
        .renderer
        .open(context.base_url.as_str(), &context.session)
        .await
        .map_err(|e| ScanError::SessionInvalid(format!("probe of base URL failed: {}", e)))?;

    let page = rendered.parse();
    if page.query("input[type='password']").is_some() {
        return Err(ScanError::SessionInvalid(format!(
            "{} answered with a login form",
            rendered.url
        )));
    }

    if let Some(scope) = context.scope() {
        match selected_project(&page) {
            Some(selected) if selected == scope => {
                tracing::debug!("Scope {} is selected", scope);
            }
            Some(selected) => tracing::warn!(
                "Scope {} requested but the tracker has project {} selected",
                scope,
                selected
            ),
            None => tracing::debug!("No project selector on the probe page"),
        }
    }

    Ok(())
}

/// Moves pool completions into the writer channel, logging progress
async fn forward_records(
    mut completions: mpsc::Receiver<Completion<Record>>,
    records: mpsc::Sender<Record>,
    started: Instant,
) -> ForwardReport {
    let mut report = ForwardReport::default();

    while let Some(completion) = completions.recv().await {
        report.records += 1;
        if completion.output.is_partial() {
            report.partial += 1;
        }

        if records.send(completion.output).await.is_err() {
            tracing::error!("Writer stopped accepting records");
            break;
        }

        if report.records % PROGRESS_INTERVAL == 0 {
            let rate = report.records as f64 / started.elapsed().as_secs_f64().max(f64::EPSILON);
            tracing::info!(
                "Progress: {} records extracted ({} partial), {:.2} records/sec",
                report.records,
                report.partial,
                rate
            );
        }
    }

    report
}

fn build_summary(
    collection: &CollectionReport,
    forwarded: ForwardReport,
    pool: &PoolStatsSnapshot,
    writer: &WriterReport,
    parse_mismatches: u64,
    interrupted: bool,
    elapsed: Duration,
) -> RunSummary {
    RunSummary {
        references_discovered: collection.references,
        records_extracted: forwarded.records,
        partial_records: forwarded.partial,
        records_persisted: writer.persisted,
        records_lost: writer.lost,
        flush_count: writer.flushes,
        pages_fetched: collection.pages_fetched,
        pages_failed: collection.pages_failed,
        collection_aborted: collection.aborted,
        parse_mismatches,
        retries: collection.retries + pool.retries,
        abandoned_tasks: pool.abandoned,
        skipped_tasks: pool.skipped,
        interrupted,
        elapsed,
    }
}

/// Lists the projects offered by the tracker's project selector
///
/// `listing_url` is the first listing page, which carries the selector.
pub async fn list_projects(
    renderer: &dyn Renderer,
    session: &SessionContext,
    listing_url: &Url,
) -> Result<Vec<ProjectEntry>, ScanError> {
    let rendered = renderer.open(listing_url.as_str(), session).await?;
    let projects = parse_projects(&rendered.parse());
    tracing::debug!("Found {} projects", projects.len());
    Ok(projects)
}
