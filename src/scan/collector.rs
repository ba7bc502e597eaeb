//! Reference collector
//!
//! Walks the paginated issue listing and turns every valid id row into a
//! [`Reference`]. Page fetches go through the worker pool so they share the
//! retry policy, pacing, timeouts and cancellation of detail fetches.

use super::context::ScanContext;
use super::model::Reference;
use super::parser::{parse_listing, ListingPage};
use super::scheduler::{Completion, Job, PoolConfig, PoolHandle, WorkerPool};
use crate::config::TerminationPolicy;
use crate::url::listing_page_url;
use crate::ScanError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Result of fetching one listing page
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub page: u32,
    /// None if the page could not be rendered
    pub listing: Option<ListingPage>,
}

/// Page-fetch job run by the worker pool
pub struct ListingJob {
    context: Arc<ScanContext>,
}

impl ListingJob {
    pub fn new(context: Arc<ScanContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Job for ListingJob {
    type Task = u32;
    type Output = PageOutcome;

    async fn attempt(&self, page: &u32) -> Result<PageOutcome, ScanError> {
        let ctx = &self.context;
        let url = listing_page_url(&ctx.base_url, &ctx.config.listing.path, *page)?;

        let rendered = ctx.renderer.open(url.as_str(), &ctx.session).await?;
        ctx.renderer
            .wait_until_stable(&rendered, ctx.settle_timeout())
            .await?;

        let listing = parse_listing(&rendered.parse(), &ctx.base_url, &ctx.config.listing);
        tracing::debug!(
            "Listing page {} yielded {} references",
            page,
            listing.references.len()
        );

        Ok(PageOutcome {
            page: *page,
            listing: Some(listing),
        })
    }

    fn fallback(&self, page: &u32, _error: &ScanError) -> PageOutcome {
        PageOutcome {
            page: *page,
            listing: None,
        }
    }

    fn describe(&self, page: &u32) -> String {
        format!("listing page {}", page)
    }
}

/// What a collection pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub pages_fetched: u64,
    pub pages_failed: u64,
    pub references: u64,
    /// Repeated ids dropped within this pass
    pub duplicates: u64,
    /// Page bound read from the pagination bar, if any
    pub discovered_pages: Option<u32>,
    /// Too many consecutive page failures ended the pass
    pub aborted: bool,
    pub retries: u64,
}

/// Single page worker fed one page at a time
struct SequentialPages {
    pages: mpsc::Sender<u32>,
    outcomes: mpsc::Receiver<Completion<PageOutcome>>,
    handle: PoolHandle<u32>,
}

impl SequentialPages {
    fn start(config: PoolConfig, job: Arc<ListingJob>, cancel: CancellationToken) -> Self {
        let (pages, page_rx) = mpsc::channel(1);
        let (outcomes, handle) = WorkerPool::new(config, job, cancel).spawn(page_rx);
        Self {
            pages,
            outcomes,
            handle,
        }
    }

    /// Fetches one page; None once the worker has stopped
    async fn fetch(&mut self, page: u32) -> Option<Completion<PageOutcome>> {
        self.pages.send(page).await.ok()?;
        self.outcomes.recv().await
    }

    /// Stops the worker and returns its retry count
    async fn finish(self) -> u64 {
        drop(self.pages);
        drop(self.outcomes);
        self.handle.join().await.retries
    }
}

/// Returns true if a successfully rendered page ends the listing
pub fn should_terminate(policy: TerminationPolicy, listing: &ListingPage) -> bool {
    match policy {
        TerminationPolicy::ZeroIds => listing.references.is_empty(),
        TerminationPolicy::NoRecordsMarker => listing.no_records,
        TerminationPolicy::Either => listing.references.is_empty() || listing.no_records,
    }
}

/// Paginates the listing and emits references
pub struct ReferenceCollector {
    context: Arc<ScanContext>,
}

/// Per-pass bookkeeping shared by the sequential and parallel paths
struct Pass {
    sender: mpsc::Sender<Reference>,
    cancel: CancellationToken,
    seen: HashSet<String>,
    report: CollectionReport,
    consecutive_failures: u32,
    max_consecutive_failures: u32,
}

impl Pass {
    /// Sends the references not seen before
    ///
    /// Returns false once the receiver is gone or the pass is cancelled while
    /// waiting for channel capacity.
    async fn emit(&mut self, listing: &ListingPage) -> bool {
        for reference in &listing.references {
            if !self.seen.insert(reference.id.clone()) {
                self.report.duplicates += 1;
                continue;
            }
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                result = self.sender.send(reference.clone()) => result.is_ok(),
            };
            if !sent {
                return false;
            }
            self.report.references += 1;
        }
        true
    }

    /// Counts a failed page; returns true if the pass must abort
    fn page_failed(&mut self, page: u32) -> bool {
        self.report.pages_failed += 1;
        self.consecutive_failures += 1;
        tracing::warn!(
            "Listing page {} failed ({} in a row)",
            page,
            self.consecutive_failures
        );
        if self.consecutive_failures > self.max_consecutive_failures {
            tracing::error!(
                "Aborting collection after {} consecutive page failures",
                self.consecutive_failures
            );
            self.report.aborted = true;
            return true;
        }
        false
    }

    fn page_succeeded(&mut self) {
        self.report.pages_fetched += 1;
        self.consecutive_failures = 0;
    }
}

impl ReferenceCollector {
    pub fn new(context: Arc<ScanContext>) -> Self {
        Self { context }
    }

    /// Collects every reference up to `max_pages` listing pages
    pub async fn collect(&self, max_pages: u32) -> (Vec<Reference>, CollectionReport) {
        let (tx, mut rx) = mpsc::channel(1024);
        let pass = self.collect_into(max_pages, tx);
        let gather = async {
            let mut references = Vec::new();
            while let Some(reference) = rx.recv().await {
                references.push(reference);
            }
            references
        };
        let (report, references) = tokio::join!(pass, gather);
        (references, report)
    }

    /// Streams references into `sender` as pages are parsed
    ///
    /// Returns when the listing terminates, the page bound is reached, the
    /// pass aborts, the run is cancelled or the receiver is dropped. The
    /// sender is dropped on return, closing the stream.
    pub async fn collect_into(
        &self,
        max_pages: u32,
        sender: mpsc::Sender<Reference>,
    ) -> CollectionReport {
        let scanner = &self.context.config.scanner;
        let policy = scanner.termination;

        // Page fetches get their own token so an abort does not cancel the run
        let cancel = self.context.cancel.child_token();
        let mut pass = Pass {
            sender,
            cancel: cancel.clone(),
            seen: HashSet::new(),
            report: CollectionReport::default(),
            consecutive_failures: 0,
            max_consecutive_failures: scanner.max_consecutive_page_failures,
        };

        if max_pages == 0 {
            return pass.report;
        }

        let job = Arc::new(ListingJob::new(Arc::clone(&self.context)));

        let mut pages = SequentialPages::start(
            PoolConfig::from_scanner(scanner, 1),
            Arc::clone(&job),
            cancel.clone(),
        );

        // Page 1 decides between parallel and sequential probing
        let mut bound = max_pages;
        let mut parallel = false;
        let mut done = false;

        match pages.fetch(1).await {
            None => done = true,
            Some(Completion {
                output: PageOutcome { listing: None, .. },
                ..
            }) => {
                if pass.page_failed(1) {
                    done = true;
                }
            }
            Some(Completion {
                output: PageOutcome {
                    listing: Some(listing),
                    ..
                },
                ..
            }) => {
                pass.page_succeeded();
                if should_terminate(policy, &listing) {
                    tracing::info!("Listing ends at page 1");
                    done = true;
                } else if !pass.emit(&listing).await {
                    done = true;
                } else if scanner.discover_pages {
                    if let Some(discovered) = listing.max_page {
                        pass.report.discovered_pages = Some(discovered);
                        bound = bound.min(discovered);
                        parallel = scanner.page_workers > 1 && bound > 1;
                        tracing::info!(
                            "Pagination reports {} pages; scanning {}",
                            discovered,
                            bound
                        );
                    }
                }
            }
        }

        if !done && !parallel {
            for page in 2..=bound {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(completion) = pages.fetch(page).await else {
                    break;
                };
                match completion.output.listing {
                    None => {
                        if pass.page_failed(page) {
                            break;
                        }
                    }
                    Some(listing) => {
                        pass.page_succeeded();
                        if should_terminate(policy, &listing) {
                            tracing::info!("Listing ends at page {}", page);
                            break;
                        }
                        if !pass.emit(&listing).await {
                            break;
                        }
                    }
                }
            }
        }

        pass.report.retries += pages.finish().await;

        if !done && parallel && !cancel.is_cancelled() {
            self.collect_parallel(2..=bound, &mut pass, &cancel, job).await;
        }

        tracing::info!(
            "Collected {} references from {} pages ({} failed)",
            pass.report.references,
            pass.report.pages_fetched,
            pass.report.pages_failed
        );
        pass.report
    }

    /// Fetches a known page range through a pool of page workers
    async fn collect_parallel(
        &self,
        pages: std::ops::RangeInclusive<u32>,
        pass: &mut Pass,
        cancel: &CancellationToken,
        job: Arc<ListingJob>,
    ) {
        let scanner = &self.context.config.scanner;
        let pool = WorkerPool::new(
            PoolConfig::from_scanner(scanner, scanner.page_workers),
            job,
            cancel.clone(),
        );
        let mut next = *pages.start();
        let (mut outcomes, handle) = pool.spawn_iter(pages);

        // Pages settle out of order; failure runs are counted in page order
        let mut settled: BTreeMap<u32, bool> = BTreeMap::new();

        while let Some(completion) = outcomes.recv().await {
            let page = completion.output.page;
            match completion.output.listing {
                None => {
                    settled.insert(page, false);
                }
                Some(listing) => {
                    settled.insert(page, true);
                    if !pass.emit(&listing).await {
                        cancel.cancel();
                    }
                }
            }

            while let Some(ok) = settled.remove(&next) {
                if ok {
                    pass.page_succeeded();
                } else if pass.page_failed(next) {
                    cancel.cancel();
                }
                next += 1;
            }
        }

        // Pages behind a gap left by cancellation
        for ok in settled.into_values() {
            if ok {
                pass.report.pages_fetched += 1;
            } else {
                pass.report.pages_failed += 1;
            }
        }

        pass.report.retries += handle.join().await.retries;
    }
}
