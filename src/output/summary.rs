//! End-of-run summary

use std::fmt;
use std::time::Duration;

/// Counts reported at the end of a scan run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub references_discovered: u64,
    /// Records that came out of the worker pool, partial ones included
    pub records_extracted: u64,
    /// Records carrying only id, url and scrape time
    pub partial_records: u64,
    pub records_persisted: u64,
    /// Records of batches whose flush finally failed
    pub records_lost: u64,
    pub flush_count: u64,
    pub pages_fetched: u64,
    pub pages_failed: u64,
    /// Listing collection stopped early on consecutive page failures
    pub collection_aborted: bool,
    /// Detail pages whose structure was not recognized
    pub parse_mismatches: u64,
    pub retries: u64,
    pub abandoned_tasks: u64,
    pub skipped_tasks: u64,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Extracted records per second of wall time
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.records_extracted as f64 / secs
        } else {
            0.0
        }
    }

    /// Logs the summary at info level, one line per group
    pub fn log(&self) {
        tracing::info!(
            "Scan finished in {:.1}s{}",
            self.elapsed.as_secs_f64(),
            if self.interrupted { " (interrupted)" } else { "" }
        );
        tracing::info!(
            "Listing: {} references from {} pages ({} failed{})",
            self.references_discovered,
            self.pages_fetched,
            self.pages_failed,
            if self.collection_aborted { ", aborted" } else { "" }
        );
        tracing::info!(
            "Extraction: {} records ({} partial, {} unrecognized pages, {} retries), {:.2} records/sec",
            self.records_extracted,
            self.partial_records,
            self.parse_mismatches,
            self.retries,
            self.throughput()
        );
        tracing::info!(
            "Persistence: {} records in {} flushes, {} lost",
            self.records_persisted,
            self.flush_count,
            self.records_lost
        );
        if self.abandoned_tasks > 0 || self.skipped_tasks > 0 {
            tracing::warn!(
                "Cancelled work: {} abandoned in flight, {} never started",
                self.abandoned_tasks,
                self.skipped_tasks
            );
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  References discovered: {}", self.references_discovered)?;
        writeln!(
            f,
            "  Pages fetched: {} ({} failed{})",
            self.pages_fetched,
            self.pages_failed,
            if self.collection_aborted { ", collection aborted" } else { "" }
        )?;
        writeln!(
            f,
            "  Records extracted: {} ({} partial)",
            self.records_extracted, self.partial_records
        )?;
        writeln!(
            f,
            "  Records persisted: {} in {} flushes ({} lost)",
            self.records_persisted, self.flush_count, self.records_lost
        )?;
        writeln!(
            f,
            "  Unrecognized pages: {}, retries: {}",
            self.parse_mismatches, self.retries
        )?;
        writeln!(
            f,
            "  Abandoned: {}, skipped: {}{}",
            self.abandoned_tasks,
            self.skipped_tasks,
            if self.interrupted { " (interrupted)" } else { "" }
        )?;
        write!(
            f,
            "  Elapsed: {:.1}s ({:.2} records/sec)",
            self.elapsed.as_secs_f64(),
            self.throughput()
        )
    }
}
