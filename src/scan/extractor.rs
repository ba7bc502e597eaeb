//! Detail extractor
//!
//! Resolves one [`Reference`] into a [`Record`]. A single call is one attempt;
//! retries, pacing and timeouts are applied by the worker pool running it.

use super::context::ScanContext;
use super::model::{Field, FieldSet, Record, Reference};
use super::parser::{IssuePage, PageModel};
use super::scheduler::Job;
use crate::render::RenderedPage;
use crate::ScanError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Builds a record from any page model
pub fn record_from_model(
    reference: &Reference,
    project_id: Option<String>,
    model: &impl PageModel,
) -> Record {
    let fields: FieldSet = Field::ALL
        .iter()
        .filter_map(|field| model.get_field(*field).map(|value| (*field, value.to_string())))
        .collect();

    Record::assemble(
        reference,
        project_id,
        fields,
        model.get_notes().to_vec(),
        Utc::now(),
    )
}

/// Resolves references into records through the run's renderer
pub struct DetailExtractor {
    context: Arc<ScanContext>,
    parse_mismatches: AtomicU64,
}

impl DetailExtractor {
    pub fn new(context: Arc<ScanContext>) -> Self {
        Self {
            context,
            parse_mismatches: AtomicU64::new(0),
        }
    }

    /// Detail pages seen so far whose structure was not recognized
    pub fn parse_mismatches(&self) -> u64 {
        self.parse_mismatches.load(Ordering::Relaxed)
    }

    /// Fetches and parses one issue
    ///
    /// Missing fields are never an error. Only render failures are returned,
    /// for the pool to retry.
    pub async fn extract(&self, reference: &Reference) -> Result<Record, ScanError> {
        let ctx = &self.context;
        let rendered = ctx.renderer.open(&reference.url, &ctx.session).await?;
        ctx.renderer
            .wait_until_stable(&rendered, ctx.settle_timeout())
            .await?;

        Ok(self.assemble(reference, &rendered))
    }

    fn assemble(&self, reference: &Reference, rendered: &RenderedPage) -> Record {
        let issue = IssuePage::parse(&rendered.parse());

        if !issue.has_tables() {
            let mismatch = ScanError::ParseMismatch {
                url: rendered.url.clone(),
                message: "no tables on detail page".to_string(),
            };
            tracing::warn!("Issue {}: {}", reference.id, mismatch);
            self.parse_mismatches.fetch_add(1, Ordering::Relaxed);
        }

        record_from_model(reference, self.context.scope().map(str::to_string), &issue)
    }
}

#[async_trait]
impl Job for DetailExtractor {
    type Task = Reference;
    type Output = Record;

    async fn attempt(&self, reference: &Reference) -> Result<Record, ScanError> {
        self.extract(reference).await
    }

    fn fallback(&self, reference: &Reference, error: &ScanError) -> Record {
        tracing::debug!("Minimal record for issue {}: {}", reference.id, error);
        Record::minimal(reference, self.context.scope().map(str::to_string))
    }

    fn describe(&self, reference: &Reference) -> String {
        reference.url.clone()
    }
}
