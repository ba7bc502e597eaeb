use crate::config::Config;
use crate::render::Renderer;
use crate::session::SessionContext;
use crate::url::parse_base_url;
use crate::ScanError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Everything a run shares between its components
///
/// Built once by the orchestrator and handed out behind an `Arc`; nothing in
/// it is mutated during the run.
pub struct ScanContext {
    pub config: Arc<Config>,
    pub base_url: Url,
    pub renderer: Arc<dyn Renderer>,
    pub session: SessionContext,
    pub cancel: CancellationToken,
}

impl ScanContext {
    pub fn new(
        config: Arc<Config>,
        renderer: Arc<dyn Renderer>,
        session: SessionContext,
        cancel: CancellationToken,
    ) -> Result<Self, ScanError> {
        let base_url = parse_base_url(&config.scanner.base_url)?;
        Ok(Self {
            config,
            base_url,
            renderer,
            session,
            cancel,
        })
    }

    /// How long to wait for a rendered page to settle
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.config.scanner.settle_timeout_ms)
    }

    /// Scope-selector token of the run
    pub fn scope(&self) -> Option<&str> {
        self.session.scope.as_deref()
    }
}
