//! Rendering capability consumed by the scan pipeline
//!
//! The pipeline never talks to the network directly. It asks a [`Renderer`] to
//! open a URL under a session and receives the page markup, which is then
//! queried structurally through [`Page`].

mod dom;
mod http;

pub use dom::{Node, Page};
pub use http::{build_http_client, HttpRenderer};

use crate::session::SessionContext;
use crate::ScanError;
use async_trait::async_trait;
use std::time::Duration;

/// Markup of a page opened by a renderer
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL after redirects
    pub url: String,
    pub html: String,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// Parses the markup for structural queries
    pub fn parse(&self) -> Page {
        Page::parse(&self.url, &self.html)
    }
}

/// Opens remote pages under an authenticated session
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Opens `url` and returns its markup
    ///
    /// Fails with `NavigationTimeout` or `Render`; both are retryable.
    async fn open(&self, url: &str, session: &SessionContext) -> Result<RenderedPage, ScanError>;

    /// Waits until the page content no longer changes, up to `timeout`
    ///
    /// Static renderers have nothing to wait for.
    async fn wait_until_stable(
        &self,
        _page: &RenderedPage,
        _timeout: Duration,
    ) -> Result<(), ScanError> {
        Ok(())
    }
}
