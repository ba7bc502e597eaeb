//! HTTP renderer
//!
//! Fetches pages with reqwest and hands back the server-rendered markup. The
//! tracker renders its listing and detail views server side, so the static
//! markup is what a browser would settle on.

use super::{RenderedPage, Renderer};
use crate::config::RenderConfig;
use crate::session::SessionContext;
use crate::ScanError;
use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Builds the HTTP client used by [`HttpRenderer`]
///
/// # Arguments
///
/// * `config` - The render configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &RenderConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Renderer backed by plain HTTP requests
#[derive(Clone)]
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a renderer from configuration
    pub fn from_config(config: &RenderConfig) -> Result<Self, ScanError> {
        let client = build_http_client(config).map_err(|e| ScanError::Render {
            url: String::new(),
            message: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self::new(client))
    }
}

/// Maps a transport error to the scan error taxonomy
fn classify(url: &str, error: reqwest::Error) -> ScanError {
    if error.is_timeout() {
        ScanError::NavigationTimeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        ScanError::Render {
            url: url.to_string(),
            message: "connection refused".to_string(),
        }
    } else {
        ScanError::Render {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn open(&self, url: &str, session: &SessionContext) -> Result<RenderedPage, ScanError> {
        let parsed = Url::parse(url)?;

        let mut request = self.client.get(parsed.clone());
        if let Some(header) = session.cookie_header(&parsed) {
            request = request.header(COOKIE, header);
        }

        let response = request.send().await.map_err(|e| classify(url, e))?;
        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(ScanError::Render {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let html = response.text().await.map_err(|e| classify(url, e))?;
        tracing::trace!("Rendered {} ({} bytes)", final_url, html.len());

        Ok(RenderedPage::new(final_url, html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let config = RenderConfig::default();
        assert!(build_http_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let renderer = HttpRenderer::from_config(&RenderConfig::default()).unwrap();
        let result = renderer.open("not a url", &SessionContext::default()).await;
        assert!(matches!(result, Err(ScanError::UrlParse(_))));
    }

    #[tokio::test]
    async fn test_connection_failure_is_retryable() {
        let renderer = HttpRenderer::from_config(&RenderConfig::default()).unwrap();
        // port 9 (discard) is closed on test hosts
        let result = renderer
            .open("http://127.0.0.1:9/", &SessionContext::default())
            .await;
        let error = result.unwrap_err();
        assert!(error.is_retryable());
    }

    // Response handling is covered against a mock server in tests/integration
}
