//! Session module for authenticated rendering
//!
//! A [`SessionProvider`] produces the [`SessionContext`] every render call runs
//! under: the cookies to send and the optional scope-selector token that narrows
//! the tracker's listing to one project.

mod cookies;

pub use cookies::{Cookie, CookieBag, CookieBagError};

use crate::url::{cookie_domain_matches, cookie_path_matches, extract_domain};
use crate::ScanError;
use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

/// Authenticated context shared read-only by every worker of a run
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub cookies: Vec<Cookie>,
    /// Scope-selector token (project id) the session is narrowed to
    pub scope: Option<String>,
}

impl SessionContext {
    pub fn new(cookies: Vec<Cookie>, scope: Option<String>) -> Self {
        Self { cookies, scope }
    }

    /// Builds the `Cookie` header value for a request to `url`
    ///
    /// Returns None if no cookie applies.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let host = extract_domain(url)?;
        let path = url.path();

        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| cookie_domain_matches(&c.domain, &host))
            .filter(|c| cookie_path_matches(&c.path, path))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

/// Supplies the session a run is executed under
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Establishes the session context
    ///
    /// Fails with `ScanError::SessionInvalid` when no usable session exists.
    async fn establish(&self) -> Result<SessionContext, ScanError>;
}

/// Session provider backed by a JSON cookie file
///
/// With a scope token the named scope cookie is set to the token and the bag is
/// written back, so follow-up manual use of the file sees the same scope. Without
/// a token the scope cookie is stripped from the in-memory session so the tracker
/// falls back to its all-projects view.
pub struct CookieFileProvider {
    path: PathBuf,
    scope_cookie: String,
    scope_domain: Option<String>,
    scope: Option<String>,
}

impl CookieFileProvider {
    pub fn new(path: impl Into<PathBuf>, scope_cookie: &str) -> Self {
        Self {
            path: path.into(),
            scope_cookie: scope_cookie.to_string(),
            scope_domain: None,
            scope: None,
        }
    }

    /// Narrows the session to one scope-selector token
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Domain written on the scope cookie when the bag does not have one yet
    pub fn with_scope_domain(mut self, domain: Option<String>) -> Self {
        self.scope_domain = domain;
        self
    }

    fn invalid(&self, reason: impl std::fmt::Display) -> ScanError {
        ScanError::SessionInvalid(format!("{}: {}", self.path.display(), reason))
    }
}

#[async_trait]
impl SessionProvider for CookieFileProvider {
    async fn establish(&self) -> Result<SessionContext, ScanError> {
        let mut bag = CookieBag::load(&self.path).map_err(|e| self.invalid(e))?;

        match &self.scope {
            Some(scope) => {
                let domain = self
                    .scope_domain
                    .clone()
                    .or_else(|| bag.cookies.first().map(|c| c.domain.clone()))
                    .unwrap_or_default();
                let updated = bag.upsert(&self.scope_cookie, scope, &domain);
                tracing::info!(
                    "{} scope cookie {} = {}",
                    if updated { "Updated" } else { "Added" },
                    self.scope_cookie,
                    scope
                );
                if let Err(e) = bag.save(&self.path) {
                    tracing::warn!(
                        "Failed to persist cookie file {}: {}; continuing with in-memory session",
                        self.path.display(),
                        e
                    );
                }
            }
            None => {
                if bag.remove(&self.scope_cookie) > 0 {
                    tracing::debug!("Stripped {} for an unscoped run", self.scope_cookie);
                }
            }
        }

        if bag.cookies.is_empty() {
            return Err(self.invalid("no cookies in session file"));
        }

        Ok(SessionContext::new(bag.cookies, self.scope.clone()))
    }
}

/// Session provider returning a fixed context
///
/// Useful when the session is obtained by other means than a cookie file.
pub struct StaticSession(pub SessionContext);

#[async_trait]
impl SessionProvider for StaticSession {
    async fn establish(&self) -> Result<SessionContext, ScanError> {
        Ok(self.0.clone())
    }
}
