//! URL handling module for Tracker-Harvest
//!
//! This module builds listing page URLs, resolves relative issue links against the
//! tracker base URL, reads pagination parameters and matches cookie domains.

mod domain;
mod matcher;

use url::Url;

// Re-export main functions
pub use domain::extract_domain;
pub use matcher::{cookie_domain_matches, cookie_path_matches};

/// Query parameter carrying the listing page index
pub const PAGE_NUMBER_PARAM: &str = "page_number";

/// Parses the tracker base URL, forcing a trailing slash so relative joins keep
/// the full base path
///
/// # Examples
///
/// ```
/// use tracker_harvest::url::parse_base_url;
///
/// let base = parse_base_url("https://tracker.example.com/mantis").unwrap();
/// assert_eq!(base.as_str(), "https://tracker.example.com/mantis/");
/// ```
pub fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("{}/", trimmed))
    }
}

/// Builds the URL of one listing page
///
/// Page 1 is requested without a page parameter, like the tracker's own
/// navigation does.
pub fn listing_page_url(base: &Url, path: &str, page: u32) -> Result<Url, url::ParseError> {
    let mut url = base.join(path.trim_start_matches('/'))?;
    if page > 1 {
        url.query_pairs_mut()
            .append_pair(PAGE_NUMBER_PARAM, &page.to_string());
    }
    Ok(url)
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None for empty hrefs, non-navigational schemes and hrefs that do
/// not resolve.
pub fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();

    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
    {
        return None;
    }

    match base.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute.to_string())
        }
        _ => None,
    }
}

/// Reads the `page_number` query value from a pagination href
pub fn page_number_of(base: &Url, href: &str) -> Option<u32> {
    let url = base.join(href.trim()).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == PAGE_NUMBER_PARAM)
        .and_then(|(_, value)| value.parse().ok())
}
