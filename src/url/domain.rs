use url::Url;

/// Extracts the domain from a URL
///
/// Returns the lowercase host of a URL, used to pick the session cookies sent
/// with a request.
///
/// # Arguments
///
/// * `url` - The URL to extract the domain from
///
/// # Returns
///
/// * `Some(String)` - The lowercase domain/host
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use tracker_harvest::url::extract_domain;
///
/// let url = Url::parse("https://Tracker.Example.com/view.php?id=7").unwrap();
/// assert_eq!(extract_domain(&url), Some("tracker.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
