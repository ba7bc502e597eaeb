/// Checks if a cookie domain applies to a request host
///
/// A leading dot is ignored; the cookie applies to the domain itself and to
/// every subdomain. An empty cookie domain applies everywhere (host-only cookies
/// saved without a domain).
///
/// # Examples
///
/// ```
/// use tracker_harvest::url::cookie_domain_matches;
///
/// assert!(cookie_domain_matches(".example.com", "example.com"));
/// assert!(cookie_domain_matches(".example.com", "tracker.example.com"));
/// assert!(cookie_domain_matches("tracker.example.com", "tracker.example.com"));
/// assert!(!cookie_domain_matches(".example.com", "example.org"));
/// ```
pub fn cookie_domain_matches(cookie_domain: &str, host: &str) -> bool {
    let domain = cookie_domain.trim().trim_start_matches('.').to_lowercase();
    if domain.is_empty() {
        return true;
    }

    let host = host.to_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Checks if a cookie path applies to a request path
///
/// The cookie path must equal the request path or be a prefix of it that ends
/// at a `/` boundary. An empty cookie path applies everywhere.
///
/// # Examples
///
/// ```
/// use tracker_harvest::url::cookie_path_matches;
///
/// assert!(cookie_path_matches("/mantis", "/mantis/view.php"));
/// assert!(!cookie_path_matches("/mantis", "/mantisX/view.php"));
/// ```
pub fn cookie_path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path.is_empty() || cookie_path == request_path {
        return true;
    }
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}
