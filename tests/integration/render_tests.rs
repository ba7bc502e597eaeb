//! Tests for the HTTP renderer against a mock tracker

use tracker_harvest::config::RenderConfig;
use tracker_harvest::render::{HttpRenderer, Renderer};
use tracker_harvest::scan::{list_projects, ProjectEntry};
use tracker_harvest::session::{Cookie, SessionContext};
use tracker_harvest::ScanError;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session(domain: &str) -> SessionContext {
    SessionContext::new(vec![Cookie::new("sid", "xyz", domain, "/")], None)
}

fn renderer() -> HttpRenderer {
    HttpRenderer::from_config(&RenderConfig::default()).expect("Failed to build renderer")
}

#[tokio::test]
async fn test_open_sends_session_cookies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/my_view_page.php"))
        .and(header("cookie", "sid=xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Welcome back</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/my_view_page.php", mock_server.uri());
    let page = renderer()
        .open(&url, &session("127.0.0.1"))
        .await
        .expect("Page should render");

    assert_eq!(page.url, url);
    assert_eq!(
        page.parse().query("p").map(|p| p.text()),
        Some("Welcome back".to_string())
    );
}

#[tokio::test]
async fn test_foreign_cookies_are_not_sent() {
    let mock_server = MockServer::start().await;

    // A request carrying cookies hits the failing mock first
    Mock::given(method("GET"))
        .and(header_exists("cookie"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
        .mount(&mock_server)
        .await;

    let url = format!("{}/", mock_server.uri());
    let result = renderer().open(&url, &session("tracker.example.com")).await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_error_status_is_retryable_render_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/view.php"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let url = format!("{}/view.php?id=1", mock_server.uri());
    let error = renderer()
        .open(&url, &session("127.0.0.1"))
        .await
        .expect_err("503 should fail");

    assert!(matches!(error, ScanError::Render { .. }));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_list_projects_over_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/view_all_bug_page.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><form>
                <select name="project_id">
                  <option value="0">All Projects</option>
                  <option value="12">Backend</option>
                  <option value="">   </option>
                </select>
            </form></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    let url = url::Url::parse(&format!("{}/view_all_bug_page.php", mock_server.uri())).unwrap();
    let projects = list_projects(&renderer(), &session("127.0.0.1"), &url)
        .await
        .expect("Listing should render");

    assert_eq!(
        projects,
        vec![ProjectEntry {
            id: "12".to_string(),
            name: "Backend".to_string()
        }]
    );
}
