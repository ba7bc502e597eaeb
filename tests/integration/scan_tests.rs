//! End-to-end scan runs against a mock tracker

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracker_harvest::config::{parse_config, Config};
use tracker_harvest::render::HttpRenderer;
use tracker_harvest::scan::{Field, Orchestrator};
use tracker_harvest::session::CookieFileProvider;
use tracker_harvest::storage::{RecordStore, RunStatus, SqliteStorage, Storage};
use tracker_harvest::{RunState, ScanError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOME: &str = r#"<html><body>
    <select name="project_id">
      <option value="0">All Projects</option>
      <option value="153" selected="selected">Cloud Portal</option>
    </select>
</body></html>"#;

/// Creates a test configuration pointing at the mock tracker
fn create_test_config(base_url: &str, dir: &Path) -> Config {
    parse_config(&format!(
        r#"
[scanner]
base-url = "{base}"
page-workers = 2
issue-workers = 3
request-delay-ms = 0
max-attempts = 2
backoff-ms = 10
backoff-max-ms = 10
task-timeout-ms = 5000
settle-timeout-ms = 0
max-pages = 10

[listing]
table-index = 0
header-rows = 1
min-columns = 2
id-column = 0

[session]
cookie-file = "{cookies}"

[output]
database-path = "{db}"
batch-size = 3
"#,
        base = base_url,
        cookies = dir.join("cookies.json").display(),
        db = dir.join("issues.db").display(),
    ))
    .expect("Test config should be valid")
}

fn write_cookie_file(dir: &Path) {
    std::fs::write(
        dir.join("cookies.json"),
        r#"[{"name": "MANTIS_STRING_COOKIE", "value": "abc", "domain": "127.0.0.1", "path": "/", "httpOnly": true}]"#,
    )
    .expect("Failed to write cookie file");
}

fn listing(ids: &[u32]) -> String {
    let rows: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<tr><td><a href="view.php?id={id}">{id}</a></td><td>Issue {id}</td></tr>"#,
                id = id
            )
        })
        .collect();
    format!(
        "<html><body><table><tr><th>ID</th><th>Summary</th></tr>{}</table></body></html>",
        rows
    )
}

fn detail(id: u32) -> String {
    format!(
        r#"<html><body><table>
            <tr><td>Category</td><td>[Cloud Portal] Sync</td></tr>
            <tr><td>Summary</td><td>Sync stalls on item {id}</td></tr>
            <tr><td>Status</td><td>acknowledged</td></tr>
            <tr><td>Assigned To</td><td>bob</td></tr>
        </table>
        <div id="bugnotes"><div class="bugnote">
            <div class="bugnoteheader">carol (reporter)</div>
            <div class="bugnote-note">Still happening on {id}</div>
        </div></div></body></html>"#,
        id = id
    )
}

/// Mounts a tracker with listing pages 2 / 2 / 0 and four issues
async fn mount_tracker(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header(
            "cookie",
            "MANTIS_STRING_COOKIE=abc; MANTIS_PROJECT_COOKIE=153",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(HOME))
        .mount(mock_server)
        .await;

    // Paged listing mocks go first so they win over the bare listing path
    for (page, ids) in [(2, vec![3, 4]), (3, vec![])] {
        Mock::given(method("GET"))
            .and(path("/view_all_bug_page.php"))
            .and(query_param("page_number", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(&ids)))
            .mount(mock_server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/view_all_bug_page.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[1, 2])))
        .mount(mock_server)
        .await;

    for id in 1..=4u32 {
        Mock::given(method("GET"))
            .and(path("/view.php"))
            .and(query_param("id", id.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail(id)))
            .mount(mock_server)
            .await;
    }
}

fn orchestrator(config: Config, scope: Option<&str>) -> Orchestrator {
    let provider = CookieFileProvider::new(&config.session.cookie_file, &config.session.scope_cookie)
        .with_scope(scope.map(str::to_string));
    let renderer =
        Arc::new(HttpRenderer::from_config(&config.render).expect("Failed to build renderer"));
    Orchestrator::new(Arc::new(config), renderer, Arc::new(provider), "test-hash")
        .without_interrupt_handler()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_scan_scoped_run() {
    let mock_server = MockServer::start().await;
    mount_tracker(&mock_server).await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_cookie_file(temp_dir.path());
    let config = create_test_config(&mock_server.uri(), temp_dir.path());

    let mut orchestrator = orchestrator(config, Some("153"));
    let outcome = orchestrator.run().await.expect("Scan should succeed");

    assert_eq!(orchestrator.state(), RunState::Done);
    assert_eq!(outcome.summary.references_discovered, 4);
    assert_eq!(outcome.summary.records_extracted, 4);
    assert_eq!(outcome.summary.records_persisted, 4);
    assert_eq!(outcome.summary.flush_count, 2);
    assert_eq!(outcome.summary.partial_records, 0);

    let storage = SqliteStorage::new(&temp_dir.path().join("issues.db")).unwrap();
    assert_eq!(storage.count_issues().unwrap(), 4);

    let record = storage.get_issue("2").unwrap().expect("Issue 2 should be stored");
    assert_eq!(record.project_name(), Some("Cloud Portal"));
    assert_eq!(record.project_id(), Some("153"));
    assert_eq!(record.get(Field::Summary), Some("Sync stalls on item 2"));
    assert_eq!(record.get(Field::AssignedTo), Some("bob"));
    assert_eq!(record.notes().len(), 1);
    assert_eq!(record.notes()[0].author.as_deref(), Some("carol (reporter)"));

    let run = storage.get_run(outcome.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");

    // The scope cookie was written back next to the existing attributes
    let cookies = std::fs::read_to_string(temp_dir.path().join("cookies.json")).unwrap();
    assert!(cookies.contains("MANTIS_PROJECT_COOKIE"));
    assert!(cookies.contains("httpOnly"));
}

#[tokio::test]
async fn test_rescan_overwrites_instead_of_duplicating() {
    let mock_server = MockServer::start().await;
    mount_tracker(&mock_server).await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_cookie_file(temp_dir.path());

    for _ in 0..2 {
        let config = create_test_config(&mock_server.uri(), temp_dir.path());
        orchestrator(config, Some("153"))
            .run()
            .await
            .expect("Scan should succeed");
    }

    let storage = SqliteStorage::new(&temp_dir.path().join("issues.db")).unwrap();
    assert_eq!(storage.count_issues().unwrap(), 4);
    let latest = storage.get_latest_run().unwrap().expect("Runs should exist");
    assert_eq!(latest.id, 2);
}

#[tokio::test]
async fn test_expired_session_fails_the_run() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><form action="login.php">
                <input name="username"><input name="password" type="password">
            </form></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_cookie_file(temp_dir.path());
    let config = create_test_config(&mock_server.uri(), temp_dir.path());

    let mut orchestrator = orchestrator(config, None);
    let result = orchestrator.run().await;

    assert!(matches!(result, Err(ScanError::SessionInvalid(_))));
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert!(!temp_dir.path().join("issues.db").exists());
}

#[tokio::test]
async fn test_missing_cookie_file_fails_the_run() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server.uri(), temp_dir.path());

    let result = orchestrator(config, None).run().await;

    assert!(matches!(result, Err(ScanError::SessionInvalid(_))));
}
