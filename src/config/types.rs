use serde::Deserialize;

/// Main configuration structure for Tracker-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub render: RenderConfig,
    pub output: OutputConfig,
}

/// Scan pipeline behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Root URL of the tracker (listing and detail links resolve against it)
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Number of concurrent workers for listing page collection
    #[serde(rename = "page-workers", default = "default_page_workers")]
    pub page_workers: u32,

    /// Number of concurrent workers for issue detail extraction
    #[serde(rename = "issue-workers", default = "default_issue_workers")]
    pub issue_workers: u32,

    /// Minimum time between two fetches of the same worker (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Attempts per task before degrading to a partial record
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff shape between attempts
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Base backoff delay (milliseconds)
    #[serde(rename = "backoff-ms", default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Upper bound for exponential backoff (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Per-attempt render timeout (milliseconds)
    #[serde(rename = "task-timeout-ms", default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// Wait-until-stable budget after a page opens (milliseconds)
    #[serde(rename = "settle-timeout-ms", default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,

    /// Upper bound on listing pages
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Read the page count from the first page's pagination links
    #[serde(rename = "discover-pages", default = "default_true")]
    pub discover_pages: bool,

    /// When the listing is considered exhausted
    #[serde(default)]
    pub termination: TerminationPolicy,

    /// Contiguous page failures that abort the collection phase
    #[serde(
        rename = "max-consecutive-page-failures",
        default = "default_max_consecutive_page_failures"
    )]
    pub max_consecutive_page_failures: u32,

    /// Time in-flight tasks get to finish after cancellation (milliseconds)
    #[serde(rename = "grace-period-ms", default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// How pool workers are executed
    #[serde(default)]
    pub strategy: ExecutionStrategy,
}

/// Backoff shape between retry attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Listing termination policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationPolicy {
    /// Stop after a rendered page yields zero valid ids
    #[default]
    ZeroIds,
    /// Stop when the page text carries a "no records" marker
    NoRecordsMarker,
    /// Stop on whichever of the two fires first
    Either,
}

/// Worker execution strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Workers are tasks on the ambient tokio runtime
    #[default]
    Async,
    /// Each worker runs on a dedicated OS thread with its own runtime
    Threaded,
}

/// Layout of the issue listing table
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Listing path relative to the base URL
    #[serde(default = "default_listing_path")]
    pub path: String,

    /// Index of the issue table among all tables on the page
    #[serde(rename = "table-index", default = "default_table_index")]
    pub table_index: usize,

    /// Leading rows of the issue table that are headers
    #[serde(rename = "header-rows", default = "default_header_rows")]
    pub header_rows: usize,

    /// Minimum cell count for a row to be an issue row
    #[serde(rename = "min-columns", default = "default_min_columns")]
    pub min_columns: usize,

    /// Cell index holding the issue id link
    #[serde(rename = "id-column", default = "default_id_column")]
    pub id_column: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            path: default_listing_path(),
            table_index: default_table_index(),
            header_rows: default_header_rows(),
            min_columns: default_min_columns(),
            id_column: default_id_column(),
        }
    }
}

/// Session cookie file configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Path to the JSON cookie bag
    #[serde(rename = "cookie-file")]
    pub cookie_file: String,

    /// Name of the cookie that selects the scan scope
    #[serde(rename = "scope-cookie", default = "default_scope_cookie")]
    pub scope_cookie: String,

    /// Domain written on a newly added scope cookie
    #[serde(rename = "scope-cookie-domain", default)]
    pub scope_cookie_domain: Option<String>,
}

/// HTTP renderer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Connection-level request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Buffered record count that triggers a flush
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Retry a failed flush once before counting its records as lost
    #[serde(rename = "retry-failed-flush", default = "default_true")]
    pub retry_failed_flush: bool,
}

fn default_page_workers() -> u32 {
    10
}

fn default_issue_workers() -> u32 {
    30
}

fn default_request_delay_ms() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    200
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_settle_timeout_ms() -> u64 {
    500
}

fn default_max_pages() -> u32 {
    100
}

fn default_max_consecutive_page_failures() -> u32 {
    5
}

fn default_grace_period_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_listing_path() -> String {
    "view_all_bug_page.php".to_string()
}

fn default_table_index() -> usize {
    3
}

fn default_header_rows() -> usize {
    2
}

fn default_min_columns() -> usize {
    30
}

fn default_id_column() -> usize {
    1
}

fn default_scope_cookie() -> String {
    "MANTIS_PROJECT_COOKIE".to_string()
}

fn default_user_agent() -> String {
    format!("tracker-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_batch_size() -> usize {
    500
}
