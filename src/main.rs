//! Tracker-Harvest main entry point
//!
//! This is the command-line interface for the Tracker-Harvest issue scanner.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracker_harvest::config::{load_config_with_hash, validate, Config};
use tracker_harvest::render::HttpRenderer;
use tracker_harvest::scan::{list_projects, Orchestrator};
use tracker_harvest::session::{CookieFileProvider, SessionProvider};
use tracker_harvest::url::{listing_page_url, parse_base_url};

/// Tracker-Harvest: a concurrent issue tracker scanner
///
/// Tracker-Harvest walks the paginated issue listing of a tracker, resolves
/// every issue into a structured record and stores the records in SQLite.
#[derive(Parser, Debug)]
#[command(name = "tracker-harvest")]
#[command(version)]
#[command(about = "A concurrent issue tracker scanner", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Scope-selector token (project id) to restrict the scan to
    #[arg(long, value_name = "TOKEN")]
    scope: Option<String>,

    /// Override the configured upper bound on listing pages
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_pages: Option<u32>,

    /// Stop the run gracefully after this many seconds
    #[arg(long, value_name = "SECONDS")]
    deadline: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "list_projects")]
    stats: bool,

    /// List the tracker's projects and exit
    #[arg(long, conflicts_with = "stats")]
    list_projects: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(max_pages) = cli.max_pages {
        config.scanner.max_pages = max_pages;
        validate(&config).context("invalid command-line override")?;
    }

    if cli.stats {
        handle_stats(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let provider = session_provider(&config, cli.scope.clone());

    if cli.list_projects {
        handle_list_projects(&config, provider.as_ref()).await?;
        return Ok(ExitCode::SUCCESS);
    }

    handle_scan(config, config_hash, provider, cli.deadline).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tracker_harvest=info,warn"),
            1 => EnvFilter::new("tracker_harvest=debug,info"),
            2 => EnvFilter::new("tracker_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn session_provider(config: &Config, scope: Option<String>) -> Arc<dyn SessionProvider> {
    Arc::new(
        CookieFileProvider::new(&config.session.cookie_file, &config.session.scope_cookie)
            .with_scope(scope)
            .with_scope_domain(config.session.scope_cookie_domain.clone()),
    )
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use tracker_harvest::output::{load_statistics, print_statistics};
    use tracker_harvest::storage::SqliteStorage;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("failed to open the database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --list-projects mode: prints the tracker's project selector
async fn handle_list_projects(
    config: &Config,
    provider: &dyn SessionProvider,
) -> anyhow::Result<()> {
    let renderer = HttpRenderer::from_config(&config.render)?;
    let session = provider.establish().await?;
    let base = parse_base_url(&config.scanner.base_url)?;
    let listing = listing_page_url(&base, &config.listing.path, 1)?;

    let projects = list_projects(&renderer, &session, &listing).await?;
    if projects.is_empty() {
        println!("No projects found (is the session still valid?)");
    }
    for project in projects {
        println!("{:>8}  {}", project.id, project.name);
    }

    Ok(())
}

/// Handles the main scan operation
async fn handle_scan(
    config: Config,
    config_hash: String,
    provider: Arc<dyn SessionProvider>,
    deadline: Option<u64>,
) -> anyhow::Result<ExitCode> {
    tracing::info!(
        "Scanning {} with {} page workers and {} issue workers ({:?})",
        config.scanner.base_url,
        config.scanner.page_workers,
        config.scanner.issue_workers,
        config.scanner.strategy
    );

    let renderer = Arc::new(HttpRenderer::from_config(&config.render)?);
    let mut orchestrator = Orchestrator::new(Arc::new(config), renderer, provider, config_hash);
    if let Some(seconds) = deadline {
        orchestrator = orchestrator.with_deadline(Duration::from_secs(seconds));
    }

    match orchestrator.run().await {
        Ok(outcome) => {
            println!("Run {} finished:\n{}", outcome.run_id, outcome.summary);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!("Scan failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
