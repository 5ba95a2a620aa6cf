//! cep-crawler main entry point
//!
//! This is the command-line interface for the CEP range crawler.

use anyhow::Context;
use cep_crawler::config::{load_config_with_hash, Config, Role};
use cep_crawler::crawler::{run_service, CrawlService, RecoverySweeper, ResultQuery};
use cep_crawler::output;
use cep_crawler::queue::QueueAdapter;
use cep_crawler::storage::SharedStorage;
use cep_crawler::ResultStatus;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// cep-crawler: bulk resolution of Brazilian postal-code ranges
///
/// Creates crawls over CEP ranges, drains the work queue against the
/// configured address providers, and reports progress.
#[derive(Parser, Debug)]
#[command(name = "cep-crawler")]
#[command(version = "1.0.0")]
#[command(about = "Bulk resolver for Brazilian postal-code ranges", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// Override the role from the configuration file
    #[arg(long, value_enum)]
    role: Option<Role>,

    /// Print projections as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a crawl over an inclusive CEP range
    Create {
        #[arg(value_name = "START")]
        start: String,
        #[arg(value_name = "END")]
        end: String,
    },

    /// Show the progress of a crawl
    Status {
        #[arg(value_name = "CRAWL_ID")]
        crawl_id: String,
    },

    /// List the results of a crawl
    Results {
        #[arg(value_name = "CRAWL_ID")]
        crawl_id: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        page_size: u32,

        /// Only results with this status
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,

        /// Substring of the code or of any cached address field
        #[arg(long)]
        search: Option<String>,

        /// Lowest postal code to include
        #[arg(long)]
        from: Option<String>,

        /// Highest postal code to include
        #[arg(long)]
        to: Option<String>,
    },

    /// Run the components allowed by the role until Ctrl-C
    Run,

    /// Run one recovery sweep and exit
    Recover,

    /// List processes seen within the last minute
    Workers,

    /// Show queue depth and active workers
    Health,

    /// Validate the configuration and show what would run
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusFilter {
    Success,
    Error,
}

impl From<StatusFilter> for ResultStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Success => ResultStatus::Success,
            StatusFilter::Error => ResultStatus::Error,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    let role = cli.role.unwrap_or(config.runtime.role);

    match cli.command {
        Command::Check => handle_check(&config, &config_hash, role),
        Command::Run => handle_run(config, config_hash, role).await,
        Command::Recover => handle_recover(&config, cli.json),
        Command::Create { start, end } => {
            let crawl = open_service(&config)?.create_crawl(&start, &end)?;
            if cli.json {
                output::print_json(&crawl)?;
            } else {
                output::print_crawl(&crawl);
            }
            Ok(())
        }
        Command::Status { crawl_id } => {
            let crawl = open_service(&config)?.get_crawl(&crawl_id)?;
            if cli.json {
                output::print_json(&crawl)?;
            } else {
                output::print_crawl(&crawl);
            }
            Ok(())
        }
        Command::Results {
            crawl_id,
            page,
            page_size,
            status,
            search,
            from,
            to,
        } => {
            let query = ResultQuery {
                page,
                page_size,
                postal_start: from,
                postal_end: to,
                status: status.map(ResultStatus::from),
                search,
            };
            let results = open_service(&config)?.list_results(&crawl_id, &query)?;
            if cli.json {
                output::print_json(&results)?;
            } else {
                output::print_results(&results);
            }
            Ok(())
        }
        Command::Workers => {
            let workers = open_service(&config)?.active_workers()?;
            output::print_workers(&workers);
            Ok(())
        }
        Command::Health => {
            let health = open_service(&config)?.health()?;
            if cli.json {
                output::print_json(&health)?;
            } else {
                output::print_health(&health);
            }
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("cep_crawler=info,warn"),
            1 => EnvFilter::new("cep_crawler=debug,info"),
            2 => EnvFilter::new("cep_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_stores(config: &Config) -> anyhow::Result<(SharedStorage, QueueAdapter)> {
    let storage = SharedStorage::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    let busy_timeout = Duration::from_millis(config.database.busy_timeout_ms);
    let queue = QueueAdapter::open(&config.queue, busy_timeout)
        .with_context(|| format!("Failed to open queue {}", config.queue.database_path))?;
    Ok((storage, queue))
}

fn open_service(config: &Config) -> anyhow::Result<CrawlService> {
    let (storage, queue) = open_stores(config)?;
    Ok(CrawlService::new(storage, queue))
}

/// Handles `check`: validates config and shows what would run
fn handle_check(config: &Config, config_hash: &str, role: Role) -> anyhow::Result<()> {
    println!("=== cep-crawler Configuration ===\n");

    println!("Role: {}", role.as_str());
    println!("Config hash: {}", config_hash);

    println!("\nStorage:");
    println!("  Database: {}", config.database.path);
    println!("  Queue database: {}", config.queue.database_path);
    println!("  Queue name: {}", config.queue.name);
    println!(
        "  Visibility timeout: {}s",
        config.queue.visibility_timeout_secs
    );

    println!("\nWorker:");
    println!("  Concurrency: {}", config.worker.concurrency);
    println!("  Rate limit: {}ms", config.worker.rate_limit_ms);
    println!("  Throttle backoff: {}ms", config.worker.throttle_backoff_ms);
    println!("  Recovery cooldown: {}min", config.recovery.cooldown_minutes);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nProviders ({}):", config.providers.len());
    for provider in &config.providers {
        println!(
            "  - {:?} at {} ({} attempts, {}ms timeout)",
            provider.kind, provider.base_url, provider.max_attempts, provider.timeout_ms
        );
    }

    println!("\n✓ Configuration is valid");
    if role.runs_worker() {
        println!("✓ Would drain queue '{}' with the provider chain", config.queue.name);
    } else {
        println!("✓ Would serve crawl requests only");
    }

    Ok(())
}

/// Handles `run`: starts the role's components and stops on Ctrl-C
async fn handle_run(config: Config, config_hash: String, role: Role) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, finishing in-flight work");
            shutdown.cancel();
        }
    });

    run_service(config, config_hash, role, cancel)
        .await
        .context("Service stopped with an error")?;
    Ok(())
}

/// Handles `recover`: runs one recovery sweep
fn handle_recover(config: &Config, json: bool) -> anyhow::Result<()> {
    let (storage, queue) = open_stores(config)?;
    let sweeper = RecoverySweeper::new(storage, queue, &config.recovery);
    let report = sweeper.sweep()?;

    if json {
        output::print_json(&report)?;
    } else {
        output::print_recovery(&report);
    }
    Ok(())
}
