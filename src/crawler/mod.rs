//! Crawler module for bulk postal-code resolution
//!
//! This module contains the core crawl engine, including:
//! - The orchestrator that creates crawls and fans out cache misses
//! - The worker loop draining the work queue
//! - The recovery sweeper that re-enqueues units missing after a crash
//! - The heartbeat that keeps the worker registry current

mod heartbeat;
mod projection;
mod recovery;
mod service;
mod worker;

pub use heartbeat::{hostname, Heartbeat, ACTIVE_WINDOW_SECS, PRUNE_AFTER_SECS};
pub use projection::{CrawlProjection, HealthReport, ResultItem, ResultQuery, ResultsPage};
pub use recovery::{RecoveryReport, RecoverySweeper};
pub use service::CrawlService;
pub use worker::{polling_backoff, BatchReport, CrawlWorker, ItemOutcome};

use crate::config::{Config, Role};
use crate::queue::QueueAdapter;
use crate::resolver::AddressResolver;
use crate::storage::SharedStorage;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs the long-lived components allowed by `role` until `cancel` fires
///
/// Every role keeps its heartbeat in the worker registry. Roles that run the
/// worker also run the recovery sweeper (once at start, then periodically)
/// and the queue-draining loop.
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, recorded in the registry
/// * `role` - Which components this process runs
/// * `cancel` - Shutdown signal
pub async fn run_service(
    config: Config,
    config_hash: String,
    role: Role,
    cancel: CancellationToken,
) -> Result<()> {
    let storage = SharedStorage::open(&config.database)?;
    let busy_timeout = Duration::from_millis(config.database.busy_timeout_ms);
    let queue = QueueAdapter::open(&config.queue, busy_timeout)?;

    let heartbeat = Heartbeat::new(
        storage.clone(),
        role,
        config_hash,
        config.worker.heartbeat_interval(),
    );
    tracing::info!(
        "Process {} starting with role {} on {}",
        heartbeat.id(),
        role.as_str(),
        heartbeat.hostname()
    );

    if role.runs_worker() {
        let resolver = Arc::new(AddressResolver::from_config(&config)?);
        tracing::info!("Provider chain: {}", resolver.provider_names().join(" -> "));

        let worker = CrawlWorker::new(storage.clone(), queue.clone(), resolver, &config);
        let sweeper = RecoverySweeper::new(storage, queue, &config.recovery);

        tokio::join!(
            heartbeat.run(cancel.clone()),
            sweeper.run_periodic(cancel.clone()),
            worker.run(cancel.clone()),
        );
    } else {
        heartbeat.run(cancel.clone()).await;
    }

    tracing::info!("Process {} stopped", heartbeat.id());
    Ok(())
}
