//! Recovery sweeper
//!
//! Finds crawls that are not terminal, diffs their processed units against
//! the full range and re-enqueues exactly the missing ones. A crawl swept
//! within the cooldown is skipped; the stamp is taken with a compare-and-set
//! before anything is enqueued, so concurrent sweepers never both re-enqueue
//! the same crawl.

use crate::cep::CepRange;
use crate::config::RecoveryConfig;
use crate::queue::{QueueAdapter, WorkItem};
use crate::storage::{CrawlRecord, SharedStorage, Storage};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Summary of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Non-terminal crawls looked at
    pub examined: usize,
    /// Crawls skipped because another sweep stamped them recently
    pub skipped: usize,
    /// Work items re-enqueued across all crawls
    pub requeued: usize,
    /// Crawls with nothing missing whose status was re-derived
    pub settled: usize,
    /// Crawls whose recovery failed
    pub failed: usize,
}

pub struct RecoverySweeper {
    storage: SharedStorage,
    queue: QueueAdapter,
    cooldown: Duration,
    interval: Duration,
}

impl RecoverySweeper {
    pub fn new(storage: SharedStorage, queue: QueueAdapter, config: &RecoveryConfig) -> Self {
        Self {
            storage,
            queue,
            cooldown: config.cooldown(),
            interval: config.interval(),
        }
    }

    /// Sweeps every non-terminal crawl now
    pub fn sweep(&self) -> Result<RecoveryReport> {
        self.sweep_at(Utc::now())
    }

    /// Sweeps every non-terminal crawl as of `now`
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<RecoveryReport> {
        let crawls = self.storage.with(|s| s.list_unfinished_crawls())?;
        let mut report = RecoveryReport::default();

        for crawl in &crawls {
            report.examined += 1;

            let stamped = self
                .storage
                .with(|s| s.try_stamp_recovery(&crawl.id, now, self.cooldown))?;
            if !stamped {
                tracing::debug!("Crawl {} recovered recently, skipping", crawl.id);
                report.skipped += 1;
                continue;
            }

            match self.recover(crawl) {
                Ok(0) => report.settled += 1,
                Ok(requeued) => report.requeued += requeued,
                Err(e) => {
                    tracing::warn!("Recovery of crawl {} failed: {}", crawl.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(
                "Recovery sweep: {} examined, {} skipped, {} items re-enqueued",
                report.examined,
                report.skipped,
                report.requeued
            );
        }

        Ok(report)
    }

    /// Re-enqueues the units of one crawl that have no result yet
    fn recover(&self, crawl: &CrawlRecord) -> Result<usize> {
        let range = CepRange::parse(&crawl.range_start, &crawl.range_end)?;
        let processed = self
            .storage
            .with(|s| s.processed_postal_codes(&crawl.id))?;

        let missing: Vec<WorkItem> = range
            .iter()
            .filter(|code| !processed.contains(code))
            .map(|code| WorkItem::new(crawl.id.clone(), code))
            .collect();

        if missing.is_empty() {
            let refreshed = self.storage.with(|s| s.refresh_crawl_status(&crawl.id))?;
            tracing::info!(
                "Crawl {} has no missing units, status is {}",
                crawl.id,
                refreshed.status
            );
            return Ok(0);
        }

        let sent = self.queue.enqueue_batch(&missing)?;
        tracing::info!("Re-enqueued {} missing units of crawl {}", sent, crawl.id);
        Ok(sent)
    }

    /// Sweeps at start and then every interval until cancelled
    pub async fn run_periodic(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep() {
                        tracing::warn!("Recovery sweep failed: {}", e);
                    }
                }
            }
        }
    }
}
