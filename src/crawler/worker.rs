//! Crawl worker loop
//!
//! Drains the work queue: each received batch is split into sub-batches of
//! `concurrency` items, resolved concurrently within a sub-batch, with a
//! rate-limit pause between sub-batches. A message is only acknowledged once
//! its result (and the counter update that goes with it) is committed; any
//! other failure leaves it for redelivery.

use crate::cep::CepRange;
use crate::config::{Config, WorkerConfig};
use crate::queue::{QueueAdapter, QueueMessage, WorkItem};
use crate::resolver::AddressResolver;
use crate::state::CrawlStatus;
use crate::storage::{CachedAddress, NewCrawlResult, SharedStorage, Storage, NOT_FOUND_MESSAGE};
use crate::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What happened to a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A new result was recorded and the message acknowledged
    Recorded,
    /// The unit already had a result; the message was acknowledged
    Duplicate,
    /// The message can never succeed and was moved aside
    DeadLettered,
    /// Upstream rate limiting; left for redelivery
    Throttled,
    /// Any other failure; left for redelivery
    Retry,
}

/// Tally of one processed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub recorded: usize,
    pub duplicates: usize,
    pub dead_lettered: usize,
    pub throttled: usize,
    pub retried: usize,
}

impl BatchReport {
    fn add(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Recorded => self.recorded += 1,
            ItemOutcome::Duplicate => self.duplicates += 1,
            ItemOutcome::DeadLettered => self.dead_lettered += 1,
            ItemOutcome::Throttled => self.throttled += 1,
            ItemOutcome::Retry => self.retried += 1,
        }
    }
}

/// Delay before the next poll after `failures` consecutive queue failures
///
/// `min(base * 2^min(failures, 5), max)`
pub fn polling_backoff(failures: u32, base: Duration, max: Duration) -> Duration {
    base.saturating_mul(1u32 << failures.min(5)).min(max)
}

/// Long-running consumer of the work queue
pub struct CrawlWorker {
    storage: SharedStorage,
    queue: QueueAdapter,
    resolver: Arc<AddressResolver>,
    config: WorkerConfig,
    receive_batch_size: usize,
    idle_pause: Duration,
}

impl CrawlWorker {
    pub fn new(
        storage: SharedStorage,
        queue: QueueAdapter,
        resolver: Arc<AddressResolver>,
        config: &Config,
    ) -> Self {
        Self {
            storage,
            queue,
            resolver,
            config: config.worker.clone(),
            receive_batch_size: config.queue.receive_batch_size,
            idle_pause: config.queue.poll_interval(),
        }
    }

    /// Polls and processes batches until `cancel` fires
    ///
    /// Queue failures back off exponentially; the backoff resets after the
    /// next successful receive. A batch already being processed drains before
    /// the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            concurrency = self.config.concurrency,
            "Worker loop started"
        );
        let mut failures = 0u32;

        while !cancel.is_cancelled() {
            match self.queue.receive_batch(self.receive_batch_size, &cancel).await {
                Ok(messages) => {
                    failures = 0;
                    if messages.is_empty() {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.idle_pause) => {}
                        }
                        continue;
                    }
                    let report = self.process_batch(messages, &cancel).await;
                    debug!(
                        received = report.received,
                        recorded = report.recorded,
                        duplicates = report.duplicates,
                        dead_lettered = report.dead_lettered,
                        throttled = report.throttled,
                        retried = report.retried,
                        "Batch processed"
                    );
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = polling_backoff(
                        failures,
                        self.config.base_backoff(),
                        self.config.max_backoff(),
                    );
                    warn!(error = %e, ?delay, "Queue receive failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("Worker loop stopped");
    }

    /// Processes a received batch in sub-batches of `concurrency` items
    ///
    /// Cancellation is observed between sub-batches; messages not reached
    /// become visible again after their visibility timeout.
    pub async fn process_batch(
        &self,
        messages: Vec<QueueMessage>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let mut report = BatchReport {
            received: messages.len(),
            ..BatchReport::default()
        };

        for chunk in messages.chunks(self.config.concurrency.max(1)) {
            let outcomes = join_all(chunk.iter().map(|m| self.process_message(m))).await;

            let throttled = outcomes.contains(&ItemOutcome::Throttled);
            for outcome in outcomes {
                report.add(outcome);
            }

            let mut pause = self.config.rate_limit();
            if throttled {
                pause += self.config.throttle_backoff();
                warn!(?pause, "Providers are throttling, slowing down");
            }
            if cancel.is_cancelled() {
                break;
            }
            if !pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        report
    }

    /// Processes one message; failures are isolated to the message
    pub async fn process_message(&self, message: &QueueMessage) -> ItemOutcome {
        match self.try_process(message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    receipt = %message.receipt_handle,
                    error = %e,
                    "Failed to process work item, leaving it for redelivery"
                );
                ItemOutcome::Retry
            }
        }
    }

    async fn try_process(&self, message: &QueueMessage) -> Result<ItemOutcome> {
        let item = match WorkItem::decode(&message.body) {
            Ok(item) => item,
            Err(e) => {
                error!(body = %message.body, error = %e, "Malformed work item");
                return self.dead_letter(message, &format!("malformed work item: {}", e));
            }
        };
        let crawl_id = item.crawl_id.as_str();
        let postal_code = item.postal_code.as_str();

        let crawl = match self.storage.with(|s| s.get_crawl(crawl_id))? {
            Some(crawl) => crawl,
            None => {
                error!(crawl_id, postal_code, "Work item for unknown crawl");
                return self.dead_letter(message, &format!("unknown crawl {}", crawl_id));
            }
        };
        if !CepRange::parse(&crawl.range_start, &crawl.range_end)?.contains(postal_code) {
            error!(crawl_id, postal_code, "Work item outside the crawl range");
            return self.dead_letter(message, "postal code outside crawl range");
        }

        if self.storage.with(|s| s.has_result(crawl_id, postal_code))? {
            debug!(crawl_id, postal_code, "Unit already processed, acknowledging");
            self.acknowledge(message)?;
            return Ok(ItemOutcome::Duplicate);
        }

        let result = match self.storage.with(|s| s.get_cached(postal_code))? {
            Some(entry) => {
                debug!(crawl_id, postal_code, found = entry.found, "Cache hit");
                NewCrawlResult::from_cache(&entry)
            }
            None => {
                let resolution = match self.resolver.resolve(postal_code).await {
                    Ok(resolution) => resolution,
                    Err(e) if e.is_throttled() => {
                        warn!(crawl_id, postal_code, "Lookup throttled, leaving for redelivery");
                        return Ok(ItemOutcome::Throttled);
                    }
                    Err(e) => {
                        warn!(crawl_id, postal_code, error = %e, "Lookup failed, leaving for redelivery");
                        return Ok(ItemOutcome::Retry);
                    }
                };

                let entry = CachedAddress::from_resolution(postal_code, &resolution);
                self.storage.with(|s| s.upsert_cached(&entry))?;
                NewCrawlResult::from_resolution(postal_code, &resolution, NOT_FOUND_MESSAGE)
            }
        };

        let outcome = self
            .storage
            .with(|s| s.record_results(crawl_id, std::slice::from_ref(&result)))?;
        self.acknowledge(message)?;

        if outcome.inserted == 0 {
            return Ok(ItemOutcome::Duplicate);
        }
        if outcome.crawl.status == CrawlStatus::Finished
            && outcome.crawl.processed_units == outcome.crawl.total_units
        {
            info!(
                crawl_id,
                success = outcome.crawl.success_units,
                failed = outcome.crawl.failed_units,
                "Crawl finished"
            );
        }

        Ok(ItemOutcome::Recorded)
    }

    fn acknowledge(&self, message: &QueueMessage) -> Result<()> {
        if !self.queue.acknowledge(&message.receipt_handle)? {
            // Visibility expired and someone else holds the message now
            debug!(receipt = %message.receipt_handle, "Receipt handle was stale");
        }
        Ok(())
    }

    fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<ItemOutcome> {
        self.queue.dead_letter(&message.receipt_handle, reason)?;
        Ok(ItemOutcome::DeadLettered)
    }
}
