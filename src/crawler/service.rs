//! Crawl orchestrator
//!
//! Creates crawls, settles every unit already in the address cache in one
//! batched write, and enqueues the rest for the workers. Also serves the
//! read side: crawl projections, filtered result pages and health.

use crate::cep::{normalize_cep, CepRange};
use crate::crawler::heartbeat::active_since;
use crate::crawler::projection::{
    CrawlProjection, HealthReport, ResultItem, ResultQuery, ResultsPage,
};
use crate::queue::{QueueAdapter, WorkItem};
use crate::storage::{
    now_timestamp, NewCrawlResult, ResultFilter, SharedStorage, Storage, WorkerRecord,
};
use crate::{CepError, Result};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Entry point for creating and inspecting crawls
#[derive(Clone)]
pub struct CrawlService {
    storage: SharedStorage,
    queue: QueueAdapter,
}

impl CrawlService {
    pub fn new(storage: SharedStorage, queue: QueueAdapter) -> Self {
        Self { storage, queue }
    }

    /// Creates a crawl over `[range_start, range_end]`
    ///
    /// # Flow
    ///
    /// 1. Validate and normalize the range
    /// 2. Insert the crawl at `PENDING`
    /// 3. Look the whole range up in the address cache at once
    /// 4. Record every hit in a single batch (counters and status included)
    /// 5. Enqueue every miss
    /// 6. Re-read the crawl; a missing crawl is an integrity fault
    ///
    /// If enqueueing fails the crawl is marked `FAILED` and the error is
    /// returned.
    pub fn create_crawl(&self, range_start: &str, range_end: &str) -> Result<CrawlProjection> {
        let range = CepRange::parse(range_start, range_end)?;
        let crawl = self.storage.with(|s| s.create_crawl(&range))?;
        info!(
            crawl_id = %crawl.id,
            "Created crawl {}-{} ({} units)",
            crawl.range_start,
            crawl.range_end,
            crawl.total_units
        );

        let codes = range.expand();
        let cached = self.storage.with(|s| s.find_cached(&codes))?;

        if !cached.is_empty() {
            let results: Vec<NewCrawlResult> = cached.iter().map(NewCrawlResult::from_cache).collect();
            let outcome = self
                .storage
                .with(|s| s.record_results(&crawl.id, &results))?;
            debug!(
                crawl_id = %crawl.id,
                hits = outcome.inserted,
                "Recorded cache hits"
            );
        }

        let hits: HashSet<&str> = cached.iter().map(|c| c.postal_code.as_str()).collect();
        let misses: Vec<WorkItem> = codes
            .iter()
            .filter(|code| !hits.contains(code.as_str()))
            .map(|code| WorkItem::new(crawl.id.clone(), code.clone()))
            .collect();

        if !misses.is_empty() {
            if let Err(e) = self.queue.enqueue_batch(&misses) {
                error!(crawl_id = %crawl.id, error = %e, "Failed to enqueue work items");
                if let Err(mark) = self.storage.with(|s| s.mark_crawl_failed(&crawl.id)) {
                    error!(crawl_id = %crawl.id, error = %mark, "Failed to mark crawl as failed");
                }
                return Err(e.into());
            }
        }

        info!(
            crawl_id = %crawl.id,
            cached = hits.len(),
            enqueued = misses.len(),
            "Crawl dispatched"
        );

        let crawl = self
            .storage
            .with(|s| s.get_crawl(&crawl.id))?
            .ok_or_else(|| CepError::Integrity {
                crawl_id: crawl.id.clone(),
            })?;

        Ok(CrawlProjection::from(&crawl))
    }

    /// Gets the current projection of a crawl
    pub fn get_crawl(&self, crawl_id: &str) -> Result<CrawlProjection> {
        self.storage
            .with(|s| s.get_crawl(crawl_id))?
            .map(|crawl| CrawlProjection::from(&crawl))
            .ok_or_else(|| CepError::CrawlNotFound(crawl_id.to_string()))
    }

    /// Lists one page of a crawl's results, oldest first
    ///
    /// A free-text term matches the postal code itself or any cached address
    /// field of a code inside the crawl's range.
    pub fn list_results(&self, crawl_id: &str, query: &ResultQuery) -> Result<ResultsPage> {
        let crawl = self
            .storage
            .with(|s| s.get_crawl(crawl_id))?
            .ok_or_else(|| CepError::CrawlNotFound(crawl_id.to_string()))?;

        let (page, page_size) = query.clamped();
        let mut filter = ResultFilter {
            postal_start: query.postal_start.as_deref().map(normalize_cep).transpose()?,
            postal_end: query.postal_end.as_deref().map(normalize_cep).transpose()?,
            status: query.status,
            search: None,
            matching_codes: Vec::new(),
        };

        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let range = CepRange::parse(&crawl.range_start, &crawl.range_end)?;
            filter.matching_codes = self
                .storage
                .with(|s| s.search_cached(term))?
                .into_iter()
                .filter(|code| range.contains(code))
                .collect();
            filter.search = Some(term.to_string());
        }

        let offset = u64::from(page - 1) * u64::from(page_size);
        let (records, total) = self.storage.with(|s| {
            let records = s.find_results(crawl_id, &filter, offset, u64::from(page_size))?;
            let total = s.count_results(crawl_id, &filter)?;
            Ok((records, total))
        })?;

        Ok(ResultsPage {
            items: records.into_iter().map(ResultItem::from).collect(),
            total,
            page,
            page_size,
        })
    }

    /// Processes seen within the liveness window
    pub fn active_workers(&self) -> Result<Vec<WorkerRecord>> {
        let since = active_since(Utc::now());
        Ok(self.storage.with(|s| s.list_active_workers(since))?)
    }

    /// Liveness snapshot: queue depth and active workers
    pub fn health(&self) -> Result<HealthReport> {
        let queue = self.queue.depth()?;
        let active_workers = self.active_workers()?.len();

        Ok(HealthReport {
            status: "OK",
            timestamp: now_timestamp(),
            queue,
            active_workers,
        })
    }
}
