//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::cep::CepRange;
use crate::storage::{
    CachedAddress, CrawlRecord, CrawlResultRecord, NewCrawlResult, RecordOutcome, ResultFilter,
    WorkerRecord,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Crawl not found: {0}")]
    CrawlNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all persistence operations needed by the orchestrator,
/// the worker loop and the recovery sweeper. Counter updates are expressed as
/// atomic increments inside the backend, never as read-modify-write by the
/// caller.
pub trait Storage {
    // ===== Crawl Management =====

    /// Creates a crawl at `PENDING` covering the given range
    fn create_crawl(&mut self, range: &CepRange) -> StorageResult<CrawlRecord>;

    /// Gets a crawl by ID
    fn get_crawl(&self, crawl_id: &str) -> StorageResult<Option<CrawlRecord>>;

    /// Lists crawls that are neither finished nor failed, oldest first
    fn list_unfinished_crawls(&self) -> StorageResult<Vec<CrawlRecord>>;

    /// Marks a crawl as failed after a top-level fault
    fn mark_crawl_failed(&mut self, crawl_id: &str) -> StorageResult<()>;

    /// Re-derives the status of a crawl from its current counters
    fn refresh_crawl_status(&mut self, crawl_id: &str) -> StorageResult<CrawlRecord>;

    /// Stamps `last_recovery_at = now` unless a stamp newer than `cooldown` exists
    ///
    /// This is a compare-and-set: it returns `true` only for the caller that
    /// actually wrote the stamp.
    fn try_stamp_recovery(
        &mut self,
        crawl_id: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> StorageResult<bool>;

    // ===== Results =====

    /// Writes results for a crawl and advances its counters and status
    ///
    /// Results whose `(crawl_id, postal_code)` already exists are ignored and
    /// do not move any counter. All rows plus the counter update commit in a
    /// single transaction.
    fn record_results(
        &mut self,
        crawl_id: &str,
        results: &[NewCrawlResult],
    ) -> StorageResult<RecordOutcome>;

    /// Returns true if a result exists for the code within the crawl
    fn has_result(&self, crawl_id: &str, postal_code: &str) -> StorageResult<bool>;

    /// Gets every postal code that already has a result in the crawl
    fn processed_postal_codes(&self, crawl_id: &str) -> StorageResult<HashSet<String>>;

    /// Gets a page of results matching the filter, oldest first
    fn find_results(
        &self,
        crawl_id: &str,
        filter: &ResultFilter,
        offset: u64,
        limit: u64,
    ) -> StorageResult<Vec<CrawlResultRecord>>;

    /// Counts results matching the filter
    fn count_results(&self, crawl_id: &str, filter: &ResultFilter) -> StorageResult<u64>;

    // ===== Address Cache =====

    /// Looks up many postal codes at once; absent codes are simply missing
    fn find_cached(&self, postal_codes: &[String]) -> StorageResult<Vec<CachedAddress>>;

    /// Looks up a single postal code
    fn get_cached(&self, postal_code: &str) -> StorageResult<Option<CachedAddress>>;

    /// Inserts or replaces the cache entry for a postal code
    fn upsert_cached(&mut self, entry: &CachedAddress) -> StorageResult<()>;

    /// Finds postal codes whose cached address matches a free-text term
    fn search_cached(&self, term: &str) -> StorageResult<Vec<String>>;

    // ===== Worker Registry =====

    /// Records a heartbeat for a process
    fn upsert_worker(&mut self, worker: &WorkerRecord) -> StorageResult<()>;

    /// Lists processes seen at or after `since`
    fn list_active_workers(&self, since: DateTime<Utc>) -> StorageResult<Vec<WorkerRecord>>;

    /// Removes processes not seen since `before`, returning how many were removed
    fn prune_workers(&mut self, before: DateTime<Utc>) -> StorageResult<u64>;
}
