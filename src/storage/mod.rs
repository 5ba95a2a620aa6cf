//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Crawl records with atomically maintained progress counters
//! - Per-unit crawl results, unique per crawl and postal code
//! - The address cache (positive and negative entries)
//! - The worker registry used for heartbeats

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{SharedStorage, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use crate::resolver::{Address, Resolution};
use crate::state::{CrawlStatus, ResultStatus};
use chrono::{DateTime, SecondsFormat, Utc};

/// Message recorded for codes confirmed absent by a provider
pub const NOT_FOUND_MESSAGE: &str = "CEP not found";

/// Message recorded for codes confirmed absent by the cache
pub const NOT_FOUND_CACHED_MESSAGE: &str = "CEP not found (cached)";

/// Formats a timestamp the way every table stores it
///
/// The fixed width keeps lexicographic order equal to chronological order,
/// which the recovery cooldown and worker liveness queries rely on.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time as a stored timestamp
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Represents a crawl in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRecord {
    pub id: String,
    pub range_start: String,
    pub range_end: String,
    pub total_units: u32,
    pub processed_units: u32,
    pub success_units: u32,
    pub failed_units: u32,
    pub status: CrawlStatus,
    pub last_recovery_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Represents a stored crawl result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlResultRecord {
    pub id: i64,
    pub crawl_id: String,
    pub postal_code: String,
    pub status: ResultStatus,
    pub payload: Option<Address>,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// A crawl result about to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCrawlResult {
    pub postal_code: String,
    pub status: ResultStatus,
    pub payload: Option<Address>,
    pub error_message: Option<String>,
}

impl NewCrawlResult {
    /// Builds the result for a resolution, using `not_found_message` on absence
    pub fn from_resolution(
        postal_code: impl Into<String>,
        resolution: &Resolution,
        not_found_message: &str,
    ) -> Self {
        match resolution {
            Resolution::Found(address) => Self {
                postal_code: postal_code.into(),
                status: ResultStatus::Success,
                payload: Some(address.clone()),
                error_message: None,
            },
            Resolution::NotFound => Self {
                postal_code: postal_code.into(),
                status: ResultStatus::Error,
                payload: None,
                error_message: Some(not_found_message.to_string()),
            },
        }
    }

    /// Builds the result synthesized from a cache entry
    pub fn from_cache(entry: &CachedAddress) -> Self {
        Self::from_resolution(
            entry.postal_code.clone(),
            &entry.resolution(),
            NOT_FOUND_CACHED_MESSAGE,
        )
    }
}

/// Outcome of writing one or more results for a crawl
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// Rows actually inserted (duplicates excluded)
    pub inserted: u32,
    /// Rows skipped because a result for the code already existed
    pub duplicates: u32,
    /// The crawl as read back after the counter update
    pub crawl: CrawlRecord,
}

/// An address cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAddress {
    pub postal_code: String,
    pub found: bool,
    pub address: Option<Address>,
}

impl CachedAddress {
    /// Builds the write-through entry for a fresh resolution
    pub fn from_resolution(postal_code: impl Into<String>, resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Found(address) => Self {
                postal_code: postal_code.into(),
                found: true,
                address: Some(address.clone()),
            },
            Resolution::NotFound => Self {
                postal_code: postal_code.into(),
                found: false,
                address: None,
            },
        }
    }

    /// The cached answer as a resolution
    pub fn resolution(&self) -> Resolution {
        match (&self.address, self.found) {
            (Some(address), true) => Resolution::Found(address.clone()),
            (None, true) => Resolution::Found(Address::default()),
            (_, false) => Resolution::NotFound,
        }
    }
}

/// Filters for listing the results of a crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultFilter {
    /// Inclusive lower bound on the postal code
    pub postal_start: Option<String>,
    /// Inclusive upper bound on the postal code
    pub postal_end: Option<String>,
    pub status: Option<ResultStatus>,
    /// Free-text term matched against the postal code itself
    pub search: Option<String>,
    /// Codes whose cached address matched the free-text term
    pub matching_codes: Vec<String>,
}

/// Represents a process in the worker registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRecord {
    pub id: String,
    pub hostname: String,
    pub role: String,
    pub config_hash: String,
    pub last_seen: String,
}
