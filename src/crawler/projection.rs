use crate::queue::QueueDepth;
use crate::resolver::Address;
use crate::state::{CrawlStatus, ResultStatus};
use crate::storage::{CrawlRecord, CrawlResultRecord};
use serde::Serialize;

/// Largest page a results listing returns
pub const MAX_PAGE_SIZE: u32 = 100;

/// Public view of a crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlProjection {
    pub id: String,
    pub range_start: String,
    pub range_end: String,
    pub status: CrawlStatus,
    pub total_units: u32,
    pub processed_units: u32,
    pub success_units: u32,
    pub failed_units: u32,
}

impl From<&CrawlRecord> for CrawlProjection {
    fn from(record: &CrawlRecord) -> Self {
        Self {
            id: record.id.clone(),
            range_start: record.range_start.clone(),
            range_end: record.range_end.clone(),
            status: record.status,
            total_units: record.total_units,
            processed_units: record.processed_units,
            success_units: record.success_units,
            failed_units: record.failed_units,
        }
    }
}

impl CrawlProjection {
    /// Share of the range already processed, 0.0 to 100.0
    pub fn percent_complete(&self) -> f64 {
        if self.total_units == 0 {
            return 100.0;
        }
        self.processed_units as f64 / self.total_units as f64 * 100.0
    }
}

/// Paging and filters for listing the results of a crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultQuery {
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    pub postal_start: Option<String>,
    pub postal_end: Option<String>,
    pub status: Option<ResultStatus>,
    /// Matches the postal code or any cached address field
    pub search: Option<String>,
}

impl Default for ResultQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            postal_start: None,
            postal_end: None,
            status: None,
            search: None,
        }
    }
}

impl ResultQuery {
    /// Page number and size brought into range
    pub fn clamped(&self) -> (u32, u32) {
        (self.page.max(1), self.page_size.clamp(1, MAX_PAGE_SIZE))
    }
}

/// One entry of a results listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultItem {
    pub postal_code: String,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: String,
}

impl From<CrawlResultRecord> for ResultItem {
    fn from(record: CrawlResultRecord) -> Self {
        Self {
            postal_code: record.postal_code,
            status: record.status,
            payload: record.payload,
            error_message: record.error_message,
            created_at: record.created_at,
        }
    }
}

/// A page of results plus the total matching the filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultsPage {
    pub items: Vec<ResultItem>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Liveness snapshot of the deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub queue: QueueDepth,
    pub active_workers: usize,
}
