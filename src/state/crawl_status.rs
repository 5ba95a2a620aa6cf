/// Crawl status definitions for tracking bulk request progress
use serde::Serialize;
use std::fmt;

/// Lifecycle of a crawl
///
/// `Pending -> Running -> Finished`, with `Failed` reachable only from
/// top-level faults. Unit-level failures never fail the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlStatus {
    /// Created, nothing processed yet
    Pending,

    /// At least one unit processed, more outstanding
    Running,

    /// Every unit of the range has a result
    Finished,

    /// Aborted by a top-level fault
    Failed,
}

impl CrawlStatus {
    /// Returns true if no further progress is expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Derives the status from freshly read counters
    pub fn from_progress(processed_units: u32, total_units: u32) -> Self {
        if processed_units >= total_units {
            Self::Finished
        } else if processed_units == 0 {
            Self::Pending
        } else {
            Self::Running
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all crawl statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![Self::Pending, Self::Running, Self::Finished, Self::Failed]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
