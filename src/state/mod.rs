//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlStatus`: lifecycle of a bulk request (pending, running, finished, failed)
//! - `ResultStatus`: outcome of a single postal code within a crawl

mod crawl_status;
mod result_status;

// Re-export main types
pub use crawl_status::CrawlStatus;
pub use result_status::ResultStatus;
