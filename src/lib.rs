//! CEP crawler: bulk resolution of Brazilian postal-code ranges
//!
//! This crate expands CEP ranges into units of work, resolves every unit
//! against a local address cache and a chain of external providers, fans the
//! work out through a durable queue to concurrent workers, and tracks the
//! progress of each bulk request until it finishes.

pub mod cep;
pub mod config;
pub mod crawler;
pub mod output;
pub mod queue;
pub mod resolver;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid CEP range: {0}")]
    Validation(#[from] cep::RangeError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Address resolution failed: {0}")]
    Resolve(#[from] resolver::ResolveError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Crawl not found: {0}")]
    CrawlNotFound(String),

    #[error("Crawl {crawl_id} vanished after creation")]
    Integrity { crawl_id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use cep::{normalize_cep, CepRange};
pub use config::{Config, Role};
pub use crawler::{CrawlProjection, CrawlService, CrawlWorker, RecoverySweeper};
pub use state::{CrawlStatus, ResultStatus};
