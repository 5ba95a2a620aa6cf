//! Configuration module for the CEP crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use cep_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("cep-crawler.toml")).unwrap();
//! println!("Worker concurrency: {}", config.worker.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DatabaseConfig, ProviderConfig, ProviderKind, QueueConfig, RecoveryConfig, Role,
    RuntimeConfig, UserAgentConfig, WorkerConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
