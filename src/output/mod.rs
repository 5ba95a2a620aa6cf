//! Output module for presenting crawl progress on the command line
//!
//! This module handles:
//! - Human-readable reports of crawls, result pages, workers and health
//! - JSON rendering of the same projections for scripting

pub mod stats;

pub use stats::{
    format_address, print_crawl, print_health, print_recovery, print_results, print_workers,
};

use crate::CepError;
use serde::Serialize;

/// Prints any projection as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CepError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
