//! Postal-code handling
//!
//! This module provides CEP normalization, range validation and expansion of
//! a range into its individual units of work.

mod normalize;
mod range;

pub use normalize::{format_cep, normalize_cep, CEP_WIDTH};
pub use range::{CepRange, MAX_RANGE_SPAN};

use thiserror::Error;

/// Validation faults raised while parsing postal codes and ranges
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("Invalid CEP format: '{0}' (expected 8 digits)")]
    InvalidFormat(String),

    #[error("cep_start must be <= cep_end ({start} > {end})")]
    StartAfterEnd { start: String, end: String },

    #[error("Range too large (max {max}): {span}")]
    TooWide { span: u32, max: u32 },
}

/// Result type alias for CEP operations
pub type RangeResult<T> = std::result::Result<T, RangeError>;
