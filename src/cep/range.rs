use crate::cep::normalize::{format_cep, parse_cep};
use crate::cep::{RangeError, RangeResult};

/// Maximum allowed distance between the first and last CEP of a range
pub const MAX_RANGE_SPAN: u32 = 10_000;

/// A validated, inclusive range of postal codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CepRange {
    start: u32,
    end: u32,
}

impl CepRange {
    /// Parses and validates a range from its two bounds
    ///
    /// # Errors
    ///
    /// * `RangeError::InvalidFormat` - a bound is not an 8-digit code
    /// * `RangeError::StartAfterEnd` - `start > end`
    /// * `RangeError::TooWide` - `end - start > MAX_RANGE_SPAN`
    ///
    /// # Examples
    ///
    /// ```
    /// use cep_crawler::cep::CepRange;
    ///
    /// let range = CepRange::parse("01000000", "01000002").unwrap();
    /// assert_eq!(range.total_units(), 3);
    /// ```
    pub fn parse(start: &str, end: &str) -> RangeResult<Self> {
        let start_value = parse_cep(start)?;
        let end_value = parse_cep(end)?;

        if start_value > end_value {
            return Err(RangeError::StartAfterEnd {
                start: format_cep(start_value),
                end: format_cep(end_value),
            });
        }

        let span = end_value - start_value;
        if span > MAX_RANGE_SPAN {
            return Err(RangeError::TooWide {
                span,
                max: MAX_RANGE_SPAN,
            });
        }

        Ok(Self {
            start: start_value,
            end: end_value,
        })
    }

    /// First code of the range, zero-padded
    pub fn start(&self) -> String {
        format_cep(self.start)
    }

    /// Last code of the range, zero-padded
    pub fn end(&self) -> String {
        format_cep(self.end)
    }

    /// Number of postal codes in the range
    pub fn total_units(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Returns true if the normalized code falls inside the range
    pub fn contains(&self, cep: &str) -> bool {
        parse_cep(cep)
            .map(|value| value >= self.start && value <= self.end)
            .unwrap_or(false)
    }

    /// Iterates every code of the range in ascending order
    pub fn iter(&self) -> impl Iterator<Item = String> {
        (self.start..=self.end).map(format_cep)
    }

    /// Collects every code of the range
    pub fn expand(&self) -> Vec<String> {
        self.iter().collect()
    }
}
