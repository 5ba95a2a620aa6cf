use crate::cep::{RangeError, RangeResult};

/// Number of digits in a normalized CEP
pub const CEP_WIDTH: usize = 8;

/// Separators tolerated in user-supplied codes ("01001-000", "01.001-000")
const SEPARATORS: &[char] = &['-', '.', ' '];

/// Normalizes a CEP to its fixed-width 8-digit form
///
/// Separators are stripped; anything else that is not an ASCII digit is
/// rejected, as is any code that does not end up with exactly 8 digits.
///
/// # Examples
///
/// ```
/// use cep_crawler::cep::normalize_cep;
///
/// assert_eq!(normalize_cep("01001-000").unwrap(), "01001000");
/// assert!(normalize_cep("0100100A").is_err());
/// ```
pub fn normalize_cep(raw: &str) -> RangeResult<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| !SEPARATORS.contains(c)).collect();

    if digits.len() != CEP_WIDTH || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(RangeError::InvalidFormat(raw.to_string()));
    }

    Ok(digits)
}

/// Formats a numeric CEP value as a zero-padded 8-digit string
pub fn format_cep(value: u32) -> String {
    format!("{:0width$}", value, width = CEP_WIDTH)
}

/// Parses a normalized CEP into its numeric value
pub(crate) fn parse_cep(raw: &str) -> RangeResult<u32> {
    let normalized = normalize_cep(raw)?;
    normalized
        .parse::<u32>()
        .map_err(|_| RangeError::InvalidFormat(raw.to_string()))
}
