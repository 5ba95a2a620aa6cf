use serde::Serialize;
use std::fmt;

/// Outcome of a single unit of a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// The address was resolved
    Success,

    /// The code does not exist (or could not be resolved definitively)
    Error,
}

impl ResultStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(Self::Success),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_db_string() {
        for status in [ResultStatus::Success, ResultStatus::Error] {
            assert_eq!(
                ResultStatus::from_db_string(status.to_db_string()),
                Some(status)
            );
        }
        assert_eq!(ResultStatus::from_db_string("success"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ResultStatus::Error), "ERROR");
    }
}
