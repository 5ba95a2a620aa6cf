use crate::cep::{normalize_cep, RangeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Instruction to resolve one postal code for one crawl
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(alias = "crawlId")]
    pub crawl_id: String,

    #[serde(alias = "cep")]
    pub postal_code: String,
}

/// Reasons a message body is not a usable work item
#[derive(Debug, Error)]
pub enum WorkItemError {
    #[error("undecodable body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty crawl id")]
    MissingCrawlId,

    #[error("bad postal code: {0}")]
    PostalCode(#[from] RangeError),
}

impl WorkItem {
    pub fn new(crawl_id: impl Into<String>, postal_code: impl Into<String>) -> Self {
        Self {
            crawl_id: crawl_id.into(),
            postal_code: postal_code.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a message body, accepting the legacy camelCase keys
    pub fn decode(body: &str) -> Result<Self, WorkItemError> {
        let item: WorkItem = serde_json::from_str(body)?;

        let crawl_id = item.crawl_id.trim();
        if crawl_id.is_empty() {
            return Err(WorkItemError::MissingCrawlId);
        }

        Ok(Self {
            crawl_id: crawl_id.to_string(),
            postal_code: normalize_cep(&item.postal_code)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let item = WorkItem::new("c1", "01001000");
        assert_eq!(
            item.encode().unwrap(),
            r#"{"crawl_id":"c1","postal_code":"01001000"}"#
        );
    }

    #[test]
    fn test_decode_legacy_keys() {
        let item = WorkItem::decode(r#"{"crawlId": "c1", "cep": "01001-000"}"#).unwrap();
        assert_eq!(item, WorkItem::new("c1", "01001000"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            WorkItem::decode("not json"),
            Err(WorkItemError::Json(_))
        ));
        assert!(matches!(
            WorkItem::decode(r#"{"crawl_id": "c1"}"#),
            Err(WorkItemError::Json(_))
        ));
        assert!(matches!(
            WorkItem::decode(r#"{"crawl_id": " ", "postal_code": "01001000"}"#),
            Err(WorkItemError::MissingCrawlId)
        ));
        assert!(matches!(
            WorkItem::decode(r#"{"crawl_id": "c1", "postal_code": "0100"}"#),
            Err(WorkItemError::PostalCode(_))
        ));
    }
}
