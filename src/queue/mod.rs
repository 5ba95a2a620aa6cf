//! Durable work queue
//!
//! This module handles:
//! - The work item wire format (`{"crawl_id", "postal_code"}`)
//! - The transport trait and its SQLite implementation, with visibility
//!   timeouts, receipt handles and a dead-letter table
//! - The async adapter used by the orchestrator, the worker loop and the
//!   recovery sweeper (batched enqueue, long-poll receive, acknowledge)

mod adapter;
mod sqlite;
mod work_item;

pub use adapter::QueueAdapter;
pub use sqlite::SqliteQueue;
pub use work_item::{WorkItem, WorkItemError};

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Provider-side limit on messages per send call
pub const MAX_SEND_BATCH: usize = 10;

/// Errors that can occur during queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Queue does not exist: {0}")]
    UnknownQueue(String),

    #[error("Batch of {size} messages exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Failed to encode work item: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue transport failure: {0}")]
    Transport(String),

    #[error("Queue lock poisoned")]
    LockPoisoned,
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// A received message and the handle that acknowledges it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub receipt_handle: String,
    pub body: String,
    /// How many times the message has been handed out, this time included
    pub receive_count: u32,
}

/// Messages waiting in the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    /// Ready to be received
    pub visible: u64,
    /// Received and not yet acknowledged or expired
    pub in_flight: u64,
    pub dead_lettered: u64,
}

/// Transport contract of the work queue
///
/// Delivery is at-least-once: a message that is not deleted within its
/// visibility timeout is handed out again under a fresh receipt handle.
pub trait WorkQueue {
    /// Creates the named queue if it does not exist yet
    fn ensure_queue(&mut self) -> QueueResult<()>;

    /// Sends up to `MAX_SEND_BATCH` message bodies in one call
    fn send_batch(&mut self, bodies: &[String]) -> QueueResult<()>;

    /// Receives up to `max` visible messages, hiding them for `visibility`
    fn receive(&mut self, max: usize, visibility: Duration) -> QueueResult<Vec<QueueMessage>>;

    /// Deletes a message; returns false if the handle is stale or unknown
    fn delete(&mut self, receipt_handle: &str) -> QueueResult<bool>;

    /// Moves a message to the dead-letter table; false if the handle is stale
    fn dead_letter(&mut self, receipt_handle: &str, reason: &str) -> QueueResult<bool>;

    /// Counts messages by delivery state
    fn depth(&self) -> QueueResult<QueueDepth>;
}
