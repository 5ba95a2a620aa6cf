//! SQLite-backed work queue
//!
//! Messages live in a table next to their visibility deadline (epoch
//! milliseconds). Receiving a message pushes the deadline out and issues a
//! fresh receipt handle, so only the latest receiver can delete it.

use crate::queue::{QueueDepth, QueueError, QueueMessage, QueueResult, WorkQueue, MAX_SEND_BATCH};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

const QUEUE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS queues (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL REFERENCES queues(name),
    body TEXT NOT NULL,
    receipt_handle TEXT,
    visible_at INTEGER NOT NULL,
    receive_count INTEGER NOT NULL DEFAULT 0,
    sent_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_visible ON messages(queue, visible_at, id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_receipt ON messages(receipt_handle);

CREATE TABLE IF NOT EXISTS dead_letters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    body TEXT NOT NULL,
    reason TEXT NOT NULL,
    receive_count INTEGER NOT NULL,
    dead_at TEXT NOT NULL
);
"#;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Durable queue stored in its own SQLite database
pub struct SqliteQueue {
    conn: Connection,
    name: String,
}

impl SqliteQueue {
    /// Opens (or creates) the queue database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `name` - Queue name inside that database
    /// * `busy_timeout` - How long to wait on locks held by other processes
    pub fn open(path: &Path, name: &str, busy_timeout: Duration) -> QueueResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;

        Ok(Self {
            conn,
            name: name.to_string(),
        })
    }

    /// Creates an in-memory queue (for testing)
    #[cfg(test)]
    pub fn new_in_memory(name: &str) -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;
        Ok(Self {
            conn,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn queue_exists(&self) -> QueueResult<bool> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM queues WHERE name = ?1",
                params![self.name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }
}

impl WorkQueue for SqliteQueue {
    fn ensure_queue(&mut self) -> QueueResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO queues (name, created_at) VALUES (?1, ?2)",
            params![self.name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn send_batch(&mut self, bodies: &[String]) -> QueueResult<()> {
        if bodies.len() > MAX_SEND_BATCH {
            return Err(QueueError::BatchTooLarge {
                size: bodies.len(),
                max: MAX_SEND_BATCH,
            });
        }
        if !self.queue_exists()? {
            return Err(QueueError::UnknownQueue(self.name.clone()));
        }

        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO messages (queue, body, visible_at, sent_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let now = now_millis();
            let sent_at = Utc::now().to_rfc3339();
            for body in bodies {
                insert.execute(params![self.name, body, now, sent_at])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn receive(&mut self, max: usize, visibility: Duration) -> QueueResult<Vec<QueueMessage>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let now = now_millis();
        let hidden_until = now.saturating_add(visibility.as_millis() as i64);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidates: Vec<(i64, String, u32)> = {
            let mut stmt = tx.prepare(
                "SELECT id, body, receive_count FROM messages
                 WHERE queue = ?1 AND visible_at <= ?2
                 ORDER BY id LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![self.name, now, max as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut messages = Vec::with_capacity(candidates.len());
        for (id, body, receive_count) in candidates {
            let receipt_handle = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "UPDATE messages SET receipt_handle = ?1, visible_at = ?2,
                 receive_count = receive_count + 1 WHERE id = ?3",
                params![receipt_handle, hidden_until, id],
            )?;
            messages.push(QueueMessage {
                receipt_handle,
                body,
                receive_count: receive_count + 1,
            });
        }
        tx.commit()?;

        Ok(messages)
    }

    fn delete(&mut self, receipt_handle: &str) -> QueueResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM messages WHERE queue = ?1 AND receipt_handle = ?2",
            params![self.name, receipt_handle],
        )?;
        Ok(deleted == 1)
    }

    fn dead_letter(&mut self, receipt_handle: &str, reason: &str) -> QueueResult<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let moved = tx.execute(
            "INSERT INTO dead_letters (queue, body, reason, receive_count, dead_at)
             SELECT queue, body, ?3, receive_count, ?4 FROM messages
             WHERE queue = ?1 AND receipt_handle = ?2",
            params![self.name, receipt_handle, reason, Utc::now().to_rfc3339()],
        )?;
        if moved == 1 {
            tx.execute(
                "DELETE FROM messages WHERE queue = ?1 AND receipt_handle = ?2",
                params![self.name, receipt_handle],
            )?;
        }
        tx.commit()?;

        Ok(moved == 1)
    }

    fn depth(&self) -> QueueResult<QueueDepth> {
        let now = now_millis();
        let (visible, in_flight): (i64, i64) = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN visible_at <= ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN visible_at > ?2 THEN 1 ELSE 0 END), 0)
             FROM messages WHERE queue = ?1",
            params![self.name, now],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let dead_lettered: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dead_letters WHERE queue = ?1",
            params![self.name],
            |row| row.get(0),
        )?;

        Ok(QueueDepth {
            visible: visible as u64,
            in_flight: in_flight as u64,
            dead_lettered: dead_lettered as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bodies(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn ready_queue() -> SqliteQueue {
        let mut queue = SqliteQueue::new_in_memory("test").unwrap();
        queue.ensure_queue().unwrap();
        queue
    }

    #[test]
    fn test_ensure_queue_is_idempotent() {
        let mut queue = SqliteQueue::new_in_memory("test").unwrap();
        queue.ensure_queue().unwrap();
        queue.ensure_queue().unwrap();
        assert_eq!(queue.name(), "test");
    }

    #[test]
    fn test_send_requires_existing_queue() {
        let mut queue = SqliteQueue::new_in_memory("test").unwrap();
        let result = queue.send_batch(&bodies(&["a"]));
        assert!(matches!(result, Err(QueueError::UnknownQueue(_))));
    }

    #[test]
    fn test_send_batch_limit() {
        let mut queue = ready_queue();
        let too_many: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        assert!(matches!(
            queue.send_batch(&too_many),
            Err(QueueError::BatchTooLarge { size: 11, max: 10 })
        ));
        assert!(queue.send_batch(&too_many[..10]).is_ok());
    }

    #[test]
    fn test_receive_hides_messages() {
        let mut queue = ready_queue();
        queue.send_batch(&bodies(&["a", "b", "c"])).unwrap();

        let first = queue.receive(2, Duration::from_secs(60)).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].body, "a");
        assert_eq!(first[0].receive_count, 1);

        let second = queue.receive(10, Duration::from_secs(60)).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].body, "c");

        assert!(queue.receive(10, Duration::from_secs(60)).unwrap().is_empty());

        let depth = queue.depth().unwrap();
        assert_eq!(depth.visible, 0);
        assert_eq!(depth.in_flight, 3);
    }

    #[test]
    fn test_delete_acknowledges() {
        let mut queue = ready_queue();
        queue.send_batch(&bodies(&["a"])).unwrap();
        let message = queue.receive(1, Duration::from_secs(60)).unwrap().remove(0);

        assert!(queue.delete(&message.receipt_handle).unwrap());
        assert!(!queue.delete(&message.receipt_handle).unwrap());
        assert_eq!(queue.depth().unwrap(), QueueDepth::default());
    }

    #[test]
    fn test_redelivery_after_visibility_timeout() {
        let mut queue = ready_queue();
        queue.send_batch(&bodies(&["a"])).unwrap();

        let first = queue.receive(1, Duration::ZERO).unwrap().remove(0);
        let second = queue.receive(1, Duration::ZERO).unwrap().remove(0);

        assert_eq!(second.body, "a");
        assert_eq!(second.receive_count, 2);
        assert_ne!(first.receipt_handle, second.receipt_handle);

        // The stale handle no longer deletes anything
        assert!(!queue.delete(&first.receipt_handle).unwrap());
        assert!(queue.delete(&second.receipt_handle).unwrap());
    }

    #[test]
    fn test_dead_letter_moves_message() {
        let mut queue = ready_queue();
        queue.send_batch(&bodies(&["garbage"])).unwrap();
        let message = queue.receive(1, Duration::ZERO).unwrap().remove(0);

        assert!(queue.dead_letter(&message.receipt_handle, "undecodable").unwrap());
        assert!(queue.receive(1, Duration::ZERO).unwrap().is_empty());

        let depth = queue.depth().unwrap();
        assert_eq!(depth.visible, 0);
        assert_eq!(depth.dead_lettered, 1);

        assert!(!queue.dead_letter(&message.receipt_handle, "again").unwrap());
    }

    #[test]
    fn test_queues_are_isolated_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let mut first = SqliteQueue::open(&path, "first", Duration::from_secs(1)).unwrap();
        let mut second = SqliteQueue::open(&path, "second", Duration::from_secs(1)).unwrap();
        first.ensure_queue().unwrap();
        second.ensure_queue().unwrap();

        first.send_batch(&bodies(&["a"])).unwrap();
        assert!(second.receive(10, Duration::ZERO).unwrap().is_empty());
        assert_eq!(first.receive(10, Duration::ZERO).unwrap().len(), 1);
    }
}
