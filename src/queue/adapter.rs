use crate::config::QueueConfig;
use crate::queue::{
    QueueDepth, QueueError, QueueMessage, QueueResult, SqliteQueue, WorkItem, WorkQueue,
    MAX_SEND_BATCH,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Async front of the work queue shared by every component
///
/// Transport calls are short and synchronous; the lock is released before
/// any await.
#[derive(Clone)]
pub struct QueueAdapter {
    transport: Arc<Mutex<Box<dyn WorkQueue + Send>>>,
    visibility: Duration,
    wait: Duration,
    poll_interval: Duration,
}

impl QueueAdapter {
    /// Wraps a transport, creating the queue if needed
    pub fn new(transport: Box<dyn WorkQueue + Send>, config: &QueueConfig) -> QueueResult<Self> {
        let adapter = Self {
            transport: Arc::new(Mutex::new(transport)),
            visibility: config.visibility_timeout(),
            wait: config.wait(),
            poll_interval: config.poll_interval(),
        };
        adapter.with(|queue| queue.ensure_queue())?;
        Ok(adapter)
    }

    /// Opens the SQLite queue described by the configuration
    pub fn open(config: &QueueConfig, busy_timeout: Duration) -> QueueResult<Self> {
        let queue = SqliteQueue::open(Path::new(&config.database_path), &config.name, busy_timeout)?;
        Self::new(Box::new(queue), config)
    }

    fn with<T, F>(&self, f: F) -> QueueResult<T>
    where
        F: FnOnce(&mut (dyn WorkQueue + Send)) -> QueueResult<T>,
    {
        let mut guard = self.transport.lock().map_err(|_| QueueError::LockPoisoned)?;
        f(guard.as_mut())
    }

    /// Sends work items in batches of `MAX_SEND_BATCH`
    ///
    /// Stops at the first failed batch; earlier batches stay sent.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of items sent
    /// * `Err(QueueError)` - A batch could not be sent
    pub fn enqueue_batch(&self, items: &[WorkItem]) -> QueueResult<usize> {
        let bodies = items
            .iter()
            .map(WorkItem::encode)
            .collect::<Result<Vec<_>, _>>()?;

        for chunk in bodies.chunks(MAX_SEND_BATCH) {
            self.with(|queue| queue.send_batch(chunk))?;
        }

        debug!(count = items.len(), "Enqueued work items");
        Ok(items.len())
    }

    /// Long-polls for up to `max` messages
    ///
    /// Returns as soon as messages are available, when the configured wait
    /// elapses, or when `cancel` fires.
    pub async fn receive_batch(
        &self,
        max: usize,
        cancel: &CancellationToken,
    ) -> QueueResult<Vec<QueueMessage>> {
        let deadline = Instant::now() + self.wait;

        loop {
            let messages = self.with(|queue| queue.receive(max, self.visibility))?;
            if !messages.is_empty() {
                return Ok(messages);
            }

            let now = Instant::now();
            if now >= deadline || cancel.is_cancelled() {
                return Ok(Vec::new());
            }

            let nap = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(Vec::new()),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    /// Deletes a message after its work has been persisted
    pub fn acknowledge(&self, receipt_handle: &str) -> QueueResult<bool> {
        self.with(|queue| queue.delete(receipt_handle))
    }

    pub fn dead_letter(&self, receipt_handle: &str, reason: &str) -> QueueResult<bool> {
        self.with(|queue| queue.dead_letter(receipt_handle, reason))
    }

    pub fn depth(&self) -> QueueResult<QueueDepth> {
        self.with(|queue| queue.depth())
    }
}
