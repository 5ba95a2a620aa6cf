use crate::config::Role;
use crate::storage::{now_timestamp, SharedStorage, Storage, WorkerRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A process counts as active if seen within this many seconds
pub const ACTIVE_WINDOW_SECS: i64 = 60;

/// Registry rows older than this are removed on each heartbeat
pub const PRUNE_AFTER_SECS: i64 = 300;

/// Oldest `last_seen` that still counts as active at `now`
pub fn active_since(now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::seconds(ACTIVE_WINDOW_SECS)
}

/// Host name from the environment, or "unknown"
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Periodic registration of this process in the worker registry
pub struct Heartbeat {
    storage: SharedStorage,
    id: String,
    hostname: String,
    role: Role,
    config_hash: String,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(storage: SharedStorage, role: Role, config_hash: String, interval: Duration) -> Self {
        Self {
            storage,
            id: uuid::Uuid::new_v4().to_string(),
            hostname: hostname(),
            role,
            config_hash,
            interval,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Records one heartbeat and prunes stale registry rows
    pub fn beat(&self) -> Result<()> {
        let record = WorkerRecord {
            id: self.id.clone(),
            hostname: self.hostname.clone(),
            role: self.role.as_str().to_string(),
            config_hash: self.config_hash.clone(),
            last_seen: now_timestamp(),
        };
        let cutoff = Utc::now() - chrono::Duration::seconds(PRUNE_AFTER_SECS);

        let pruned = self.storage.with(|s| {
            s.upsert_worker(&record)?;
            s.prune_workers(cutoff)
        })?;
        if pruned > 0 {
            tracing::debug!("Pruned {} stale worker registrations", pruned);
        }
        Ok(())
    }

    /// Beats every interval until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.beat() {
                        tracing::warn!("Heartbeat failed: {}", e);
                    }
                }
            }
        }
    }
}
