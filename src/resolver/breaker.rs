//! Per-provider circuit breaker
//!
//! Tracks consecutive faults of one provider. Once `failure_threshold` faults
//! pile up the circuit opens and the provider is skipped until the cooldown
//! has elapsed; the next request after that is a trial, and a success closes
//! the circuit again.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit position as seen by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    /// Cooldown elapsed, one trial request may go through
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerHealth {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_error: Option<String>,
}

/// Circuit breaker guarding a single provider
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    health: Mutex<BreakerHealth>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            health: Mutex::new(BreakerHealth::default()),
        }
    }

    pub fn state(&self) -> CircuitState {
        let health = match self.health.lock() {
            Ok(health) => health,
            Err(poisoned) => poisoned.into_inner(),
        };

        match health.opened_at {
            None => CircuitState::Closed,
            Some(opened) if opened.elapsed() >= self.cooldown => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    /// Returns true unless the circuit is open
    pub fn allows_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Record a definitive answer from the provider
    pub fn record_success(&self) {
        let mut health = match self.health.lock() {
            Ok(health) => health,
            Err(poisoned) => poisoned.into_inner(),
        };
        health.consecutive_failures = 0;
        health.opened_at = None;
        health.last_error = None;
    }

    /// Record a fault; returns true if this fault opened the circuit
    pub fn record_failure(&self, error: impl Into<String>) -> bool {
        let mut health = match self.health.lock() {
            Ok(health) => health,
            Err(poisoned) => poisoned.into_inner(),
        };
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_error = Some(error.into());

        let reached = health.consecutive_failures >= self.failure_threshold;
        // A failed trial restarts the cooldown
        let reopen = reached && health.opened_at.map_or(true, |o| o.elapsed() >= self.cooldown);
        if reopen {
            health.opened_at = Some(Instant::now());
        }
        reopen
    }

    pub fn last_error(&self) -> Option<String> {
        match self.health.lock() {
            Ok(health) => health.last_error.clone(),
            Err(poisoned) => poisoned.into_inner().last_error.clone(),
        }
    }
}
