//! Address resolution against the provider chain
//!
//! This module handles:
//! - The closed set of address providers and their wire formats
//! - Bounded exponential retry per provider
//! - A circuit breaker per provider
//! - Fallback through the providers in priority order

mod address;
mod breaker;
mod client;
mod provider;
mod retry;

pub use address::{Address, Resolution};
pub use breaker::{CircuitBreaker, CircuitState};
pub use client::{build_http_client, user_agent};
pub use provider::{AddressProvider, ProviderEndpoint, ProviderError, ProviderLookup};
pub use retry::RetryPolicy;

use crate::config::{Config, ProviderConfig};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Faults that prevented a definitive resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Upstream rate limiting exhausted the retries and no provider answered
    #[error("providers throttled the lookup of {postal_code}")]
    Throttled { postal_code: String },

    /// Every provider was skipped by an open circuit
    #[error("no address provider available for {postal_code}")]
    Unavailable { postal_code: String },
}

impl ResolveError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

struct ProviderSlot {
    provider: AddressProvider,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

/// Ordered chain of providers sharing one HTTP client
pub struct AddressResolver {
    client: Client,
    slots: Vec<ProviderSlot>,
}

impl AddressResolver {
    /// Builds a resolver over the given providers, in priority order
    pub fn new(client: Client, providers: &[ProviderConfig]) -> Self {
        let slots = providers
            .iter()
            .map(|config| ProviderSlot {
                provider: AddressProvider::from_config(config),
                retry: RetryPolicy::from_config(config),
                breaker: CircuitBreaker::new(
                    config.failure_threshold,
                    Duration::from_secs(config.open_cooldown_secs),
                ),
            })
            .collect();

        Self { client, slots }
    }

    /// Builds the HTTP client and the provider chain from the configuration
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent)?;
        Ok(Self::new(client, &config.providers))
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|slot| slot.provider.name()).collect()
    }

    /// Resolves a normalized postal code
    ///
    /// Providers are tried in order; the first one that finds the address
    /// wins. A provider that faults is logged and skipped. When nobody finds
    /// the code the answer is `NotFound`, unless rate limiting prevented any
    /// definitive answer (`Throttled`) or every circuit is open
    /// (`Unavailable`).
    pub async fn resolve(&self, postal_code: &str) -> Result<Resolution, ResolveError> {
        let mut skipped = 0usize;
        let mut throttled = false;
        let mut definitive = false;

        for slot in &self.slots {
            let name = slot.provider.name();

            if !slot.breaker.allows_request() {
                debug!(provider = name, postal_code, "Circuit open, skipping provider");
                skipped += 1;
                continue;
            }

            match self.lookup_with_retry(slot, postal_code).await {
                Ok(ProviderLookup::Found(address)) => {
                    slot.breaker.record_success();
                    debug!(provider = name, postal_code, "Address resolved");
                    return Ok(Resolution::Found(address));
                }
                Ok(ProviderLookup::NotFound) => {
                    slot.breaker.record_success();
                    definitive = true;
                    debug!(provider = name, postal_code, "Provider reports code absent");
                }
                Err(e) => {
                    throttled |= e.is_throttled();
                    if slot.breaker.record_failure(e.to_string()) {
                        warn!(provider = name, "Circuit opened after repeated faults");
                    }
                    warn!(provider = name, postal_code, error = %e, "Provider failed, falling through");
                }
            }
        }

        if !self.slots.is_empty() && skipped == self.slots.len() {
            return Err(ResolveError::Unavailable {
                postal_code: postal_code.to_string(),
            });
        }
        if throttled && !definitive {
            return Err(ResolveError::Throttled {
                postal_code: postal_code.to_string(),
            });
        }

        Ok(Resolution::NotFound)
    }

    /// Runs one provider with its retry policy
    async fn lookup_with_retry(
        &self,
        slot: &ProviderSlot,
        postal_code: &str,
    ) -> Result<ProviderLookup, ProviderError> {
        let name = slot.provider.name();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match slot.provider.get_address(&self.client, postal_code).await {
                Ok(lookup) => return Ok(lookup),
                Err(ProviderError::Client(status)) => {
                    info!(provider = name, postal_code, status, "Client error, treating as no result");
                    return Ok(ProviderLookup::NotFound);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            match &error {
                ProviderError::RateLimited => {
                    warn!(provider = name, postal_code, attempt, "Rate limited by provider")
                }
                ProviderError::Timeout => {
                    warn!(provider = name, postal_code, attempt, "Provider request timed out")
                }
                other => {
                    debug!(provider = name, postal_code, attempt, error = %other, "Transient provider error")
                }
            }

            if !slot.retry.allows_retry_after(attempt) {
                return Err(match error {
                    ProviderError::RateLimited => ProviderError::Throttled { attempts: attempt },
                    other => ProviderError::Exhausted {
                        attempts: attempt,
                        last: other.to_string(),
                    },
                });
            }

            tokio::time::sleep(slot.retry.delay_for(attempt)).await;
        }
    }
}
