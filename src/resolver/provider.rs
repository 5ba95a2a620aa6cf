//! Address providers
//!
//! Each provider variant knows how to build its lookup URL and how to read
//! its own "not found" signal:
//! - ViaCEP answers `200 {"erro": true}` for unknown codes
//! - OpenCEP answers `404` for unknown codes
//!
//! A single call here is one HTTP attempt; retries live in the resolver.

use crate::config::{ProviderConfig, ProviderKind};
use crate::resolver::Address;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Answer of a provider that responded definitively
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderLookup {
    Found(Address),
    NotFound,
}

/// Errors a provider lookup can end with
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("server error (HTTP {0})")]
    Server(u16),

    #[error("client error (HTTP {0})")]
    Client(u16),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("throttled after {attempts} attempts")]
    Throttled { attempts: u32 },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl ProviderError {
    /// Returns true if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::Network(_) | Self::Server(_)
        )
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Throttled { .. })
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Where a provider lives and how long one request may take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub timeout: Duration,
}

/// The closed set of supported providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressProvider {
    ViaCep(ProviderEndpoint),
    OpenCep(ProviderEndpoint),
}

/// ViaCEP body: the address itself, or `{"erro": true}` (some deployments
/// send the flag as the string `"true"`)
#[derive(Debug, Deserialize)]
struct ViaCepBody {
    #[serde(default)]
    erro: Option<serde_json::Value>,
    #[serde(flatten)]
    address: Address,
}

impl ViaCepBody {
    fn is_not_found(&self) -> bool {
        match &self.erro {
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

impl AddressProvider {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let endpoint = ProviderEndpoint {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        };
        match config.kind {
            ProviderKind::Viacep => Self::ViaCep(endpoint),
            ProviderKind::Opencep => Self::OpenCep(endpoint),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ViaCep(_) => "viacep",
            Self::OpenCep(_) => "opencep",
        }
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        match self {
            Self::ViaCep(endpoint) | Self::OpenCep(endpoint) => endpoint,
        }
    }

    /// Lookup URL for a normalized postal code
    pub fn url_for(&self, postal_code: &str) -> String {
        match self {
            Self::ViaCep(endpoint) => format!("{}/{}/json/", endpoint.base_url, postal_code),
            Self::OpenCep(endpoint) => format!("{}/{}.json", endpoint.base_url, postal_code),
        }
    }

    /// Performs one lookup attempt
    ///
    /// # Arguments
    ///
    /// * `client` - The shared HTTP client
    /// * `postal_code` - Normalized 8-digit code
    ///
    /// # Returns
    ///
    /// * `Ok(ProviderLookup)` - The provider answered definitively
    /// * `Err(ProviderError)` - Transport fault or unexpected status
    pub async fn get_address(
        &self,
        client: &Client,
        postal_code: &str,
    ) -> Result<ProviderLookup, ProviderError> {
        let response = client
            .get(self.url_for(postal_code))
            .timeout(self.endpoint().timeout)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if status == StatusCode::NOT_FOUND && matches!(self, Self::OpenCep(_)) {
            return Ok(ProviderLookup::NotFound);
        }
        if status.is_server_error() {
            return Err(ProviderError::Server(status.as_u16()));
        }
        if !status.is_success() {
            return Err(ProviderError::Client(status.as_u16()));
        }

        match self {
            Self::ViaCep(_) => {
                let body: ViaCepBody = response.json().await.map_err(ProviderError::from_reqwest)?;
                if body.is_not_found() {
                    Ok(ProviderLookup::NotFound)
                } else {
                    Ok(ProviderLookup::Found(body.address.cleaned()))
                }
            }
            Self::OpenCep(_) => {
                let address: Address =
                    response.json().await.map_err(ProviderError::from_reqwest)?;
                Ok(ProviderLookup::Found(address.cleaned()))
            }
        }
    }
}
