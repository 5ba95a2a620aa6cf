use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the CEP crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(rename = "provider")]
    pub providers: Vec<ProviderConfig>,
}

/// Which components a process runs
///
/// Selected once at startup and injected into component construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Serves crawl requests only
    Api,
    /// Drains the work queue only
    Worker,
    /// Both of the above
    #[default]
    Both,
}

impl Role {
    pub fn runs_worker(&self) -> bool {
        matches!(self, Self::Worker | Self::Both)
    }

    pub fn runs_api(&self) -> bool {
        matches!(self, Self::Api | Self::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Worker => "worker",
            Self::Both => "both",
        }
    }
}

/// Process role configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub role: Role,
}

/// Crawl store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database holding crawls, results and the cache
    #[serde(default = "default_database_path")]
    pub path: String,

    /// How long a connection waits on a lock held by another process (milliseconds)
    #[serde(rename = "busy-timeout-ms", default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Work queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Path to the SQLite database backing the queue
    #[serde(rename = "database-path", default = "default_queue_path")]
    pub database_path: String,

    /// Queue name
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// How long a received message stays invisible before redelivery (seconds)
    #[serde(
        rename = "visibility-timeout-secs",
        default = "default_visibility_timeout_secs"
    )]
    pub visibility_timeout_secs: u64,

    /// Maximum messages pulled per receive
    #[serde(rename = "receive-batch-size", default = "default_receive_batch_size")]
    pub receive_batch_size: usize,

    /// Long-poll duration for a receive (seconds)
    #[serde(rename = "wait-seconds", default = "default_wait_seconds")]
    pub wait_seconds: u64,

    /// Interval between polls while long-polling (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: default_queue_path(),
            name: default_queue_name(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            receive_batch_size: default_receive_batch_size(),
            wait_seconds: default_wait_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Worker loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Items resolved concurrently within a sub-batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause after every sub-batch (milliseconds)
    #[serde(rename = "rate-limit-ms", default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Additional pause after a sub-batch hit upstream throttling (milliseconds)
    #[serde(rename = "throttle-backoff-ms", default = "default_throttle_backoff_ms")]
    pub throttle_backoff_ms: u64,

    /// Base delay of the polling-loop backoff (milliseconds)
    #[serde(rename = "base-backoff-ms", default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Cap of the polling-loop backoff (milliseconds)
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Interval between worker registry heartbeats (seconds)
    #[serde(
        rename = "heartbeat-interval-secs",
        default = "default_heartbeat_interval_secs"
    )]
    pub heartbeat_interval_secs: u64,
}

impl WorkerConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn throttle_backoff(&self) -> Duration {
        Duration::from_millis(self.throttle_backoff_ms)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_limit_ms: default_rate_limit_ms(),
            throttle_backoff_ms: default_throttle_backoff_ms(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

/// Recovery sweeper configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    /// Minimum time between two recovery passes over the same crawl (minutes)
    #[serde(rename = "cooldown-minutes", default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,

    /// Interval between periodic sweeps (seconds)
    #[serde(rename = "interval-secs", default = "default_recovery_interval_secs")]
    pub interval_secs: u64,
}

impl RecoveryConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes * 60)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: default_cooldown_minutes(),
            interval_secs: default_recovery_interval_secs(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Supported address providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Viacep,
    Opencep,
}

/// One entry of the provider chain, in priority order
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Base URL of the provider API
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts per lookup, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential retry delay (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Consecutive faults before the provider's circuit opens
    #[serde(rename = "failure-threshold", default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an open circuit skips the provider (seconds)
    #[serde(rename = "open-cooldown-secs", default = "default_open_cooldown_secs")]
    pub open_cooldown_secs: u64,
}

impl ProviderConfig {
    /// Builds a provider entry with default retry and circuit settings
    pub fn new(kind: ProviderKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            timeout_ms: default_provider_timeout_ms(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            failure_threshold: default_failure_threshold(),
            open_cooldown_secs: default_open_cooldown_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_database_path() -> String {
    "./cep-crawler.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_queue_path() -> String {
    "./cep-queue.db".to_string()
}

fn default_queue_name() -> String {
    "cep-crawl".to_string()
}

fn default_visibility_timeout_secs() -> u64 {
    60
}

fn default_receive_batch_size() -> usize {
    10
}

fn default_wait_seconds() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_concurrency() -> usize {
    3
}

fn default_rate_limit_ms() -> u64 {
    1_000
}

fn default_throttle_backoff_ms() -> u64 {
    10_000
}

fn default_base_backoff_ms() -> u64 {
    5_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_heartbeat_interval_secs() -> u64 {
    15
}

fn default_cooldown_minutes() -> u64 {
    10
}

fn default_recovery_interval_secs() -> u64 {
    300
}

fn default_provider_timeout_ms() -> u64 {
    4_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_cooldown_secs() -> u64 {
    30
}
