use crate::core::{EventLogError, Result};
use crate::event::validate_key_component;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TABLE_PREFIX: &str = "eventlog";
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Capped exponential backoff for operations the store may only partially
/// apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 25,
            max_backoff_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// `max_attempts` attempts without sleeping in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0, 0)
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based). Doubles each time and saturates at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.initial_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_backoff_ms;
        let max = self.max_backoff_ms.max(base);
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(base.saturating_mul(factor).min(max))
    }
}

/// Client settings (region, endpoint, credentials profile, ...) handed to the
/// client factory untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportConfig(serde_json::Value);

impl TransportConfig {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Event log configuration.
///
/// Only the namespace is required; everything else has a default.
///
/// ```ignore
/// let config = EventLogConfig::new("billing")
///     .table_prefix("prod")
///     .pool_size(8)
///     .write_retry(RetryPolicy::new(10, 50, 2_000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogConfig {
    pub namespace: String,

    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Overrides `{table_prefix}-events`.
    #[serde(default)]
    pub events_table: Option<String>,

    /// Overrides `{events_table}-idx`.
    #[serde(default)]
    pub index_table: Option<String>,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long to wait for a free pooled client; unbounded when absent.
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,

    #[serde(default)]
    pub write_retry: RetryPolicy,

    #[serde(default)]
    pub fetch_retry: RetryPolicy,

    /// Concurrent batch-get workers; defaults to the pool size.
    #[serde(default)]
    pub fetch_workers: Option<usize>,

    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_string()
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

impl EventLogConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            table_prefix: default_table_prefix(),
            events_table: None,
            index_table: None,
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout_ms: None,
            write_retry: RetryPolicy::default(),
            fetch_retry: RetryPolicy::default(),
            fetch_workers: None,
            transport: TransportConfig::default(),
        }
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EventLogError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn events_table_name(mut self, name: impl Into<String>) -> Self {
        self.events_table = Some(name.into());
        self
    }

    pub fn index_table_name(mut self, name: impl Into<String>) -> Self {
        self.index_table = Some(name.into());
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn write_retry(mut self, policy: RetryPolicy) -> Self {
        self.write_retry = policy;
        self
    }

    pub fn fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.fetch_retry = policy;
        self
    }

    pub fn fetch_workers(mut self, workers: usize) -> Self {
        self.fetch_workers = Some(workers);
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn events_table(&self) -> String {
        self.events_table
            .clone()
            .unwrap_or_else(|| format!("{}-events", self.table_prefix))
    }

    pub fn index_table(&self) -> String {
        self.index_table
            .clone()
            .unwrap_or_else(|| format!("{}-idx", self.events_table()))
    }

    pub fn acquire_timeout_duration(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn effective_fetch_workers(&self) -> usize {
        self.fetch_workers.unwrap_or(self.pool_size)
    }

    pub fn validate(&self) -> Result<()> {
        validate_key_component("namespace", &self.namespace)
            .map_err(|e| EventLogError::Config(e.to_string()))?;

        if self.table_prefix.is_empty() && self.events_table.is_none() {
            return Err(EventLogError::Config("table_prefix cannot be empty".into()));
        }
        if self.events_table.as_deref() == Some("") || self.index_table.as_deref() == Some("") {
            return Err(EventLogError::Config("table names cannot be empty".into()));
        }
        if self.events_table() == self.index_table() {
            return Err(EventLogError::Config(
                "events and index tables must be distinct".into(),
            ));
        }
        if self.pool_size == 0 {
            return Err(EventLogError::Config("pool_size must be > 0".into()));
        }
        if self.fetch_workers == Some(0) {
            return Err(EventLogError::Config("fetch_workers must be > 0".into()));
        }
        for (name, policy) in [("write_retry", &self.write_retry), ("fetch_retry", &self.fetch_retry)] {
            if policy.max_attempts == 0 {
                return Err(EventLogError::Config(format!(
                    "{}.max_attempts must be > 0",
                    name
                )));
            }
        }
        Ok(())
    }
}
