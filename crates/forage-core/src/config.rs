//! Explicit configuration for the orchestrator and its components.
//!
//! Everything the core needs — credentials, quota overrides, cache TTL,
//! retry policy — arrives through [`OrchestratorConfig`]. The core never
//! reads environment variables or other ambient state itself.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Named secrets available to backends, keyed by credential name
/// (e.g. `ADZUNA_APP_ID`).
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    secrets: HashMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.secrets.get(name).map(String::as_str)
    }

    /// Names from `required` that are not present.
    pub fn missing(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.secrets.contains_key(*name))
            .cloned()
            .collect()
    }
}

/// Retry policy for transient backend failures.
///
/// Delays grow exponentially: `base_delay * 2^(attempt - 1)`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per backend call, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry attempt (2-indexed: the first retry
    /// is attempt 2).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        self.base_delay * 2u32.saturating_pow(exponent)
    }
}

/// Configuration for an [`Orchestrator`](crate::orchestrator::Orchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Where the quota ledger persists usage. `None` keeps it in memory.
    pub ledger_path: Option<PathBuf>,
    /// Response cache time-to-live.
    pub cache_ttl: Duration,
    /// Per-backend monthly limit overrides (backend name → limit).
    pub quota_overrides: HashMap<String, u32>,
    pub credentials: Credentials,
    pub retry: RetryConfig,
    /// Fraction of a metered backend's limit held back from Low-priority
    /// queries, so broad searches cannot drain the last of a strict quota.
    pub reserve_fraction: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ledger_path: None,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            quota_overrides: HashMap::new(),
            credentials: Credentials::new(),
            retry: RetryConfig::default(),
            reserve_fraction: 0.25,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_quota_override(mut self, backend: impl Into<String>, limit: u32) -> Self {
        self.quota_overrides.insert(backend.into(), limit);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
