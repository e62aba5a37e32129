//! Runtime configuration for the in-process services.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the coordinator and document services.
///
/// Defaults are production-sane; everything can be overridden via
/// environment variables (`LEDGERKIT_*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Currency assigned to documents created without one.
    pub default_currency: String,
    /// Upper bound on waiting for a ledger key lock before surfacing a
    /// retryable contention error.
    pub lock_timeout_ms: u64,
    /// How many times retryable errors (contention, sequencing conflicts)
    /// are retried before turning terminal.
    pub retry_budget: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_currency: "TRY".to_string(),
            lock_timeout_ms: 250,
            retry_budget: 3,
        }
    }
}

impl RuntimeConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_currency: std::env::var("LEDGERKIT_DEFAULT_CURRENCY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.default_currency),
            lock_timeout_ms: std::env::var("LEDGERKIT_LOCK_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lock_timeout_ms),
            retry_budget: std::env::var("LEDGERKIT_RETRY_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_budget),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
