//! Periodic job scheduling configuration.

use std::time::Duration;

use serde::Deserialize;

const ONE_DAY_SECS: u64 = 24 * 60 * 60;

/// Intervals and per-run timeouts for the batch jobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between expiry job runs.
    pub expiry_interval_secs: u64,
    /// Seconds an expiry run may take before it stops picking up customers.
    pub expiry_timeout_secs: u64,
    /// Seconds between recalculation job runs.
    pub recalculation_interval_secs: u64,
    /// Seconds a recalculation run may take before it stops picking up customers.
    pub recalculation_timeout_secs: u64,
    /// Run both jobs once at startup instead of waiting a full interval.
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expiry_interval_secs: ONE_DAY_SECS,
            expiry_timeout_secs: 30 * 60,
            recalculation_interval_secs: ONE_DAY_SECS,
            recalculation_timeout_secs: 60 * 60,
            run_on_start: false,
        }
    }
}

impl SchedulerConfig {
    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_secs.max(1))
    }

    pub fn expiry_timeout(&self) -> Duration {
        Duration::from_secs(self.expiry_timeout_secs)
    }

    pub fn recalculation_interval(&self) -> Duration {
        Duration::from_secs(self.recalculation_interval_secs.max(1))
    }

    pub fn recalculation_timeout(&self) -> Duration {
        Duration::from_secs(self.recalculation_timeout_secs)
    }
}
