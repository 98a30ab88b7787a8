//! Shared bookkeeping for batch job runs.

use std::fmt;

use tokio::time::Instant;

/// Outcome counts for one job run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Customers the run picked up.
    pub processed: u64,
    /// Customers whose state the run changed.
    pub changed: u64,
    /// Customers with nothing to do.
    pub skipped: u64,
    /// Customers whose processing failed; retried on the next run.
    pub failed: u64,
    /// Qualifying miles removed by expire entries.
    pub expired_miles: f64,
    /// The run stopped at its deadline with work left.
    pub timed_out: bool,
}

impl BatchReport {
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} changed={} skipped={} failed={} expired_miles={}",
            self.processed, self.changed, self.skipped, self.failed, self.expired_miles
        )?;
        if self.timed_out {
            f.write_str(" (timed out)")?;
        }
        Ok(())
    }
}

pub(crate) fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}
