//! Periodic runner for the expiry and recalculation jobs.
//!
//! Each job ticks on its own fixed interval. A run stops picking up customers
//! once its timeout passes; a run that overshoots by more than
//! [`HARD_STOP_GRACE`] is abandoned and reported as timed out. Work already
//! committed stays, and the next run finishes the rest.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError, SchedulerConfig};
use crate::error::Result;
use crate::interfaces::Repository;

use super::batch::BatchReport;
use super::expiry_job::ExpiryJob;
use super::recalculation_job::RecalculationJob;

/// Extra time a run gets past its timeout to finish the customer in hand.
pub const HARD_STOP_GRACE: Duration = Duration::from_secs(30);

/// Drives both batch jobs.
pub struct JobScheduler {
    expiry: ExpiryJob,
    recalculation: RecalculationJob,
    config: SchedulerConfig,
}

impl JobScheduler {
    pub fn new(repository: Arc<dyn Repository>, config: &Config) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            expiry: ExpiryJob::new(repository.clone(), &config.loyalty),
            recalculation: RecalculationJob::new(repository, &config.loyalty)?,
            config: config.scheduler.clone(),
        })
    }

    /// One expiry run for the current month.
    pub async fn run_expiry_once(&self) -> Result<BatchReport> {
        let timeout = self.config.expiry_timeout();
        bounded("expiry", timeout, |deadline| {
            self.expiry.run(Utc::now(), Some(deadline))
        })
        .await
    }

    /// One recalculation run over all customers.
    pub async fn run_recalculation_once(&self) -> Result<BatchReport> {
        let timeout = self.config.recalculation_timeout();
        bounded("recalculation", timeout, |deadline| {
            self.recalculation.run(Utc::now(), Some(deadline))
        })
        .await
    }

    /// Expiry, then recalculation, so tiers see this month's expirations.
    pub async fn run_all_once(&self) -> Result<(BatchReport, BatchReport)> {
        let expiry = self.run_expiry_once().await?;
        let recalculation = self.run_recalculation_once().await?;
        Ok((expiry, recalculation))
    }

    /// Run both jobs on their intervals until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            expiry_interval = ?self.config.expiry_interval(),
            recalculation_interval = ?self.config.recalculation_interval(),
            run_on_start = self.config.run_on_start,
            "Starting job scheduler"
        );

        let mut expiry_ticker = ticker(self.config.expiry_interval(), self.config.run_on_start);
        let mut recalculation_ticker =
            ticker(self.config.recalculation_interval(), self.config.run_on_start);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Job scheduler shutting down");
                    return;
                }
                _ = expiry_ticker.tick() => {
                    if let Err(e) = self.run_expiry_once().await {
                        error!(error = %e, "Expiry run failed");
                    }
                }
                _ = recalculation_ticker.tick() => {
                    if let Err(e) = self.run_recalculation_once().await {
                        error!(error = %e, "Recalculation run failed");
                    }
                }
            }
        }
    }
}

fn ticker(period: Duration, immediate: bool) -> tokio::time::Interval {
    let start = if immediate {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn bounded<F, Fut>(job: &'static str, timeout: Duration, run: F) -> Result<BatchReport>
where
    F: FnOnce(Instant) -> Fut,
    Fut: Future<Output = Result<BatchReport>>,
{
    let deadline = Instant::now() + timeout;
    match tokio::time::timeout(timeout + HARD_STOP_GRACE, run(deadline)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(job, timeout = ?timeout, "Run abandoned past its timeout");
            Ok(BatchReport::timed_out())
        }
    }
}
