//! Periodic tier recalculation over every customer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ConfigError, LoyaltyConfig};
use crate::domain::TierChangeReason;
use crate::error::Result;
use crate::interfaces::Repository;

use super::batch::{deadline_passed, BatchReport};
use super::tier_engine::TierEngine;

/// Walks all customers page by page and re-derives their tiers.
#[derive(Clone)]
pub struct RecalculationJob {
    repository: Arc<dyn Repository>,
    engine: TierEngine,
    batch_size: u32,
}

impl RecalculationJob {
    pub fn new(
        repository: Arc<dyn Repository>,
        config: &LoyaltyConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            engine: TierEngine::from_config(repository.clone(), config)?,
            repository,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Recalculate every customer's tier for the window closing at `now`.
    ///
    /// A failure listing a page ends the run with an error; failures for
    /// individual customers are counted and the run continues.
    #[instrument(skip(self, deadline), fields(batch_size = self.batch_size))]
    pub async fn run(&self, now: DateTime<Utc>, deadline: Option<Instant>) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut page = 1u32;

        'pages: loop {
            let (ids, total) = self
                .repository
                .customers()
                .get_all_customer_ids(page, self.batch_size)
                .await?;
            debug!(page, count = ids.len(), total, "Loaded customer page");

            for customer_id in &ids {
                if deadline_passed(deadline) {
                    warn!(processed = report.processed, "Recalculation run reached its deadline");
                    report.timed_out = true;
                    break 'pages;
                }

                report.processed += 1;
                match self
                    .engine
                    .recalculate(*customer_id, now, TierChangeReason::CronRecalc)
                    .await
                {
                    Ok(outcome) if outcome.changed => report.changed += 1,
                    Ok(_) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        error!(customer_id = %customer_id, error = %e, "Failed to recalculate tier");
                    }
                }
            }

            let seen = u64::from(page - 1) * u64::from(self.batch_size) + ids.len() as u64;
            if ids.len() < self.batch_size as usize || seen >= total {
                break;
            }
            page += 1;
        }

        info!(
            processed = report.processed,
            changed = report.changed,
            unchanged = report.skipped,
            failed = report.failed,
            timed_out = report.timed_out,
            "Recalculation run finished"
        );
        Ok(report)
    }
}
