//! Qualifying miles expiry.
//!
//! For a target month, every customer who earned qualifying miles that month
//! gets one expire entry negating the month's net earnings. The entry is keyed
//! on (customer, expired month), so re-runs skip customers already done.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::LoyaltyConfig;
use crate::domain::MilesLedgerEntry;
use crate::error::{MileageError, Result};
use crate::interfaces::{Repository, StorageError};
use crate::utils::month::{format_month, month_of, month_start, sub_months};

use super::batch::{deadline_passed, BatchReport};
use super::ledger_writer::LedgerWriter;

enum CustomerExpiry {
    Expired(f64),
    AlreadyExpired,
    NothingToExpire,
}

/// Posts expire entries for miles that aged out.
#[derive(Clone)]
pub struct ExpiryJob {
    repository: Arc<dyn Repository>,
    ledger: LedgerWriter,
    expiry_period_months: u32,
}

impl ExpiryJob {
    pub fn new(repository: Arc<dyn Repository>, config: &LoyaltyConfig) -> Self {
        Self {
            ledger: LedgerWriter::new(repository.clone()),
            repository,
            expiry_period_months: config.expiry_period_months,
        }
    }

    /// Month whose earnings expire on a run at `now`.
    pub fn target_month(&self, now: DateTime<Utc>) -> NaiveDate {
        sub_months(month_of(now), self.expiry_period_months)
    }

    /// Expire the month that ages out at `now`.
    pub async fn run(&self, now: DateTime<Utc>, deadline: Option<Instant>) -> Result<BatchReport> {
        self.run_for_month(self.target_month(now), month_of(now), deadline)
            .await
    }

    /// Expire `month`, dating the expire entries in `processing_month`.
    #[instrument(skip(self, deadline), fields(month = %format_month(month)))]
    pub async fn run_for_month(
        &self,
        month: NaiveDate,
        processing_month: NaiveDate,
        deadline: Option<Instant>,
    ) -> Result<BatchReport> {
        let month = month_start(month);
        let customers = self
            .repository
            .mileage()
            .get_customers_with_positive_qm_deltas_for_month(month)
            .await?;

        let mut report = BatchReport::default();
        for customer_id in customers {
            if deadline_passed(deadline) {
                warn!(processed = report.processed, "Expiry run reached its deadline");
                report.timed_out = true;
                break;
            }

            report.processed += 1;
            match self.expire_customer(customer_id, month, processing_month).await {
                Ok(CustomerExpiry::Expired(miles)) => {
                    report.changed += 1;
                    report.expired_miles += miles;
                }
                Ok(CustomerExpiry::AlreadyExpired | CustomerExpiry::NothingToExpire) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    error!(customer_id = %customer_id, error = %e, "Failed to expire miles");
                }
            }
        }

        info!(
            processed = report.processed,
            expired = report.changed,
            skipped = report.skipped,
            failed = report.failed,
            expired_miles = report.expired_miles,
            timed_out = report.timed_out,
            "Expiry run finished"
        );
        Ok(report)
    }

    async fn expire_customer(
        &self,
        customer_id: Uuid,
        month: NaiveDate,
        processing_month: NaiveDate,
    ) -> Result<CustomerExpiry> {
        let mileage = self.repository.mileage();
        if mileage.check_expire_record_exists(customer_id, month).await? {
            return Ok(CustomerExpiry::AlreadyExpired);
        }

        let earned = mileage
            .get_total_qm_deltas_for_customer_and_month(customer_id, month)
            .await?;
        if earned <= 0.0 {
            return Ok(CustomerExpiry::NothingToExpire);
        }

        let entry = MilesLedgerEntry::expire(customer_id, month, earned, processing_month);
        match self.ledger.post(&entry).await {
            Ok(()) => Ok(CustomerExpiry::Expired(earned)),
            // A concurrent run got there first.
            Err(MileageError::Storage(StorageError::Conflict(_))) => {
                Ok(CustomerExpiry::AlreadyExpired)
            }
            Err(e) => Err(e),
        }
    }
}
