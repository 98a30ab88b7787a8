//! Ledger posting.
//!
//! Every miles movement goes through here. Storage appends the entry and
//! moves the customer's cached totals in one unit, so no reader sees one
//! without the other.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::domain::{LedgerKind, MilesLedgerEntry, Review};
use crate::error::{MileageError, Result};
use crate::interfaces::{Repository, StorageError};

/// Appends ledger entries together with the owner's total update.
#[derive(Clone)]
pub struct LedgerWriter {
    repository: Arc<dyn Repository>,
}

impl LedgerWriter {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Post a standalone entry (adjustment, correction or expire).
    pub async fn post(&self, entry: &MilesLedgerEntry) -> Result<()> {
        validate(entry)?;
        if entry.kind == LedgerKind::Accrual {
            return Err(MileageError::Validation(
                "accrual entries are posted through request approval".to_string(),
            ));
        }

        self.repository
            .mileage()
            .save_mileage_ledger(entry)
            .await
            .map_err(|e| customer_not_found(e, entry.customer_id))?;

        debug!(
            customer_id = %entry.customer_id,
            kind = %entry.kind,
            qualifying_delta = entry.qualifying_miles_delta,
            bonus_delta = entry.bonus_miles_delta,
            "Posted ledger entry"
        );
        Ok(())
    }

    /// Approve a request and post its accrual entry as one unit.
    ///
    /// Returns `false` when the request already left `in_progress`; nothing
    /// is written in that case.
    pub async fn post_approval(
        &self,
        request_id: Uuid,
        review: &Review,
        entry: &MilesLedgerEntry,
    ) -> Result<bool> {
        validate(entry)?;
        if entry.kind != LedgerKind::Accrual || entry.accrual_request_id != Some(request_id) {
            return Err(MileageError::Validation(format!(
                "approval entry must be an accrual for request {}",
                request_id
            )));
        }

        let applied = self
            .repository
            .mileage()
            .approve_accrual_request(request_id, review, entry)
            .await
            .map_err(|e| customer_not_found(e, entry.customer_id))?;

        if applied {
            debug!(
                request_id = %request_id,
                customer_id = %entry.customer_id,
                qualifying_delta = entry.qualifying_miles_delta,
                bonus_delta = entry.bonus_miles_delta,
                "Posted accrual entry"
            );
        }
        Ok(applied)
    }
}

fn validate(entry: &MilesLedgerEntry) -> Result<()> {
    if !entry.qualifying_miles_delta.is_finite() || !entry.bonus_miles_delta.is_finite() {
        return Err(MileageError::Validation(
            "ledger deltas must be finite".to_string(),
        ));
    }
    Ok(())
}

fn customer_not_found(err: StorageError, customer_id: Uuid) -> MileageError {
    match err {
        StorageError::NotFound(_) => MileageError::CustomerNotFound(customer_id.to_string()),
        other => other.into(),
    }
}
