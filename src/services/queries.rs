//! Read-side views over customers, requests, the ledger and tier history.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{AccrualRequest, Customer, MembershipHistory, MilesLedgerEntry};
use crate::error::{MileageError, Result};
use crate::interfaces::{AccrualRequestFilter, CustomerFilter, LedgerFilter, Repository};

/// Paged listings for customers and administrators.
#[derive(Clone)]
pub struct MileageQueries {
    repository: Arc<dyn Repository>,
}

impl MileageQueries {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Matching customers, oldest first, plus the total match count.
    ///
    /// Blank criteria are ignored.
    pub async fn list_customers(&self, filter: &CustomerFilter) -> Result<(Vec<Customer>, u64)> {
        filter.pagination.validate().map_err(MileageError::Validation)?;
        let filter = CustomerFilter {
            name: non_blank(&filter.name),
            email: non_blank(&filter.email),
            phone: non_blank(&filter.phone),
            pagination: filter.pagination,
        };
        Ok(self.repository.customers().list_customers(&filter).await?)
    }

    /// Matching requests, newest first, plus the total match count.
    pub async fn list_accrual_requests(
        &self,
        filter: &AccrualRequestFilter,
    ) -> Result<(Vec<AccrualRequest>, u64)> {
        filter.pagination.validate().map_err(MileageError::Validation)?;
        let mut filter = filter.clone();
        filter.keyword = non_blank(&filter.keyword);
        Ok(self.repository.mileage().list_accrual_requests(&filter).await?)
    }

    /// Matching ledger entries, newest first, plus the total match count.
    pub async fn list_ledger_entries(
        &self,
        filter: &LedgerFilter,
    ) -> Result<(Vec<MilesLedgerEntry>, u64)> {
        filter.pagination.validate().map_err(MileageError::Validation)?;
        Ok(self.repository.mileage().get_mileage_ledgers(filter).await?)
    }

    /// Tier transitions for a customer, oldest first.
    pub async fn membership_history(&self, customer_id: Uuid) -> Result<Vec<MembershipHistory>> {
        if self
            .repository
            .customers()
            .get_customer_by_id(customer_id)
            .await?
            .is_none()
        {
            return Err(MileageError::CustomerNotFound(customer_id.to_string()));
        }
        Ok(self
            .repository
            .membership()
            .get_membership_history(customer_id)
            .await?)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
