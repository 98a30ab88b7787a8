//! Repository interface.
//!
//! Storage is exposed as one capability set with three named sub-scopes:
//! customers, mileage (requests, routes and the ledger) and membership.
//! A single concrete adapter implements all three.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{
    AccrualRequest, Customer, MembershipHistory, MilesLedgerEntry, RequestStatus, Review,
    TravelDistance,
};
use crate::utils::Pagination;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}

/// Filter for listing accrual requests.
#[derive(Debug, Clone, Default)]
pub struct AccrualRequestFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    /// Exact ticket id or PNR.
    pub keyword: Option<String>,
    /// Calendar day (UTC) the request was submitted.
    pub submitted_on: Option<NaiveDate>,
    pub pagination: Pagination,
}

/// Filter for listing customers.
#[derive(Debug, Clone, Default)]
pub struct CustomerFilter {
    /// Case-insensitive substring of "first last".
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub pagination: Pagination,
}

impl CustomerFilter {
    /// True when `customer` passes every set criterion.
    pub fn matches(&self, customer: &Customer) -> bool {
        let name_ok = self.name.as_deref().map_or(true, |name| {
            customer
                .full_name()
                .to_ascii_lowercase()
                .contains(&name.to_ascii_lowercase())
        });
        let email_ok = self.email.as_deref().map_or(true, |e| customer.email == e);
        let phone_ok = self
            .phone
            .as_deref()
            .map_or(true, |p| customer.phone.as_deref() == Some(p));
        name_ok && email_ok && phone_ok
    }
}

/// Filter for listing ledger entries.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub customer_id: Option<Uuid>,
    pub earning_month: Option<NaiveDate>,
    pub pagination: Pagination,
}

/// Customer profile storage.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn get_customer_by_id(&self, customer_id: Uuid) -> Result<Option<Customer>>;

    async fn get_customer_by_external_id(&self, external_id: &str) -> Result<Option<Customer>>;

    /// Insert a new customer. Fails with `Conflict` when the external id is taken.
    async fn save_customer(&self, customer: &Customer) -> Result<()>;

    /// Matching customers, oldest first, plus the total match count.
    async fn list_customers(&self, filter: &CustomerFilter) -> Result<(Vec<Customer>, u64)>;

    /// One page (1-based) of customer ids in stable order, plus the total count.
    async fn get_all_customer_ids(&self, page: u32, size: u32) -> Result<(Vec<Uuid>, u64)>;
}

/// Accrual requests, travel distances and the miles ledger.
#[async_trait]
pub trait MileageRepository: Send + Sync {
    /// Find a non-rejected request for (customer, ticket, pnr).
    async fn get_accrual_request_by_filter(
        &self,
        customer_id: Uuid,
        ticket_id: &str,
        pnr: &str,
    ) -> Result<Option<AccrualRequest>>;

    /// Insert a new request. Fails with `Conflict` when a non-rejected request
    /// with the same (customer, ticket, pnr) exists.
    async fn save_accrual_request(&self, request: &AccrualRequest) -> Result<()>;

    async fn get_accrual_request(&self, request_id: Uuid) -> Result<Option<AccrualRequest>>;

    async fn list_accrual_requests(
        &self,
        filter: &AccrualRequestFilter,
    ) -> Result<(Vec<AccrualRequest>, u64)>;

    /// Move an in-progress request to approved, append its accrual entry and
    /// add the entry's deltas to the customer's totals, as one atomic unit.
    ///
    /// Returns `false` (and writes nothing) when the request is no longer
    /// in progress.
    async fn approve_accrual_request(
        &self,
        request_id: Uuid,
        review: &Review,
        entry: &MilesLedgerEntry,
    ) -> Result<bool>;

    /// Move an in-progress request to rejected. Returns `false` when the
    /// request is no longer in progress.
    async fn reject_accrual_request(&self, request_id: Uuid, review: &Review) -> Result<bool>;

    /// Route distance in either direction.
    async fn get_travel_distance(&self, from_code: &str, to_code: &str)
        -> Result<Option<TravelDistance>>;

    /// Reference-data load for routes.
    async fn save_travel_distance(&self, distance: &TravelDistance) -> Result<()>;

    /// Append an entry and add its deltas to the owner's totals, atomically.
    ///
    /// Fails with `NotFound` for an unknown customer, and with `Conflict` for a
    /// second expire entry for the same (customer, expired month).
    async fn save_mileage_ledger(&self, entry: &MilesLedgerEntry) -> Result<()>;

    async fn get_mileage_ledgers(&self, filter: &LedgerFilter)
        -> Result<(Vec<MilesLedgerEntry>, u64)>;

    /// Distinct customers with a positive qualifying delta earned in `month`.
    async fn get_customers_with_positive_qm_deltas_for_month(
        &self,
        month: NaiveDate,
    ) -> Result<Vec<Uuid>>;

    /// Net qualifying delta earned in `month`, excluding expire entries.
    async fn get_total_qm_deltas_for_customer_and_month(
        &self,
        customer_id: Uuid,
        month: NaiveDate,
    ) -> Result<f64>;

    /// Whether an expire entry for (customer, `month`) was already posted.
    async fn check_expire_record_exists(&self, customer_id: Uuid, month: NaiveDate)
        -> Result<bool>;
}

/// Tier aggregation and membership history.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Sum of qualifying deltas whose earning month (at 00:00 UTC) falls in
    /// `[start, end)`.
    async fn get_rolling_window_qualifying_miles(
        &self,
        customer_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64>;

    /// Set the customer's tier to `change.new_tier` if it is still
    /// `change.old_tier`, and record `change`, as one atomic unit.
    ///
    /// Returns `false` (and writes nothing) when the stored tier moved.
    async fn update_customer_membership_tier(&self, change: &MembershipHistory) -> Result<bool>;

    /// Tier transitions for a customer, oldest first.
    async fn get_membership_history(&self, customer_id: Uuid) -> Result<Vec<MembershipHistory>>;
}

/// Storage capability set.
pub trait Repository: Send + Sync {
    fn customers(&self) -> &dyn CustomerRepository;

    fn mileage(&self) -> &dyn MileageRepository;

    fn membership(&self) -> &dyn MembershipRepository;
}
