//! In-memory repository.
//!
//! One lock guards all state, so every multi-row operation is atomic the
//! same way a SQL transaction is. Used by tests and local runs. Failure
//! flags let tests exercise the engine's error paths.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    location_code, AccrualRequest, Customer, LedgerKind, MembershipHistory, MilesLedgerEntry,
    RequestStatus, Review, TravelDistance,
};
use crate::interfaces::repository::Result;
use crate::interfaces::{
    AccrualRequestFilter, CustomerFilter, CustomerRepository, LedgerFilter, MembershipRepository,
    MileageRepository, Repository, StorageError,
};
use crate::utils::month::{at_midnight, month_start};
use crate::utils::Pagination;

#[derive(Default)]
struct State {
    customers: HashMap<Uuid, Customer>,
    requests: HashMap<Uuid, AccrualRequest>,
    routes: Vec<TravelDistance>,
    ledger: Vec<MilesLedgerEntry>,
    history: Vec<MembershipHistory>,
}

impl State {
    fn apply_entry(&mut self, entry: &MilesLedgerEntry) -> Result<()> {
        let customer = self
            .customers
            .get_mut(&entry.customer_id)
            .ok_or_else(|| StorageError::NotFound(format!("customer {}", entry.customer_id)))?;
        customer.qualifying_miles_total += entry.qualifying_miles_delta;
        customer.bonus_miles_total += entry.bonus_miles_delta;
        customer.updated_at = Utc::now();
        self.ledger.push(entry.clone());
        Ok(())
    }

    fn expire_exists(&self, customer_id: Uuid, month: NaiveDate) -> bool {
        let month = month_start(month);
        self.ledger.iter().any(|e| {
            e.customer_id == customer_id
                && e.kind == LedgerKind::Expire
                && e.expired_month == Some(month)
        })
    }
}

/// Repository that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
    fail_on_read: RwLock<bool>,
    fail_on_write: RwLock<bool>,
    fail_on_tier_update: RwLock<bool>,
    failing_customers: RwLock<HashSet<Uuid>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn set_fail_on_tier_update(&self, fail: bool) {
        *self.fail_on_tier_update.write().await = fail;
    }

    /// Make every customer-scoped operation for `customer_id` fail.
    pub async fn fail_for_customer(&self, customer_id: Uuid) {
        self.failing_customers.write().await.insert(customer_id);
    }

    pub async fn clear_failures(&self) {
        *self.fail_on_read.write().await = false;
        *self.fail_on_write.write().await = false;
        *self.fail_on_tier_update.write().await = false;
        self.failing_customers.write().await.clear();
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    async fn check_customer(&self, customer_id: Uuid) -> Result<()> {
        if self.failing_customers.read().await.contains(&customer_id) {
            return Err(StorageError::Unavailable(format!(
                "injected failure for customer {}",
                customer_id
            )));
        }
        Ok(())
    }
}

fn page<T>(items: Vec<T>, pagination: &Pagination) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let (offset, limit) = pagination.offset_limit();
    let items = items
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    (items, total)
}

#[async_trait]
impl CustomerRepository for MemoryRepository {
    async fn get_customer_by_id(&self, customer_id: Uuid) -> Result<Option<Customer>> {
        self.check_read().await?;
        self.check_customer(customer_id).await?;
        Ok(self.state.read().await.customers.get(&customer_id).cloned())
    }

    async fn get_customer_by_external_id(&self, external_id: &str) -> Result<Option<Customer>> {
        self.check_read().await?;
        Ok(self
            .state
            .read()
            .await
            .customers
            .values()
            .find(|c| c.external_id == external_id)
            .cloned())
    }

    async fn save_customer(&self, customer: &Customer) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        if state.customers.contains_key(&customer.id)
            || state
                .customers
                .values()
                .any(|c| c.external_id == customer.external_id)
        {
            return Err(StorageError::Conflict(format!(
                "customer {} already exists",
                customer.external_id
            )));
        }
        state.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn list_customers(&self, filter: &CustomerFilter) -> Result<(Vec<Customer>, u64)> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut customers: Vec<Customer> = state
            .customers
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        customers.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(page(customers, &filter.pagination))
    }

    async fn get_all_customer_ids(&self, page: u32, size: u32) -> Result<(Vec<Uuid>, u64)> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut customers: Vec<(DateTime<Utc>, Uuid)> = state
            .customers
            .values()
            .map(|c| (c.created_at, c.id))
            .collect();
        customers.sort();
        let ids = customers.into_iter().map(|(_, id)| id).collect();
        Ok(self::page(ids, &Pagination::new(page, size)))
    }
}

#[async_trait]
impl MileageRepository for MemoryRepository {
    async fn get_accrual_request_by_filter(
        &self,
        customer_id: Uuid,
        ticket_id: &str,
        pnr: &str,
    ) -> Result<Option<AccrualRequest>> {
        self.check_read().await?;
        Ok(self
            .state
            .read()
            .await
            .requests
            .values()
            .find(|r| {
                r.customer_id == customer_id
                    && r.ticket_id == ticket_id
                    && r.pnr == pnr
                    && r.status != RequestStatus::Rejected
            })
            .cloned())
    }

    async fn save_accrual_request(&self, request: &AccrualRequest) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let duplicate = state.requests.values().any(|r| {
            r.customer_id == request.customer_id
                && r.ticket_id == request.ticket_id
                && r.pnr == request.pnr
                && r.status != RequestStatus::Rejected
        });
        if duplicate || state.requests.contains_key(&request.id) {
            return Err(StorageError::Conflict(format!(
                "accrual request for ticket {} / {} already exists",
                request.ticket_id, request.pnr
            )));
        }
        state.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_accrual_request(&self, request_id: Uuid) -> Result<Option<AccrualRequest>> {
        self.check_read().await?;
        Ok(self.state.read().await.requests.get(&request_id).cloned())
    }

    async fn list_accrual_requests(
        &self,
        filter: &AccrualRequestFilter,
    ) -> Result<(Vec<AccrualRequest>, u64)> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut requests: Vec<AccrualRequest> = state
            .requests
            .values()
            .filter(|r| filter.customer_id.map_or(true, |id| r.customer_id == id))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| {
                filter
                    .keyword
                    .as_deref()
                    .map_or(true, |k| r.ticket_id == k || r.pnr == k)
            })
            .filter(|r| {
                filter
                    .submitted_on
                    .map_or(true, |day| r.created_at.date_naive() == day)
            })
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page(requests, &filter.pagination))
    }

    async fn approve_accrual_request(
        &self,
        request_id: Uuid,
        review: &Review,
        entry: &MilesLedgerEntry,
    ) -> Result<bool> {
        self.check_write().await?;
        self.check_customer(entry.customer_id).await?;
        let mut state = self.state.write().await;

        let status = state
            .requests
            .get(&request_id)
            .map(|r| r.status)
            .ok_or_else(|| StorageError::NotFound(format!("accrual request {}", request_id)))?;
        if status != RequestStatus::InProgress {
            return Ok(false);
        }

        state.apply_entry(entry)?;
        if let Some(request) = state.requests.get_mut(&request_id) {
            request.apply_review(RequestStatus::Approved, review);
        }
        Ok(true)
    }

    async fn reject_accrual_request(&self, request_id: Uuid, review: &Review) -> Result<bool> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| StorageError::NotFound(format!("accrual request {}", request_id)))?;
        if request.status != RequestStatus::InProgress {
            return Ok(false);
        }
        request.apply_review(RequestStatus::Rejected, review);
        Ok(true)
    }

    async fn get_travel_distance(
        &self,
        from_code: &str,
        to_code: &str,
    ) -> Result<Option<TravelDistance>> {
        self.check_read().await?;
        let (from, to) = (location_code(from_code), location_code(to_code));
        Ok(self
            .state
            .read()
            .await
            .routes
            .iter()
            .find(|r| r.connects(&from, &to))
            .cloned())
    }

    async fn save_travel_distance(&self, distance: &TravelDistance) -> Result<()> {
        self.check_write().await?;
        let distance = distance.normalized();
        let mut state = self.state.write().await;
        state
            .routes
            .retain(|r| !r.connects(&distance.from_code, &distance.to_code));
        state.routes.push(distance);
        Ok(())
    }

    async fn save_mileage_ledger(&self, entry: &MilesLedgerEntry) -> Result<()> {
        self.check_write().await?;
        self.check_customer(entry.customer_id).await?;
        let mut state = self.state.write().await;
        if entry.kind == LedgerKind::Expire {
            let expired_month = entry.expired_month.ok_or_else(|| {
                StorageError::InvalidData("expire entry without expired month".to_string())
            })?;
            if state.expire_exists(entry.customer_id, expired_month) {
                return Err(StorageError::Conflict(format!(
                    "customer {} already expired {}",
                    entry.customer_id, expired_month
                )));
            }
        }
        state.apply_entry(entry)
    }

    async fn get_mileage_ledgers(
        &self,
        filter: &LedgerFilter,
    ) -> Result<(Vec<MilesLedgerEntry>, u64)> {
        self.check_read().await?;
        let state = self.state.read().await;
        let earning_month = filter.earning_month.map(month_start);
        let mut entries: Vec<MilesLedgerEntry> = state
            .ledger
            .iter()
            .filter(|e| filter.customer_id.map_or(true, |id| e.customer_id == id))
            .filter(|e| earning_month.map_or(true, |m| e.earning_month == m))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page(entries, &filter.pagination))
    }

    async fn get_customers_with_positive_qm_deltas_for_month(
        &self,
        month: NaiveDate,
    ) -> Result<Vec<Uuid>> {
        self.check_read().await?;
        let month = month_start(month);
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.earning_month == month && e.qualifying_miles_delta > 0.0)
            .filter(|e| seen.insert(e.customer_id))
            .map(|e| e.customer_id)
            .collect())
    }

    async fn get_total_qm_deltas_for_customer_and_month(
        &self,
        customer_id: Uuid,
        month: NaiveDate,
    ) -> Result<f64> {
        self.check_read().await?;
        self.check_customer(customer_id).await?;
        let month = month_start(month);
        Ok(self
            .state
            .read()
            .await
            .ledger
            .iter()
            .filter(|e| {
                e.customer_id == customer_id
                    && e.earning_month == month
                    && e.kind != LedgerKind::Expire
            })
            .map(|e| e.qualifying_miles_delta)
            .sum())
    }

    async fn check_expire_record_exists(
        &self,
        customer_id: Uuid,
        month: NaiveDate,
    ) -> Result<bool> {
        self.check_read().await?;
        self.check_customer(customer_id).await?;
        Ok(self.state.read().await.expire_exists(customer_id, month))
    }
}

#[async_trait]
impl MembershipRepository for MemoryRepository {
    async fn get_rolling_window_qualifying_miles(
        &self,
        customer_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64> {
        self.check_read().await?;
        self.check_customer(customer_id).await?;
        Ok(self
            .state
            .read()
            .await
            .ledger
            .iter()
            .filter(|e| e.customer_id == customer_id)
            .filter(|e| {
                let earned = at_midnight(e.earning_month);
                earned >= start && earned < end
            })
            .map(|e| e.qualifying_miles_delta)
            .sum())
    }

    async fn update_customer_membership_tier(&self, change: &MembershipHistory) -> Result<bool> {
        self.check_write().await?;
        if *self.fail_on_tier_update.read().await {
            return Err(StorageError::Unavailable(
                "injected tier update failure".to_string(),
            ));
        }
        let mut state = self.state.write().await;
        let customer = state
            .customers
            .get_mut(&change.customer_id)
            .ok_or_else(|| StorageError::NotFound(format!("customer {}", change.customer_id)))?;
        if customer.member_tier != change.old_tier {
            return Ok(false);
        }
        customer.member_tier = change.new_tier;
        customer.updated_at = change.created_at;
        state.history.push(change.clone());
        Ok(true)
    }

    async fn get_membership_history(&self, customer_id: Uuid) -> Result<Vec<MembershipHistory>> {
        self.check_read().await?;
        Ok(self
            .state
            .read()
            .await
            .history
            .iter()
            .filter(|h| h.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

impl Repository for MemoryRepository {
    fn customers(&self) -> &dyn CustomerRepository {
        self
    }

    fn mileage(&self) -> &dyn MileageRepository {
        self
    }

    fn membership(&self) -> &dyn MembershipRepository {
        self
    }
}
