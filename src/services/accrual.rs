//! Accrual request processing.
//!
//! Requests move `in_progress -> approved | rejected` exactly once. The
//! transition is a status-guarded write, so concurrent reviewers cannot both
//! succeed. Approval posts the accrual entry and totals in the same storage
//! unit, then re-derives the customer's tier.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::{ConfigError, LoyaltyConfig, MileRounding};
use crate::domain::{
    AccrualRequest, Actor, MilesLedgerEntry, RequestStatus, Review, TicketClaim, TierChangeReason,
};
use crate::error::{ErrorKind, MileageError, Result};
use crate::interfaces::{Repository, StorageError};
use crate::utils::month::{add_months, month_start};

use super::distance::TravelDistanceResolver;
use super::ledger_writer::LedgerWriter;
use super::rate_table::RateTable;
use super::tier_engine::{TierEngine, TierOutcome};

/// What an approval did.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    /// The request as stored after approval.
    pub request: AccrualRequest,
    /// The accrual entry posted for it.
    pub entry: MilesLedgerEntry,
    /// Tier after re-derivation; `None` when that step failed. The next
    /// recalculation run converges it, or the caller can re-run the step with
    /// [`AccrualRequestProcessor::recalculate_tier`].
    pub tier: Option<TierOutcome>,
    /// Kind of the re-derivation failure, when there was one.
    pub tier_error: Option<ErrorKind>,
}

impl ApprovalOutcome {
    /// True when the miles were credited but the tier was not re-derived.
    pub fn needs_tier_recalc(&self) -> bool {
        self.tier.is_none()
    }
}

/// Submits, approves and rejects accrual requests.
#[derive(Clone)]
pub struct AccrualRequestProcessor {
    repository: Arc<dyn Repository>,
    rates: RateTable,
    distances: TravelDistanceResolver,
    ledger: LedgerWriter,
    tiers: TierEngine,
    rounding: MileRounding,
    expiry_period_months: u32,
}

impl AccrualRequestProcessor {
    pub fn new(
        repository: Arc<dyn Repository>,
        config: &LoyaltyConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            rates: RateTable::new(&config.booking_classes)?,
            distances: TravelDistanceResolver::new(repository.clone()),
            ledger: LedgerWriter::new(repository.clone()),
            tiers: TierEngine::from_config(repository.clone(), config)?,
            rounding: config.mile_rounding,
            expiry_period_months: config.expiry_period_months,
            repository,
        })
    }

    /// Record a new claim with its computed miles, status `in_progress`.
    #[instrument(skip(self, claim), fields(ticket_id = %claim.ticket_id, pnr = %claim.pnr))]
    pub async fn submit(&self, customer_id: Uuid, claim: TicketClaim) -> Result<AccrualRequest> {
        let claim = normalize_claim(claim)?;

        self.repository
            .customers()
            .get_customer_by_id(customer_id)
            .await?
            .ok_or_else(|| MileageError::CustomerNotFound(customer_id.to_string()))?;

        let existing = self
            .repository
            .mileage()
            .get_accrual_request_by_filter(customer_id, &claim.ticket_id, &claim.pnr)
            .await?;
        if existing.is_some() {
            return Err(MileageError::DuplicateRequest {
                ticket_id: claim.ticket_id,
                pnr: claim.pnr,
            });
        }

        let distance = self
            .distances
            .distance_between(&claim.from_code, &claim.to_code)
            .await?;
        let quote = self.rates.quote(&claim.booking_class, distance)?;

        let mut request = AccrualRequest::submitted(customer_id, claim);
        request.distance_miles = quote.distance_miles;
        request.qualifying_accrual_rate = quote.qualifying_rate;
        request.qualifying_miles = self.rounding.apply(quote.qualifying_miles);
        request.bonus_accrual_rate = quote.bonus_rate;
        request.bonus_miles = self.rounding.apply(quote.bonus_miles);

        match self.repository.mileage().save_accrual_request(&request).await {
            Ok(()) => {}
            // Lost a race with an identical submission.
            Err(StorageError::Conflict(_)) => {
                return Err(MileageError::DuplicateRequest {
                    ticket_id: request.ticket_id,
                    pnr: request.pnr,
                })
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            request_id = %request.id,
            customer_id = %customer_id,
            distance_miles = request.distance_miles,
            qualifying_miles = request.qualifying_miles,
            bonus_miles = request.bonus_miles,
            "Accrual request submitted"
        );
        Ok(request)
    }

    /// Approve an in-progress request and credit its miles.
    #[instrument(skip(self, reviewer), fields(reviewer = %reviewer.external_id))]
    pub async fn approve(&self, reviewer: &Actor, request_id: Uuid) -> Result<ApprovalOutcome> {
        assert_reviewer(reviewer)?;

        let mut request = self.load_in_progress(request_id).await?;

        let review = Review {
            reviewer_id: reviewer.external_id.clone(),
            reviewed_at: Utc::now(),
            reject_reason: None,
        };
        let earning_month = month_start(request.departure_date);
        let expires_at = add_months(earning_month, self.expiry_period_months);
        let entry = MilesLedgerEntry::accrual(&request, earning_month, expires_at);

        if !self.ledger.post_approval(request_id, &review, &entry).await? {
            return Err(self.lost_transition(request_id).await);
        }
        request.apply_review(RequestStatus::Approved, &review);

        info!(
            request_id = %request_id,
            customer_id = %request.customer_id,
            qualifying_miles = request.qualifying_miles,
            bonus_miles = request.bonus_miles,
            "Accrual request approved"
        );

        let (tier, tier_error) = match self.recalculate_tier(request.customer_id).await {
            Ok(outcome) => (Some(outcome), None),
            Err(e) => {
                error!(
                    request_id = %request_id,
                    customer_id = %request.customer_id,
                    error = %e,
                    "Tier recalculation after approval failed"
                );
                (None, Some(e.kind()))
            }
        };

        Ok(ApprovalOutcome {
            request,
            entry,
            tier,
            tier_error,
        })
    }

    /// Re-derive a customer's tier after an accrual. Safe to repeat.
    pub async fn recalculate_tier(&self, customer_id: Uuid) -> Result<TierOutcome> {
        self.tiers
            .recalculate(customer_id, Utc::now(), TierChangeReason::Accrual)
            .await
    }

    /// Reject an in-progress request. No miles move.
    #[instrument(skip(self, reviewer, reason), fields(reviewer = %reviewer.external_id))]
    pub async fn reject(
        &self,
        reviewer: &Actor,
        request_id: Uuid,
        reason: &str,
    ) -> Result<AccrualRequest> {
        assert_reviewer(reviewer)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(MileageError::Validation(
                "a reject reason is required".to_string(),
            ));
        }

        let mut request = self.load_in_progress(request_id).await?;

        let review = Review {
            reviewer_id: reviewer.external_id.clone(),
            reviewed_at: Utc::now(),
            reject_reason: Some(reason.to_string()),
        };
        if !self
            .repository
            .mileage()
            .reject_accrual_request(request_id, &review)
            .await?
        {
            return Err(self.lost_transition(request_id).await);
        }
        request.apply_review(RequestStatus::Rejected, &review);

        info!(request_id = %request_id, reason = %reason, "Accrual request rejected");
        Ok(request)
    }

    async fn load_in_progress(&self, request_id: Uuid) -> Result<AccrualRequest> {
        let request = self
            .repository
            .mileage()
            .get_accrual_request(request_id)
            .await?
            .ok_or(MileageError::RequestNotFound(request_id))?;
        if request.status != RequestStatus::InProgress {
            return Err(MileageError::InvalidStatus {
                id: request_id,
                status: request.status,
            });
        }
        Ok(request)
    }

    /// Error for a guarded transition that found the request already moved.
    async fn lost_transition(&self, request_id: Uuid) -> MileageError {
        match self.repository.mileage().get_accrual_request(request_id).await {
            Ok(Some(current)) => MileageError::InvalidStatus {
                id: request_id,
                status: current.status,
            },
            Ok(None) => MileageError::RequestNotFound(request_id),
            Err(e) => e.into(),
        }
    }
}

fn assert_reviewer(reviewer: &Actor) -> Result<()> {
    if reviewer.external_id.trim().is_empty() {
        return Err(MileageError::MissingReviewer);
    }
    if !reviewer.is_admin() {
        return Err(MileageError::Forbidden(format!(
            "{} may not review accrual requests",
            reviewer.external_id
        )));
    }
    Ok(())
}

fn normalize_claim(mut claim: TicketClaim) -> Result<TicketClaim> {
    claim.ticket_id = claim.ticket_id.trim().to_string();
    claim.pnr = claim.pnr.trim().to_ascii_uppercase();
    claim.booking_class = claim.booking_class.trim().to_ascii_uppercase();
    claim.carrier = claim.carrier.trim().to_string();
    claim.from_code = claim.from_code.trim().to_ascii_uppercase();
    claim.to_code = claim.to_code.trim().to_ascii_uppercase();

    if claim.ticket_id.is_empty() || claim.pnr.is_empty() {
        return Err(MileageError::Validation(
            "ticket id and PNR are required".to_string(),
        ));
    }
    if claim.booking_class.is_empty() {
        return Err(MileageError::Validation(
            "booking class is required".to_string(),
        ));
    }
    Ok(claim)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::domain::{Customer, LedgerKind, MemberTier, TravelDistance};
    use crate::interfaces::LedgerFilter;
    use crate::storage::MemoryRepository;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        processor: AccrualRequestProcessor,
        customer: Customer,
        admin: Actor,
    }

    async fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let customer = Customer::new("auth|member", "member@example.com");
        repo.customers().save_customer(&customer).await.unwrap();
        repo.mileage()
            .save_travel_distance(&TravelDistance::new("SGN", "CDG", 3000))
            .await
            .unwrap();
        repo.mileage()
            .save_travel_distance(&TravelDistance::new("SGN", "HAN", 710))
            .await
            .unwrap();
        let processor =
            AccrualRequestProcessor::new(repo.clone(), &LoyaltyConfig::default()).unwrap();
        Fixture {
            repo,
            processor,
            customer,
            admin: Actor::admin("auth|admin"),
        }
    }

    fn claim(ticket_id: &str, class: &str, to: &str) -> TicketClaim {
        TicketClaim {
            ticket_id: ticket_id.to_string(),
            pnr: "abc123".to_string(),
            carrier: "VJ".to_string(),
            booking_class: class.to_string(),
            from_code: "SGN".to_string(),
            to_code: to.to_string(),
            departure_date: Utc::now().date_naive(),
            ticket_image_url: Some("https://img.example/ticket.png".to_string()),
            boarding_pass_image_url: None,
        }
    }

    #[tokio::test]
    async fn test_submit_computes_miles() {
        let f = fixture().await;
        let request = f
            .processor
            .submit(f.customer.id, claim("T-1", "y", "CDG"))
            .await
            .unwrap();

        assert_eq!(request.status, RequestStatus::InProgress);
        assert_eq!(request.pnr, "ABC123");
        assert_eq!(request.booking_class, "Y");
        assert_eq!(request.distance_miles, 3000);
        assert_eq!(request.qualifying_accrual_rate, 1.10);
        assert_eq!(request.qualifying_miles, 3300.0);
        assert_eq!(request.bonus_accrual_rate, 1.5);
        assert_eq!(request.bonus_miles, 4500.0);

        let stored = f.repo.mileage().get_accrual_request(request.id).await.unwrap();
        assert_eq!(stored, Some(request));
    }

    #[tokio::test]
    async fn test_submit_rounds_to_whole_miles() {
        let f = fixture().await;
        let request = f
            .processor
            .submit(f.customer.id, claim("T-2", "S", "HAN"))
            .await
            .unwrap();
        // 0.65 * 710 = 461.5
        assert_eq!(request.qualifying_miles, 462.0);
        assert_eq!(request.bonus_miles, 710.0);
    }

    #[tokio::test]
    async fn test_duplicate_submission_conflicts() {
        let f = fixture().await;
        f.processor
            .submit(f.customer.id, claim("T-3", "Y", "CDG"))
            .await
            .unwrap();

        let err = f
            .processor
            .submit(f.customer.id, claim("T-3", "M", "HAN"))
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::DuplicateRequest { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_resubmission_after_rejection() {
        let f = fixture().await;
        let first = f
            .processor
            .submit(f.customer.id, claim("T-4", "Y", "CDG"))
            .await
            .unwrap();
        f.processor
            .reject(&f.admin, first.id, "blurry boarding pass")
            .await
            .unwrap();

        let second = f
            .processor
            .submit(f.customer.id, claim("T-4", "Y", "CDG"))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_submit_errors_propagate() {
        let f = fixture().await;
        let err = f
            .processor
            .submit(f.customer.id, claim("T-5", "Y", "LHR"))
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::RouteNotFound { .. }));

        let err = f
            .processor
            .submit(f.customer.id, claim("T-6", "X", "CDG"))
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::InvalidBookingClass(_)));

        let err = f
            .processor
            .submit(Uuid::new_v4(), claim("T-7", "Y", "CDG"))
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::CustomerNotFound(_)));

        let err = f
            .processor
            .submit(f.customer.id, claim("  ", "Y", "CDG"))
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::Validation(_)));
    }

    #[tokio::test]
    async fn test_approve_credits_miles_and_tier() {
        let f = fixture().await;
        let request = f
            .processor
            .submit(f.customer.id, claim("T-8", "Y", "CDG"))
            .await
            .unwrap();

        let outcome = f.processor.approve(&f.admin, request.id).await.unwrap();

        assert_eq!(outcome.request.status, RequestStatus::Approved);
        assert_eq!(outcome.request.reviewer_id.as_deref(), Some("auth|admin"));
        assert_eq!(outcome.entry.kind, LedgerKind::Accrual);
        assert_eq!(outcome.entry.earning_month, month_start(request.departure_date));
        assert_eq!(
            outcome.entry.expires_at,
            Some(add_months(month_start(request.departure_date), 13))
        );
        let tier = outcome.tier.unwrap();
        assert_eq!(tier.tier, MemberTier::Silver);
        assert_eq!(tier.rolling_miles, 3300.0);

        let customer = f
            .repo
            .customers()
            .get_customer_by_id(f.customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.qualifying_miles_total, 3300.0);
        assert_eq!(customer.bonus_miles_total, 4500.0);
        assert_eq!(customer.member_tier, MemberTier::Silver);

        let (entries, _) = f
            .repo
            .mileage()
            .get_mileage_ledgers(&LedgerFilter {
                customer_id: Some(f.customer.id),
                ..Default::default()
            })
            .await
            .unwrap();
        let accruals: Vec<_> = entries
            .iter()
            .filter(|e| e.accrual_request_id == Some(request.id))
            .collect();
        assert_eq!(accruals.len(), 1);
    }

    #[tokio::test]
    async fn test_second_review_is_invalid_status() {
        let f = fixture().await;
        let request = f
            .processor
            .submit(f.customer.id, claim("T-9", "Y", "CDG"))
            .await
            .unwrap();
        f.processor.approve(&f.admin, request.id).await.unwrap();

        let err = f.processor.approve(&f.admin, request.id).await.unwrap_err();
        assert!(matches!(
            err,
            MileageError::InvalidStatus {
                status: RequestStatus::Approved,
                ..
            }
        ));
        let err = f
            .processor
            .reject(&f.admin, request.id, "too late")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let customer = f
            .repo
            .customers()
            .get_customer_by_id(f.customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.qualifying_miles_total, 3300.0);
    }

    #[tokio::test]
    async fn test_concurrent_approvals_credit_once() {
        let f = fixture().await;
        let request = f
            .processor
            .submit(f.customer.id, claim("T-10", "Y", "CDG"))
            .await
            .unwrap();

        let (a, b) = futures::future::join(
            f.processor.approve(&f.admin, request.id),
            f.processor.approve(&f.admin, request.id),
        )
        .await;
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

        let customer = f
            .repo
            .customers()
            .get_customer_by_id(f.customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.qualifying_miles_total, 3300.0);
    }

    #[tokio::test]
    async fn test_reject_requires_reason_and_moves_nothing() {
        let f = fixture().await;
        let request = f
            .processor
            .submit(f.customer.id, claim("T-11", "Y", "CDG"))
            .await
            .unwrap();

        let err = f
            .processor
            .reject(&f.admin, request.id, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::Validation(_)));

        let rejected = f
            .processor
            .reject(&f.admin, request.id, "ticket not flown")
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.reject_reason.as_deref(), Some("ticket not flown"));

        let customer = f
            .repo
            .customers()
            .get_customer_by_id(f.customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.qualifying_miles_total, 0.0);
        assert_eq!(customer.member_tier, MemberTier::Register);
    }

    #[tokio::test]
    async fn test_reviewer_identity_is_asserted() {
        let f = fixture().await;
        let request = f
            .processor
            .submit(f.customer.id, claim("T-12", "Y", "CDG"))
            .await
            .unwrap();

        let err = f
            .processor
            .approve(&Actor::admin(""), request.id)
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::MissingReviewer));

        let err = f
            .processor
            .approve(&Actor::new("auth|member"), request.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = f
            .processor
            .approve(&f.admin, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_tier_failure_after_approval_keeps_credit() {
        let f = fixture().await;
        let request = f
            .processor
            .submit(f.customer.id, claim("T-13", "Y", "CDG"))
            .await
            .unwrap();

        f.repo.set_fail_on_tier_update(true).await;
        let outcome = f.processor.approve(&f.admin, request.id).await.unwrap();
        assert!(outcome.tier.is_none());
        assert!(outcome.needs_tier_recalc());
        assert_eq!(outcome.tier_error, Some(ErrorKind::Dependency));

        let customer = f
            .repo
            .customers()
            .get_customer_by_id(f.customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.qualifying_miles_total, 3300.0);
        assert_eq!(customer.member_tier, MemberTier::Register);

        // Approving again is refused; the tier step alone can be re-run.
        let err = f.processor.approve(&f.admin, request.id).await.unwrap_err();
        assert!(matches!(err, MileageError::InvalidStatus { .. }));

        f.repo.clear_failures().await;
        let tier = f.processor.recalculate_tier(f.customer.id).await.unwrap();
        assert_eq!(tier.tier, MemberTier::Silver);
        assert!(tier.changed);
    }

    #[test]
    fn test_departure_month_drives_earning_month() {
        let departure = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(
            add_months(month_start(departure), 13),
            NaiveDate::from_ymd_opt(2027, 2, 1).unwrap()
        );
    }
}
