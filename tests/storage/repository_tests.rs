//! Repository interface tests.
//!
//! These tests verify the contract of the Repository trait and its three
//! scopes. Each storage implementation should run these tests. Tests share
//! one store, so each works on its own customers and months.

use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use mileage_engine::domain::{
    AccrualRequest, Customer, LedgerKind, MemberTier, MembershipHistory, MilesLedgerEntry,
    RequestStatus, Review, TicketClaim, TierChangeReason, TravelDistance,
};
use mileage_engine::interfaces::{
    AccrualRequestFilter, CustomerFilter, LedgerFilter, Repository, StorageError,
};
use mileage_engine::utils::Pagination;

pub fn month(y: i32, m: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, 1).unwrap()
}

/// Save and return a new customer.
pub async fn make_customer<R: Repository>(repo: &R, label: &str) -> Customer {
    let external_id = format!("auth|{}|{}", label, Uuid::new_v4());
    let customer = Customer::new(external_id, format!("{}@example.com", label));
    repo.customers()
        .save_customer(&customer)
        .await
        .expect("save_customer should succeed");
    customer
}

pub fn make_request(customer_id: Uuid, ticket_id: &str, pnr: &str) -> AccrualRequest {
    let mut request = AccrualRequest::submitted(
        customer_id,
        TicketClaim {
            ticket_id: ticket_id.to_string(),
            pnr: pnr.to_string(),
            carrier: "VJ".to_string(),
            booking_class: "Y".to_string(),
            from_code: "SGN".to_string(),
            to_code: "HAN".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            ticket_image_url: Some("https://img.example/t.png".to_string()),
            boarding_pass_image_url: None,
        },
    );
    request.distance_miles = 710;
    request.qualifying_accrual_rate = 1.1;
    request.qualifying_miles = 781.0;
    request.bonus_accrual_rate = 1.4;
    request.bonus_miles = 994.0;
    request
}

fn review(reason: Option<&str>) -> Review {
    Review {
        reviewer_id: "auth|reviewer".to_string(),
        reviewed_at: Utc::now(),
        reject_reason: reason.map(str::to_string),
    }
}

fn adjustment(customer_id: Uuid, qualifying: f64, bonus: f64, earned: NaiveDate) -> MilesLedgerEntry {
    MilesLedgerEntry::manual(customer_id, LedgerKind::Adjustment, qualifying, bonus, earned, "test")
}

async fn totals<R: Repository>(repo: &R, customer_id: Uuid) -> (f64, f64) {
    let customer = repo
        .customers()
        .get_customer_by_id(customer_id)
        .await
        .expect("get should succeed")
        .expect("customer should exist");
    (customer.qualifying_miles_total, customer.bonus_miles_total)
}

// =============================================================================
// Customer tests
// =============================================================================

pub async fn test_customer_round_trip<R: Repository>(repo: &R) {
    let mut customer = Customer::new(format!("auth|rt|{}", Uuid::new_v4()), "rt@example.com")
        .with_name("Lan", "Nguyen");
    customer.phone = Some("+84900000000".to_string());
    repo.customers().save_customer(&customer).await.unwrap();

    let by_id = repo.customers().get_customer_by_id(customer.id).await.unwrap().unwrap();
    assert_eq!(by_id.external_id, customer.external_id);
    assert_eq!(by_id.first_name, "Lan");
    assert_eq!(by_id.phone, customer.phone);
    assert_eq!(by_id.member_tier, MemberTier::Register);
    assert_eq!(by_id.qualifying_miles_total, 0.0);

    let by_external = repo
        .customers()
        .get_customer_by_external_id(&customer.external_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_external.id, customer.id);

    assert!(repo.customers().get_customer_by_id(Uuid::new_v4()).await.unwrap().is_none());
}

pub async fn test_customer_duplicate_external_id<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "dup").await;
    let twin = Customer::new(customer.external_id.clone(), "twin@example.com");

    let result = repo.customers().save_customer(&twin).await;
    assert!(
        matches!(result, Err(StorageError::Conflict(_))),
        "duplicate external id should conflict, got {:?}",
        result
    );
}

pub async fn test_customer_ids_paging<R: Repository>(repo: &R) {
    let mut created = Vec::new();
    for i in 0..3 {
        created.push(make_customer(repo, &format!("page{}", i)).await.id);
    }

    let mut seen = Vec::new();
    let mut page = 1;
    let total = loop {
        let (ids, total) = repo.customers().get_all_customer_ids(page, 2).await.unwrap();
        assert!(ids.len() <= 2, "page should respect size");
        let done = ids.len() < 2;
        seen.extend(ids);
        if done || seen.len() as u64 >= total {
            break total;
        }
        page += 1;
    };

    assert_eq!(seen.len() as u64, total, "pages should cover every customer");
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), seen.len(), "no customer should appear twice");
    for id in created {
        assert!(seen.contains(&id), "created customer should be listed");
    }
}

pub async fn test_list_customers_filters<R: Repository>(repo: &R) {
    let tag = Uuid::new_v4().simple().to_string();
    let mut lan = Customer::new(format!("auth|lan|{}", tag), format!("lan.{}@example.com", tag))
        .with_name("Lan", format!("Nguyen{}", tag));
    lan.phone = Some(format!("+84-{}", tag));
    let hoa = Customer::new(format!("auth|hoa|{}", tag), format!("hoa.{}@example.com", tag))
        .with_name("Hoa", format!("Nguyen{}", tag));
    for customer in [&lan, &hoa] {
        repo.customers().save_customer(customer).await.unwrap();
    }

    let (found, total) = repo
        .customers()
        .list_customers(&CustomerFilter {
            name: Some(format!("NGUYEN{}", tag.to_ascii_uppercase())),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2, "name filter ignores case and spans last names");
    let mut ids: Vec<Uuid> = found.iter().map(|c| c.id).collect();
    ids.sort();
    let mut expected = vec![lan.id, hoa.id];
    expected.sort();
    assert_eq!(ids, expected);

    let (found, total) = repo
        .customers()
        .list_customers(&CustomerFilter {
            name: Some(format!("lan nguyen{}", tag)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1, "full name should match");
    assert_eq!(found[0].id, lan.id);

    let (found, total) = repo
        .customers()
        .list_customers(&CustomerFilter {
            email: Some(hoa.email.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(found[0].id, hoa.id);
    assert_eq!(found[0].last_name, hoa.last_name);

    let (found, total) = repo
        .customers()
        .list_customers(&CustomerFilter {
            phone: lan.phone.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(found[0].id, lan.id);

    let (page, total) = repo
        .customers()
        .list_customers(&CustomerFilter {
            name: Some(tag.clone()),
            pagination: Pagination::new(2, 1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2, "total counts every match, not the page");
    assert_eq!(page.len(), 1);

    let (none, total) = repo
        .customers()
        .list_customers(&CustomerFilter {
            email: Some(format!("nobody.{}@example.com", tag)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert!(none.is_empty());
}

// =============================================================================
// Accrual request tests
// =============================================================================

pub async fn test_request_round_trip<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "req").await;
    let request = make_request(customer.id, "T-RT", "PNR1");
    repo.mileage().save_accrual_request(&request).await.unwrap();

    let stored = repo.mileage().get_accrual_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::InProgress);
    assert_eq!(stored.distance_miles, 710);
    assert_eq!(stored.qualifying_miles, 781.0);
    assert_eq!(stored.bonus_miles, 994.0);
    assert_eq!(stored.departure_date, request.departure_date);
    assert_eq!(stored.ticket_image_url, request.ticket_image_url);

    let found = repo
        .mileage()
        .get_accrual_request_by_filter(customer.id, "T-RT", "PNR1")
        .await
        .unwrap();
    assert_eq!(found.map(|r| r.id), Some(request.id));
}

pub async fn test_request_duplicate_until_rejected<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "reqdup").await;
    let first = make_request(customer.id, "T-DUP", "PNR2");
    repo.mileage().save_accrual_request(&first).await.unwrap();

    let second = make_request(customer.id, "T-DUP", "PNR2");
    let result = repo.mileage().save_accrual_request(&second).await;
    assert!(matches!(result, Err(StorageError::Conflict(_))));

    assert!(repo
        .mileage()
        .reject_accrual_request(first.id, &review(Some("blurry scan")))
        .await
        .unwrap());
    assert!(repo
        .mileage()
        .get_accrual_request_by_filter(customer.id, "T-DUP", "PNR2")
        .await
        .unwrap()
        .is_none());

    repo.mileage()
        .save_accrual_request(&second)
        .await
        .expect("resubmission after rejection should succeed");
}

pub async fn test_approve_is_atomic_and_once<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "approve").await;
    let request = make_request(customer.id, "T-APP", "PNR3");
    repo.mileage().save_accrual_request(&request).await.unwrap();

    let entry = MilesLedgerEntry::accrual(&request, month(2026, 3), NaiveDate::from_ymd_opt(2027, 4, 1).unwrap());
    assert!(repo
        .mileage()
        .approve_accrual_request(request.id, &review(None), &entry)
        .await
        .unwrap());

    let stored = repo.mileage().get_accrual_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Approved);
    assert_eq!(stored.reviewer_id.as_deref(), Some("auth|reviewer"));
    assert_eq!(totals(repo, customer.id).await, (781.0, 994.0));

    let again = MilesLedgerEntry::accrual(&request, month(2026, 3), NaiveDate::from_ymd_opt(2027, 4, 1).unwrap());
    assert!(!repo
        .mileage()
        .approve_accrual_request(request.id, &review(None), &again)
        .await
        .unwrap());
    assert!(!repo
        .mileage()
        .reject_accrual_request(request.id, &review(Some("late")))
        .await
        .unwrap());
    assert_eq!(totals(repo, customer.id).await, (781.0, 994.0));

    let (entries, total) = repo
        .mileage()
        .get_mileage_ledgers(&LedgerFilter {
            customer_id: Some(customer.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(entries[0].kind, LedgerKind::Accrual);
    assert_eq!(entries[0].accrual_request_id, Some(request.id));
    assert_eq!(entries[0].earning_month, month(2026, 3));
}

pub async fn test_reject_records_reason<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "reject").await;
    let request = make_request(customer.id, "T-REJ", "PNR4");
    repo.mileage().save_accrual_request(&request).await.unwrap();

    assert!(repo
        .mileage()
        .reject_accrual_request(request.id, &review(Some("not flown")))
        .await
        .unwrap());
    let stored = repo.mileage().get_accrual_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Rejected);
    assert_eq!(stored.reject_reason.as_deref(), Some("not flown"));
    assert_eq!(totals(repo, customer.id).await, (0.0, 0.0));
}

pub async fn test_list_requests_filters<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "list").await;
    for (ticket, pnr) in [("L-1", "LP1"), ("L-2", "LP2"), ("L-3", "LP3")] {
        repo.mileage()
            .save_accrual_request(&make_request(customer.id, ticket, pnr))
            .await
            .unwrap();
    }

    let (page, total) = repo
        .mileage()
        .list_accrual_requests(&AccrualRequestFilter {
            customer_id: Some(customer.id),
            pagination: Pagination::new(1, 2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);

    let (by_pnr, total) = repo
        .mileage()
        .list_accrual_requests(&AccrualRequestFilter {
            customer_id: Some(customer.id),
            keyword: Some("LP2".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(by_pnr[0].ticket_id, "L-2");

    let (approved, total) = repo
        .mileage()
        .list_accrual_requests(&AccrualRequestFilter {
            customer_id: Some(customer.id),
            status: Some(RequestStatus::Approved),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert!(approved.is_empty());

    let (today, _) = repo
        .mileage()
        .list_accrual_requests(&AccrualRequestFilter {
            customer_id: Some(customer.id),
            submitted_on: Some(Utc::now().date_naive()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(today.len(), 3);
}

// =============================================================================
// Travel distance tests
// =============================================================================

pub async fn test_travel_distance_symmetric<R: Repository>(repo: &R) {
    repo.mileage()
        .save_travel_distance(&TravelDistance::new("DAD", "CXR", 326))
        .await
        .unwrap();

    let forward = repo.mileage().get_travel_distance("DAD", "CXR").await.unwrap();
    let backward = repo.mileage().get_travel_distance("CXR", "DAD").await.unwrap();
    assert_eq!(forward.map(|d| d.miles), Some(326));
    assert_eq!(backward.map(|d| d.miles), Some(326));
    assert!(repo.mileage().get_travel_distance("DAD", "VII").await.unwrap().is_none());
}

pub async fn test_travel_distance_ignores_code_case<R: Repository>(repo: &R) {
    repo.mileage()
        .save_travel_distance(&TravelDistance {
            from_code: "pqc".to_string(),
            to_code: "Vca ".to_string(),
            miles: 140,
        })
        .await
        .unwrap();

    for (from, to) in [("pqc", "vca"), ("PQC", "VCA"), ("vca", "Pqc")] {
        let route = repo.mileage().get_travel_distance(from, to).await.unwrap();
        assert_eq!(route.map(|d| d.miles), Some(140), "{} -> {}", from, to);
    }

    // Re-saving in another case replaces the route.
    repo.mileage()
        .save_travel_distance(&TravelDistance::new("VCA", "PQC", 150))
        .await
        .unwrap();
    let route = repo.mileage().get_travel_distance("pqc", "vca").await.unwrap().unwrap();
    assert_eq!(route.miles, 150);
    assert_eq!(route.from_code, "VCA");
}

// =============================================================================
// Ledger tests
// =============================================================================

pub async fn test_ledger_moves_totals<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "ledger").await;
    repo.mileage()
        .save_mileage_ledger(&adjustment(customer.id, 1200.0, 300.0, month(2024, 1)))
        .await
        .unwrap();
    repo.mileage()
        .save_mileage_ledger(&adjustment(customer.id, -200.0, 0.0, month(2024, 2)))
        .await
        .unwrap();
    assert_eq!(totals(repo, customer.id).await, (1000.0, 300.0));

    let (january, total) = repo
        .mileage()
        .get_mileage_ledgers(&LedgerFilter {
            customer_id: Some(customer.id),
            earning_month: Some(month(2024, 1)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(january[0].qualifying_miles_delta, 1200.0);

    let orphan = adjustment(Uuid::new_v4(), 10.0, 0.0, month(2024, 1));
    let result = repo.mileage().save_mileage_ledger(&orphan).await;
    assert!(
        matches!(result, Err(StorageError::NotFound(_))),
        "unknown customer should be NotFound, got {:?}",
        result
    );
}

pub async fn test_expire_entries_are_unique<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "expire").await;
    repo.mileage()
        .save_mileage_ledger(&adjustment(customer.id, 500.0, 0.0, month(2023, 3)))
        .await
        .unwrap();
    assert!(!repo
        .mileage()
        .check_expire_record_exists(customer.id, month(2023, 3))
        .await
        .unwrap());

    let expire = MilesLedgerEntry::expire(customer.id, month(2023, 3), 500.0, month(2024, 4));
    repo.mileage().save_mileage_ledger(&expire).await.unwrap();
    assert!(repo
        .mileage()
        .check_expire_record_exists(customer.id, month(2023, 3))
        .await
        .unwrap());
    assert_eq!(totals(repo, customer.id).await, (0.0, 0.0));

    let again = MilesLedgerEntry::expire(customer.id, month(2023, 3), 500.0, month(2024, 4));
    let result = repo.mileage().save_mileage_ledger(&again).await;
    assert!(matches!(result, Err(StorageError::Conflict(_))));
    assert_eq!(totals(repo, customer.id).await, (0.0, 0.0));
}

pub async fn test_month_aggregates<R: Repository>(repo: &R) {
    let earner = make_customer(repo, "earner").await;
    let debtor = make_customer(repo, "debtor").await;
    let target = month(2022, 7);

    for entry in [
        adjustment(earner.id, 300.0, 0.0, target),
        adjustment(earner.id, 200.0, 0.0, target),
        adjustment(earner.id, -100.0, 0.0, target),
        adjustment(earner.id, 999.0, 0.0, month(2022, 8)),
        adjustment(debtor.id, -50.0, 0.0, target),
    ] {
        repo.mileage().save_mileage_ledger(&entry).await.unwrap();
    }
    // Dated in the target month but excluded from its earnings.
    repo.mileage()
        .save_mileage_ledger(&MilesLedgerEntry::expire(earner.id, month(2021, 6), 40.0, target))
        .await
        .unwrap();

    let customers = repo
        .mileage()
        .get_customers_with_positive_qm_deltas_for_month(target)
        .await
        .unwrap();
    assert!(customers.contains(&earner.id));
    assert!(!customers.contains(&debtor.id));
    assert_eq!(customers.iter().filter(|id| **id == earner.id).count(), 1);

    let earned = repo
        .mileage()
        .get_total_qm_deltas_for_customer_and_month(earner.id, target)
        .await
        .unwrap();
    assert_eq!(earned, 400.0);
}

// =============================================================================
// Membership tests
// =============================================================================

pub async fn test_rolling_window_is_half_open<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "window").await;
    for (earned, miles) in [(month(2025, 1), 100.0), (month(2025, 6), 200.0), (month(2026, 1), 400.0)] {
        repo.mileage()
            .save_mileage_ledger(&adjustment(customer.id, miles, 0.0, earned))
            .await
            .unwrap();
    }

    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let sum = repo
        .membership()
        .get_rolling_window_qualifying_miles(customer.id, start, end)
        .await
        .unwrap();
    assert_eq!(sum, 300.0);

    let mid_month = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
    let after_end = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap();
    let sum = repo
        .membership()
        .get_rolling_window_qualifying_miles(customer.id, mid_month, after_end)
        .await
        .unwrap();
    assert_eq!(sum, 600.0);
}

pub async fn test_tier_update_is_guarded<R: Repository>(repo: &R) {
    let customer = make_customer(repo, "tier").await;
    let promote = MembershipHistory::new(
        customer.id,
        MemberTier::Register,
        MemberTier::Silver,
        TierChangeReason::Accrual,
    );
    assert!(repo
        .membership()
        .update_customer_membership_tier(&promote)
        .await
        .unwrap());

    let stale = MembershipHistory::new(
        customer.id,
        MemberTier::Register,
        MemberTier::Gold,
        TierChangeReason::Manual,
    );
    assert!(!repo
        .membership()
        .update_customer_membership_tier(&stale)
        .await
        .unwrap());

    let stored = repo.customers().get_customer_by_id(customer.id).await.unwrap().unwrap();
    assert_eq!(stored.member_tier, MemberTier::Silver);

    let history = repo.membership().get_membership_history(customer.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, promote.id);
    assert_eq!(history[0].old_tier, MemberTier::Register);
    assert_eq!(history[0].new_tier, MemberTier::Silver);
    assert_eq!(history[0].reason, TierChangeReason::Accrual);

    let ghost = MembershipHistory::new(
        Uuid::new_v4(),
        MemberTier::Register,
        MemberTier::Silver,
        TierChangeReason::CronRecalc,
    );
    let result = repo.membership().update_customer_membership_tier(&ghost).await;
    assert!(matches!(result, Err(StorageError::NotFound(_))));
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all Repository interface tests against an implementation.
#[macro_export]
macro_rules! run_repository_tests {
    ($repo:expr) => {
        use $crate::storage::repository_tests::*;

        // customers
        test_customer_round_trip($repo).await;
        println!("  test_customer_round_trip: PASSED");

        test_customer_duplicate_external_id($repo).await;
        println!("  test_customer_duplicate_external_id: PASSED");

        test_customer_ids_paging($repo).await;
        println!("  test_customer_ids_paging: PASSED");

        test_list_customers_filters($repo).await;
        println!("  test_list_customers_filters: PASSED");

        // accrual requests
        test_request_round_trip($repo).await;
        println!("  test_request_round_trip: PASSED");

        test_request_duplicate_until_rejected($repo).await;
        println!("  test_request_duplicate_until_rejected: PASSED");

        test_approve_is_atomic_and_once($repo).await;
        println!("  test_approve_is_atomic_and_once: PASSED");

        test_reject_records_reason($repo).await;
        println!("  test_reject_records_reason: PASSED");

        test_list_requests_filters($repo).await;
        println!("  test_list_requests_filters: PASSED");

        // routes
        test_travel_distance_symmetric($repo).await;
        println!("  test_travel_distance_symmetric: PASSED");

        test_travel_distance_ignores_code_case($repo).await;
        println!("  test_travel_distance_ignores_code_case: PASSED");

        // ledger
        test_ledger_moves_totals($repo).await;
        println!("  test_ledger_moves_totals: PASSED");

        test_expire_entries_are_unique($repo).await;
        println!("  test_expire_entries_are_unique: PASSED");

        test_month_aggregates($repo).await;
        println!("  test_month_aggregates: PASSED");

        // membership
        test_rolling_window_is_half_open($repo).await;
        println!("  test_rolling_window_is_half_open: PASSED");

        test_tier_update_is_guarded($repo).await;
        println!("  test_tier_update_is_guarded: PASSED");
    };
}
