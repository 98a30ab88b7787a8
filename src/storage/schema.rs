//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.
//! Identifiers, dates and timestamps are stored as TEXT; dates as `YYYY-MM-DD`
//! and timestamps as fixed-width RFC 3339 UTC, so text order is time order.

use sea_query::Iden;

/// Customers table schema.
#[derive(Iden)]
pub enum Customers {
    Table,
    Id,
    ExternalId,
    Email,
    FirstName,
    LastName,
    Phone,
    QualifyingMilesTotal,
    BonusMilesTotal,
    MemberTier,
    CreatedAt,
    UpdatedAt,
}

/// Accrual requests table schema.
#[derive(Iden)]
pub enum AccrualRequests {
    Table,
    Id,
    CustomerId,
    TicketId,
    Pnr,
    Carrier,
    BookingClass,
    FromCode,
    ToCode,
    DepartureDate,
    TicketImageUrl,
    BoardingPassImageUrl,
    DistanceMiles,
    QualifyingAccrualRate,
    QualifyingMiles,
    BonusAccrualRate,
    BonusMiles,
    Status,
    ReviewerId,
    ReviewedAt,
    RejectReason,
    CreatedAt,
    UpdatedAt,
}

/// Miles ledger table schema.
#[derive(Iden)]
pub enum MilesLedger {
    Table,
    Id,
    CustomerId,
    QualifyingMilesDelta,
    BonusMilesDelta,
    AccrualRequestId,
    Kind,
    EarningMonth,
    ExpiresAt,
    ExpiredMonth,
    Note,
    CreatedAt,
}

/// Membership history table schema.
#[derive(Iden)]
pub enum TierHistory {
    #[iden = "membership_history"]
    Table,
    Id,
    CustomerId,
    OldTier,
    NewTier,
    Reason,
    CreatedAt,
}

/// Travel distances table schema.
#[derive(Iden)]
pub enum TravelDistances {
    Table,
    FromCode,
    ToCode,
    Miles,
}

/// SQL for creating the customers table.
pub const CREATE_CUSTOMERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id TEXT PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    phone TEXT,
    qualifying_miles_total REAL NOT NULL DEFAULT 0,
    bonus_miles_total REAL NOT NULL DEFAULT 0,
    member_tier TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_customers_created_at ON customers(created_at, id);
"#;

/// SQL for creating the accrual requests table.
///
/// At most one non-rejected request per (customer, ticket, PNR).
pub const CREATE_ACCRUAL_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accrual_requests (
    id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL REFERENCES customers(id),
    ticket_id TEXT NOT NULL,
    pnr TEXT NOT NULL,
    carrier TEXT NOT NULL,
    booking_class TEXT NOT NULL,
    from_code TEXT NOT NULL,
    to_code TEXT NOT NULL,
    departure_date TEXT NOT NULL,
    ticket_image_url TEXT,
    boarding_pass_image_url TEXT,
    distance_miles INTEGER NOT NULL,
    qualifying_accrual_rate REAL NOT NULL,
    qualifying_miles REAL NOT NULL,
    bonus_accrual_rate REAL NOT NULL,
    bonus_miles REAL NOT NULL,
    status TEXT NOT NULL,
    reviewer_id TEXT,
    reviewed_at TEXT,
    reject_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_accrual_requests_active_ticket
    ON accrual_requests(customer_id, ticket_id, pnr)
    WHERE status <> 'rejected';

CREATE INDEX IF NOT EXISTS idx_accrual_requests_created_at ON accrual_requests(created_at);
"#;

/// SQL for creating the miles ledger table.
///
/// At most one expire entry per (customer, expired month).
pub const CREATE_MILES_LEDGER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS miles_ledger (
    id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL REFERENCES customers(id),
    qualifying_miles_delta REAL NOT NULL,
    bonus_miles_delta REAL NOT NULL,
    accrual_request_id TEXT REFERENCES accrual_requests(id),
    kind TEXT NOT NULL,
    earning_month TEXT NOT NULL,
    expires_at TEXT,
    expired_month TEXT,
    note TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_miles_ledger_customer_month
    ON miles_ledger(customer_id, earning_month);

CREATE INDEX IF NOT EXISTS idx_miles_ledger_month ON miles_ledger(earning_month);

CREATE UNIQUE INDEX IF NOT EXISTS idx_miles_ledger_expire
    ON miles_ledger(customer_id, expired_month)
    WHERE kind = 'expire';

CREATE UNIQUE INDEX IF NOT EXISTS idx_miles_ledger_accrual
    ON miles_ledger(accrual_request_id)
    WHERE kind = 'accrual';
"#;

/// SQL for creating the membership history table.
pub const CREATE_MEMBERSHIP_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS membership_history (
    id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL REFERENCES customers(id),
    old_tier TEXT NOT NULL,
    new_tier TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_membership_history_customer
    ON membership_history(customer_id, created_at);
"#;

/// SQL for creating the travel distances table.
pub const CREATE_TRAVEL_DISTANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS travel_distances (
    from_code TEXT NOT NULL,
    to_code TEXT NOT NULL,
    miles INTEGER NOT NULL,
    PRIMARY KEY (from_code, to_code)
);
"#;
