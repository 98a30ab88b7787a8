//! Miles ledger entries.
//!
//! The ledger is append-only: entries are never updated or deleted. A
//! customer's cached totals equal the sum of their entries' deltas.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::month::{format_month, month_start};

use super::AccrualRequest;

/// Why a ledger delta was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Accrual,
    Adjustment,
    Expire,
    Correction,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Accrual => "accrual",
            LedgerKind::Adjustment => "adjustment",
            LedgerKind::Expire => "expire",
            LedgerKind::Correction => "correction",
        }
    }

    /// Kinds an administrator may post by hand.
    pub fn is_manual(&self) -> bool {
        matches!(self, LedgerKind::Adjustment | LedgerKind::Correction)
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accrual" => Ok(LedgerKind::Accrual),
            "adjustment" => Ok(LedgerKind::Adjustment),
            "expire" => Ok(LedgerKind::Expire),
            "correction" => Ok(LedgerKind::Correction),
            other => Err(format!("unknown ledger kind: {}", other)),
        }
    }
}

/// One immutable miles delta for a customer.
#[derive(Debug, Clone, PartialEq)]
pub struct MilesLedgerEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub qualifying_miles_delta: f64,
    pub bonus_miles_delta: f64,
    pub accrual_request_id: Option<Uuid>,
    pub kind: LedgerKind,
    /// First day of the month the delta is attributed to.
    pub earning_month: NaiveDate,
    pub expires_at: Option<NaiveDate>,
    /// For `Expire` entries: the earning month whose miles this entry removes.
    pub expired_month: Option<NaiveDate>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl MilesLedgerEntry {
    /// Credit for an approved accrual request.
    pub fn accrual(request: &AccrualRequest, earning_month: NaiveDate, expires_at: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id: request.customer_id,
            qualifying_miles_delta: request.qualifying_miles,
            bonus_miles_delta: request.bonus_miles,
            accrual_request_id: Some(request.id),
            kind: LedgerKind::Accrual,
            earning_month: month_start(earning_month),
            expires_at: Some(expires_at),
            expired_month: None,
            note: format!("Accrual for flight {}", request.ticket_id),
            created_at: Utc::now(),
        }
    }

    /// Negating entry that expires `miles` qualifying miles earned in `expired_month`.
    pub fn expire(
        customer_id: Uuid,
        expired_month: NaiveDate,
        miles: f64,
        processing_month: NaiveDate,
    ) -> Self {
        let expired_month = month_start(expired_month);
        Self {
            id: Uuid::new_v4(),
            customer_id,
            qualifying_miles_delta: -miles,
            bonus_miles_delta: 0.0,
            accrual_request_id: None,
            kind: LedgerKind::Expire,
            earning_month: month_start(processing_month),
            expires_at: None,
            expired_month: Some(expired_month),
            note: format!("expire QM for {}", format_month(expired_month)),
            created_at: Utc::now(),
        }
    }

    /// Hand-posted adjustment or correction.
    pub fn manual(
        customer_id: Uuid,
        kind: LedgerKind,
        qualifying_miles_delta: f64,
        bonus_miles_delta: f64,
        earning_month: NaiveDate,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            qualifying_miles_delta,
            bonus_miles_delta,
            accrual_request_id: None,
            kind,
            earning_month: month_start(earning_month),
            expires_at: None,
            expired_month: None,
            note: note.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_expire_entry_negates_and_records_months() {
        let customer = Uuid::new_v4();
        let entry = MilesLedgerEntry::expire(customer, date(2025, 3, 14), 500.0, date(2026, 4, 2));

        assert_eq!(entry.kind, LedgerKind::Expire);
        assert_eq!(entry.qualifying_miles_delta, -500.0);
        assert_eq!(entry.bonus_miles_delta, 0.0);
        assert_eq!(entry.earning_month, date(2026, 4, 1));
        assert_eq!(entry.expired_month, Some(date(2025, 3, 1)));
        assert_eq!(entry.note, "expire QM for 2025-03");
    }

    #[test]
    fn test_manual_kinds() {
        assert!(LedgerKind::Adjustment.is_manual());
        assert!(LedgerKind::Correction.is_manual());
        assert!(!LedgerKind::Accrual.is_manual());
        assert!(!LedgerKind::Expire.is_manual());
    }
}
