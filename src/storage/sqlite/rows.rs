//! Column encoding and row decoding for the SQLite repository.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{AccrualRequest, Customer, MembershipHistory, MilesLedgerEntry, TravelDistance};
use crate::interfaces::repository::Result;
use crate::interfaces::StorageError;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub(super) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(super) fn date(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

/// Uniqueness violations become `Conflict`; everything else stays a database error.
pub(super) fn conflict_on_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict(what()),
        _ => StorageError::Database(err),
    }
}

fn uuid_col(row: &SqliteRow, col: &str) -> Result<Uuid> {
    let raw: String = row.try_get(col)?;
    Ok(Uuid::parse_str(&raw)?)
}

fn opt_uuid_col(row: &SqliteRow, col: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| Uuid::parse_str(&s)).transpose().map_err(Into::into)
}

fn date_col(row: &SqliteRow, col: &str) -> Result<NaiveDate> {
    let raw: String = row.try_get(col)?;
    parse_date(&raw)
}

fn opt_date_col(row: &SqliteRow, col: &str) -> Result<Option<NaiveDate>> {
    let raw: Option<String> = row.try_get(col)?;
    raw.as_deref().map(parse_date).transpose()
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| StorageError::InvalidData(format!("bad date {:?}: {}", raw, e)))
}

fn timestamp_col(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(col)?;
    parse_timestamp(&raw)
}

fn opt_timestamp_col(row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(col)?;
    raw.as_deref().map(parse_timestamp).transpose()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("bad timestamp {:?}: {}", raw, e)))
}

fn enum_col<T>(row: &SqliteRow, col: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(col)?;
    raw.parse().map_err(StorageError::InvalidData)
}

pub(super) fn customer(row: &SqliteRow) -> Result<Customer> {
    Ok(Customer {
        id: uuid_col(row, "id")?,
        external_id: row.try_get("external_id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        qualifying_miles_total: row.try_get("qualifying_miles_total")?,
        bonus_miles_total: row.try_get("bonus_miles_total")?,
        member_tier: enum_col(row, "member_tier")?,
        created_at: timestamp_col(row, "created_at")?,
        updated_at: timestamp_col(row, "updated_at")?,
    })
}

pub(super) fn accrual_request(row: &SqliteRow) -> Result<AccrualRequest> {
    let distance: i64 = row.try_get("distance_miles")?;
    Ok(AccrualRequest {
        id: uuid_col(row, "id")?,
        customer_id: uuid_col(row, "customer_id")?,
        ticket_id: row.try_get("ticket_id")?,
        pnr: row.try_get("pnr")?,
        carrier: row.try_get("carrier")?,
        booking_class: row.try_get("booking_class")?,
        from_code: row.try_get("from_code")?,
        to_code: row.try_get("to_code")?,
        departure_date: date_col(row, "departure_date")?,
        ticket_image_url: row.try_get("ticket_image_url")?,
        boarding_pass_image_url: row.try_get("boarding_pass_image_url")?,
        distance_miles: u32::try_from(distance)
            .map_err(|_| StorageError::InvalidData(format!("bad distance {}", distance)))?,
        qualifying_accrual_rate: row.try_get("qualifying_accrual_rate")?,
        qualifying_miles: row.try_get("qualifying_miles")?,
        bonus_accrual_rate: row.try_get("bonus_accrual_rate")?,
        bonus_miles: row.try_get("bonus_miles")?,
        status: enum_col(row, "status")?,
        reviewer_id: row.try_get("reviewer_id")?,
        reviewed_at: opt_timestamp_col(row, "reviewed_at")?,
        reject_reason: row.try_get("reject_reason")?,
        created_at: timestamp_col(row, "created_at")?,
        updated_at: timestamp_col(row, "updated_at")?,
    })
}

pub(super) fn ledger_entry(row: &SqliteRow) -> Result<MilesLedgerEntry> {
    Ok(MilesLedgerEntry {
        id: uuid_col(row, "id")?,
        customer_id: uuid_col(row, "customer_id")?,
        qualifying_miles_delta: row.try_get("qualifying_miles_delta")?,
        bonus_miles_delta: row.try_get("bonus_miles_delta")?,
        accrual_request_id: opt_uuid_col(row, "accrual_request_id")?,
        kind: enum_col(row, "kind")?,
        earning_month: date_col(row, "earning_month")?,
        expires_at: opt_date_col(row, "expires_at")?,
        expired_month: opt_date_col(row, "expired_month")?,
        note: row.try_get("note")?,
        created_at: timestamp_col(row, "created_at")?,
    })
}

pub(super) fn membership_history(row: &SqliteRow) -> Result<MembershipHistory> {
    Ok(MembershipHistory {
        id: uuid_col(row, "id")?,
        customer_id: uuid_col(row, "customer_id")?,
        old_tier: enum_col(row, "old_tier")?,
        new_tier: enum_col(row, "new_tier")?,
        reason: enum_col(row, "reason")?,
        created_at: timestamp_col(row, "created_at")?,
    })
}

pub(super) fn travel_distance(row: &SqliteRow) -> Result<TravelDistance> {
    let miles: i64 = row.try_get("miles")?;
    Ok(TravelDistance {
        from_code: row.try_get("from_code")?,
        to_code: row.try_get("to_code")?,
        miles: u32::try_from(miles)
            .map_err(|_| StorageError::InvalidData(format!("bad distance {}", miles)))?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let late = early + chrono::Duration::milliseconds(1);
        assert_eq!(timestamp(&early), "2026-01-02T03:04:05.000000Z");
        assert!(timestamp(&early) < timestamp(&late));
        assert_eq!(parse_timestamp(&timestamp(&late)).unwrap(), late);
    }

    #[test]
    fn test_date_text() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(date(day), "2026-03-01");
        assert_eq!(parse_date("2026-03-01").unwrap(), day);
        assert!(parse_date("03/01/2026").is_err());
    }
}
