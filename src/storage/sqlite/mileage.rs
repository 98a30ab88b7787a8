//! Accrual request, route and ledger storage.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_query::{Asterisk, Cond, Condition, Expr, Order, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{
    location_code, AccrualRequest, LedgerKind, MilesLedgerEntry, RequestStatus, Review,
    TravelDistance,
};
use crate::interfaces::repository::Result;
use crate::interfaces::{AccrualRequestFilter, LedgerFilter, MileageRepository, StorageError};
use crate::storage::schema::{AccrualRequests, MilesLedger, TravelDistances};
use crate::utils::month::month_start;

use super::{add_to_totals, row_exists, rows, sum_qualifying, SqliteRepository};

fn request_filter(filter: &AccrualRequestFilter) -> Condition {
    Cond::all()
        .add_option(
            filter
                .customer_id
                .map(|id| Expr::col(AccrualRequests::CustomerId).eq(id.to_string())),
        )
        .add_option(
            filter
                .status
                .map(|s| Expr::col(AccrualRequests::Status).eq(s.as_str())),
        )
        .add_option(filter.keyword.as_deref().map(|k| {
            Cond::any()
                .add(Expr::col(AccrualRequests::TicketId).eq(k))
                .add(Expr::col(AccrualRequests::Pnr).eq(k))
        }))
        .add_option(filter.submitted_on.map(|day| {
            let next = day.succ_opt().unwrap_or(day);
            Cond::all()
                .add(Expr::col(AccrualRequests::CreatedAt).gte(rows::date(day)))
                .add(Expr::col(AccrualRequests::CreatedAt).lt(rows::date(next)))
        }))
}

fn ledger_filter(filter: &LedgerFilter) -> Condition {
    Cond::all()
        .add_option(
            filter
                .customer_id
                .map(|id| Expr::col(MilesLedger::CustomerId).eq(id.to_string())),
        )
        .add_option(
            filter
                .earning_month
                .map(|m| Expr::col(MilesLedger::EarningMonth).eq(rows::date(month_start(m)))),
        )
}

fn route_condition(from_code: &str, to_code: &str) -> Condition {
    let (from_code, to_code) = (location_code(from_code), location_code(to_code));
    Cond::any()
        .add(
            Cond::all()
                .add(Expr::col(TravelDistances::FromCode).eq(from_code.as_str()))
                .add(Expr::col(TravelDistances::ToCode).eq(to_code.as_str())),
        )
        .add(
            Cond::all()
                .add(Expr::col(TravelDistances::FromCode).eq(to_code.as_str()))
                .add(Expr::col(TravelDistances::ToCode).eq(from_code.as_str())),
        )
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &MilesLedgerEntry) -> Result<()> {
    if entry.kind == LedgerKind::Expire && entry.expired_month.is_none() {
        return Err(StorageError::InvalidData(
            "expire entry without expired month".to_string(),
        ));
    }

    let (sql, values) = Query::insert()
        .into_table(MilesLedger::Table)
        .columns([
            MilesLedger::Id,
            MilesLedger::CustomerId,
            MilesLedger::QualifyingMilesDelta,
            MilesLedger::BonusMilesDelta,
            MilesLedger::AccrualRequestId,
            MilesLedger::Kind,
            MilesLedger::EarningMonth,
            MilesLedger::ExpiresAt,
            MilesLedger::ExpiredMonth,
            MilesLedger::Note,
            MilesLedger::CreatedAt,
        ])
        .values_panic([
            entry.id.to_string().into(),
            entry.customer_id.to_string().into(),
            entry.qualifying_miles_delta.into(),
            entry.bonus_miles_delta.into(),
            entry.accrual_request_id.map(|id| id.to_string()).into(),
            entry.kind.as_str().into(),
            rows::date(entry.earning_month).into(),
            entry.expires_at.map(rows::date).into(),
            entry.expired_month.map(|m| rows::date(month_start(m))).into(),
            entry.note.clone().into(),
            rows::timestamp(&entry.created_at).into(),
        ])
        .build_sqlx(SqliteQueryBuilder);

    sqlx::query_with(&sql, values)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            rows::conflict_on_unique(e, || match entry.kind {
                LedgerKind::Expire => format!(
                    "customer {} already has an expire entry for {:?}",
                    entry.customer_id, entry.expired_month
                ),
                _ => format!("ledger entry {} already recorded", entry.id),
            })
        })?;
    Ok(())
}

/// Move an in-progress request to `status`. Returns rows changed.
async fn review_request(
    conn: &mut SqliteConnection,
    request_id: Uuid,
    status: RequestStatus,
    review: &Review,
) -> Result<u64> {
    let reviewed_at = rows::timestamp(&review.reviewed_at);
    let (sql, values) = Query::update()
        .table(AccrualRequests::Table)
        .value(AccrualRequests::Status, status.as_str())
        .value(AccrualRequests::ReviewerId, review.reviewer_id.clone())
        .value(AccrualRequests::ReviewedAt, reviewed_at.clone())
        .value(AccrualRequests::RejectReason, review.reject_reason.clone())
        .value(AccrualRequests::UpdatedAt, reviewed_at)
        .and_where(Expr::col(AccrualRequests::Id).eq(request_id.to_string()))
        .and_where(Expr::col(AccrualRequests::Status).eq(RequestStatus::InProgress.as_str()))
        .build_sqlx(SqliteQueryBuilder);

    let result = sqlx::query_with(&sql, values).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl MileageRepository for SqliteRepository {
    async fn get_accrual_request_by_filter(
        &self,
        customer_id: Uuid,
        ticket_id: &str,
        pnr: &str,
    ) -> Result<Option<AccrualRequest>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(AccrualRequests::Table)
            .and_where(Expr::col(AccrualRequests::CustomerId).eq(customer_id.to_string()))
            .and_where(Expr::col(AccrualRequests::TicketId).eq(ticket_id))
            .and_where(Expr::col(AccrualRequests::Pnr).eq(pnr))
            .and_where(Expr::col(AccrualRequests::Status).ne(RequestStatus::Rejected.as_str()))
            .limit(1)
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rows::accrual_request).transpose()
    }

    async fn save_accrual_request(&self, request: &AccrualRequest) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(AccrualRequests::Table)
            .columns([
                AccrualRequests::Id,
                AccrualRequests::CustomerId,
                AccrualRequests::TicketId,
                AccrualRequests::Pnr,
                AccrualRequests::Carrier,
                AccrualRequests::BookingClass,
                AccrualRequests::FromCode,
                AccrualRequests::ToCode,
                AccrualRequests::DepartureDate,
                AccrualRequests::TicketImageUrl,
                AccrualRequests::BoardingPassImageUrl,
                AccrualRequests::DistanceMiles,
                AccrualRequests::QualifyingAccrualRate,
                AccrualRequests::QualifyingMiles,
                AccrualRequests::BonusAccrualRate,
                AccrualRequests::BonusMiles,
                AccrualRequests::Status,
                AccrualRequests::ReviewerId,
                AccrualRequests::ReviewedAt,
                AccrualRequests::RejectReason,
                AccrualRequests::CreatedAt,
                AccrualRequests::UpdatedAt,
            ])
            .values_panic([
                request.id.to_string().into(),
                request.customer_id.to_string().into(),
                request.ticket_id.clone().into(),
                request.pnr.clone().into(),
                request.carrier.clone().into(),
                request.booking_class.clone().into(),
                request.from_code.clone().into(),
                request.to_code.clone().into(),
                rows::date(request.departure_date).into(),
                request.ticket_image_url.clone().into(),
                request.boarding_pass_image_url.clone().into(),
                i64::from(request.distance_miles).into(),
                request.qualifying_accrual_rate.into(),
                request.qualifying_miles.into(),
                request.bonus_accrual_rate.into(),
                request.bonus_miles.into(),
                request.status.as_str().into(),
                request.reviewer_id.clone().into(),
                request.reviewed_at.as_ref().map(rows::timestamp).into(),
                request.reject_reason.clone().into(),
                rows::timestamp(&request.created_at).into(),
                rows::timestamp(&request.updated_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        sqlx::query_with(&sql, values)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                rows::conflict_on_unique(e, || {
                    format!(
                        "accrual request for ticket {} / {} already exists",
                        request.ticket_id, request.pnr
                    )
                })
            })?;
        Ok(())
    }

    async fn get_accrual_request(&self, request_id: Uuid) -> Result<Option<AccrualRequest>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(AccrualRequests::Table)
            .and_where(Expr::col(AccrualRequests::Id).eq(request_id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rows::accrual_request).transpose()
    }

    async fn list_accrual_requests(
        &self,
        filter: &AccrualRequestFilter,
    ) -> Result<(Vec<AccrualRequest>, u64)> {
        let cond = request_filter(filter);

        let (count_sql, count_values) = Query::select()
            .expr(Expr::col(Asterisk).count())
            .from(AccrualRequests::Table)
            .cond_where(cond.clone())
            .build_sqlx(SqliteQueryBuilder);
        let total: i64 = sqlx::query_with(&count_sql, count_values)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let (offset, limit) = filter.pagination.offset_limit();
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(AccrualRequests::Table)
            .cond_where(cond)
            .order_by(AccrualRequests::CreatedAt, Order::Desc)
            .order_by(AccrualRequests::Id, Order::Asc)
            .limit(limit)
            .offset(offset)
            .build_sqlx(SqliteQueryBuilder);

        let requests = sqlx::query_with(&sql, values)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::accrual_request)
            .collect::<Result<Vec<_>>>()?;

        Ok((requests, total.max(0) as u64))
    }

    async fn approve_accrual_request(
        &self,
        request_id: Uuid,
        review: &Review,
        entry: &MilesLedgerEntry,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if review_request(&mut tx, request_id, RequestStatus::Approved, review).await? == 0 {
            if !row_exists(&mut tx, "accrual_requests", request_id).await? {
                return Err(StorageError::NotFound(format!("accrual request {}", request_id)));
            }
            return Ok(false);
        }

        let updated_at = rows::timestamp(&review.reviewed_at);
        add_to_totals(
            &mut tx,
            entry.customer_id,
            entry.qualifying_miles_delta,
            entry.bonus_miles_delta,
            &updated_at,
        )
        .await?;
        insert_entry(&mut tx, entry).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn reject_accrual_request(&self, request_id: Uuid, review: &Review) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if review_request(&mut tx, request_id, RequestStatus::Rejected, review).await? == 0 {
            if !row_exists(&mut tx, "accrual_requests", request_id).await? {
                return Err(StorageError::NotFound(format!("accrual request {}", request_id)));
            }
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn get_travel_distance(
        &self,
        from_code: &str,
        to_code: &str,
    ) -> Result<Option<TravelDistance>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(TravelDistances::Table)
            .cond_where(route_condition(from_code, to_code))
            .limit(1)
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rows::travel_distance).transpose()
    }

    async fn save_travel_distance(&self, distance: &TravelDistance) -> Result<()> {
        let distance = distance.normalized();
        let mut tx = self.pool.begin().await?;

        let (sql, values) = Query::delete()
            .from_table(TravelDistances::Table)
            .cond_where(route_condition(&distance.from_code, &distance.to_code))
            .build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&mut *tx).await?;

        let (sql, values) = Query::insert()
            .into_table(TravelDistances::Table)
            .columns([
                TravelDistances::FromCode,
                TravelDistances::ToCode,
                TravelDistances::Miles,
            ])
            .values_panic([
                distance.from_code.clone().into(),
                distance.to_code.clone().into(),
                i64::from(distance.miles).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save_mileage_ledger(&self, entry: &MilesLedgerEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated_at = rows::timestamp(&Utc::now());
        add_to_totals(
            &mut tx,
            entry.customer_id,
            entry.qualifying_miles_delta,
            entry.bonus_miles_delta,
            &updated_at,
        )
        .await?;
        insert_entry(&mut tx, entry).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_mileage_ledgers(
        &self,
        filter: &LedgerFilter,
    ) -> Result<(Vec<MilesLedgerEntry>, u64)> {
        let cond = ledger_filter(filter);

        let (count_sql, count_values) = Query::select()
            .expr(Expr::col(Asterisk).count())
            .from(MilesLedger::Table)
            .cond_where(cond.clone())
            .build_sqlx(SqliteQueryBuilder);
        let total: i64 = sqlx::query_with(&count_sql, count_values)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let (offset, limit) = filter.pagination.offset_limit();
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(MilesLedger::Table)
            .cond_where(cond)
            .order_by(MilesLedger::CreatedAt, Order::Desc)
            .order_by(MilesLedger::Id, Order::Asc)
            .limit(limit)
            .offset(offset)
            .build_sqlx(SqliteQueryBuilder);

        let entries = sqlx::query_with(&sql, values)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::ledger_entry)
            .collect::<Result<Vec<_>>>()?;

        Ok((entries, total.max(0) as u64))
    }

    async fn get_customers_with_positive_qm_deltas_for_month(
        &self,
        month: NaiveDate,
    ) -> Result<Vec<Uuid>> {
        let (sql, values) = Query::select()
            .distinct()
            .column(MilesLedger::CustomerId)
            .from(MilesLedger::Table)
            .and_where(Expr::col(MilesLedger::EarningMonth).eq(rows::date(month_start(month))))
            .and_where(Expr::col(MilesLedger::QualifyingMilesDelta).gt(0.0))
            .order_by(MilesLedger::CustomerId, Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        sqlx::query_with(&sql, values)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<Uuid> {
                let raw: String = row.try_get(0)?;
                Ok(Uuid::parse_str(&raw)?)
            })
            .collect()
    }

    async fn get_total_qm_deltas_for_customer_and_month(
        &self,
        customer_id: Uuid,
        month: NaiveDate,
    ) -> Result<f64> {
        let mut conn = self.pool.acquire().await?;
        sum_qualifying(
            &mut conn,
            Cond::all()
                .add(Expr::col(MilesLedger::CustomerId).eq(customer_id.to_string()))
                .add(Expr::col(MilesLedger::EarningMonth).eq(rows::date(month_start(month))))
                .add(Expr::col(MilesLedger::Kind).ne(LedgerKind::Expire.as_str())),
        )
        .await
    }

    async fn check_expire_record_exists(
        &self,
        customer_id: Uuid,
        month: NaiveDate,
    ) -> Result<bool> {
        let (sql, values) = Query::select()
            .expr(Expr::col(Asterisk).count())
            .from(MilesLedger::Table)
            .and_where(Expr::col(MilesLedger::CustomerId).eq(customer_id.to_string()))
            .and_where(Expr::col(MilesLedger::Kind).eq(LedgerKind::Expire.as_str()))
            .and_where(Expr::col(MilesLedger::ExpiredMonth).eq(rows::date(month_start(month))))
            .build_sqlx(SqliteQueryBuilder);

        let count: i64 = sqlx::query_with(&sql, values)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        Ok(count > 0)
    }
}
