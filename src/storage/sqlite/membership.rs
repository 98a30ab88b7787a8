//! Tier aggregation and membership history storage.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_query::{Asterisk, Cond, Expr, Order, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use uuid::Uuid;

use crate::domain::MembershipHistory;
use crate::interfaces::repository::Result;
use crate::interfaces::{MembershipRepository, StorageError};
use crate::storage::schema::{Customers, MilesLedger, TierHistory};

use super::{row_exists, rows, sum_qualifying, SqliteRepository};

/// First calendar day whose midnight is at or after `at`.
///
/// `midnight(d) >= at` exactly when `d >= first_day_from(at)`, which lets the
/// window compare stored `YYYY-MM-DD` text directly.
fn first_day_from(at: DateTime<Utc>) -> NaiveDate {
    let day = at.date_naive();
    if at.time() == NaiveTime::MIN {
        day
    } else {
        day.succ_opt().unwrap_or(NaiveDate::MAX)
    }
}

#[async_trait]
impl MembershipRepository for SqliteRepository {
    async fn get_rolling_window_qualifying_miles(
        &self,
        customer_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64> {
        let mut conn = self.pool.acquire().await?;
        sum_qualifying(
            &mut conn,
            Cond::all()
                .add(Expr::col(MilesLedger::CustomerId).eq(customer_id.to_string()))
                .add(Expr::col(MilesLedger::EarningMonth).gte(rows::date(first_day_from(start))))
                .add(Expr::col(MilesLedger::EarningMonth).lt(rows::date(first_day_from(end)))),
        )
        .await
    }

    async fn update_customer_membership_tier(&self, change: &MembershipHistory) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let customer_id = change.customer_id.to_string();

        let (sql, values) = Query::update()
            .table(Customers::Table)
            .value(Customers::MemberTier, change.new_tier.as_str())
            .value(Customers::UpdatedAt, rows::timestamp(&change.created_at))
            .and_where(Expr::col(Customers::Id).eq(customer_id.clone()))
            .and_where(Expr::col(Customers::MemberTier).eq(change.old_tier.as_str()))
            .build_sqlx(SqliteQueryBuilder);

        let result = sqlx::query_with(&sql, values).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            if !row_exists(&mut tx, "customers", change.customer_id).await? {
                return Err(StorageError::NotFound(format!("customer {}", change.customer_id)));
            }
            return Ok(false);
        }

        let (sql, values) = Query::insert()
            .into_table(TierHistory::Table)
            .columns([
                TierHistory::Id,
                TierHistory::CustomerId,
                TierHistory::OldTier,
                TierHistory::NewTier,
                TierHistory::Reason,
                TierHistory::CreatedAt,
            ])
            .values_panic([
                change.id.to_string().into(),
                customer_id.into(),
                change.old_tier.as_str().into(),
                change.new_tier.as_str().into(),
                change.reason.as_str().into(),
                rows::timestamp(&change.created_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn get_membership_history(&self, customer_id: Uuid) -> Result<Vec<MembershipHistory>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(TierHistory::Table)
            .and_where(Expr::col(TierHistory::CustomerId).eq(customer_id.to_string()))
            .order_by(TierHistory::CreatedAt, Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        sqlx::query_with(&sql, values)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::membership_history)
            .collect()
    }
}
