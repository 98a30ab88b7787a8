//! Customer storage.

use async_trait::async_trait;
use sea_query::{Asterisk, Cond, Condition, Expr, Order, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::Customer;
use crate::interfaces::repository::Result;
use crate::interfaces::{CustomerFilter, CustomerRepository};
use crate::storage::schema::Customers;
use crate::utils::Pagination;

use super::{rows, SqliteRepository};

fn customer_filter(filter: &CustomerFilter) -> Condition {
    Cond::all()
        .add_option(filter.name.as_deref().map(|name| {
            // ASCII LIKE is case-insensitive in SQLite.
            Expr::cust_with_values(
                "(first_name || ' ' || last_name) LIKE ?",
                [format!("%{}%", name)],
            )
        }))
        .add_option(
            filter
                .email
                .as_deref()
                .map(|email| Expr::col(Customers::Email).eq(email)),
        )
        .add_option(
            filter
                .phone
                .as_deref()
                .map(|phone| Expr::col(Customers::Phone).eq(phone)),
        )
}

#[async_trait]
impl CustomerRepository for SqliteRepository {
    async fn get_customer_by_id(&self, customer_id: Uuid) -> Result<Option<Customer>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(Customers::Table)
            .and_where(Expr::col(Customers::Id).eq(customer_id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rows::customer).transpose()
    }

    async fn get_customer_by_external_id(&self, external_id: &str) -> Result<Option<Customer>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(Customers::Table)
            .and_where(Expr::col(Customers::ExternalId).eq(external_id))
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rows::customer).transpose()
    }

    async fn save_customer(&self, customer: &Customer) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(Customers::Table)
            .columns([
                Customers::Id,
                Customers::ExternalId,
                Customers::Email,
                Customers::FirstName,
                Customers::LastName,
                Customers::Phone,
                Customers::QualifyingMilesTotal,
                Customers::BonusMilesTotal,
                Customers::MemberTier,
                Customers::CreatedAt,
                Customers::UpdatedAt,
            ])
            .values_panic([
                customer.id.to_string().into(),
                customer.external_id.clone().into(),
                customer.email.clone().into(),
                customer.first_name.clone().into(),
                customer.last_name.clone().into(),
                customer.phone.clone().into(),
                customer.qualifying_miles_total.into(),
                customer.bonus_miles_total.into(),
                customer.member_tier.as_str().into(),
                rows::timestamp(&customer.created_at).into(),
                rows::timestamp(&customer.updated_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        sqlx::query_with(&sql, values)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                rows::conflict_on_unique(e, || {
                    format!("customer {} already exists", customer.external_id)
                })
            })?;
        Ok(())
    }

    async fn list_customers(&self, filter: &CustomerFilter) -> Result<(Vec<Customer>, u64)> {
        let cond = customer_filter(filter);

        let (count_sql, count_values) = Query::select()
            .expr(Expr::col(Asterisk).count())
            .from(Customers::Table)
            .cond_where(cond.clone())
            .build_sqlx(SqliteQueryBuilder);
        let total: i64 = sqlx::query_with(&count_sql, count_values)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let (offset, limit) = filter.pagination.offset_limit();
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(Customers::Table)
            .cond_where(cond)
            .order_by(Customers::CreatedAt, Order::Asc)
            .order_by(Customers::Id, Order::Asc)
            .limit(limit)
            .offset(offset)
            .build_sqlx(SqliteQueryBuilder);

        let customers = sqlx::query_with(&sql, values)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::customer)
            .collect::<Result<Vec<_>>>()?;

        Ok((customers, total.max(0) as u64))
    }

    async fn get_all_customer_ids(&self, page: u32, size: u32) -> Result<(Vec<Uuid>, u64)> {
        let (count_sql, count_values) = Query::select()
            .expr(Expr::col(Asterisk).count())
            .from(Customers::Table)
            .build_sqlx(SqliteQueryBuilder);
        let total: i64 = sqlx::query_with(&count_sql, count_values)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let (offset, limit) = Pagination::new(page, size).offset_limit();
        let (sql, values) = Query::select()
            .column(Customers::Id)
            .from(Customers::Table)
            .order_by(Customers::CreatedAt, Order::Asc)
            .order_by(Customers::Id, Order::Asc)
            .limit(limit)
            .offset(offset)
            .build_sqlx(SqliteQueryBuilder);

        let ids = sqlx::query_with(&sql, values)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<Uuid> {
                let raw: String = row.try_get(0)?;
                Ok(Uuid::parse_str(&raw)?)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((ids, total.max(0) as u64))
    }
}
