//! SQLite implementation of the repository.
//!
//! Every multi-row operation runs in one transaction that starts with its
//! guarded write, so the write lock is taken before anything is read. A
//! dropped transaction rolls back, which keeps cancelled job runs clean.

mod customers;
mod membership;
mod mileage;
mod rows;

use sea_query::{Alias, Asterisk, Condition, Expr, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::config::SqliteConfig;
use crate::interfaces::repository::Result;
use crate::interfaces::{
    CustomerRepository, MembershipRepository, MileageRepository, Repository, StorageError,
};

use super::schema::{
    Customers, MilesLedger, CREATE_ACCRUAL_REQUESTS_TABLE, CREATE_CUSTOMERS_TABLE,
    CREATE_MEMBERSHIP_HISTORY_TABLE, CREATE_MILES_LEDGER_TABLE, CREATE_TRAVEL_DISTANCES_TABLE,
};

/// SQLite-backed repository.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Create a repository over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `config`.
    ///
    /// An in-memory database lives per connection, so it gets exactly one.
    pub async fn connect(config: &SqliteConfig) -> Result<Self> {
        let max_connections = if config.path == ":memory:" {
            1
        } else {
            config.max_connections.max(1)
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&config.connection_string())
            .await?;
        Ok(Self::new(pool))
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        for ddl in [
            CREATE_CUSTOMERS_TABLE,
            CREATE_ACCRUAL_REQUESTS_TABLE,
            CREATE_MILES_LEDGER_TABLE,
            CREATE_MEMBERSHIP_HISTORY_TABLE,
            CREATE_TRAVEL_DISTANCES_TABLE,
        ] {
            sqlx::raw_sql(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Add ledger deltas to a customer's totals. `NotFound` when no row moved.
async fn add_to_totals(
    conn: &mut SqliteConnection,
    customer_id: Uuid,
    qualifying_delta: f64,
    bonus_delta: f64,
    updated_at: &str,
) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Customers::Table)
        .value(
            Customers::QualifyingMilesTotal,
            Expr::col(Customers::QualifyingMilesTotal).add(qualifying_delta),
        )
        .value(
            Customers::BonusMilesTotal,
            Expr::col(Customers::BonusMilesTotal).add(bonus_delta),
        )
        .value(Customers::UpdatedAt, updated_at)
        .and_where(Expr::col(Customers::Id).eq(customer_id.to_string()))
        .build_sqlx(SqliteQueryBuilder);

    let result = sqlx::query_with(&sql, values).execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound(format!("customer {}", customer_id)));
    }
    Ok(())
}

/// Sum of qualifying deltas over the ledger rows matching `cond`.
async fn sum_qualifying(conn: &mut SqliteConnection, cond: Condition) -> Result<f64> {
    let (sql, values) = Query::select()
        .expr(Expr::col(MilesLedger::QualifyingMilesDelta).sum())
        .from(MilesLedger::Table)
        .cond_where(cond)
        .build_sqlx(SqliteQueryBuilder);

    let row = sqlx::query_with(&sql, values).fetch_one(&mut *conn).await?;
    let total: Option<f64> = row.try_get(0)?;
    Ok(total.unwrap_or(0.0))
}

/// Whether a row with `id` exists in `table`.
async fn row_exists(conn: &mut SqliteConnection, table: &str, id: Uuid) -> Result<bool> {
    let (sql, values) = Query::select()
        .expr(Expr::col(Asterisk).count())
        .from(Alias::new(table))
        .and_where(Expr::col(Alias::new("id")).eq(id.to_string()))
        .build_sqlx(SqliteQueryBuilder);

    let row = sqlx::query_with(&sql, values).fetch_one(&mut *conn).await?;
    let count: i64 = row.try_get(0)?;
    Ok(count > 0)
}

impl Repository for SqliteRepository {
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
