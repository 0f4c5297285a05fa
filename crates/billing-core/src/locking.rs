use std::future::Future;

use sqlx::{PgPool, Postgres, Transaction};

use crate::error::Error;
use crate::Result;

/// Per-customer advisory lock coupled to a DB transaction (C2). This is the
/// single mutual-exclusion primitive for every write path that touches a
/// given customer's billing state; ordering between customers is
/// unconstrained.
pub struct CustomerLock {
    pool: PgPool,
    timeout_secs: u64,
}

impl CustomerLock {
    pub fn new(pool: PgPool, timeout_secs: u64) -> Self {
        Self { pool, timeout_secs }
    }

    /// Opens a transaction, sets a lock-wait budget, blocks on the exclusive
    /// advisory lock keyed on `customer_id`, runs `f(tx)`, and commits.
    /// Releases the lock on commit or rollback since Postgres ties
    /// transaction-level advisory locks to the transaction's lifetime.
    pub async fn with_customer_lock<F, Fut, T>(&self, customer_id: i32, f: F) -> Result<T>
    where
        F: FnOnce(Transaction<'_, Postgres>) -> Fut,
        Fut: Future<Output = Result<(Transaction<'_, Postgres>, T)>>,
    {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("SET LOCAL lock_timeout = '{}s'", self.timeout_secs))
            .execute(&mut *tx)
            .await?;

        let lock_result = sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(customer_id as i64)
            .execute(&mut *tx)
            .await;

        if let Err(e) = lock_result {
            tx.rollback().await.ok();
            return Err(classify_lock_error(e, customer_id));
        }

        let (tx, value) = f(tx).await?;
        tx.commit().await?;
        Ok(value)
    }

    /// Non-blocking variant: attempts `pg_try_advisory_xact_lock` and returns
    /// `Ok(None)` immediately if the lock is already held elsewhere, instead
    /// of waiting out the timeout.
    pub async fn try_customer_lock<F, Fut, T>(&self, customer_id: i32, f: F) -> Result<Option<T>>
    where
        F: FnOnce(Transaction<'_, Postgres>) -> Fut,
        Fut: Future<Output = Result<(Transaction<'_, Postgres>, T)>>,
    {
        let mut tx = self.pool.begin().await?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(customer_id as i64)
            .fetch_one(&mut *tx)
            .await?;

        if !acquired {
            tx.rollback().await.ok();
            return Ok(None);
        }

        let (tx, value) = f(tx).await?;
        tx.commit().await?;
        Ok(Some(value))
    }
}

fn classify_lock_error(e: sqlx::Error, customer_id: i32) -> Error {
    let timed_out = matches!(&e, sqlx::Error::Database(db) if db.code().as_deref() == Some("55P03"));
    if timed_out {
        Error::LockTimeout { customer_id }
    } else {
        Error::Database(e)
    }
}
