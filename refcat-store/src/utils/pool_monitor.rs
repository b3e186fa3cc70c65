//! Connection pool monitoring utilities
//!
//! Instrumented transaction begin/commit that logs how long callers waited
//! for a pooled connection and how long they held it.

use refcat_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use crate::db::classify::classify;

/// Monitored transaction wrapper that logs acquisition and release timing
///
/// Dereferences to the underlying connection, so it can be passed wherever
/// a `&mut SqliteConnection` is expected. Dropping it without committing
/// rolls the transaction back.
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    fn new(tx: Transaction<'c, Sqlite>, caller: &'static str, acquired_at: Instant) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at,
        }
    }

    fn take(&mut self) -> Result<Transaction<'c, Sqlite>> {
        self.tx
            .take()
            .ok_or_else(|| Error::Internal(format!("{}: transaction already consumed", self.caller)))
    }

    /// Commit the transaction and log release timing
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.commit()
            .await
            .map_err(|e| classify(e, "commit", "transaction", self.caller))?;

        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms = held_ms,
                "LONG TRANSACTION - Connection held for extended period, may contribute to pool saturation"
            );
        } else {
            tracing::debug!(
                caller = self.caller,
                held_ms = held_ms,
                "Connection released (commit)"
            );
        }

        Ok(())
    }

    /// Rollback the transaction and log release timing
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.rollback()
            .await
            .map_err(|e| classify(e, "rollback", "transaction", self.caller))?;

        tracing::debug!(
            caller = self.caller,
            held_ms = self.acquired_at.elapsed().as_millis(),
            "Connection released (rollback)"
        );

        Ok(())
    }
}

impl Deref for MonitoredTransaction<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        match &self.tx {
            Some(tx) => &**tx,
            None => unreachable!("transaction is only taken by commit/rollback, which consume self"),
        }
    }
}

impl DerefMut for MonitoredTransaction<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.tx {
            Some(tx) => &mut **tx,
            None => unreachable!("transaction is only taken by commit/rollback, which consume self"),
        }
    }
}

impl Drop for MonitoredTransaction<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let held_ms = self.acquired_at.elapsed().as_millis();

            if held_ms > 2000 {
                tracing::warn!(
                    caller = self.caller,
                    held_ms = held_ms,
                    "LONG TRANSACTION DROPPED - Connection held then released via Drop (error path?)"
                );
            } else {
                tracing::debug!(
                    caller = self.caller,
                    held_ms = held_ms,
                    "Connection released (drop, rolled back)"
                );
            }
        }
    }
}

/// Begin a monitored transaction with connection pool timing logs
///
/// # Example
/// ```ignore
/// let mut tx = begin_monitored(&pool, "writer::create_with_tree").await?;
/// sqlx::query("...").execute(&mut *tx).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();

    tracing::debug!(caller = caller, "Connection acquisition requested");

    let tx = pool
        .begin()
        .await
        .map_err(|e| classify(e, "begin", "transaction", caller))?;

    let wait_ms = start.elapsed().as_millis();

    if wait_ms > 1000 {
        tracing::warn!(
            caller = caller,
            wait_ms = wait_ms,
            "SLOW CONNECTION ACQUISITION - Pool may be saturated (all connections in use)"
        );
    } else {
        tracing::debug!(caller = caller, wait_ms = wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction::new(tx, caller, Instant::now()))
}
