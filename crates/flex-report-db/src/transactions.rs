//! Transaction support for the ORM.
//!
//! Transactions are managed through the [`TransactionManager`], which holds
//! one connection pinned from a [`DbExecutor`] and tracks the nesting depth.
//! The [`atomic()`] function is the primary entry point: it runs a closure
//! inside a transaction, committing on `Ok` and rolling back on `Err`.
//! Statements run through the manager never leave the pinned connection.
//!
//! Nested `begin()` calls create savepoints rather than nested transactions.
//!
//! ```ignore
//! use flex_report_db::transactions::atomic;
//!
//! atomic(db, |txn| async move {
//!     txn.execute_sql("UPDATE report_template SET is_page_default = 0", &[]).await?;
//!     Ok(())
//! }).await?;
//! ```

use crate::executor::DbExecutor;
use crate::query::compiler::{DatabaseBackendType, Row};
use crate::value::Value;
use flex_report_core::{ReportError, ReportResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Counter for generating unique savepoint names.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_savepoint_name() -> String {
    let id = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sp_{id}")
}

/// Manages transaction state for a database connection.
pub struct TransactionManager<'a> {
    /// The pinned connection.
    conn: Box<dyn DbExecutor + 'a>,
    /// Current nesting depth (0 = no transaction, 1 = outermost, 2+ = savepoint).
    depth: Mutex<u32>,
    /// Names of the active savepoints, innermost last.
    savepoints: Mutex<Vec<String>>,
}

impl<'a> TransactionManager<'a> {
    /// Pins a connection of `db` for a new transaction manager.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be obtained.
    pub async fn new(db: &'a dyn DbExecutor) -> ReportResult<Self> {
        Ok(Self {
            conn: db.pin_connection().await?,
            depth: Mutex::new(0),
            savepoints: Mutex::new(Vec::new()),
        })
    }

    /// Returns the current transaction nesting depth.
    pub async fn depth(&self) -> u32 {
        *self.depth.lock().await
    }

    /// Begins a new transaction or creates a savepoint if already in one.
    pub async fn begin(&self) -> ReportResult<()> {
        let mut depth = self.depth.lock().await;
        if *depth == 0 {
            self.conn.execute_sql("BEGIN", &[]).await?;
        } else {
            let name = next_savepoint_name();
            self.conn.execute_sql(&format!("SAVEPOINT {name}"), &[]).await?;
            self.savepoints.lock().await.push(name);
        }
        *depth += 1;
        Ok(())
    }

    /// Commits the current transaction or releases the current savepoint.
    pub async fn commit(&self) -> ReportResult<()> {
        let mut depth = self.depth.lock().await;
        match *depth {
            0 => Err(ReportError::DatabaseError(
                "Cannot commit: not in a transaction".to_string(),
            )),
            1 => {
                self.conn.execute_sql("COMMIT", &[]).await?;
                *depth = 0;
                Ok(())
            }
            _ => {
                if let Some(name) = self.savepoints.lock().await.pop() {
                    self.conn
                        .execute_sql(&format!("RELEASE SAVEPOINT {name}"), &[])
                        .await?;
                }
                *depth -= 1;
                Ok(())
            }
        }
    }

    /// Rolls back the current transaction or savepoint.
    pub async fn rollback(&self) -> ReportResult<()> {
        let mut depth = self.depth.lock().await;
        match *depth {
            0 => Err(ReportError::DatabaseError(
                "Cannot rollback: not in a transaction".to_string(),
            )),
            1 => {
                self.conn.execute_sql("ROLLBACK", &[]).await?;
                *depth = 0;
                Ok(())
            }
            _ => {
                if let Some(name) = self.savepoints.lock().await.pop() {
                    self.conn
                        .execute_sql(&format!("ROLLBACK TO SAVEPOINT {name}"), &[])
                        .await?;
                }
                *depth -= 1;
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl DbExecutor for TransactionManager<'_> {
    fn backend_type(&self) -> DatabaseBackendType {
        self.conn.backend_type()
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> ReportResult<u64> {
        self.conn.execute_sql(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>> {
        self.conn.query(sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> ReportResult<Row> {
        self.conn.query_one(sql, params).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> ReportResult<Value> {
        self.conn.insert_returning_id(sql, params).await
    }
}

/// Executes a closure within a database transaction.
///
/// If the closure returns `Ok`, the transaction is committed. If it returns
/// `Err`, the transaction is rolled back and the original error returned.
pub async fn atomic<'a, F, Fut, T>(db: &'a dyn DbExecutor, f: F) -> ReportResult<T>
where
    F: FnOnce(Arc<TransactionManager<'a>>) -> Fut,
    Fut: std::future::Future<Output = ReportResult<T>>,
{
    let txn = Arc::new(TransactionManager::new(db).await?);
    txn.begin().await?;

    match f(Arc::clone(&txn)).await {
        Ok(result) => {
            txn.commit().await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}
