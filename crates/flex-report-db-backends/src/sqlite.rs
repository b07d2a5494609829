//! SQLite database backend using `rusqlite`.
//!
//! [`SqliteBackend`] implements [`DbExecutor`] on top of a single
//! `rusqlite::Connection` behind an async mutex. Every statement runs in
//! `tokio::task::spawn_blocking` so the driver never blocks the runtime.
//!
//! [`atomic`](flex_report_db::transactions::atomic) pins the connection by
//! holding the mutex guard for the whole transaction, so statements from
//! other tasks sharing the backend wait until it commits or rolls back.

use std::path::PathBuf;
use std::sync::Arc;

use flex_report_core::{ReportError, ReportResult};
use flex_report_db::query::compiler::{DatabaseBackendType, Row};
use flex_report_db::value::Value;
use flex_report_db::DbExecutor;
use rusqlite::types::ValueRef;
use rusqlite::ErrorCode;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Guard = OwnedMutexGuard<rusqlite::Connection>;

/// A SQLite database backend.
pub struct SqliteBackend {
    path: PathBuf,
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").field("path", &self.path).finish_non_exhaustive()
    }
}

/// Maps a driver error into the report error taxonomy.
///
/// Constraint violations become `IntegrityError`; everything else is a
/// `DatabaseError`.
pub(crate) fn map_sqlite_error(err: rusqlite::Error) -> ReportError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            ReportError::IntegrityError(err.to_string())
        }
        _ => ReportError::DatabaseError(err.to_string()),
    }
}

impl SqliteBackend {
    /// Opens a SQLite database at the given path.
    ///
    /// `:memory:` opens an in-memory database. File databases use WAL
    /// journaling; foreign keys are enforced in both cases.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> ReportResult<Self> {
        let path = path.into();
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| ReportError::DatabaseError(format!("SQLite open failed: {e}")))?;

        let pragmas = if in_memory {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"
        };
        conn.execute_batch(pragmas)
            .map_err(|e| ReportError::DatabaseError(format!("Failed to set pragmas: {e}")))?;

        tracing::debug!(path = %path.display(), "opened sqlite database");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database.
    pub fn memory() -> ReportResult<Self> {
        Self::open(":memory:")
    }

    /// Returns the database file path.
    pub const fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Runs several `;`-separated statements without parameters.
    pub async fn execute_batch(&self, sql: &str) -> ReportResult<()> {
        let conn = Arc::clone(&self.conn).lock_owned().await;
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || conn.execute_batch(&sql).map_err(map_sqlite_error))
            .await
            .map_err(|e| ReportError::DatabaseError(format!("Task join error: {e}")))?
    }

    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> ReportResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, d.format("%Y-%m-%d").to_string()),
                Value::DateTime(dt) => {
                    stmt.raw_bind_parameter(idx, dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
                }
                Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339()),
                Value::Time(t) => stmt.raw_bind_parameter(idx, t.format("%H:%M:%S%.f").to_string()),
                Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string()),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string()),
                Value::List(_) => stmt.raw_bind_parameter(idx, param.to_json().to_string()),
            }
            .map_err(|e| ReportError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values = (0..column_names.len())
            .map(|i| match sqlite_row.get_ref(i).unwrap_or(ValueRef::Null) {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(v) => Value::Int(v),
                ValueRef::Real(v) => Value::Float(v),
                ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
                ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
            })
            .collect();
        Row::new(column_names.to_vec(), values)
    }

    async fn run<T, F>(&self, sql: &str, params: &[Value], f: F) -> ReportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection, &mut rusqlite::Statement<'_>) -> ReportResult<T> + Send + 'static,
    {
        let guard = Arc::clone(&self.conn).lock_owned().await;
        run_locked(guard, sql, params, f).await.1
    }
}

/// Runs one statement on a locked connection in a blocking task and hands
/// the guard back. The guard is `None` only if the task panicked.
async fn run_locked<T, F>(guard: Guard, sql: &str, params: &[Value], f: F) -> (Option<Guard>, ReportResult<T>)
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection, &mut rusqlite::Statement<'_>) -> ReportResult<T> + Send + 'static,
{
    let sql = sql.to_string();
    let params = params.to_vec();
    let task = tokio::task::spawn_blocking(move || {
        let result = guard
            .prepare(&sql)
            .map_err(map_sqlite_error)
            .and_then(|mut stmt| {
                SqliteBackend::bind_params(&mut stmt, &params)?;
                f(&guard, &mut stmt)
            });
        (guard, result)
    });
    match task.await {
        Ok((guard, result)) => (Some(guard), result),
        Err(e) => (None, Err(ReportError::DatabaseError(format!("Task join error: {e}")))),
    }
}

fn execute(_: &rusqlite::Connection, stmt: &mut rusqlite::Statement<'_>) -> ReportResult<u64> {
    let count = stmt.raw_execute().map_err(map_sqlite_error)?;
    Ok(count as u64)
}

fn fetch(_: &rusqlite::Connection, stmt: &mut rusqlite::Statement<'_>) -> ReportResult<Vec<Row>> {
    let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut raw_rows = stmt.raw_query();
    let mut rows = Vec::new();
    while let Some(row) = raw_rows.next().map_err(map_sqlite_error)? {
        rows.push(SqliteBackend::convert_row(row, &column_names));
    }
    Ok(rows)
}

fn insert(conn: &rusqlite::Connection, stmt: &mut rusqlite::Statement<'_>) -> ReportResult<Value> {
    stmt.raw_execute().map_err(map_sqlite_error)?;
    Ok(Value::Int(conn.last_insert_rowid()))
}

/// The backend's connection, locked until this handle is dropped.
struct PinnedConnection {
    guard: Mutex<Option<Guard>>,
}

impl PinnedConnection {
    async fn run<T, F>(&self, sql: &str, params: &[Value], f: F) -> ReportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection, &mut rusqlite::Statement<'_>) -> ReportResult<T> + Send + 'static,
    {
        let mut slot = self.guard.lock().await;
        let guard = slot
            .take()
            .ok_or_else(|| ReportError::DatabaseError("pinned sqlite connection was lost".into()))?;
        let (guard, result) = run_locked(guard, sql, params, f).await;
        *slot = guard;
        result
    }
}

#[async_trait::async_trait]
impl DbExecutor for PinnedConnection {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> ReportResult<u64> {
        self.run(sql, params, execute).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>> {
        self.run(sql, params, fetch).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> ReportResult<Value> {
        self.run(sql, params, insert).await
    }
}

#[async_trait::async_trait]
impl DbExecutor for SqliteBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn pin_connection<'a>(&'a self) -> ReportResult<Box<dyn DbExecutor + 'a>> {
        let guard = Arc::clone(&self.conn).lock_owned().await;
        Ok(Box::new(PinnedConnection {
            guard: Mutex::new(Some(guard)),
        }))
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> ReportResult<u64> {
        self.run(sql, params, execute).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>> {
        self.run(sql, params, fetch).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> ReportResult<Value> {
        self.run(sql, params, insert).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flex_report_db::query::compiler::SqlCompiler;

    async fn backend_with_table() -> SqliteBackend {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute_sql(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, age INTEGER, score REAL)",
                &[],
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_sqlite_memory_open() {
        let backend = SqliteBackend::memory().unwrap();
        assert_eq!(backend.backend_type(), DatabaseBackendType::SQLite);
        assert_eq!(backend.path().to_str(), Some(":memory:"));
    }

    #[tokio::test]
    async fn test_sqlite_insert_and_query() {
        let backend = backend_with_table().await;
        let id = backend
            .insert_returning_id(
                "INSERT INTO users (name, age, score) VALUES (?, ?, ?)",
                &[Value::from("Alice"), Value::Int(30), Value::Null],
            )
            .await
            .unwrap();
        assert_eq!(id, Value::Int(1));

        let rows = backend.query("SELECT id, name, age, score FROM users", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Alice");
        assert_eq!(rows[0].get::<i64>("age").unwrap(), 30);
        assert_eq!(rows[0].get::<Option<f64>>("score").unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_query_one() {
        let backend = backend_with_table().await;
        backend
            .execute_sql("INSERT INTO users (name) VALUES (?)", &[Value::from("a")])
            .await
            .unwrap();
        let row = backend
            .query_one("SELECT name FROM users WHERE id = ?", &[Value::Int(1)])
            .await
            .unwrap();
        assert_eq!(row.get::<String>("name").unwrap(), "a");

        let missing = backend
            .query_one("SELECT name FROM users WHERE id = ?", &[Value::Int(9)])
            .await;
        assert!(matches!(missing, Err(ReportError::DoesNotExist(_))));
    }

    #[tokio::test]
    async fn test_sqlite_unique_violation_is_integrity_error() {
        let backend = backend_with_table().await;
        let insert = "INSERT INTO users (name) VALUES (?)";
        backend.execute_sql(insert, &[Value::from("dup")]).await.unwrap();
        let err = backend.execute_sql(insert, &[Value::from("dup")]).await.unwrap_err();
        assert!(matches!(err, ReportError::IntegrityError(_)));
    }

    #[tokio::test]
    async fn test_sqlite_syntax_error_is_database_error() {
        let backend = SqliteBackend::memory().unwrap();
        let err = backend.query("SELEC 1", &[]).await.unwrap_err();
        assert!(matches!(err, ReportError::DatabaseError(_)));
    }

    #[tokio::test]
    async fn test_sqlite_compiled_update_and_delete() {
        let backend = backend_with_table().await;
        let compiler = SqlCompiler::new(DatabaseBackendType::SQLite);
        let (sql, params) = compiler.compile_insert("users", &[("name", Value::from("bob")), ("age", Value::Int(3))]);
        backend.execute_sql(&sql, &params).await.unwrap();

        let pk = flex_report_db::WhereNode::Condition {
            column: "id".into(),
            lookup: flex_report_db::Lookup::Exact(Value::Int(1)),
        };
        let (sql, params) = compiler.compile_update("users", &[("age", Value::Int(4))], &pk);
        assert_eq!(backend.execute_sql(&sql, &params).await.unwrap(), 1);
        let (sql, params) = compiler.compile_delete("users", &pk);
        assert_eq!(backend.execute_sql(&sql, &params).await.unwrap(), 1);
        assert!(backend.query("SELECT * FROM users", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_booleans_and_dates_bind_as_text_and_int() {
        let backend = SqliteBackend::memory().unwrap();
        backend.execute_batch("CREATE TABLE t (flag INTEGER, day TEXT)").await.unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        backend
            .execute_sql("INSERT INTO t VALUES (?, ?)", &[Value::Bool(true), Value::Date(day)])
            .await
            .unwrap();
        let row = backend.query_one("SELECT flag, day FROM t", &[]).await.unwrap();
        assert_eq!(row.get::<Value>("flag").unwrap(), Value::Int(1));
        assert_eq!(row.get::<String>("day").unwrap(), "2024-03-09");
    }

    #[tokio::test]
    async fn test_sqlite_atomic_rollback() {
        let backend = backend_with_table().await;
        let result: ReportResult<()> = flex_report_db::atomic(&backend, |txn| async move {
            txn.execute_sql("INSERT INTO users (name) VALUES ('x')", &[]).await?;
            Err(ReportError::BadRequest("abort".into()))
        })
        .await;
        assert!(result.is_err());
        assert!(backend.query("SELECT * FROM users", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_atomic_holds_the_connection() {
        let backend = Arc::new(backend_with_table().await);
        let (started, wait_started) = tokio::sync::oneshot::channel();
        let shared = Arc::clone(&backend);
        let aborted = tokio::spawn(async move {
            flex_report_db::atomic(&*shared, |txn| async move {
                txn.execute_sql("INSERT INTO users (name) VALUES ('inside')", &[]).await?;
                let _ = started.send(());
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Err::<(), _>(ReportError::BadRequest("abort".into()))
            })
            .await
        });

        wait_started.await.unwrap();
        backend
            .execute_sql("INSERT INTO users (name) VALUES ('outside')", &[])
            .await
            .unwrap();
        assert!(aborted.await.unwrap().is_err());

        let rows = backend.query("SELECT name FROM users", &[]).await.unwrap();
        let names: Vec<String> = rows.iter().map(|r| r.get::<String>("name").unwrap()).collect();
        assert_eq!(names, vec!["outside"]);
    }
}
