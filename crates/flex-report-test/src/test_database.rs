//! Test database utilities for flex-report.
//!
//! Provides [`TestDatabase`], an in-memory SQLite database wrapper for use in
//! tests. It implements [`DbExecutor`] so it can back a report site or be
//! handed to any ORM operation, and adds helpers for creating tables from a
//! schema registry and counting executed queries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use flex_report_test::test_database::TestDatabase;
//!
//! async fn example() {
//!     let db = TestDatabase::new().unwrap();
//!     db.execute_raw("CREATE TABLE shop_tag (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
//!         .await
//!         .unwrap();
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flex_report_core::ReportResult;
use flex_report_db::ddl::create_table_sql;
use flex_report_db::{DatabaseBackendType, DbExecutor, ModelMeta, Row, SchemaRegistry, Value};
use flex_report_db_backends::SqliteBackend;

/// An in-memory SQLite database for testing.
///
/// Clones share the connection and the query counter. Every
/// `TestDatabase::new()` opens a fresh database.
#[derive(Debug, Clone)]
pub struct TestDatabase {
    backend: Arc<SqliteBackend>,
    query_count: Arc<AtomicUsize>,
}

impl TestDatabase {
    /// Opens a new in-memory SQLite test database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot open the database.
    pub fn new() -> ReportResult<Self> {
        Ok(Self {
            backend: Arc::new(SqliteBackend::memory()?),
            query_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Creates the table of `meta`, with its many-to-many join tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL execution fails.
    pub async fn setup_table(&self, meta: &ModelMeta) -> ReportResult<()> {
        for sql in create_table_sql(meta, DatabaseBackendType::SQLite) {
            self.execute_raw(&sql).await?;
        }
        Ok(())
    }

    /// Creates the tables of every model in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL execution fails.
    pub async fn setup_registry(&self, registry: &SchemaRegistry) -> ReportResult<()> {
        for schema in registry.models() {
            self.setup_table(schema.meta()).await?;
        }
        Ok(())
    }

    /// Runs each statement of `sql`, e.g. fixture inserts.
    ///
    /// # Errors
    ///
    /// Returns the first failing statement's error.
    pub async fn load_fixture(&self, sql: &[&str]) -> ReportResult<()> {
        for statement in sql {
            self.execute_raw(statement).await?;
        }
        Ok(())
    }

    /// Drops all user-created tables in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL execution fails.
    pub async fn teardown(&self) -> ReportResult<()> {
        let rows = self
            .backend
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                &[],
            )
            .await?;

        for row in &rows {
            let table_name: String = row.get("name")?;
            self.backend
                .execute_sql(&format!("DROP TABLE IF EXISTS \"{table_name}\""), &[])
                .await?;
        }
        Ok(())
    }

    /// Executes a raw SQL string with no parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL execution fails.
    pub async fn execute_raw(&self, sql: &str) -> ReportResult<u64> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.execute_sql(sql, &[]).await
    }

    /// Returns the number of statements run since creation or the last reset.
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    pub fn reset_query_count(&self) {
        self.query_count.store(0, Ordering::Relaxed);
    }

    pub fn backend(&self) -> &SqliteBackend {
        &self.backend
    }
}

/// A pinned connection whose statements still count toward the database.
struct CountedConnection<'a> {
    conn: Box<dyn DbExecutor + 'a>,
    query_count: &'a AtomicUsize,
}

#[async_trait::async_trait]
impl DbExecutor for CountedConnection<'_> {
    fn backend_type(&self) -> DatabaseBackendType {
        self.conn.backend_type()
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> ReportResult<u64> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.conn.execute_sql(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.conn.query(sql, params).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> ReportResult<Value> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.conn.insert_returning_id(sql, params).await
    }
}

#[async_trait::async_trait]
impl DbExecutor for TestDatabase {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn pin_connection<'a>(&'a self) -> ReportResult<Box<dyn DbExecutor + 'a>> {
        Ok(Box::new(CountedConnection {
            conn: self.backend.pin_connection().await?,
            query_count: &self.query_count,
        }))
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> ReportResult<u64> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.execute_sql(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.query(sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> ReportResult<Row> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.query_one(sql, params).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> ReportResult<Value> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.backend.insert_returning_id(sql, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flex_report_db::{FieldDef, FieldType, ModelSchema};

    fn article_meta() -> ModelMeta {
        ModelMeta::new(
            "blog",
            "article",
            vec![
                FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                FieldDef::new("title", FieldType::CharField).max_length(200),
                FieldDef::new("body", FieldType::TextField).nullable(),
            ],
        )
    }

    #[tokio::test]
    async fn test_new_creates_database() {
        let db = TestDatabase::new().unwrap();
        assert_eq!(db.backend_type(), DatabaseBackendType::SQLite);
        assert_eq!(db.query_count(), 0);
    }

    #[tokio::test]
    async fn test_setup_table_from_meta() {
        let db = TestDatabase::new().unwrap();
        db.setup_table(&article_meta()).await.unwrap();

        db.execute_sql("INSERT INTO blog_article (title) VALUES (?)", &[Value::from("First")])
            .await
            .unwrap();
        let rows = db.query("SELECT id, title, body FROM blog_article", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("title").unwrap(), "First");
    }

    #[tokio::test]
    async fn test_setup_registry_and_fixture() {
        let db = TestDatabase::new().unwrap();
        let mut registry = SchemaRegistry::new();
        registry.register(ModelSchema::new(article_meta()));
        db.setup_registry(&registry).await.unwrap();
        db.load_fixture(&["INSERT INTO blog_article (id, title) VALUES (1, 'a'), (2, 'b')"])
            .await
            .unwrap();
        let rows = db.query("SELECT id FROM blog_article", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_teardown_drops_tables() {
        let db = TestDatabase::new().unwrap();
        db.execute_raw("CREATE TABLE a (id INTEGER PRIMARY KEY)").await.unwrap();
        db.execute_raw("CREATE TABLE b (id INTEGER PRIMARY KEY)").await.unwrap();

        db.teardown().await.unwrap();

        let result = db.execute_sql("INSERT INTO a (id) VALUES (?)", &[Value::from(1)]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_query_counter() {
        let db = TestDatabase::new().unwrap();
        db.execute_raw("CREATE TABLE counter_test (id INTEGER PRIMARY KEY)").await.unwrap();
        assert_eq!(db.query_count(), 1);

        db.execute_sql("INSERT INTO counter_test (id) VALUES (?)", &[Value::from(1)])
            .await
            .unwrap();
        db.query("SELECT * FROM counter_test", &[]).await.unwrap();
        assert_eq!(db.query_count(), 3);

        db.reset_query_count();
        assert_eq!(db.query_count(), 0);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let db = TestDatabase::new().unwrap();
        let db2 = db.clone();
        db.execute_raw("CREATE TABLE shared (id INTEGER PRIMARY KEY)").await.unwrap();

        assert!(db2.query("SELECT * FROM shared", &[]).await.is_ok());
        assert_eq!(db.query_count(), db2.query_count());
    }

    #[tokio::test]
    async fn test_transactions_are_counted() {
        let db = TestDatabase::new().unwrap();
        db.execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY)").await.unwrap();
        db.reset_query_count();

        flex_report_db::atomic(&db, |txn| async move {
            txn.execute_sql("INSERT INTO t (id) VALUES (1)", &[]).await?;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(db.query_count(), 3);
        assert_eq!(db.query("SELECT id FROM t", &[]).await.unwrap().len(), 1);
    }
}
