//! Database executor trait and model CRUD operations.
//!
//! This module defines the [`DbExecutor`] trait that provides the minimal async
//! interface required by [`QuerySet`](crate::query::queryset::QuerySet) execution
//! methods and model CRUD operations. It also provides free functions for
//! save/create/delete/refresh operations on typed model instances.
//!
//! The `DbExecutor` trait is implemented by backend types (e.g., `SqliteBackend`,
//! `PostgresBackend`) in the `flex-report-db-backends` crate.

use crate::model::Model;
use crate::query::compiler::{DatabaseBackendType, OrderBy, Query, Row, SqlCompiler, WhereNode};
use crate::query::lookups::Lookup;
use crate::value::Value;
use flex_report_core::{ReportError, ReportResult};

/// Minimal async database executor trait.
///
/// This is the bridge between the ORM layer (`flex-report-db`) and the
/// concrete database backends (`flex-report-db-backends`). `QuerySet`
/// execution methods and model CRUD functions accept `&dyn DbExecutor`, which
/// backends implement.
#[async_trait::async_trait]
pub trait DbExecutor: Send + Sync {
    /// Returns the backend type for SQL compilation.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Returns an executor that runs every statement on one connection,
    /// held until the returned executor is dropped.
    ///
    /// [`atomic`](crate::transactions::atomic) runs its `BEGIN`, body and
    /// `COMMIT` through this handle. The default hands back `self`, which
    /// is right for executors that already are a single connection; pooled
    /// or shared backends override it.
    async fn pin_connection<'a>(&'a self) -> ReportResult<Box<dyn DbExecutor + 'a>> {
        Ok(Box::new(self))
    }

    /// Runs a SQL statement that does not return rows.
    /// Returns the number of rows affected.
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> ReportResult<u64>;

    /// Runs a SQL query and returns all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>>;

    /// Runs a SQL query and returns exactly one row.
    /// Returns `DoesNotExist` if no rows and `DatabaseError` if more than one.
    async fn query_one(&self, sql: &str, params: &[Value]) -> ReportResult<Row> {
        let mut rows = self.query(sql, params).await?;
        match rows.len() {
            0 => Err(ReportError::DoesNotExist(
                "Query returned no rows".to_string(),
            )),
            1 => Ok(rows.remove(0)),
            n => Err(ReportError::DatabaseError(format!(
                "Query returned {n} rows, expected 1"
            ))),
        }
    }

    /// Executes an INSERT and returns the last inserted row ID.
    ///
    /// The default implementation asks SQLite for `last_insert_rowid()`;
    /// other backends override it.
    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> ReportResult<Value> {
        self.execute_sql(sql, params).await?;
        let row = self.query("SELECT last_insert_rowid() AS id", &[]).await?;
        row.into_iter().next().map_or_else(
            || {
                Err(ReportError::DatabaseError(
                    "Failed to retrieve last inserted ID".to_string(),
                ))
            },
            |r| r.get::<Value>("id"),
        )
    }
}

#[async_trait::async_trait]
impl<T: DbExecutor + ?Sized> DbExecutor for &T {
    fn backend_type(&self) -> DatabaseBackendType {
        (**self).backend_type()
    }

    async fn pin_connection<'a>(&'a self) -> ReportResult<Box<dyn DbExecutor + 'a>> {
        (**self).pin_connection().await
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> ReportResult<u64> {
        (**self).execute_sql(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>> {
        (**self).query(sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> ReportResult<Row> {
        (**self).query_one(sql, params).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> ReportResult<Value> {
        (**self).insert_returning_id(sql, params).await
    }
}

fn pk_condition<M: Model>(pk: Value) -> WhereNode {
    WhereNode::Condition {
        column: M::pk_field_name().to_string(),
        lookup: Lookup::Exact(pk),
    }
}

// ── Model CRUD free functions ──────────────────────────────────────────

/// Saves a model instance to the database.
///
/// If the primary key is set, performs an UPDATE of all fields. Otherwise
/// performs an INSERT and sets the PK from the returned value.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn save_model<M: Model>(model: &mut M, db: &dyn DbExecutor) -> ReportResult<()> {
    let Some(pk_value) = model.pk() else {
        return create_model(model, db).await;
    };

    let fields = model.non_pk_field_values();
    if fields.is_empty() {
        return Ok(());
    }
    let compiler = SqlCompiler::new(db.backend_type());
    let (sql, params) = compiler.compile_update(M::table_name(), &fields, &pk_condition::<M>(pk_value));
    db.execute_sql(&sql, &params).await?;
    Ok(())
}

/// Creates a new model instance in the database via INSERT.
///
/// Always performs an INSERT and sets the PK from the returned value.
///
/// # Errors
///
/// Returns an error if the INSERT fails.
pub async fn create_model<M: Model>(model: &mut M, db: &dyn DbExecutor) -> ReportResult<()> {
    let compiler = SqlCompiler::new(db.backend_type());
    let fields = model.non_pk_field_values();
    let (sql, params) = compiler.compile_insert(M::table_name(), &fields);
    let pk = db.insert_returning_id(&sql, &params).await?;
    model.set_pk(pk);
    Ok(())
}

/// Deletes a model instance from the database.
///
/// # Errors
///
/// Returns an error if the PK is not set or the DELETE fails.
pub async fn delete_model<M: Model>(model: &M, db: &dyn DbExecutor) -> ReportResult<u64> {
    let pk_value = model.pk().ok_or_else(|| {
        ReportError::DatabaseError("Cannot delete a model without a primary key".to_string())
    })?;
    let compiler = SqlCompiler::new(db.backend_type());
    let (sql, params) = compiler.compile_delete(M::table_name(), &pk_condition::<M>(pk_value));
    db.execute_sql(&sql, &params).await
}

/// Refreshes a model instance from the database.
///
/// # Errors
///
/// Returns an error if the PK is not set or the record does not exist.
pub async fn refresh_model<M: Model>(model: &mut M, db: &dyn DbExecutor) -> ReportResult<()> {
    let pk_value = model.pk().ok_or_else(|| {
        ReportError::DatabaseError("Cannot refresh a model without a primary key".to_string())
    })?;
    *model = get_model::<M>(pk_value, db).await?;
    Ok(())
}

/// Loads one model instance by primary key.
///
/// # Errors
///
/// Returns `DoesNotExist` when no row has the given key.
pub async fn get_model<M: Model>(pk: Value, db: &dyn DbExecutor) -> ReportResult<M> {
    let mut query = Query::new(M::table_name());
    query.where_clause = Some(pk_condition::<M>(pk.clone()));
    let mut found = fetch_models::<M>(&query, db).await?;
    if found.is_empty() {
        return Err(ReportError::DoesNotExist(format!(
            "{} matching pk={pk} does not exist",
            M::meta().model_name
        )));
    }
    Ok(found.remove(0))
}

/// Runs a query and builds typed instances from its rows.
///
/// Without explicit ordering the model's default ordering applies.
pub async fn fetch_models<M: Model>(query: &Query, db: &dyn DbExecutor) -> ReportResult<Vec<M>> {
    let mut query = query.clone();
    if query.order_by.is_empty() {
        query.order_by = if M::meta().ordering.is_empty() {
            vec![OrderBy::asc(M::pk_field_name())]
        } else {
            M::meta().ordering.clone()
        };
    }
    let compiler = SqlCompiler::new(db.backend_type());
    let (sql, params) = compiler.compile_select(&query);
    tracing::debug!(sql = %sql, "fetching {}", M::meta().model_name);
    db.query(&sql, &params)
        .await?
        .iter()
        .map(M::from_row)
        .collect()
}
