//! PostgreSQL database backend using `tokio-postgres` and `deadpool-postgres`.
//!
//! [`PostgresBackend`] implements [`DbExecutor`] over a `deadpool-postgres`
//! pool. Plain statements check a client out of the pool each time;
//! [`atomic`](flex_report_db::transactions::atomic) pins one pooled client
//! and runs the whole transaction on it.

use crate::base::DatabaseConfig;
use flex_report_core::{ReportError, ReportResult};
use flex_report_db::query::compiler::{DatabaseBackendType, Row};
use flex_report_db::value::Value;
use flex_report_db::DbExecutor;
use tokio_postgres::types::{FromSql, ToSql, Type};

/// Report storage on PostgreSQL.
pub struct PostgresBackend {
    pool: deadpool_postgres::Pool,
}

impl PostgresBackend {
    /// Creates a new `PostgresBackend` from a `deadpool-postgres` pool.
    pub const fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }

    /// Creates a new backend from a [`DatabaseConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub fn from_config(config: &DatabaseConfig) -> ReportResult<Self> {
        let mut pg_config = deadpool_postgres::Config::new();
        pg_config.dbname = Some(config.name.clone());
        pg_config.host = config.host.clone();
        pg_config.port = config.port;
        pg_config.user = config.user.clone();
        pg_config.password = config.password.clone();

        let pool = pg_config
            .create_pool(
                Some(deadpool_postgres::Runtime::Tokio1),
                tokio_postgres::NoTls,
            )
            .map_err(|e| ReportError::DatabaseError(format!("Failed to create pool: {e}")))?;

        Ok(Self { pool })
    }

    fn bind(params: &[Value]) -> Vec<Param> {
        params.iter().map(to_param).collect()
    }

    async fn client(&self) -> ReportResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| ReportError::DatabaseError(format!("Pool error: {e}")))
    }
}

fn map_pg_error(err: &tokio_postgres::Error) -> ReportError {
    use tokio_postgres::error::SqlState;
    match err.code() {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION || *code == SqlState::FOREIGN_KEY_VIOLATION => {
            ReportError::IntegrityError(err.to_string())
        }
        _ => ReportError::DatabaseError(err.to_string()),
    }
}

type Param = Box<dyn ToSql + Sync + Send>;

/// Boxes one ORM value as a driver parameter. Lists travel as JSON arrays.
fn to_param(value: &Value) -> Param {
    match value {
        Value::Null => Box::new(None::<String>),
        Value::Bool(b) => Box::new(*b),
        Value::Int(i) => Box::new(*i),
        Value::Float(f) => Box::new(*f),
        Value::String(s) => Box::new(s.clone()),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::Date(d) => Box::new(*d),
        Value::DateTime(dt) => Box::new(*dt),
        Value::DateTimeTz(dt) => Box::new(*dt),
        Value::Time(t) => Box::new(*t),
        Value::Uuid(u) => Box::new(*u),
        Value::Json(j) => Box::new(j.clone()),
        Value::List(_) => Box::new(value.to_json()),
    }
}

fn refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect()
}

/// Reads column `idx` as `T`, mapping NULL and decode failures to `Value::Null`.
fn cell<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, wrap: F) -> Value
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    row.try_get::<_, Option<T>>(idx).ok().flatten().map_or(Value::Null, wrap)
}

fn decode_row(row: &tokio_postgres::Row) -> Row {
    let mut names = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        names.push(column.name().to_string());
        let value = match *column.type_() {
            Type::BOOL => cell(row, idx, Value::Bool),
            Type::INT2 => cell(row, idx, |v: i16| Value::Int(v.into())),
            Type::INT4 => cell(row, idx, |v: i32| Value::Int(v.into())),
            Type::INT8 => cell(row, idx, Value::Int),
            Type::FLOAT4 => cell(row, idx, |v: f32| Value::Float(v.into())),
            Type::FLOAT8 => cell(row, idx, Value::Float),
            Type::BYTEA => cell(row, idx, Value::Bytes),
            Type::UUID => cell(row, idx, Value::Uuid),
            Type::DATE => cell(row, idx, Value::Date),
            Type::TIMESTAMP => cell(row, idx, Value::DateTime),
            Type::TIMESTAMPTZ => cell(row, idx, Value::DateTimeTz),
            Type::TIME => cell(row, idx, Value::Time),
            Type::JSON | Type::JSONB => cell(row, idx, Value::Json),
            _ => cell(row, idx, Value::String),
        };
        values.push(value);
    }
    Row::new(names, values)
}

async fn execute_on(client: &tokio_postgres::Client, sql: &str, params: &[Value]) -> ReportResult<u64> {
    let bound = PostgresBackend::bind(params);
    client.execute(sql, &refs(&bound)).await.map_err(|e| map_pg_error(&e))
}

async fn query_on(client: &tokio_postgres::Client, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>> {
    let bound = PostgresBackend::bind(params);
    let rows = client.query(sql, &refs(&bound)).await.map_err(|e| map_pg_error(&e))?;
    Ok(rows.iter().map(decode_row).collect())
}

async fn insert_on(client: &tokio_postgres::Client, sql: &str, params: &[Value]) -> ReportResult<Value> {
    let rows = query_on(client, &returning_id(sql), params).await?;
    match rows.first() {
        Some(row) => row.get::<Value>("id"),
        None => Err(ReportError::DatabaseError("insert returned no id".into())),
    }
}

fn returning_id(insert: &str) -> String {
    format!("{insert} RETURNING \"id\"")
}

#[async_trait::async_trait]
impl DbExecutor for PostgresBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::PostgreSQL
    }

    async fn pin_connection<'a>(&'a self) -> ReportResult<Box<dyn DbExecutor + 'a>> {
        Ok(Box::new(PinnedClient {
            client: self.client().await?,
        }))
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> ReportResult<u64> {
        execute_on(&self.client().await?, sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>> {
        query_on(&self.client().await?, sql, params).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> ReportResult<Value> {
        insert_on(&self.client().await?, sql, params).await
    }
}

/// One pooled client, returned to the pool when dropped.
struct PinnedClient {
    client: deadpool_postgres::Object,
}

#[async_trait::async_trait]
impl DbExecutor for PinnedClient {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::PostgreSQL
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> ReportResult<u64> {
        execute_on(&self.client, sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> ReportResult<Vec<Row>> {
        query_on(&self.client, sql, params).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> ReportResult<Value> {
        insert_on(&self.client, sql, params).await
    }
}
