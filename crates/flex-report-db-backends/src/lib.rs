//! # flex-report-db-backends
//!
//! Database backends for flex-report. Each backend implements
//! [`DbExecutor`](flex_report_db::DbExecutor) and is compiled in behind a
//! feature:
//!
//! - `sqlite` (default): `rusqlite` on a blocking thread pool
//! - `postgres`: `tokio-postgres` with `deadpool-postgres` pooling

pub mod base;
#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{connect, DatabaseConfig};
#[cfg(feature = "postgres")]
pub use postgresql::PostgresBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
