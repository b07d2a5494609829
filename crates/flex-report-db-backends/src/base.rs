//! Connection configuration and backend selection.
//!
//! [`DatabaseConfig`] describes where report data lives; [`connect`] opens
//! the matching backend and hands it back as a shared [`DbExecutor`].

use std::sync::Arc;

use flex_report_core::{ReportError, ReportResult};
use flex_report_db::query::compiler::DatabaseBackendType;
use flex_report_db::DbExecutor;
use serde::Deserialize;

/// Configuration for connecting to a database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// The backend type.
    #[serde(default = "default_backend", deserialize_with = "deserialize_backend")]
    pub backend: DatabaseBackendType,
    /// The database name or file path.
    pub name: String,
    /// The database host (for network-based backends).
    #[serde(default)]
    pub host: Option<String>,
    /// The database port.
    #[serde(default)]
    pub port: Option<u16>,
    /// The database user.
    #[serde(default)]
    pub user: Option<String>,
    /// The database password.
    #[serde(default)]
    pub password: Option<String>,
}

const fn default_backend() -> DatabaseBackendType {
    DatabaseBackendType::SQLite
}

fn deserialize_backend<'de, D>(deserializer: D) -> Result<DatabaseBackendType, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    match name.to_ascii_lowercase().as_str() {
        "sqlite" | "sqlite3" => Ok(DatabaseBackendType::SQLite),
        "postgres" | "postgresql" => Ok(DatabaseBackendType::PostgreSQL),
        other => Err(serde::de::Error::custom(format!("unknown database backend '{other}'"))),
    }
}

impl DatabaseConfig {
    /// Creates a configuration for an in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self::sqlite_file(":memory:")
    }

    /// Creates a configuration for a SQLite file database.
    pub fn sqlite_file(path: impl Into<String>) -> Self {
        Self {
            backend: DatabaseBackendType::SQLite,
            name: path.into(),
            host: None,
            port: None,
            user: None,
            password: None,
        }
    }

    /// Creates a configuration for a PostgreSQL database.
    pub fn postgres(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            backend: DatabaseBackendType::PostgreSQL,
            name: name.into(),
            host: Some(host.into()),
            port: Some(port),
            user: Some(user.into()),
            password: Some(password.into()),
        }
    }
}

/// Opens the backend described by `config`.
///
/// # Errors
///
/// Returns `ImproperlyConfigured` when the backend was not compiled in, or
/// the driver's error when the connection cannot be established.
#[allow(clippy::unused_async)]
pub async fn connect(config: &DatabaseConfig) -> ReportResult<Arc<dyn DbExecutor>> {
    match config.backend {
        #[cfg(feature = "sqlite")]
        DatabaseBackendType::SQLite => Ok(Arc::new(crate::sqlite::SqliteBackend::open(&config.name)?)),
        #[cfg(feature = "postgres")]
        DatabaseBackendType::PostgreSQL => {
            Ok(Arc::new(crate::postgresql::PostgresBackend::from_config(config)?))
        }
        #[allow(unreachable_patterns)]
        other => Err(ReportError::ImproperlyConfigured(format!(
            "database backend {other:?} is not enabled in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_sqlite_memory() {
        let cfg = DatabaseConfig::sqlite_memory();
        assert_eq!(cfg.backend, DatabaseBackendType::SQLite);
        assert_eq!(cfg.name, ":memory:");
        assert!(cfg.host.is_none());
    }

    #[test]
    fn test_database_config_postgres() {
        let cfg = DatabaseConfig::postgres("mydb", "localhost", 5432, "user", "pass");
        assert_eq!(cfg.backend, DatabaseBackendType::PostgreSQL);
        assert_eq!(cfg.host.as_deref(), Some("localhost"));
        assert_eq!(cfg.port, Some(5432));
    }

    #[test]
    fn test_database_config_deserialize() {
        let cfg: DatabaseConfig =
            serde_json::from_str(r#"{"backend": "PostgreSQL", "name": "reports", "port": 5433}"#).unwrap();
        assert_eq!(cfg.backend, DatabaseBackendType::PostgreSQL);
        assert_eq!(cfg.port, Some(5433));

        let cfg: DatabaseConfig = serde_json::from_str(r#"{"name": "db.sqlite3"}"#).unwrap();
        assert_eq!(cfg, DatabaseConfig::sqlite_file("db.sqlite3"));

        assert!(serde_json::from_str::<DatabaseConfig>(r#"{"backend": "oracle", "name": "x"}"#).is_err());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_connect_sqlite() {
        let db = connect(&DatabaseConfig::sqlite_memory()).await.unwrap();
        assert_eq!(db.backend_type(), DatabaseBackendType::SQLite);
    }
}
