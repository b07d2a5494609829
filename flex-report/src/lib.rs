//! # flex-report
//!
//! Template-driven tabular reports for Rust web services.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `flex-report` to get the whole engine, or depend on
//! individual crates for finer-grained control.
//!
//! A report is described by a stored [`Template`](engine::models::Template):
//! a target model, an ordered set of columns, stored filters and row buttons.
//! At request time the controller in [`views`] resolves the template for the
//! current page, builds the filter and quicksearch sets from the query string,
//! composes the queryset, paginates it and renders the cells. The same rows can
//! be exported through the format registry in [`engine::export`].

/// Core types, settings, logging, localization, and error types.
pub use flex_report_core as core;

/// ORM: values, fields, model schemas, `QuerySet`, and SQL compilation.
#[cfg(feature = "db")]
pub use flex_report_db as db;

/// Database backends: `SQLite` and `PostgreSQL`.
pub use flex_report_db_backends as db_backends;

/// HTTP layer: query dictionaries, requests, and responses.
#[cfg(feature = "http")]
pub use flex_report_http as http;

/// The report engine: entities, field resolution, filters, composition, rendering, export.
#[cfg(feature = "engine")]
pub use flex_report_engine as engine;

/// Report and export views, pagination, and the axum router.
#[cfg(feature = "views")]
pub use flex_report_views as views;

/// Testing utilities.
#[cfg(feature = "testing")]
pub use flex_report_test as test;

// Re-export commonly used third-party crates
pub use async_trait;
pub use axum;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;
