//! The administrative entities of the report engine.
//!
//! Templates, columns, pages and buttons are written by administrators and
//! read by the engine at request time. Each entity implements
//! [`Model`](flex_report_db::Model) so it persists through the ORM, and
//! carries a `clean()` method that rejects invalid values before they are
//! written.

mod button;
mod column;
mod page;
mod saved_filter;
mod template;

pub use button::{TableButton, TableButtonColor};
pub use column::{Column, ColumnType};
pub use page::TablePage;
pub use saved_filter::TemplateSavedFilter;
pub use template::{Template, TemplateStatus};

use flex_report_core::ReportResult;
use flex_report_db::query::compiler::Row;

/// The app label shared by every entity table.
pub const APP_LABEL: &str = "flex_report";

/// Reads a JSON object column, treating `NULL` as an empty object.
pub(crate) fn json_object(row: &Row, column: &str) -> ReportResult<serde_json::Map<String, serde_json::Value>> {
    Ok(match row.get::<Option<serde_json::Value>>(column)? {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    })
}

/// Reads a JSON column and deserializes it, treating `NULL` as the default.
pub(crate) fn json_column<T>(row: &Row, column: &str) -> ReportResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match row.get::<Option<serde_json::Value>>(column)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}

/// Reads a nullable text column, mapping empty strings to `None`.
pub(crate) fn optional_text(row: &Row, column: &str) -> ReportResult<Option<String>> {
    Ok(row.get::<Option<String>>(column)?.filter(|s| !s.is_empty()))
}

pub(crate) fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
