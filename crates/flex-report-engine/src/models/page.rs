use std::sync::LazyLock;

use flex_report_core::{ReportError, ValidationError};
use flex_report_db::query::compiler::Row;
use flex_report_db::{FieldDef, FieldType, Model, ModelMeta, OrderBy, Value};
use serde::Serialize;

use super::APP_LABEL;

/// A named route whose report templates compete for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePage {
    pub id: Option<i64>,
    pub title: String,
    /// The route name the page is served under.
    pub url_name: String,
}

impl TablePage {
    pub fn new(title: impl Into<String>, url_name: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            url_name: url_name.into(),
        }
    }

    /// Validates the page before it is written.
    pub fn clean(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::for_field("title", "This field is required.", "required"));
        }
        if self.url_name.trim().is_empty() {
            return Err(ValidationError::for_field("url_name", "This field is required.", "required"));
        }
        Ok(())
    }
}

impl Model for TablePage {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                APP_LABEL,
                "tablepage",
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("title", FieldType::CharField).max_length(200),
                    FieldDef::new("url_name", FieldType::CharField).max_length(200).unique(),
                ],
            )
            .verbose_name("Table Page", "Table Pages")
            .ordering(vec![OrderBy::asc("title")])
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn set_pk(&mut self, value: Value) {
        self.id = value.as_int();
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.pk().unwrap_or(Value::Null)),
            ("title", Value::from(self.title.as_str())),
            ("url_name", Value::from(self.url_name.as_str())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, ReportError> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            url_name: row.get("url_name")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_requires_url_name() {
        let err = TablePage::new("Orders", " ").clean().unwrap_err();
        assert_eq!(err.codes_for("url_name"), vec!["required"]);
        assert!(TablePage::new("Orders", "orders").clean().is_ok());
    }
}
