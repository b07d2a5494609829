use std::sync::LazyLock;

use flex_report_core::{ReportError, ValidationError};
use flex_report_db::query::compiler::Row;
use flex_report_db::{FieldDef, FieldType, Model, ModelMeta, OrderBy, Value};
use serde::{Deserialize, Serialize};

use super::APP_LABEL;
use crate::resolver::{ColumnKind, FieldResolver};

/// How a column is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// One cell per row, read from a field, property or computed field.
    #[default]
    Model,
    /// A dynamic field that unpacks into several cells.
    Dynamic,
}

impl ColumnType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Dynamic => "dynamic",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "dynamic" {
            Self::Dynamic
        } else {
            Self::Model
        }
    }
}

/// A named reference to a value of a report model.
///
/// `title` is a field path (`customer__name`), a property name, a computed
/// field (`provider.key`) or, for dynamic columns, a dynamic field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub id: Option<i64>,
    pub title: String,
    pub searchable: bool,
    /// Label of the report model the column belongs to.
    pub model: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(model: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            searchable: false,
            model: model.into(),
            column_type: ColumnType::Model,
        }
    }

    /// Marks the column as searchable.
    #[must_use]
    pub const fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    /// Marks the column as dynamic.
    #[must_use]
    pub const fn dynamic(mut self) -> Self {
        self.column_type = ColumnType::Dynamic;
        self
    }

    /// Validates the column against its model.
    ///
    /// The title must resolve on the model, a dynamic column must name a
    /// dynamic field, and a searchable column must be filterable.
    pub fn clean(&self, resolver: &FieldResolver) -> Result<(), ValidationError> {
        let Some(descriptor) = resolver.resolve(&self.model, &self.title) else {
            return Err(ValidationError::for_field(
                "title",
                format!("'{}' is not a field, property or custom field of '{}'.", self.title, self.model),
                "invalid",
            )
            .with_param("value", self.title.clone()));
        };
        let is_dynamic = descriptor.kind == ColumnKind::Dynamic;
        if is_dynamic != (self.column_type == ColumnType::Dynamic) {
            return Err(ValidationError::for_field(
                "column_type",
                format!("'{}' cannot be displayed as a {} column.", self.title, self.column_type.as_str()),
                "invalid",
            ));
        }
        if self.searchable && !descriptor.is_filterable() {
            return Err(ValidationError::for_field(
                "searchable",
                format!("'{}' cannot be used for searching.", self.title),
                "invalid",
            ));
        }
        Ok(())
    }
}

impl Model for Column {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                APP_LABEL,
                "column",
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("title", FieldType::CharField).max_length(200),
                    FieldDef::new("searchable", FieldType::BooleanField).default(false),
                    FieldDef::new("model", FieldType::CharField).max_length(100),
                    FieldDef::new("column_type", FieldType::CharField)
                        .max_length(10)
                        .default("model")
                        .choices([("model", "Model"), ("dynamic", "Dynamic")]),
                ],
            )
            .verbose_name("Column", "Columns")
            .unique_together(vec!["model", "title"])
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
            ("searchable", Value::Bool(self.searchable)),
            ("model", Value::from(self.model.as_str())),
            ("column_type", Value::from(self.column_type.as_str())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, ReportError> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            searchable: row.get("searchable")?,
            model: row.get("model")?,
            column_type: ColumnType::parse(&row.get::<String>("column_type")?),
        })
    }
}
