//! Model trait and metadata for the ORM.
//!
//! The [`Model`] trait is implemented by typed structs that are persisted
//! through the ORM (the report engine's own entities). [`ModelMeta`] captures
//! the model options: table name, verbose names, default ordering and field
//! definitions. Report target models only need a `ModelMeta`; they are read
//! dynamically through the [`SchemaRegistry`](crate::schema::SchemaRegistry).

use crate::fields::FieldDef;
use crate::query::compiler::OrderBy;
use crate::value::Value;
use flex_report_core::ReportError;

/// A database row abstraction used for constructing model instances.
pub use crate::query::compiler::Row;

/// The core trait for typed ORM models.
///
/// # Examples
///
/// ```
/// use flex_report_db::model::{Model, ModelMeta};
/// use flex_report_db::fields::{FieldDef, FieldType};
/// use flex_report_db::value::Value;
/// use flex_report_db::query::compiler::Row;
/// use flex_report_core::ReportError;
///
/// struct Article {
///     id: Option<i64>,
///     title: String,
/// }
///
/// impl Model for Article {
///     fn meta() -> &'static ModelMeta {
///         use std::sync::LazyLock;
///         static META: LazyLock<ModelMeta> = LazyLock::new(|| {
///             ModelMeta::new("blog", "article", vec![
///                 FieldDef::new("id", FieldType::BigAutoField).primary_key(),
///                 FieldDef::new("title", FieldType::CharField).max_length(200),
///             ])
///         });
///         &META
///     }
///
///     fn pk(&self) -> Option<Value> { self.id.map(Value::Int) }
///     fn set_pk(&mut self, value: Value) {
///         self.id = value.as_int();
///     }
///     fn field_values(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.pk().unwrap_or(Value::Null)), ("title", Value::String(self.title.clone()))]
///     }
///     fn from_row(row: &Row) -> Result<Self, ReportError> {
///         Ok(Article {
///             id: row.get::<Option<i64>>("id")?,
///             title: row.get::<String>("title")?,
///         })
///     }
/// }
///
/// assert_eq!(Article::table_name(), "blog_article");
/// ```
pub trait Model: Send + Sync + 'static {
    /// Returns the static metadata for this model type.
    fn meta() -> &'static ModelMeta;

    /// Returns the database table name.
    fn table_name() -> &'static str {
        &Self::meta().db_table
    }

    /// Returns the application label this model belongs to.
    fn app_label() -> &'static str {
        Self::meta().app_label
    }

    /// Returns the primary key value, or `None` if unsaved.
    fn pk(&self) -> Option<Value>;

    /// Sets the primary key value on this instance (used after INSERT).
    fn set_pk(&mut self, value: Value);

    /// Returns the name of the primary key column (e.g., "id").
    fn pk_field_name() -> &'static str {
        "id"
    }

    /// Returns all column name-value pairs for this instance.
    fn field_values(&self) -> Vec<(&'static str, Value)>;

    /// Returns column name-value pairs excluding the primary key.
    /// Used for INSERT operations where the PK is auto-generated.
    fn non_pk_field_values(&self) -> Vec<(&'static str, Value)> {
        let pk_name = Self::pk_field_name();
        self.field_values()
            .into_iter()
            .filter(|(name, _)| *name != pk_name)
            .collect()
    }

    /// Constructs a model instance from a database row.
    fn from_row(row: &Row) -> Result<Self, ReportError>
    where
        Self: Sized;
}

/// Metadata about a model.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    /// The application label (e.g., "shop").
    pub app_label: &'static str,
    /// The model name in lowercase (e.g., "order").
    pub model_name: &'static str,
    /// The database table name.
    pub db_table: String,
    /// Human-readable singular name.
    pub verbose_name: String,
    /// Human-readable plural name.
    pub verbose_name_plural: String,
    /// Default ordering for queries, by column.
    pub ordering: Vec<OrderBy>,
    /// Sets of columns that must be unique together.
    pub unique_together: Vec<Vec<&'static str>>,
    /// Field definitions for this model.
    pub fields: Vec<FieldDef>,
}

impl ModelMeta {
    /// Creates metadata with the conventional `{app_label}_{model_name}` table.
    pub fn new(app_label: &'static str, model_name: &'static str, fields: Vec<FieldDef>) -> Self {
        let verbose_name = model_name.replace('_', " ");
        Self {
            app_label,
            model_name,
            db_table: format!("{app_label}_{model_name}"),
            verbose_name_plural: format!("{verbose_name}s"),
            verbose_name,
            ordering: Vec::new(),
            unique_together: Vec::new(),
            fields,
        }
    }

    /// Sets the default ordering.
    #[must_use]
    pub fn ordering(mut self, ordering: Vec<OrderBy>) -> Self {
        self.ordering = ordering;
        self
    }

    /// Sets the verbose names.
    #[must_use]
    pub fn verbose_name(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        self.verbose_name = singular.into();
        self.verbose_name_plural = plural.into();
        self
    }

    /// Adds a set of columns that must be unique together.
    #[must_use]
    pub fn unique_together(mut self, columns: Vec<&'static str>) -> Self {
        self.unique_together.push(columns);
        self
    }

    /// Returns the `"app_label.model_name"` label of the model.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    /// Looks up a field by its attribute name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the primary key field.
    pub fn pk_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Returns the primary key column, defaulting to `"id"`.
    pub fn pk_column(&self) -> &str {
        self.pk_field().map_or("id", |f| f.column.as_str())
    }

    /// Iterates over the fields that own a column in the model's table.
    pub fn concrete_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_concrete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;

    fn meta() -> ModelMeta {
        ModelMeta::new(
            "shop",
            "order_line",
            vec![
                FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                FieldDef::new("sku", FieldType::CharField),
                FieldDef::new(
                    "tags",
                    FieldType::ManyToManyField {
                        to: "shop.tag".into(),
                        through: None,
                        related_name: None,
                    },
                ),
            ],
        )
    }

    #[test]
    fn test_meta_defaults() {
        let m = meta();
        assert_eq!(m.db_table, "shop_order_line");
        assert_eq!(m.verbose_name, "order line");
        assert_eq!(m.verbose_name_plural, "order lines");
        assert_eq!(m.label(), "shop.order_line");
        assert!(m.ordering.is_empty());
    }

    #[test]
    fn test_meta_field_lookup() {
        let m = meta();
        assert!(m.get_field("sku").is_some());
        assert!(m.get_field("missing").is_none());
        assert_eq!(m.pk_column(), "id");
        assert_eq!(m.concrete_fields().count(), 2);
    }

    #[test]
    fn test_meta_builders() {
        let m = meta()
            .ordering(vec![OrderBy::desc("id")])
            .verbose_name("line", "lines")
            .unique_together(vec!["sku"]);
        assert_eq!(m.ordering, vec![OrderBy::desc("id")]);
        assert_eq!(m.verbose_name_plural, "lines");
        assert_eq!(m.unique_together, vec![vec!["sku"]]);
    }
}
