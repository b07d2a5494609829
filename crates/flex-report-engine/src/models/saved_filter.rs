use std::sync::LazyLock;

use flex_report_core::utils::text::slugify;
use flex_report_core::{ReportError, ValidationError};
use flex_report_db::query::compiler::Row;
use flex_report_db::{FieldDef, FieldType, Model, ModelMeta, OnDelete, Value};
use serde::Serialize;

use super::{json_object, APP_LABEL};

/// A named set of filter values a user saved against a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSavedFilter {
    pub id: Option<i64>,
    pub title: String,
    /// Derived from the title when left empty.
    pub slug: String,
    pub template_id: i64,
    pub creator_id: Option<i64>,
    pub filters: serde_json::Map<String, serde_json::Value>,
}

impl TemplateSavedFilter {
    pub fn new(template_id: i64, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: None,
            slug: slugify(&title),
            title,
            template_id,
            creator_id: None,
            filters: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Fills in the slug and validates the title.
    pub fn clean(&mut self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::for_field("title", "This field is required.", "required"));
        }
        if self.slug.is_empty() {
            self.slug = slugify(&self.title);
        }
        if self.slug.is_empty() {
            return Err(ValidationError::for_field(
                "slug",
                "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
                "invalid",
            ));
        }
        Ok(())
    }
}

impl Model for TemplateSavedFilter {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                APP_LABEL,
                "templatesavedfilter",
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("title", FieldType::CharField).max_length(200),
                    FieldDef::new("slug", FieldType::SlugField).max_length(200),
                    FieldDef::new(
                        "template",
                        FieldType::ForeignKey {
                            to: "flex_report.template".into(),
                            on_delete: OnDelete::Cascade,
                            related_name: Some("saved_filters".into()),
                        },
                    ),
                    FieldDef::new("creator_id", FieldType::BigIntegerField).nullable(),
                    FieldDef::new("filters", FieldType::JsonField),
                ],
            )
            .verbose_name("Template Saved Filter", "Template Saved Filters")
            .unique_together(vec!["title", "template"])
            .unique_together(vec!["slug", "template"])
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
            ("slug", Value::from(self.slug.as_str())),
            ("template_id", Value::Int(self.template_id)),
            ("creator_id", Value::from(self.creator_id)),
            ("filters", Value::Json(serde_json::Value::Object(self.filters.clone()))),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, ReportError> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            slug: row.get("slug")?,
            template_id: row.get("template_id")?,
            creator_id: row.get("creator_id")?,
            filters: json_object(row, "filters")?,
        })
    }
}
