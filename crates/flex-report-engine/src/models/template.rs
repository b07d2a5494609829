use std::sync::LazyLock;

use chrono::NaiveDateTime;
use flex_report_core::i18n::gettext;
use flex_report_core::{ReportError, ValidationError};
use flex_report_db::query::compiler::Row;
use flex_report_db::{FieldDef, FieldType, Model, ModelMeta, OnDelete, OrderBy, Value};
use serde::{Deserialize, Serialize};

use super::{json_column, json_object, now, APP_LABEL};
use crate::user_path::UserPath;

/// Whether a template is ready to be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemplateStatus {
    /// Columns and filters are set; the report can run.
    #[serde(rename = "c")]
    Complete,
    /// Created but not configured yet.
    #[default]
    #[serde(rename = "p")]
    Pending,
}

impl TemplateStatus {
    /// The stored code.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Complete => "c",
            Self::Pending => "p",
        }
    }

    fn from_code(code: &str) -> Self {
        if code == "c" {
            Self::Complete
        } else {
            Self::Pending
        }
    }

    /// The localized label.
    pub fn label(self) -> String {
        match self {
            Self::Complete => gettext("Completed"),
            Self::Pending => gettext("Pending"),
        }
    }
}

/// A saved report configuration.
///
/// Columns and buttons are stored in join tables and loaded through the
/// [`ReportRepository`](crate::repository::ReportRepository).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub id: Option<i64>,
    pub title: String,
    /// Label of the report model.
    pub model: String,
    /// Stored filter values, keyed by filter parameter name.
    pub filters: serde_json::Map<String, serde_json::Value>,
    pub has_export: bool,
    pub creator_id: Option<i64>,
    /// The creator's full name at creation time.
    pub creator_name: String,
    pub page_id: Option<i64>,
    pub is_page_default: bool,
    pub status: TemplateStatus,
    /// Row-level scoping paths, tried in order.
    pub model_user_path: Vec<UserPath>,
    pub created_date: NaiveDateTime,
    pub modified_date: NaiveDateTime,
}

impl Template {
    pub fn new(title: impl Into<String>, model: impl Into<String>) -> Self {
        let created = now();
        Self {
            id: None,
            title: title.into(),
            model: model.into(),
            filters: serde_json::Map::new(),
            has_export: true,
            creator_id: None,
            creator_name: String::new(),
            page_id: None,
            is_page_default: false,
            status: TemplateStatus::Pending,
            model_user_path: Vec::new(),
            created_date: created,
            modified_date: created,
        }
    }

    /// Records the creating user.
    #[must_use]
    pub fn created_by(mut self, user: &flex_report_http::RequestUser) -> Self {
        self.creator_id = user.id;
        self.creator_name = user.get_full_name();
        self
    }

    /// Binds the template to a page.
    #[must_use]
    pub const fn on_page(mut self, page_id: i64) -> Self {
        self.page_id = Some(page_id);
        self
    }

    /// Marks the template complete.
    #[must_use]
    pub const fn completed(mut self) -> Self {
        self.status = TemplateStatus::Complete;
        self
    }

    /// Sets a stored filter value.
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TemplateStatus::Complete
    }

    /// Number of stored filters with a non-empty value.
    pub fn filters_count(&self) -> usize {
        self.filters
            .values()
            .filter(|v| Value::from_json(v).is_truthy())
            .count()
    }

    /// The creator's full name, or a localized placeholder.
    pub fn user_fullname(&self) -> String {
        if self.creator_name.trim().is_empty() {
            gettext("Not Set")
        } else {
            self.creator_name.clone()
        }
    }

    pub fn clean(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::for_field("title", "This field is required.", "required"));
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError::for_field("model", "This field is required.", "required"));
        }
        if self.is_page_default && self.page_id.is_none() {
            return Err(ValidationError::for_field(
                "is_page_default",
                "Only templates bound to a page can be its default.",
                "invalid",
            ));
        }
        Ok(())
    }
}

impl Model for Template {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                APP_LABEL,
                "template",
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("title", FieldType::CharField).max_length(200),
                    FieldDef::new("model", FieldType::CharField).max_length(100),
                    FieldDef::new("filters", FieldType::JsonField),
                    FieldDef::new("has_export", FieldType::BooleanField).default(true),
                    FieldDef::new("creator_id", FieldType::BigIntegerField).nullable(),
                    FieldDef::new("creator_name", FieldType::CharField).max_length(300).default(""),
                    FieldDef::new(
                        "page",
                        FieldType::ForeignKey {
                            to: "flex_report.tablepage".into(),
                            on_delete: OnDelete::SetNull,
                            related_name: Some("templates".into()),
                        },
                    )
                    .nullable(),
                    FieldDef::new("is_page_default", FieldType::BooleanField).default(false),
                    FieldDef::new("status", FieldType::CharField)
                        .max_length(1)
                        .default("p")
                        .choices([("c", "Completed"), ("p", "Pending")]),
                    FieldDef::new("model_user_path", FieldType::JsonField),
                    FieldDef::new("created_date", FieldType::DateTimeField),
                    FieldDef::new("modified_date", FieldType::DateTimeField),
                    FieldDef::new(
                        "columns",
                        FieldType::ManyToManyField {
                            to: "flex_report.column".into(),
                            through: None,
                            related_name: Some("templates".into()),
                        },
                    ),
                    FieldDef::new(
                        "buttons",
                        FieldType::ManyToManyField {
                            to: "flex_report.tablebutton".into(),
                            through: None,
                            related_name: Some("templates".into()),
                        },
                    ),
                ],
            )
            .verbose_name("Template", "Templates")
            .ordering(vec![OrderBy::desc("is_page_default"), OrderBy::asc("id")])
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
            ("model", Value::from(self.model.as_str())),
            ("filters", Value::Json(serde_json::Value::Object(self.filters.clone()))),
            ("has_export", Value::Bool(self.has_export)),
            ("creator_id", Value::from(self.creator_id)),
            ("creator_name", Value::from(self.creator_name.as_str())),
            ("page_id", Value::from(self.page_id)),
            ("is_page_default", Value::Bool(self.is_page_default)),
            ("status", Value::from(self.status.code())),
            (
                "model_user_path",
                serde_json::to_value(&self.model_user_path).map_or(Value::Null, Value::Json),
            ),
            ("created_date", Value::DateTime(self.created_date)),
            ("modified_date", Value::DateTime(self.modified_date)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, ReportError> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            model: row.get("model")?,
            filters: json_object(row, "filters")?,
            has_export: row.get("has_export")?,
            creator_id: row.get("creator_id")?,
            creator_name: row.get::<Option<String>>("creator_name")?.unwrap_or_default(),
            page_id: row.get("page_id")?,
            is_page_default: row.get("is_page_default")?,
            status: TemplateStatus::from_code(&row.get::<String>("status")?),
            model_user_path: json_column(row, "model_user_path")?,
            created_date: row.get("created_date")?,
            modified_date: row.get("modified_date")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flex_report_http::RequestUser;

    #[test]
    fn test_derived_properties() {
        let template = Template::new("Orders", "shop.order")
            .with_filter("paid", true)
            .with_filter("status", "")
            .with_filter("tags__in", serde_json::json!([1, 2]));
        assert!(!template.is_completed());
        assert_eq!(template.filters_count(), 2);
        assert_eq!(template.user_fullname(), "Not Set");

        let user = RequestUser::new(1, "ann").with_name("Ann", "Lee");
        let template = template.created_by(&user).completed();
        assert!(template.is_completed());
        assert_eq!(template.user_fullname(), "Ann Lee");
        assert_eq!(template.creator_id, Some(1));
    }

    #[test]
    fn test_clean() {
        assert!(Template::new("Orders", "shop.order").clean().is_ok());
        assert_eq!(
            Template::new("", "shop.order").clean().unwrap_err().codes_for("title"),
            vec!["required"]
        );
        let mut orphan_default = Template::new("Orders", "shop.order");
        orphan_default.is_page_default = true;
        assert!(orphan_default.clean().is_err());
    }

    #[test]
    fn test_row_round_trip() {
        let template = Template::new("Orders", "shop.order").with_filter("paid", true).on_page(3);
        let (columns, values): (Vec<String>, Vec<Value>) = template
            .field_values()
            .into_iter()
            .map(|(c, v)| (c.to_string(), v))
            .unzip();
        let read = Template::from_row(&Row::new(columns, values)).unwrap();
        assert_eq!(read, template);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TemplateStatus::Complete.code(), "c");
        assert_eq!(TemplateStatus::from_code("p"), TemplateStatus::Pending);
        assert_eq!(serde_json::to_value(TemplateStatus::Complete).unwrap(), "c");
    }
}
