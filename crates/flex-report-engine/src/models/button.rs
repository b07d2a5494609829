use std::collections::BTreeMap;
use std::sync::LazyLock;

use flex_report_core::{ReportError, ValidationError};
use flex_report_db::query::compiler::Row;
use flex_report_db::{FieldDef, FieldType, Model, ModelMeta, OnDelete, OrderBy, Value};
use serde::Serialize;

use super::{json_column, optional_text, APP_LABEL};

/// A named CSS color class for row buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableButtonColor {
    pub id: Option<i64>,
    pub title: String,
    pub color: String,
}

impl TableButtonColor {
    pub fn new(title: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            color: color.into(),
        }
    }

    pub fn clean(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::for_field("title", "This field is required.", "required"));
        }
        if self.color.trim().is_empty() {
            return Err(ValidationError::for_field("color", "This field is required.", "required"));
        }
        Ok(())
    }
}

impl Model for TableButtonColor {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                APP_LABEL,
                "tablebuttoncolor",
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("title", FieldType::CharField).max_length(50).unique(),
                    FieldDef::new("color", FieldType::CharField).max_length(50),
                ],
            )
            .verbose_name("Table Button Color", "Table Button Colors")
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
            ("color", Value::from(self.color.as_str())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, ReportError> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            color: row.get("color")?,
        })
    }
}

/// A per-row action shown next to the report cells.
///
/// A button either fires a client-side `event` or links to the route
/// `url_name`; exactly one of the two is set. `url_kwargs` maps route
/// keyword arguments to record field paths, and `exposed_fields` lists the
/// columns handed to the event handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableButton {
    pub id: Option<i64>,
    pub title: String,
    pub icon: Option<String>,
    pub display_name: Option<String>,
    pub event: Option<String>,
    pub url_name: Option<String>,
    pub url_kwargs: BTreeMap<String, String>,
    pub exposed_fields: Vec<String>,
    pub color_id: Option<i64>,
}

impl TableButton {
    /// Creates a button that fires `event`.
    pub fn with_event(title: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            ..Self::blank(title)
        }
    }

    /// Creates a button that links to the route `url_name`.
    pub fn with_url(title: impl Into<String>, url_name: impl Into<String>) -> Self {
        Self {
            url_name: Some(url_name.into()),
            ..Self::blank(title)
        }
    }

    fn blank(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            icon: None,
            display_name: None,
            event: None,
            url_name: None,
            url_kwargs: BTreeMap::new(),
            exposed_fields: Vec::new(),
            color_id: None,
        }
    }

    /// Maps a route keyword argument to a record field path.
    #[must_use]
    pub fn url_kwarg(mut self, kwarg: impl Into<String>, path: impl Into<String>) -> Self {
        self.url_kwargs.insert(kwarg.into(), path.into());
        self
    }

    /// Exposes a column to the button's event handler.
    #[must_use]
    pub fn expose(mut self, field: impl Into<String>) -> Self {
        self.exposed_fields.push(field.into());
        self
    }

    /// The label shown on the button.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.title)
    }

    /// Validates the button before it is written.
    ///
    /// A button needs a title or an icon, and exactly one of `event` and
    /// `url_name`.
    pub fn clean(&self) -> Result<(), ValidationError> {
        let mut errors = std::collections::HashMap::new();
        let has_icon = self.icon.as_deref().is_some_and(|i| !i.trim().is_empty());
        if self.title.trim().is_empty() && !has_icon {
            errors.insert(
                "title".to_string(),
                vec![ValidationError::new("Title or icon is required.", "required")],
            );
        }
        let has_event = self.event.as_deref().is_some_and(|e| !e.trim().is_empty());
        let has_url = self.url_name.as_deref().is_some_and(|u| !u.trim().is_empty());
        if has_event == has_url {
            let message = if has_event {
                "Event and URL name cannot be used together."
            } else {
                "Either an event or a URL name is required."
            };
            for field in ["event", "url_name"] {
                errors.insert(field.to_string(), vec![ValidationError::new(message, "invalid")]);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::with_field_errors(errors))
        }
    }
}

fn json_of<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).map_or(Value::Null, Value::Json)
}

impl Model for TableButton {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                APP_LABEL,
                "tablebutton",
                vec![
                    FieldDef::new("id", FieldType::BigAutoField).primary_key(),
                    FieldDef::new("title", FieldType::CharField).max_length(50).unique(),
                    FieldDef::new("icon", FieldType::CharField).max_length(30).nullable(),
                    FieldDef::new("display_name", FieldType::CharField).max_length(40).nullable(),
                    FieldDef::new("event", FieldType::CharField).max_length(50).nullable(),
                    FieldDef::new("url_name", FieldType::CharField).max_length(200).nullable(),
                    FieldDef::new("url_kwargs", FieldType::JsonField),
                    FieldDef::new("exposed_fields", FieldType::JsonField),
                    FieldDef::new(
                        "color",
                        FieldType::ForeignKey {
                            to: "flex_report.tablebuttoncolor".into(),
                            on_delete: OnDelete::SetNull,
                            related_name: Some("buttons".into()),
                        },
                    )
                    .nullable(),
                ],
            )
            .verbose_name("Table Button", "Table Buttons")
            .ordering(vec![OrderBy::asc("id")])
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
            ("icon", Value::from(self.icon.clone())),
            ("display_name", Value::from(self.display_name.clone())),
            ("event", Value::from(self.event.clone())),
            ("url_name", Value::from(self.url_name.clone())),
            ("url_kwargs", json_of(&self.url_kwargs)),
            ("exposed_fields", json_of(&self.exposed_fields)),
            ("color_id", Value::from(self.color_id)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, ReportError> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            icon: optional_text(row, "icon")?,
            display_name: optional_text(row, "display_name")?,
            event: optional_text(row, "event")?,
            url_name: optional_text(row, "url_name")?,
            url_kwargs: json_column(row, "url_kwargs")?,
            exposed_fields: json_column(row, "exposed_fields")?,
            color_id: row.get("color_id")?,
        })
    }
}
