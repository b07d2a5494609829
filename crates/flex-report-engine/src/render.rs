//! Cell rendering.
//!
//! [`CellRenderer`] turns one record and one column title into display text.
//! Dates go through the configured calendar and formats, relations render
//! the display string of the related records, choices render their label,
//! money renders with its currency and files become media URLs.
//!
//! HTML cells additionally pass through [`DataTags`], a per-type table of
//! tag builders that callers may override, and blank values render the
//! configured default cell value.

use std::collections::HashMap;
use std::sync::Arc;

use flex_report_core::i18n::{calendar, gettext};
use flex_report_core::utils::text::escape_html;
use flex_report_core::AppSettings;
use flex_report_db::{FieldDef, FieldType, Record, Related, ResolvedPath, Value};

use crate::resolver::{ColumnDescriptor, ColumnKind, FieldResolver};

/// The tag family a cell renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Image,
    File,
    Boolean,
    Phone,
    Default,
}

impl TagKind {
    /// Picks the tag family of a field type.
    pub const fn for_field(field_type: Option<&FieldType>) -> Self {
        match field_type {
            Some(FieldType::ImageField { .. }) => Self::Image,
            Some(FieldType::FileField { .. }) => Self::File,
            Some(FieldType::BooleanField) => Self::Boolean,
            Some(FieldType::PhoneNumberField) => Self::Phone,
            _ => Self::Default,
        }
    }
}

/// Builds the HTML of a cell from its text.
pub type TagRenderer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The HTML tag builders, one per [`TagKind`].
///
/// ```
/// use std::sync::Arc;
/// use flex_report_engine::render::{DataTags, TagKind};
///
/// let mut tags = DataTags::default();
/// assert_eq!(tags.render(TagKind::Phone, "+1 555 0100"), "<span>+1-555-0100</span>");
/// tags.set(TagKind::Phone, Arc::new(|v: &str| format!("<a href=\"tel:{v}\">{v}</a>")));
/// assert_eq!(tags.render(TagKind::Phone, "5550100"), "<a href=\"tel:5550100\">5550100</a>");
/// ```
#[derive(Clone)]
pub struct DataTags {
    tags: HashMap<TagKind, TagRenderer>,
}

impl std::fmt::Debug for DataTags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTags")
            .field("kinds", &self.tags.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

impl Default for DataTags {
    fn default() -> Self {
        let mut tags: HashMap<TagKind, TagRenderer> = HashMap::new();
        tags.insert(
            TagKind::Image,
            Arc::new(|v: &str| format!("<img src=\"{}\" height=100>", escape_html(v))),
        );
        tags.insert(
            TagKind::File,
            Arc::new(|v: &str| {
                let name = escape_html(file_name(v));
                format!("<a href=\"{}\" download=\"{name}\">{name}</a>", escape_html(v))
            }),
        );
        tags.insert(
            TagKind::Boolean,
            Arc::new(|v: &str| {
                let icon = if v == "true" { "check_circle" } else { "cancel" };
                format!("<i class=\"material-icons-outlined\">{icon}</i>")
            }),
        );
        tags.insert(
            TagKind::Phone,
            Arc::new(|v: &str| format!("<span>{}</span>", escape_html(&v.replace(' ', "-")))),
        );
        tags.insert(
            TagKind::Default,
            Arc::new(|v: &str| format!("<span>{}</span>", escape_html(v))),
        );
        Self { tags }
    }
}

impl DataTags {
    /// Replaces the builder of one tag family.
    pub fn set(&mut self, kind: TagKind, renderer: TagRenderer) {
        self.tags.insert(kind, renderer);
    }

    /// Renders `value` with the builder of `kind`.
    ///
    /// Falls back to the default builder, then to escaped text.
    pub fn render(&self, kind: TagKind, value: &str) -> String {
        match self.tags.get(&kind).or_else(|| self.tags.get(&TagKind::Default)) {
            Some(renderer) => renderer(value),
            None => escape_html(value),
        }
    }
}

/// Returns `true` if a value should be shown rather than blanked.
///
/// Truthy values are shown, and so are booleans and zero.
pub fn is_row_value_valid(field_type: Option<&FieldType>, value: &Value) -> bool {
    value.is_truthy() || matches!(field_type, Some(FieldType::BooleanField)) || value.is_zero()
}

/// How file fields are turned into URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileUrls {
    /// `media_url` + path.
    Relative,
    /// `site_url` + `media_url` + path.
    Absolute,
}

/// Renders cells of records against the resolver's classifications.
#[derive(Debug, Clone, Copy)]
pub struct CellRenderer<'a> {
    resolver: &'a FieldResolver,
    settings: &'a AppSettings,
    tags: &'a DataTags,
}

impl<'a> CellRenderer<'a> {
    pub const fn new(resolver: &'a FieldResolver, settings: &'a AppSettings, tags: &'a DataTags) -> Self {
        Self {
            resolver,
            settings,
            tags,
        }
    }

    pub const fn resolver(&self) -> &'a FieldResolver {
        self.resolver
    }

    pub const fn settings(&self) -> &'a AppSettings {
        self.settings
    }

    fn descriptor(&self, record: &Record, column: &str) -> Option<Arc<ColumnDescriptor>> {
        self.resolver.resolve(record.model(), column)
    }

    /// The typed value of a cell.
    ///
    /// Many-valued columns yield a list; unresolvable columns yield null.
    pub fn value(&self, record: &Record, column: &str) -> Value {
        let Some(descriptor) = self.descriptor(record, column) else {
            return Value::Null;
        };
        match descriptor.kind {
            ColumnKind::Field => descriptor
                .path
                .as_ref()
                .map_or(Value::Null, |path| path_value(record, path)),
            ColumnKind::Property => follow(record, &descriptor.relation_prefix)
                .and_then(|target| {
                    descriptor
                        .owner
                        .get_property(&descriptor.attribute)
                        .map(|p| p.compute(target))
                })
                .unwrap_or(Value::Null),
            ColumnKind::Custom => match descriptor.owner.get_computed(column) {
                Some(field) => field.compute(record),
                None => descriptor
                    .owner
                    .get_custom_fields(column)
                    .map_or(Value::Null, |provider| {
                        Value::List(provider.fields.iter().map(|f| f.compute(record)).collect())
                    }),
            },
            ColumnKind::Dynamic => descriptor
                .owner
                .get_dynamic_field(column)
                .map_or(Value::Null, |dynamic| {
                    Value::List(dynamic.unpack().iter().map(|f| f.compute(record)).collect())
                }),
        }
    }

    /// Renders a cell as plain text with relative file URLs.
    pub fn render(&self, record: &Record, column: &str) -> String {
        self.render_with(record, column, FileUrls::Relative)
    }

    /// Renders a cell as plain text.
    pub fn render_with(&self, record: &Record, column: &str, urls: FileUrls) -> String {
        let Some(descriptor) = self.descriptor(record, column) else {
            return String::new();
        };
        match (&descriptor.kind, &descriptor.path) {
            (ColumnKind::Field, Some(path)) => self.render_path(record, path, urls),
            (ColumnKind::Dynamic, _) => self.render_dynamic(record, column).join(", "),
            _ => self.value_text(&self.value(record, column)),
        }
    }

    /// Renders each sub-field of a dynamic column.
    pub fn render_dynamic(&self, record: &Record, column: &str) -> Vec<String> {
        let Some(schema) = self.resolver.registry().get(record.model()) else {
            return Vec::new();
        };
        schema
            .get_dynamic_field(column)
            .map(|dynamic| {
                dynamic
                    .unpack()
                    .iter()
                    .map(|f| self.value_text(&f.compute(record)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Renders a cell as HTML.
    pub fn render_html(&self, record: &Record, column: &str) -> String {
        let Some(descriptor) = self.descriptor(record, column) else {
            return self.settings.default_cell_value.clone();
        };
        let field_type = descriptor.field_type();
        let value = self.value(record, column);
        if !is_row_value_valid(field_type, &value) {
            return self.settings.default_cell_value.clone();
        }
        let kind = TagKind::for_field(field_type);
        if kind == TagKind::Boolean {
            return self.tags.render(kind, if value.is_truthy() { "true" } else { "false" });
        }
        let text = self.render_with(record, column, FileUrls::Absolute);
        self.tags.render(kind, &text)
    }

    /// Builds the URL of a stored file path.
    ///
    /// Paths that already are URLs are returned as they are.
    pub fn file_url(&self, path: &str, urls: FileUrls) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let relative = format!("{}{}", self.settings.media_url, path.trim_start_matches('/'));
        match urls {
            FileUrls::Relative => relative,
            FileUrls::Absolute => format!("{}{relative}", self.settings.site_url.trim_end_matches('/')),
        }
    }

    fn render_path(&self, record: &Record, path: &ResolvedPath, urls: FileUrls) -> String {
        let owners = walk(record, path);
        let parts: Vec<String> = match &path.relation {
            Some(hop) => owners
                .iter()
                .flat_map(|owner| match owner.related(&path.name) {
                    Some(Related::Many(records)) => records.iter().map(|r| hop.to.display_record(r)).collect(),
                    Some(Related::One(Some(related))) => vec![hop.to.display_record(related)],
                    Some(Related::One(None)) => Vec::new(),
                    None => owner
                        .get(&path.name)
                        .filter(|v| !v.is_null())
                        .map(ToString::to_string)
                        .into_iter()
                        .collect(),
                })
                .collect(),
            None => owners
                .iter()
                .filter_map(|owner| owner.get(&path.name))
                .map(|value| self.format_field(path.field.as_ref(), value, urls))
                .filter(|text| !text.is_empty())
                .collect(),
        };
        parts.join(", ")
    }

    fn format_field(&self, field: Option<&FieldDef>, value: &Value, urls: FileUrls) -> String {
        let Some(field) = field else {
            return self.value_text(value);
        };
        if value.is_null() {
            return String::new();
        }
        if let Some(label) = field.choice_label(value) {
            return label.to_string();
        }
        match (&field.field_type, value) {
            (FieldType::MoneyField { currency }, _) => {
                let amount = match value {
                    Value::Float(f) => Some(*f),
                    #[allow(clippy::cast_precision_loss)]
                    Value::Int(i) => Some(*i as f64),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                };
                amount.map_or_else(|| value.to_string(), |a| self.settings.money_format.format(a, currency))
            }
            (FieldType::FileField { .. } | FieldType::ImageField { .. }, Value::String(path)) => {
                if path.is_empty() {
                    String::new()
                } else {
                    self.file_url(path, urls)
                }
            }
            _ => self.value_text(value),
        }
    }

    /// Plain text of a value, formatting dates through the calendar.
    pub fn value_text(&self, value: &Value) -> String {
        value_text(self.settings, value)
    }
}

/// Plain text of a value.
///
/// Dates and times use the configured formats and calendar, booleans the
/// localized yes/no tokens and lists are joined with `", "`.
pub fn value_text(settings: &AppSettings, value: &Value) -> String {
    let formats = &settings.time_formats;
    let cal = settings.calendar;
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => gettext("Yes"),
        Value::Bool(false) => gettext("No"),
        Value::String(s) => s.clone(),
        Value::Date(d) => calendar::format_date(*d, &formats.date, cal),
        Value::DateTime(dt) => calendar::strftime(dt, &formats.datetime, cal),
        Value::DateTimeTz(dt) => calendar::strftime(&dt.naive_utc(), &formats.datetime, cal),
        Value::Time(t) => calendar::format_time(*t, &formats.time),
        Value::List(items) => items
            .iter()
            .map(|v| value_text(settings, v))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Json(serde_json::Value::String(s)) => s.clone(),
        other => other.to_string(),
    }
}

/// Follows single relations by name.
fn follow<'r>(record: &'r Record, names: &[String]) -> Option<&'r Record> {
    names.iter().try_fold(record, |current, name| current.one(name))
}

/// The records owning the last segment of `path`, across every hop.
fn walk<'r>(record: &'r Record, path: &ResolvedPath) -> Vec<&'r Record> {
    path.hops.iter().fold(vec![record], |current, hop| {
        current
            .into_iter()
            .flat_map(|r| match r.related(&hop.name) {
                Some(Related::One(Some(related))) => vec![related.as_ref()],
                Some(Related::Many(records)) => records.iter().collect(),
                _ => Vec::new(),
            })
            .collect()
    })
}

fn path_value(record: &Record, path: &ResolvedPath) -> Value {
    let owners = walk(record, path);
    let mut values: Vec<Value> = owners
        .iter()
        .flat_map(|owner| match (&path.relation, owner.related(&path.name)) {
            (Some(_), Some(Related::Many(records))) => records.iter().map(|r| r.pk().clone()).collect(),
            (Some(_), Some(Related::One(Some(related)))) => vec![related.pk().clone()],
            (Some(_), Some(Related::One(None))) => Vec::new(),
            _ => owner.get(&path.name).cloned().into_iter().collect(),
        })
        .collect();
    let many = path.is_many() || path.hops.iter().any(|hop| hop.is_many());
    if many {
        Value::List(values)
    } else {
        values.pop().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_order, shop_resolver};
    use flex_report_core::{Calendar, MoneyFormat};

    fn settings() -> AppSettings {
        AppSettings {
            calendar: Calendar::Gregorian,
            ..AppSettings::default()
        }
    }

    fn render_all(columns: &[&str]) -> Vec<String> {
        let resolver = shop_resolver();
        let settings = settings();
        let tags = DataTags::default();
        let renderer = CellRenderer::new(&resolver, &settings, &tags);
        let order = sample_order();
        columns.iter().map(|c| renderer.render(&order, c)).collect()
    }

    fn render_html_all(columns: &[&str]) -> Vec<String> {
        let resolver = shop_resolver();
        let settings = settings();
        let tags = DataTags::default();
        let renderer = CellRenderer::new(&resolver, &settings, &tags);
        let order = sample_order();
        columns.iter().map(|c| renderer.render_html(&order, c)).collect()
    }

    #[test]
    fn test_field_text() {
        assert_eq!(
            render_all(&["number", "total", "price", "paid", "status", "created", "due", "receipt"]),
            vec![
                "A-100",
                "12.5",
                "12.50 USD",
                "No",
                "Shipped",
                "14:30 2024/03/05",
                "",
                "/media/receipts/a100.pdf"
            ]
        );
    }

    #[test]
    fn test_relation_text() {
        assert_eq!(
            render_all(&["customer", "customer__name", "customer__city__name", "tags", "tags__name", "lines"]),
            vec!["Ann Lee", "Ann Lee", "Tabriz", "gift, rush", "gift, rush", ""]
        );
    }

    #[test]
    fn test_computed_text() {
        assert_eq!(
            render_all(&["double_total", "customer__initials", "audit.created_by", "audit", "scores", "nope"]),
            vec!["25", "AL", "admin", "admin, web", "12.5, 13.5", ""]
        );
    }

    #[test]
    fn test_money_follows_settings() {
        let resolver = shop_resolver();
        let settings = AppSettings {
            money_format: MoneyFormat {
                decimal_places: 1,
                thousands_separator: ",".into(),
                pattern: "{currency} {amount}".into(),
            },
            ..settings()
        };
        let tags = DataTags::default();
        let renderer = CellRenderer::new(&resolver, &settings, &tags);
        assert_eq!(renderer.render(&sample_order(), "price"), "USD 12.5");
        let big = sample_order().with("price", 1_234_567.3);
        assert_eq!(renderer.render(&big, "price"), "USD 1,234,567.3");
        let text = sample_order().with("price", "n/a");
        assert_eq!(renderer.render(&text, "price"), "n/a");
    }

    #[test]
    fn test_jalali_dates() {
        let resolver = shop_resolver();
        let settings = AppSettings::default();
        let tags = DataTags::default();
        let renderer = CellRenderer::new(&resolver, &settings, &tags);
        assert_eq!(renderer.render(&sample_order(), "created"), "14:30 1402/12/15");
    }

    #[test]
    fn test_html_tags() {
        assert_eq!(
            render_html_all(&["paid", "photo", "receipt", "customer__phone", "number", "due", "nope"]),
            vec![
                "<i class=\"material-icons-outlined\">cancel</i>",
                "<img src=\"/media/photos/a100.png\" height=100>",
                "<a href=\"/media/receipts/a100.pdf\" download=\"a100.pdf\">a100.pdf</a>",
                "<span>+98-914-000-1122</span>",
                "<span>A-100</span>",
                "&mdash;",
                "&mdash;",
            ]
        );
    }

    #[test]
    fn test_html_escapes_and_absolute_urls() {
        let resolver = shop_resolver();
        let settings = AppSettings {
            site_url: "https://reports.example.com/".into(),
            ..settings()
        };
        let tags = DataTags::default();
        let renderer = CellRenderer::new(&resolver, &settings, &tags);
        let order = sample_order().with("number", "<b>A</b>");
        assert_eq!(renderer.render_html(&order, "number"), "<span>&lt;b&gt;A&lt;/b&gt;</span>");
        assert_eq!(
            renderer.render_html(&order, "photo"),
            "<img src=\"https://reports.example.com/media/photos/a100.png\" height=100>"
        );
        assert_eq!(renderer.render(&order, "photo"), "/media/photos/a100.png");
        assert_eq!(
            renderer.file_url("https://cdn.example.com/x.png", FileUrls::Absolute),
            "https://cdn.example.com/x.png"
        );
    }

    #[test]
    fn test_typed_values() {
        let resolver = shop_resolver();
        let settings = settings();
        let tags = DataTags::default();
        let renderer = CellRenderer::new(&resolver, &settings, &tags);
        let order = sample_order();
        assert_eq!(renderer.value(&order, "tags"), Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(renderer.value(&order, "customer"), Value::Int(3));
        assert_eq!(renderer.value(&order, "customer__city__name"), Value::from("Tabriz"));
        assert_eq!(renderer.value(&order, "due"), Value::Null);
        assert_eq!(renderer.value(&order, "double_total"), Value::Float(25.0));
    }

    #[test]
    fn test_is_row_value_valid() {
        assert!(is_row_value_valid(None, &Value::from("x")));
        assert!(is_row_value_valid(None, &Value::Int(0)));
        assert!(is_row_value_valid(Some(&FieldType::BooleanField), &Value::Bool(false)));
        assert!(!is_row_value_valid(None, &Value::Bool(false)));
        assert!(!is_row_value_valid(None, &Value::from("")));
        assert!(!is_row_value_valid(None, &Value::Null));
    }

    #[test]
    fn test_override_tag() {
        let resolver = shop_resolver();
        let settings = settings();
        let mut tags = DataTags::default();
        tags.set(TagKind::Boolean, Arc::new(|v: &str| format!("[{v}]")));
        let renderer = CellRenderer::new(&resolver, &settings, &tags);
        assert_eq!(renderer.render_html(&sample_order(), "paid"), "[false]");
    }
}
