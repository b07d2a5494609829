//! Filter generation.
//!
//! Filters are built at request time from the columns of a template. A
//! [`FilterSetFactory`] holds one [`FilterSpec`] per query parameter it
//! accepts; binding it to [`FilterData`] yields a [`FilterSet`] that has
//! validated and coerced every value and knows the [`Q`] it contributes.
//!
//! Two flavours exist. A *general* factory creates one predicate per
//! `(field, lookup)` pair and ANDs them; a *quicksearch* factory accepts a
//! single `search` parameter and ORs an `icontains` across every searchable
//! field.
//!
//! Raw query strings are coerced with [`prepare_initial`] before binding:
//!
//! ```
//! use flex_report_db::Value;
//! use flex_report_engine::filters::prepare_initial;
//!
//! assert_eq!(prepare_initial("TRUE"), Value::Bool(true));
//! assert_eq!(prepare_initial("42"), Value::Int(42));
//! assert_eq!(prepare_initial("042"), Value::from("042"));
//! assert_eq!(prepare_initial("[1, 2]"), Value::List(vec![Value::Int(1), Value::Int(2)]));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime};
use flex_report_core::i18n::{calendar, gettext};
use flex_report_core::{AppSettings, Calendar, ReportResult};
use flex_report_db::{FieldDef, FieldType, Lookup, ModelSchema, QuerySet, SchemaRegistry, Value, Q};
use flex_report_http::QueryDict;
use serde::Serialize;

use crate::resolver::{ColumnDescriptor, FieldResolver};

/// Coerced filter values keyed by query parameter name.
pub type FilterData = BTreeMap<String, Value>;

/// The parameter carrying the quicksearch text.
pub const SEARCH_PARAM: &str = "search";

/// Suffix of parameters that carry several values.
pub const MULTI_VALUE_SUFFIX: &str = "__in";

/// Coerces one raw query value.
///
/// `true`/`false` in any case become booleans, bracketed literals become
/// lists, digit strings without a leading zero become integers, and
/// everything else stays a string.
pub fn prepare_initial(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&trimmed.replace('\'', "\"")) {
            return Value::from_json(&json);
        }
    }
    if !trimmed.is_empty() && !trimmed.starts_with('0') && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(number) = trimmed.parse::<i64>() {
            return Value::Int(number);
        }
    }
    Value::from(raw)
}

fn is_ignored_value(raw: &str, settings: &AppSettings) -> bool {
    raw.trim().is_empty() || settings.ignore_search_values.iter().any(|v| v == raw)
}

/// Collects the filter values of a request's query string.
///
/// Blank values, sentinel values and ignored keys are dropped. Keys ending in
/// `__in` keep all their values as a list.
pub fn get_initials(query: &QueryDict, settings: &AppSettings) -> FilterData {
    let mut initials = FilterData::new();
    for key in query.keys() {
        if settings.ignore_search_keys.iter().any(|k| k == key) {
            continue;
        }
        if key.ends_with(MULTI_VALUE_SUFFIX) {
            let items: Vec<Value> = query
                .get_list(key)
                .into_iter()
                .flatten()
                .filter(|raw| !is_ignored_value(raw, settings))
                .map(|raw| prepare_initial(raw))
                .collect();
            if !items.is_empty() {
                initials.insert(key.clone(), Value::List(items));
            }
            continue;
        }
        match query.get(key) {
            Some(raw) if !is_ignored_value(raw, settings) => {
                initials.insert(key.clone(), prepare_initial(raw));
            }
            _ => {}
        }
    }
    initials
}

/// Converts stored template filters into filter data.
pub fn stored_filter_data(filters: &serde_json::Map<String, serde_json::Value>) -> FilterData {
    filters
        .iter()
        .map(|(k, v)| (k.clone(), Value::from_json(v)))
        .filter(|(_, v)| v.is_truthy() || matches!(v, Value::Bool(_) | Value::Int(0)))
        .collect()
}

/// One selectable option of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterChoice {
    pub display: String,
    pub value: String,
}

impl FilterChoice {
    pub fn new(display: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            value: value.into(),
        }
    }
}

/// The kind of input a filter expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterInput {
    Text,
    Number,
    Boolean,
    Choice,
    Date,
    DateTime,
    Time,
    Relation { model: String },
    Search,
}

/// One query parameter a filter set accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSpec {
    /// The query parameter name.
    pub param: String,
    /// The field path the predicate applies to.
    pub field: String,
    pub lookup: &'static str,
    pub label: String,
    pub input: FilterInput,
    pub choices: Vec<FilterChoice>,
    #[serde(skip)]
    field_def: Option<FieldDef>,
}

impl FilterSpec {
    /// The field the predicate applies to, when it ends in a field.
    pub const fn field_def(&self) -> Option<&FieldDef> {
        self.field_def.as_ref()
    }

    fn for_column(descriptor: &ColumnDescriptor, lookup: &'static str) -> Self {
        let field_def = descriptor.path.as_ref().and_then(|p| p.field.clone());
        let param = match lookup {
            "iexact" | "startswith" => descriptor.name.clone(),
            other => format!("{}__{other}", descriptor.name),
        };
        let label = match lookup {
            "gte" => format!("{} ({})", descriptor.verbose_name, gettext("from")),
            "lte" => format!("{} ({})", descriptor.verbose_name, gettext("to")),
            _ => descriptor.verbose_name.clone(),
        };
        let mut choices = Vec::new();
        let input = match (lookup, field_def.as_ref().map(|f| &f.field_type)) {
            ("in", _) => FilterInput::Relation {
                model: descriptor
                    .path
                    .as_ref()
                    .and_then(|p| p.relation.as_ref())
                    .map(|hop| hop.to.label())
                    .unwrap_or_default(),
            },
            (_, Some(FieldType::BooleanField)) => {
                choices.push(FilterChoice::new(gettext("Yes"), "true"));
                choices.push(FilterChoice::new(gettext("No"), "false"));
                FilterInput::Boolean
            }
            (_, Some(FieldType::DateField)) => FilterInput::Date,
            (_, Some(FieldType::DateTimeField)) => FilterInput::DateTime,
            (_, Some(FieldType::TimeField)) => FilterInput::Time,
            (_, Some(field_type)) if is_numeric(field_type) => FilterInput::Number,
            _ => FilterInput::Text,
        };
        if let Some(field_choices) = field_def.as_ref().and_then(|f| f.choices.as_ref()) {
            choices = field_choices
                .iter()
                .map(|(value, display)| FilterChoice::new(display.clone(), value.to_string()))
                .collect();
        }
        let input = if field_def.as_ref().is_some_and(|f| f.choices.is_some()) {
            FilterInput::Choice
        } else {
            input
        };
        Self {
            param,
            field: descriptor.name.clone(),
            lookup,
            label,
            input,
            choices,
            field_def,
        }
    }

    /// Validates and coerces a bound value into a lookup.
    fn clean(&self, value: &Value, calendar: Calendar) -> Result<(Value, Lookup), String> {
        let field_type = self.field_def.as_ref().map(|f| &f.field_type);
        match self.lookup {
            "in" => {
                let items = match value {
                    Value::List(items) => items.clone(),
                    other => vec![other.clone()],
                };
                let keys = items
                    .iter()
                    .map(|item| match item {
                        Value::Int(i) => Some(Value::Int(*i)),
                        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::Int),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| gettext("Select a valid choice."))?;
                if keys.is_empty() {
                    return Err(gettext("Select a valid choice."));
                }
                Ok((Value::List(keys.clone()), Lookup::In(keys)))
            }
            "gte" | "lte" => {
                let cleaned = clean_temporal(value, field_type, self.lookup == "lte", calendar)
                    .ok_or_else(|| gettext("Enter a valid date."))?;
                let lookup = if self.lookup == "gte" {
                    Lookup::Gte(cleaned.clone())
                } else {
                    Lookup::Lte(cleaned.clone())
                };
                Ok((cleaned, lookup))
            }
            "startswith" => {
                let text = text_of(value).ok_or_else(|| gettext("Enter a valid value."))?;
                Ok((Value::from(text.as_str()), Lookup::StartsWith(text)))
            }
            _ => {
                let cleaned = self.clean_exact(value, field_type)?;
                Ok((cleaned.clone(), Lookup::IExact(cleaned)))
            }
        }
    }

    fn clean_exact(&self, value: &Value, field_type: Option<&FieldType>) -> Result<Value, String> {
        if let Some(choices) = self.field_def.as_ref().and_then(|f| f.choices.as_ref()) {
            let raw = text_of(value).unwrap_or_default();
            return choices
                .iter()
                .find(|(choice, _)| choice.to_string() == raw)
                .map(|(choice, _)| choice.clone())
                .ok_or_else(|| gettext("Select a valid choice."));
        }
        match field_type {
            Some(FieldType::BooleanField) => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(1) => Ok(Value::Bool(true)),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::String(s) if s == "0" => Ok(Value::Bool(false)),
                _ => Err(gettext("Enter a valid boolean.")),
            },
            Some(t) if is_integer(t) => match value {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| gettext("Enter a whole number.")),
                _ => Err(gettext("Enter a whole number.")),
            },
            Some(t) if is_numeric(t) => match value {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| gettext("Enter a number.")),
                _ => Err(gettext("Enter a number.")),
            },
            _ => text_of(value).map(Value::String).ok_or_else(|| gettext("Enter a valid value.")),
        }
    }
}

const fn is_integer(field_type: &FieldType) -> bool {
    matches!(
        field_type,
        FieldType::IntegerField
            | FieldType::BigIntegerField
            | FieldType::SmallIntegerField
            | FieldType::AutoField
            | FieldType::BigAutoField
    )
}

const fn is_numeric(field_type: &FieldType) -> bool {
    is_integer(field_type) || matches!(field_type, FieldType::FloatField | FieldType::DecimalField { .. })
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Uuid(_) => Some(value.to_string()),
        _ => None,
    }
}

fn clean_temporal(value: &Value, field_type: Option<&FieldType>, upper: bool, cal: Calendar) -> Option<Value> {
    let raw = value.as_str()?;
    match field_type {
        Some(FieldType::TimeField) => ["%H:%M:%S", "%H:%M"]
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(raw.trim(), fmt).ok())
            .map(Value::Time),
        Some(FieldType::DateTimeField) => {
            let date = calendar::parse_date(raw, cal)?;
            let time = if upper {
                NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)?
            } else {
                NaiveTime::MIN
            };
            Some(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        _ => calendar::parse_date(raw, cal).map(Value::Date),
    }
}

/// How a factory combines its predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// One predicate per field, ANDed.
    General,
    /// One `search` value matched against every field, ORed.
    Quicksearch,
}

/// Builds bound filter sets for one model.
#[derive(Debug, Clone)]
pub struct FilterSetFactory {
    registry: Arc<SchemaRegistry>,
    schema: Arc<ModelSchema>,
    mode: FilterMode,
    specs: Vec<FilterSpec>,
    search_fields: Vec<(String, &'static str)>,
    calendar: Calendar,
}

impl FilterSetFactory {
    /// Creates a general factory over `fields` of `model`.
    ///
    /// Fields that do not resolve, or resolve to something that cannot be
    /// filtered, are skipped. Specs are ordered by field name.
    pub fn general<'a>(
        resolver: &FieldResolver,
        model: &str,
        fields: impl IntoIterator<Item = &'a str>,
        calendar: Calendar,
    ) -> ReportResult<Self> {
        let schema = resolver.registry().require(model)?;
        let mut descriptors = resolve_filterable(resolver, model, fields);
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        let specs = descriptors
            .iter()
            .flat_map(|d| d.lookups.iter().map(|lookup| FilterSpec::for_column(d, lookup)))
            .collect();
        Ok(Self {
            registry: Arc::clone(resolver.registry()),
            schema,
            mode: FilterMode::General,
            specs,
            search_fields: Vec::new(),
            calendar,
        })
    }

    /// Creates a quicksearch factory over the searchable `fields` of `model`.
    ///
    /// Date and time fields never take part.
    pub fn quicksearch<'a>(
        resolver: &FieldResolver,
        model: &str,
        fields: impl IntoIterator<Item = &'a str>,
        calendar: Calendar,
    ) -> ReportResult<Self> {
        let schema = resolver.registry().require(model)?;
        let mut search_fields: Vec<(String, &'static str)> = resolve_filterable(resolver, model, fields)
            .iter()
            .filter_map(|d| d.quicksearch_lookups.first().map(|lookup| (d.name.clone(), *lookup)))
            .collect();
        search_fields.sort();
        let specs = if search_fields.is_empty() {
            Vec::new()
        } else {
            vec![FilterSpec {
                param: SEARCH_PARAM.to_string(),
                field: SEARCH_PARAM.to_string(),
                lookup: "icontains",
                label: gettext("Search"),
                input: FilterInput::Search,
                choices: Vec::new(),
                field_def: None,
            }]
        };
        Ok(Self {
            registry: Arc::clone(resolver.registry()),
            schema,
            mode: FilterMode::Quicksearch,
            specs,
            search_fields,
            calendar,
        })
    }

    pub const fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn specs(&self) -> &[FilterSpec] {
        &self.specs
    }

    /// The `(field, lookup)` pairs a quicksearch matches against.
    pub fn search_fields(&self) -> &[(String, &'static str)] {
        &self.search_fields
    }

    /// Returns `true` if the factory produces at least one predicate.
    pub fn has_filters(&self) -> bool {
        !self.specs.is_empty()
    }

    /// Binds data, keeping only the parameters this factory accepts.
    pub fn bind(&self, data: &FilterData) -> FilterSet {
        let mut set = FilterSet {
            registry: Arc::clone(&self.registry),
            schema: Arc::clone(&self.schema),
            has_filters: self.has_filters(),
            specs: self.specs.clone(),
            data: FilterData::new(),
            cleaned: Vec::new(),
            errors: BTreeMap::new(),
            q: None,
        };
        let mut predicates = Vec::new();
        for spec in &self.specs {
            let Some(value) = data.get(&spec.param) else {
                continue;
            };
            set.data.insert(spec.param.clone(), value.clone());
            match self.mode {
                FilterMode::General => match spec.clean(value, self.calendar) {
                    Ok((cleaned, lookup)) => {
                        predicates.push(Q::filter(spec.field.clone(), lookup));
                        set.cleaned.push(CleanedValue::new(spec, cleaned));
                    }
                    Err(message) => {
                        tracing::warn!(param = %spec.param, value = %value, %message, "invalid filter value");
                        set.errors.entry(spec.param.clone()).or_default().push(message);
                    }
                },
                FilterMode::Quicksearch => {
                    let Some(text) = text_of(value).filter(|t| !t.trim().is_empty()) else {
                        set.errors
                            .entry(spec.param.clone())
                            .or_default()
                            .push(gettext("Enter a valid value."));
                        continue;
                    };
                    predicates.push(Q::Or(
                        self.search_fields
                            .iter()
                            .filter_map(|(field, lookup)| {
                                Lookup::build(lookup, Value::from(text.as_str())).map(|l| Q::filter(field.clone(), l))
                            })
                            .collect(),
                    ));
                    set.cleaned.push(CleanedValue::new(spec, Value::String(text)));
                }
            }
        }
        for key in data.keys().filter(|k| !set.data.contains_key(*k)) {
            tracing::debug!(model = %self.schema.label(), param = %key, "ignoring filter parameter");
        }
        set.q = match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Q::And(predicates)),
        };
        set
    }
}

fn resolve_filterable<'a>(
    resolver: &FieldResolver,
    model: &str,
    fields: impl IntoIterator<Item = &'a str>,
) -> Vec<Arc<ColumnDescriptor>> {
    let mut seen = Vec::new();
    let mut descriptors = Vec::new();
    for field in fields {
        if seen.contains(&field) {
            continue;
        }
        seen.push(field);
        match resolver.resolve(model, field) {
            Some(descriptor) if descriptor.is_filterable() => descriptors.push(descriptor),
            _ => tracing::debug!(model, field, "column cannot be filtered"),
        }
    }
    descriptors
}

/// One validated filter value.
#[derive(Debug, Clone)]
pub struct CleanedValue {
    pub param: String,
    pub field: String,
    pub label: String,
    pub value: Value,
    field_def: Option<FieldDef>,
}

impl CleanedValue {
    fn new(spec: &FilterSpec, value: Value) -> Self {
        Self {
            param: spec.param.clone(),
            field: spec.field.clone(),
            label: spec.label.clone(),
            value,
            field_def: spec.field_def.clone(),
        }
    }

    pub const fn field_def(&self) -> Option<&FieldDef> {
        self.field_def.as_ref()
    }
}

/// A filter factory bound to data.
#[derive(Debug, Clone)]
pub struct FilterSet {
    registry: Arc<SchemaRegistry>,
    schema: Arc<ModelSchema>,
    has_filters: bool,
    specs: Vec<FilterSpec>,
    data: FilterData,
    cleaned: Vec<CleanedValue>,
    errors: BTreeMap<String, Vec<String>>,
    q: Option<Q>,
}

impl FilterSet {
    /// Returns `true` if the factory had at least one predicate.
    pub const fn has_filters(&self) -> bool {
        self.has_filters
    }

    /// The parameters this set accepts.
    pub fn specs(&self) -> &[FilterSpec] {
        &self.specs
    }

    /// The bound values this set accepted.
    pub const fn data(&self) -> &FilterData {
        &self.data
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub const fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    /// The validated values, in the order the filters were declared.
    pub fn cleaned_data(&self) -> &[CleanedValue] {
        &self.cleaned
    }

    /// Returns `true` if the set has predicates, data and no errors.
    pub fn is_active(&self) -> bool {
        self.has_filters && !self.data.is_empty() && self.is_valid() && !self.cleaned.is_empty()
    }

    /// The predicate of the valid values.
    pub const fn q(&self) -> Option<&Q> {
        self.q.as_ref()
    }

    /// The model's rows matching this set.
    pub fn queryset(&self) -> QuerySet {
        self.apply(QuerySet::for_schema(Arc::clone(&self.registry), Arc::clone(&self.schema)))
    }

    /// Restricts `queryset` to rows matching this set.
    pub fn apply(&self, queryset: QuerySet) -> QuerySet {
        match &self.q {
            Some(q) => queryset.filter(q.clone()),
            None => queryset,
        }
    }
}
