//! Query composition.
//!
//! [`QueryComposer::compose`] builds the result set of one report request:
//!
//! 1. the base queryset is the model's rows, narrowed by the template's
//!    stored filters when it has any;
//! 2. the first applicable user path of the template scopes the base;
//! 3. the request's general filters and quicksearch are ANDed onto it only
//!    when the general set, the quicksearch set and the stored set all have
//!    predicates, bound data and no validation errors; otherwise the base is
//!    returned as it is;
//! 4. the result is deduplicated and ordered by the model's ordering, or by
//!    primary key.
//!
//! When request filters were applied, the composer also summarizes them as
//! `"<label> = <value>"` pairs for display.

use std::sync::Arc;

use flex_report_core::i18n::gettext;
use flex_report_core::{AppSettings, ReportResult};
use flex_report_db::{DatabaseBackendType, QuerySet, Value};
use flex_report_http::HttpRequest;

use crate::filters::{
    get_initials, stored_filter_data, CleanedValue, FilterData, FilterSet, FilterSetFactory, SEARCH_PARAM,
};
use crate::hooks::HookRegistry;
use crate::models::Template;
use crate::render::value_text;
use crate::resolver::{ColumnKind, FieldResolver};
use crate::user_path::apply_user_path;

/// The outcome of composing a report request.
#[derive(Debug, Clone)]
pub struct ComposedReport {
    /// The rows of the report, not yet evaluated.
    pub queryset: QuerySet,
    /// Filters bound to the request.
    pub filters: FilterSet,
    /// Quicksearch bound to the request.
    pub quicksearch: FilterSet,
    /// Filters bound to the template's stored values.
    pub template_filters: FilterSet,
    /// The request's coerced filter values.
    pub initials: FilterData,
    /// Whether the request's filters narrowed the result.
    pub filters_applied: bool,
    pub used_filters: Option<String>,
}

/// Combines the filters of a template and a request into one queryset.
#[derive(Debug, Clone, Copy)]
pub struct QueryComposer<'a> {
    resolver: &'a FieldResolver,
    settings: &'a AppSettings,
    hooks: &'a HookRegistry,
}

impl<'a> QueryComposer<'a> {
    pub const fn new(resolver: &'a FieldResolver, settings: &'a AppSettings, hooks: &'a HookRegistry) -> Self {
        Self {
            resolver,
            settings,
            hooks,
        }
    }

    /// Composes the report of `template` for `request`.
    ///
    /// `columns` are the template's column titles and `searchable` the titles
    /// of its searchable columns. Request parameters that name no filter are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Fails when the template's model is not registered.
    pub fn compose(
        &self,
        template: &Template,
        columns: &[String],
        searchable: &[String],
        request: &HttpRequest,
    ) -> ReportResult<ComposedReport> {
        let model = template.model.as_str();
        let schema = self.resolver.registry().require(model)?;
        let cal = self.settings.calendar;

        let model_fields: Vec<&str> = schema.meta().fields.iter().map(|f| f.name).collect();
        let template_filters = FilterSetFactory::general(self.resolver, model, model_fields, cal)?
            .bind(&stored_filter_data(&template.filters));
        if !template_filters.is_valid() {
            tracing::warn!(
                template = template.title.as_str(),
                errors = ?template_filters.errors(),
                "stored template filters are invalid; applying the valid ones"
            );
        }
        let mut queryset = if template_filters.data().is_empty() {
            QuerySet::for_schema(Arc::clone(self.resolver.registry()), schema)
        } else {
            template_filters.queryset().distinct()
        };

        if !template.model_user_path.is_empty() {
            match self.hooks.user_path(model, &self.settings.model_user_path_func_name) {
                Some(hook) => {
                    queryset = apply_user_path(queryset, &template.model_user_path, &hook(request));
                }
                None => tracing::debug!(model, "template has user paths but the model has no user path hook"),
            }
        }

        let initials = get_initials(request.get(), self.settings);
        let filter_fields = columns
            .iter()
            .filter(|c| self.resolver.kind_of(model, c) == Some(ColumnKind::Field))
            .map(String::as_str);
        let filters = FilterSetFactory::general(self.resolver, model, filter_fields, cal)?.bind(&initials);
        let quicksearch =
            FilterSetFactory::quicksearch(self.resolver, model, searchable.iter().map(String::as_str), cal)?
                .bind(&initials);

        let request_ready = |set: &FilterSet| set.has_filters() && !initials.is_empty() && set.is_valid();
        let stored_ready = template_filters.has_filters()
            && !template_filters.data().is_empty()
            && template_filters.is_valid();
        let filters_applied = stored_ready && request_ready(&filters) && request_ready(&quicksearch);
        let mut used_filters = None;
        if filters_applied {
            queryset = quicksearch.apply(filters.apply(queryset));
            used_filters = self.used_filters(quicksearch.cleaned_data().iter().chain(filters.cleaned_data()));
        } else if !initials.is_empty() {
            tracing::debug!(
                model,
                stored = stored_ready,
                filters = ?filters.errors(),
                quicksearch = ?quicksearch.errors(),
                "request filters not applied; showing the base report"
            );
        }

        let queryset = queryset.distinct().order_by_default();
        if let Ok((sql, _)) = queryset.to_sql(DatabaseBackendType::SQLite) {
            tracing::debug!(model, %sql, "composed report queryset");
        }
        Ok(ComposedReport {
            queryset,
            filters,
            quicksearch,
            template_filters,
            initials,
            filters_applied,
            used_filters,
        })
    }

    /// Summarizes cleaned filter values, skipping the quicksearch text.
    pub fn used_filters<'c>(&self, cleaned: impl IntoIterator<Item = &'c CleanedValue>) -> Option<String> {
        let parts: Vec<String> = cleaned
            .into_iter()
            .filter(|c| !c.param.eq_ignore_ascii_case(SEARCH_PARAM))
            .filter(|c| c.value.is_truthy() || matches!(c.value, Value::Bool(_)) || c.value.is_zero())
            .map(|c| format!("{} = {}", c.label, self.format_used_value(c)))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(&gettext(" and ")))
        }
    }

    fn format_used_value(&self, cleaned: &CleanedValue) -> String {
        let one = |value: &Value| {
            cleaned
                .field_def()
                .and_then(|f| f.choice_label(value))
                .map_or_else(|| value_text(self.settings, value), ToString::to_string)
        };
        match &cleaned.value {
            Value::List(items) => items.iter().map(one).collect::<Vec<_>>().join(", "),
            value => one(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::shop_resolver;
    use crate::user_path::{PathExpr, UserPath};
    use flex_report_core::Calendar;
    use flex_report_http::RequestUser;
    use std::collections::HashMap;

    fn settings() -> AppSettings {
        AppSettings {
            calendar: Calendar::Gregorian,
            ..AppSettings::default()
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn compose(template: &Template, query: &str, hooks: &HookRegistry) -> ComposedReport {
        let resolver = shop_resolver();
        let settings = settings();
        let request = HttpRequest::builder()
            .query_string(query)
            .user(RequestUser::new(3, "ann"))
            .build();
        QueryComposer::new(&resolver, &settings, hooks)
            .compose(
                template,
                &strings(&["number", "paid", "status", "created", "tags", "double_total"]),
                &strings(&["number", "customer__name", "created"]),
                &request,
            )
            .unwrap()
    }

    fn sql(report: &ComposedReport) -> String {
        report.queryset.to_sql(DatabaseBackendType::SQLite).unwrap().0
    }

    #[test]
    fn test_no_filters_orders_and_deduplicates() {
        let report = compose(&Template::new("Orders", "shop.order"), "", &HookRegistry::new());
        assert_eq!(sql(&report), "SELECT DISTINCT * FROM \"shop_order\" ORDER BY \"number\" ASC");
        assert!(!report.filters_applied);
        assert!(report.used_filters.is_none());
    }

    #[test]
    fn test_request_filters_and_quicksearch_intersect() {
        let report = compose(
            &Template::new("Paid orders", "shop.order").with_filter("paid", true),
            "status=s&search=ann&report_template=2&total=5",
            &HookRegistry::new(),
        );
        assert!(report.filters_applied);
        assert_eq!(
            sql(&report),
            "SELECT DISTINCT * FROM \"shop_order\" WHERE (\"paid\" = ? AND LOWER(\"status\") = LOWER(?) AND \
             (\"customer_id\" IN (SELECT \"id\" FROM \"shop_customer\" WHERE LOWER(\"name\") LIKE LOWER(?)) OR \
             LOWER(\"number\") LIKE LOWER(?))) ORDER BY \"number\" ASC"
        );
        assert_eq!(report.used_filters.as_deref(), Some("Status = Shipped"));
        assert!(!report.initials.contains_key("report_template"));
    }

    #[test]
    fn test_request_filters_need_stored_filters() {
        let report = compose(&Template::new("Orders", "shop.order"), "number=A-100", &HookRegistry::new());
        assert!(report.filters.is_active());
        assert!(!report.filters_applied);
        assert!(report.used_filters.is_none());
        assert_eq!(sql(&report), "SELECT DISTINCT * FROM \"shop_order\" ORDER BY \"number\" ASC");

        let stored = Template::new("Orders", "shop.order").with_filter("paid", true);
        let report = compose(&stored, "number=A-100", &HookRegistry::new());
        assert!(report.filters_applied);
        assert_eq!(report.used_filters.as_deref(), Some("Number = A-100"));
    }

    #[test]
    fn test_invalid_stored_filters_keep_request_filters_off() {
        let template = Template::new("Orders", "shop.order").with_filter("status", "x");
        let report = compose(&template, "number=A-100", &HookRegistry::new());
        assert!(!report.template_filters.is_valid());
        assert!(!report.filters_applied);
    }

    #[test]
    fn test_invalid_request_filters_fall_back_to_base() {
        let report = compose(
            &Template::new("Orders", "shop.order"),
            "status=x&search=ann",
            &HookRegistry::new(),
        );
        assert!(!report.filters_applied);
        assert!(!report.filters.is_valid());
        assert_eq!(sql(&report), "SELECT DISTINCT * FROM \"shop_order\" ORDER BY \"number\" ASC");
    }

    #[test]
    fn test_stored_filters_form_the_base() {
        let template = Template::new("Orders", "shop.order")
            .with_filter("paid", false)
            .with_filter("number", "");
        let report = compose(&template, "search=a-1", &HookRegistry::new());
        assert_eq!(report.template_filters.data().len(), 1);
        assert_eq!(
            sql(&report),
            "SELECT DISTINCT * FROM \"shop_order\" WHERE (\"paid\" = ? AND (\"customer_id\" IN \
             (SELECT \"id\" FROM \"shop_customer\" WHERE LOWER(\"name\") LIKE LOWER(?)) OR \
             LOWER(\"number\") LIKE LOWER(?))) ORDER BY \"number\" ASC"
        );
        assert!(report.used_filters.is_none());
    }

    #[test]
    fn test_user_path_scopes_the_base() {
        let hooks = HookRegistry::new();
        hooks.connect_user_path(
            "shop.order",
            "report_user_path",
            Arc::new(|request: &HttpRequest| {
                let mut values = HashMap::new();
                values.insert("customer".to_string(), Value::from(request.user().id));
                values
            }),
        );
        let mut template = Template::new("Orders", "shop.order");
        template.model_user_path = vec![
            UserPath::new("city", PathExpr::compare("customer__city")),
            UserPath::new("customer", PathExpr::compare("customer")),
        ];
        let report = compose(&template, "", &hooks);
        let (sql, params) = report.queryset.to_sql(DatabaseBackendType::SQLite).unwrap();
        assert_eq!(
            sql,
            "SELECT DISTINCT * FROM \"shop_order\" WHERE \"customer_id\" = ? ORDER BY \"number\" ASC"
        );
        assert_eq!(params, vec![Value::Int(3)]);
    }

    #[test]
    fn test_used_filters_formatting() {
        let report = compose(
            &Template::new("Orders", "shop.order").with_filter("paid", true),
            "tags__in=1&tags__in=2&created__gte=2024/03/01&number=A-100",
            &HookRegistry::new(),
        );
        assert_eq!(
            report.used_filters.as_deref(),
            Some("Created (from) = 00:00 2024/03/01 and Number = A-100 and Tags = 1, 2")
        );
    }

    #[test]
    fn test_used_filters_are_localized() {
        flex_report_core::i18n::install_builtin_catalogs();
        flex_report_core::i18n::activate("fa");
        let template = Template::new("Orders", "shop.order").with_filter("paid", false);
        let report = compose(&template, "paid=false&number=x", &HookRegistry::new());
        flex_report_core::i18n::deactivate();
        assert_eq!(report.used_filters.as_deref(), Some("Number = x و Paid = خیر"));
    }
}
