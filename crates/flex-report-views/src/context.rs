//! The context bundle of a report page.
//!
//! [`ReportContext`] is what the report view serializes: everything a page
//! template needs to draw the filters, the table header, the rows of the
//! current page and the pagination links.

use std::collections::{BTreeMap, HashMap};

use flex_report_core::i18n::gettext;
use flex_report_db::Value;
use flex_report_engine::filters::{FilterData, FilterSet, FilterSpec};
use flex_report_engine::models::{Column, TableButton, TableButtonColor, Template};
use flex_report_engine::{ColumnKind, FieldResolver};
use flex_report_engine::export::ExportFormat;
use flex_report_http::QueryDict;
use serde::Serialize;

use crate::pagination::{get_centered_range, query_transform, Page, PageKeywords};
use crate::site::TEMPLATE_PARAM;

/// A column of the report table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnHeader {
    pub name: String,
    pub verbose_name: String,
    /// `"field"`, `"property"`, `"custom"` or `"dynamic"`; empty when unresolved.
    pub kind: &'static str,
    pub searchable: bool,
    /// Headers of the cells a dynamic column expands into.
    pub sub_fields: Vec<String>,
}

impl ColumnHeader {
    pub fn new(resolver: &FieldResolver, column: &Column) -> Self {
        let descriptor = resolver.resolve(&column.model, &column.title);
        let sub_fields = descriptor
            .as_ref()
            .filter(|d| d.kind == ColumnKind::Dynamic)
            .and_then(|d| d.owner.get_dynamic_field(&d.attribute))
            .map(|field| field.unpack().iter().map(|f| f.verbose_name.clone()).collect())
            .unwrap_or_default();
        Self {
            name: column.title.clone(),
            verbose_name: descriptor
                .as_ref()
                .map_or_else(|| column.title.clone(), |d| d.verbose_name.clone()),
            kind: descriptor.as_ref().map_or("", |d| d.kind.as_str()),
            searchable: column.searchable,
            sub_fields,
        }
    }

    /// Cells this column occupies in a row.
    pub fn width(&self) -> usize {
        self.sub_fields.len().max(1)
    }
}

/// The number of table cells of a report row.
///
/// Every column counts once, the row's selection cell once, each button once
/// and every sub-field of a dynamic column once more.
pub fn columns_count(columns: &[ColumnHeader], buttons: usize) -> usize {
    columns.len() + 1 + buttons + columns.iter().map(|c| c.sub_fields.len()).sum::<usize>()
}

/// A row button as listed in the table header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonContext {
    pub id: Option<i64>,
    pub title: String,
    pub label: String,
    pub icon: Option<String>,
    pub event: Option<String>,
    pub url_name: Option<String>,
    pub exposed_fields: Vec<String>,
    /// CSS color class of the button.
    pub color: Option<String>,
}

impl ButtonContext {
    pub fn new(button: &TableButton, colors: &HashMap<i64, TableButtonColor>) -> Self {
        Self {
            id: button.id,
            title: button.title.clone(),
            label: button.label().to_string(),
            icon: button.icon.clone(),
            event: button.event.clone(),
            url_name: button.url_name.clone(),
            exposed_fields: button.exposed_fields.clone(),
            color: button
                .color_id
                .and_then(|id| colors.get(&id))
                .map(|c| c.color.clone()),
        }
    }
}

/// A template with its derived properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateContext {
    pub id: Option<i64>,
    pub title: String,
    pub model: String,
    pub status: &'static str,
    pub status_label: String,
    pub is_completed: bool,
    pub is_page_default: bool,
    pub has_export: bool,
    pub filters_count: usize,
    pub user_fullname: String,
    pub columns_count: usize,
    pub created_date: String,
    pub modified_date: String,
}

impl TemplateContext {
    pub fn new(template: &Template, columns_count: usize) -> Self {
        Self {
            id: template.id,
            title: template.title.clone(),
            model: template.model.clone(),
            status: template.status.code(),
            status_label: template.status.label(),
            is_completed: template.is_completed(),
            is_page_default: template.is_page_default,
            has_export: template.has_export,
            filters_count: template.filters_count(),
            user_fullname: template.user_fullname(),
            columns_count,
            created_date: template.created_date.format("%Y-%m-%d %H:%M:%S").to_string(),
            modified_date: template.modified_date.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// A button of one rendered row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowButton {
    pub title: String,
    pub label: String,
    pub event: Option<String>,
    pub url: String,
    /// Exposed columns handed to the button's event.
    pub fields: serde_json::Value,
}

/// One rendered row of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowContext {
    pub pk: Value,
    /// HTML cells, dynamic columns expanded.
    pub cells: Vec<String>,
    pub buttons: Vec<RowButton>,
}

/// A link of the pagination bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLink {
    pub number: usize,
    /// Query string of the link, other parameters kept.
    pub query: String,
    pub current: bool,
}

/// The current page and the links around it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginationContext {
    pub keywords: PageKeywords,
    pub page_sizes: Vec<usize>,
    pub per_page: usize,
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<usize>,
    pub previous_page_number: Option<usize>,
    pub start_index: usize,
    pub end_index: usize,
    pub links: Vec<PageLink>,
    pub rows: Vec<RowContext>,
}

impl PaginationContext {
    pub fn new(
        page: Page<RowContext>,
        count: usize,
        per_page: usize,
        page_sizes: &[usize],
        keywords: PageKeywords,
        query: &QueryDict,
    ) -> Self {
        let number = page.number();
        let links = get_centered_range(number, page.num_pages())
            .map(|n| PageLink {
                number: n,
                query: query_transform(
                    query,
                    [(keywords.page, n.to_string()), (keywords.per_page, per_page.to_string())],
                ),
                current: n == number,
            })
            .collect();
        Self {
            keywords,
            page_sizes: page_sizes.to_vec(),
            per_page,
            number,
            num_pages: page.num_pages(),
            count,
            has_next: page.has_next(),
            has_previous: page.has_previous(),
            next_page_number: page.next_page_number(),
            previous_page_number: page.previous_page_number(),
            start_index: page.start_index(),
            end_index: page.end_index(),
            links,
            rows: page.into_object_list(),
        }
    }
}

/// An export format offered on the page, with a localized name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatEntry {
    pub name: String,
    pub slug: &'static str,
}

impl From<ExportFormat> for FormatEntry {
    fn from(format: ExportFormat) -> Self {
        Self {
            name: gettext(format.name),
            slug: format.slug,
        }
    }
}

/// The context bundle of a report page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportContext {
    pub page_title: String,
    pub is_page_table: bool,
    pub page_template_keyword: &'static str,
    pub have_template: bool,
    /// `false` while the selected template is pending.
    pub template_ready: bool,
    pub template: Option<TemplateContext>,
    pub templates: Vec<TemplateContext>,
    pub columns: Vec<ColumnHeader>,
    pub columns_count: usize,
    pub buttons: Vec<ButtonContext>,
    pub filters: Vec<FilterSpec>,
    pub filter_errors: BTreeMap<String, Vec<String>>,
    pub searchable_fields: Vec<String>,
    pub quicksearch: Vec<FilterSpec>,
    pub realtime_quicksearch: bool,
    pub used_filters: Option<String>,
    pub initials: FilterData,
    pub pagination: Option<PaginationContext>,
    pub export_formats: Vec<FormatEntry>,
    pub has_export: bool,
    pub is_editor: bool,
}

impl ReportContext {
    /// A page without a template to show.
    pub fn empty(page_title: String) -> Self {
        Self {
            page_title,
            is_page_table: true,
            page_template_keyword: TEMPLATE_PARAM,
            have_template: false,
            template_ready: false,
            template: None,
            templates: Vec::new(),
            columns: Vec::new(),
            columns_count: 0,
            buttons: Vec::new(),
            filters: Vec::new(),
            filter_errors: BTreeMap::new(),
            searchable_fields: Vec::new(),
            quicksearch: Vec::new(),
            realtime_quicksearch: false,
            used_filters: None,
            initials: FilterData::new(),
            pagination: None,
            export_formats: Vec::new(),
            has_export: false,
            is_editor: false,
        }
    }

    /// Copies the specs and errors of bound filter sets.
    pub fn set_filters(&mut self, filters: &FilterSet, quicksearch: &FilterSet) {
        self.filters = filters.specs().to_vec();
        self.quicksearch = quicksearch.specs().to_vec();
        self.filter_errors = filters
            .errors()
            .iter()
            .chain(quicksearch.errors())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
    }
}
