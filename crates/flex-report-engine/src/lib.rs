//! # flex-report-engine
//!
//! The report core of flex-report. A report is a saved [`Template`] over a
//! registered model: a list of columns, stored filter values, row buttons and
//! optional user paths that scope rows to the requesting user.
//!
//! ## Architecture
//!
//! A request flows through the engine in four steps:
//!
//! 1. the [`FieldResolver`] classifies every column title of the template
//!    as a field path, property, custom field or dynamic field;
//! 2. the [`filters`] module turns the column fields into filter sets, one
//!    for general filters and one for quicksearch;
//! 3. the [`QueryComposer`] combines stored filters, the user path and the
//!    request filters into one ordered, distinct [`QuerySet`];
//! 4. the [`CellRenderer`] turns each fetched record into display text or
//!    HTML, and the [`export`] module writes the rendered rows as CSV or XLSX.
//!
//! [`ReportEngine`] holds the shared state of these steps: settings, the
//! schema registry, model hooks, exporters and HTML tags.
//!
//! ## Module Overview
//!
//! - [`models`] - Administrative entities and their validation
//! - [`repository`] - Persistence of the entities
//! - [`resolver`] - Column classification
//! - [`filters`] - Filter generation and binding
//! - [`user_path`] - Typed user-path scoping
//! - [`composer`] - Query composition and the used-filters summary
//! - [`render`] - Cell rendering and HTML tags
//! - [`export`] - Export tables and the CSV/XLSX exporters
//! - [`buttons`] - Row button URLs and exposed fields
//! - [`hooks`] - Per-model hooks for user paths and export options
//!
//! [`Template`]: models::Template
//! [`QuerySet`]: flex_report_db::QuerySet

// - doc_markdown: backtick requirements for documentation items are too strict
// - too_many_lines: filter binding and rendering match on every field type
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::result_large_err)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::return_self_not_must_use)]

pub mod buttons;
pub mod composer;
pub mod export;
pub mod filters;
pub mod hooks;
pub mod models;
pub mod render;
pub mod repository;
pub mod resolver;
pub mod user_path;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use flex_report_core::AppSettings;
use flex_report_db::{DbExecutor, SchemaRegistry};
use flex_report_http::HttpRequest;

pub use composer::{ComposedReport, QueryComposer};
pub use export::{ExportOptions, ExportRegistry, ExportTable, Exporter};
pub use hooks::HookRegistry;
pub use render::{CellRenderer, DataTags};
pub use repository::ReportRepository;
pub use resolver::{ColumnKind, FieldResolver};

/// Shared state of the report engine.
///
/// Cloning is cheap; every part is behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ReportEngine {
    settings: Arc<AppSettings>,
    resolver: Arc<FieldResolver>,
    hooks: Arc<HookRegistry>,
    exporters: Arc<ExportRegistry>,
    tags: Arc<DataTags>,
}

impl ReportEngine {
    /// Creates an engine with the built-in exporters and HTML tags.
    pub fn new(settings: AppSettings, registry: SchemaRegistry) -> Self {
        Self {
            settings: Arc::new(settings),
            resolver: Arc::new(FieldResolver::new(Arc::new(registry))),
            hooks: Arc::new(HookRegistry::new()),
            exporters: Arc::new(ExportRegistry::default()),
            tags: Arc::new(DataTags::default()),
        }
    }

    /// Registers an exporter, replacing the one with the same slug.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        Arc::make_mut(&mut self.exporters).register(exporter);
        self
    }

    /// Replaces the HTML tags used for cells.
    #[must_use]
    pub fn with_tags(mut self, tags: DataTags) -> Self {
        self.tags = Arc::new(tags);
        self
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        self.resolver.registry()
    }

    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    /// Model hooks; connect user-path and export hooks here.
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn exporters(&self) -> &ExportRegistry {
        &self.exporters
    }

    pub fn tags(&self) -> &DataTags {
        &self.tags
    }

    pub fn renderer(&self) -> CellRenderer<'_> {
        CellRenderer::new(&self.resolver, &self.settings, &self.tags)
    }

    pub fn composer(&self) -> QueryComposer<'_> {
        QueryComposer::new(&self.resolver, &self.settings, &self.hooks)
    }

    pub fn repository<'a>(&'a self, db: &'a dyn DbExecutor) -> ReportRepository<'a> {
        ReportRepository::new(db, &self.resolver)
    }

    /// The exporter options the model's export hook returns for `request`.
    pub fn export_options(&self, model: &str, request: &HttpRequest) -> ExportOptions {
        self.hooks
            .export_options(model, &self.settings.model_export_kwargs_func_name)
            .map(|hook| hook(request))
            .unwrap_or_default()
    }

    /// Relation paths to load so every column of `columns` can render.
    pub fn prefetch_paths<'c>(&self, model: &str, columns: impl IntoIterator<Item = &'c str>) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for column in columns {
            let Some(descriptor) = self.resolver.resolve(model, column) else {
                continue;
            };
            for path in descriptor.prefetch_paths() {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CsvExporter;
    use crate::testing::shop_engine;
    use flex_report_http::RequestUser;

    #[test]
    fn test_export_options_use_the_configured_hook() {
        let engine = shop_engine();
        let request = HttpRequest::builder().user(RequestUser::new(1, "ann")).build();
        assert_eq!(engine.export_options("shop.order", &request), ExportOptions::default());

        engine.hooks().connect_export_options(
            "shop.order",
            "flex_export_kwargs",
            Arc::new(|request: &HttpRequest| {
                ExportOptions::default()
                    .sheet_name(format!("orders of {}", request.user().username))
                    .header("number", "Order number")
            }),
        );
        let options = engine.export_options("shop.order", &request);
        assert_eq!(options.sheet_name.as_deref(), Some("orders of ann"));
        assert_eq!(options.headers["number"], "Order number");
        assert_eq!(engine.export_options("shop.customer", &request), ExportOptions::default());
    }

    #[test]
    fn test_prefetch_paths_cover_relations() {
        let engine = shop_engine();
        let paths = engine.prefetch_paths(
            "shop.order",
            ["number", "customer__name", "customer__city__name", "tags", "customer__initials", "nope"],
        );
        assert_eq!(paths, vec!["customer", "customer__city", "tags"]);
    }

    #[test]
    fn test_with_exporter_replaces_by_slug() {
        let engine = shop_engine().with_exporter(Arc::new(CsvExporter));
        let slugs: Vec<&str> = engine.exporters().formats().iter().map(|f| f.slug).collect();
        assert_eq!(slugs, vec!["xlsx", "csv"]);
        assert_eq!(engine.renderer().settings().calendar, flex_report_core::Calendar::Gregorian);
    }
}
