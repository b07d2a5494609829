//! Report downloads.
//!
//! `?format=<slug>` picks a registered exporter; a missing or unknown slug is
//! a client error. The exported rows are the same composed rows the report
//! page shows, unpaginated.

use async_trait::async_trait;
use chrono::Utc;
use flex_report_core::{ReportError, ReportResult};
use flex_report_engine::export::{export_filename, ExportTable};
use flex_report_http::{HttpRequest, HttpResponse};

use crate::site::ReportSite;
use crate::views::View;

/// The query parameter that selects the export format.
pub const FORMAT_PARAM: &str = "format";

/// Serves the template of the request's page as a file.
#[derive(Debug, Clone)]
pub struct ExportView {
    site: ReportSite,
}

impl ExportView {
    pub const fn new(site: ReportSite) -> Self {
        Self { site }
    }

    /// Exports the selected template of the request's page.
    ///
    /// # Errors
    ///
    /// - `UnknownFormat` for a missing or unregistered format
    /// - `PermissionDenied` when the site's export check rejects the template
    /// - `NotFound` when the page has no template, or it cannot be exported
    /// - `ImproperlyConfigured` when there are no rows to export
    pub async fn export(&self, request: &HttpRequest) -> ReportResult<HttpResponse> {
        let engine = self.site.engine();
        let slug = request
            .get()
            .get(FORMAT_PARAM)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ReportError::UnknownFormat("No export format was given.".into()))?;
        let exporter = engine.exporters().get(slug.trim())?;

        let selection = self.site.select_template(request).await?;
        let template = selection
            .selected
            .ok_or_else(|| ReportError::NotFound("This page has no report template.".into()))?;
        if !self.site.can_export(request, &template) {
            return Err(ReportError::PermissionDenied(
                "You do not have permission to export this report.".into(),
            ));
        }
        if !template.has_export || !template.is_completed() {
            return Err(ReportError::NotFound(format!("'{}' cannot be exported.", template.title)));
        }

        let repo = self.site.repository();
        let columns = repo.template_columns(&template, false).await?;
        let titles: Vec<String> = columns.iter().map(|c| c.title.clone()).collect();
        let searchable: Vec<String> = columns.iter().filter(|c| c.searchable).map(|c| c.title.clone()).collect();
        let composed = engine.composer().compose(&template, &titles, &searchable, request)?;
        let records = composed
            .queryset
            .prefetch_related(engine.prefetch_paths(&template.model, titles.iter().map(String::as_str)))
            .fetch(self.site.db())
            .await?;

        self.site.activate_language();
        let options = engine.export_options(&template.model, request);
        let mut headers = options.headers;
        for title in &titles {
            if let Some(descriptor) = engine.resolver().resolve(&template.model, title) {
                headers
                    .entry(title.clone())
                    .or_insert_with(|| descriptor.verbose_name.clone());
            }
        }
        let sheet_name = options.sheet_name.unwrap_or_else(|| template.title.clone());
        let table = ExportTable::build(&engine.renderer(), &records, &titles, &headers, sheet_name)?;
        let bytes = exporter.export(&table)?;

        let filename = format!(
            "{}.{}",
            export_filename(&template.title, &Utc::now().naive_utc(), engine.settings().calendar),
            exporter.extension()
        );
        tracing::info!(
            template = template.title.as_str(),
            format = exporter.slug(),
            rows = table.rows.len(),
            filename = filename.as_str(),
            "exported report"
        );
        Ok(HttpResponse::attachment(&filename, bytes))
    }
}

#[async_trait]
impl View for ExportView {
    async fn get(&self, request: HttpRequest) -> HttpResponse {
        self.export(&request).await.unwrap_or_else(HttpResponse::from)
    }
}
