//! The report page.
//!
//! A request moves through three states once its template is resolved:
//!
//! - no template on the page: the context says `have_template: false` and
//!   carries nothing else to draw;
//! - a pending template: the site's not-ready handler may answer instead,
//!   otherwise the page shows the template without composing any query;
//! - a complete template: the query is composed, one page of rows is
//!   fetched and every row is rendered with its buttons.

use async_trait::async_trait;
use flex_report_core::{ReportError, ReportResult};
use flex_report_db::Record;
use flex_report_engine::buttons::{button_fields, button_url};
use flex_report_engine::models::{Column, TableButton, Template};
use flex_report_engine::{CellRenderer, ColumnKind};
use flex_report_http::{HttpRequest, HttpResponse, JsonResponse};

use crate::context::{
    columns_count, ButtonContext, ColumnHeader, FormatEntry, PaginationContext, ReportContext, RowButton,
    RowContext, TemplateContext,
};
use crate::pagination::{PageKeywords, PageRequest, Paginator};
use crate::site::ReportSite;
use crate::views::View;

/// What a report request produced.
#[derive(Debug)]
pub enum ReportOutcome {
    Context(Box<ReportContext>),
    /// A response that replaces the page, e.g. from the not-ready handler.
    Response(HttpResponse),
}

/// Serves the report page of the request's route as a JSON context bundle.
#[derive(Debug, Clone)]
pub struct ReportView {
    site: ReportSite,
    keywords: PageKeywords,
}

impl ReportView {
    pub fn new(site: ReportSite) -> Self {
        Self {
            site,
            keywords: PageKeywords::REPORT,
        }
    }

    /// Uses other pagination parameter names.
    #[must_use]
    pub const fn with_keywords(mut self, keywords: PageKeywords) -> Self {
        self.keywords = keywords;
        self
    }

    /// Builds the context of the report page for `request`.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when the site's access check rejects the
    /// template, and database or configuration errors as they occur.
    pub async fn context(&self, request: &HttpRequest) -> ReportResult<ReportOutcome> {
        let engine = self.site.engine();
        let selection = self.site.select_template(request).await?;
        let page_title = selection.page_title();
        let Some(template) = selection.selected.clone() else {
            let mut context = ReportContext::empty(page_title);
            context.is_editor = self.site.is_editor(request.user());
            return Ok(ReportOutcome::Context(Box::new(context)));
        };
        if !self.site.can_view(request, &template) {
            return Err(ReportError::PermissionDenied(
                "You do not have permission to view this report.".into(),
            ));
        }

        let repo = self.site.repository();
        let columns = repo.template_columns(&template, false).await?;
        let buttons = repo.template_buttons(&template).await?;
        let colors = repo.button_colors(&buttons).await?;
        let mut templates = Vec::with_capacity(selection.templates.len());
        for other in &selection.templates {
            let bound = if other.id == template.id {
                columns.len()
            } else {
                repo.template_columns(other, false).await?.len()
            };
            templates.push((other.clone(), bound));
        }

        self.site.activate_language();
        let headers: Vec<ColumnHeader> = columns
            .iter()
            .map(|c| ColumnHeader::new(engine.resolver(), c))
            .collect();
        let mut context = ReportContext::empty(page_title);
        context.have_template = true;
        context.template = Some(TemplateContext::new(&template, columns.len()));
        context.templates = templates.iter().map(|(t, n)| TemplateContext::new(t, *n)).collect();
        context.columns_count = columns_count(&headers, buttons.len());
        context.columns = headers;
        context.buttons = buttons.iter().map(|b| ButtonContext::new(b, &colors)).collect();
        context.searchable_fields = columns
            .iter()
            .filter(|c| c.searchable)
            .map(|c| c.title.clone())
            .collect();
        context.realtime_quicksearch = engine.settings().realtime_quicksearch;
        context.export_formats = engine.exporters().formats().into_iter().map(FormatEntry::from).collect();
        context.has_export = template.has_export && !context.export_formats.is_empty();
        context.is_editor = self.site.is_editor(request.user());

        if !template.is_completed() {
            if let Some(response) = self.site.not_ready_response(request, &template) {
                tracing::debug!(template = template.title.as_str(), "template not ready; handing off");
                return Ok(ReportOutcome::Response(response));
            }
            return Ok(ReportOutcome::Context(Box::new(context)));
        }

        context.template_ready = true;
        self.fill_rows(&mut context, &template, &columns, &buttons, request).await?;
        Ok(ReportOutcome::Context(Box::new(context)))
    }

    async fn fill_rows(
        &self,
        context: &mut ReportContext,
        template: &Template,
        columns: &[Column],
        buttons: &[TableButton],
        request: &HttpRequest,
    ) -> ReportResult<()> {
        let engine = self.site.engine();
        let titles: Vec<String> = columns.iter().map(|c| c.title.clone()).collect();
        let searchable = context.searchable_fields.clone();
        let composed = engine.composer().compose(template, &titles, &searchable, request)?;
        context.set_filters(&composed.filters, &composed.quicksearch);
        context.used_filters.clone_from(&composed.used_filters);
        context.initials.clone_from(&composed.initials);

        let settings = engine.settings();
        let page_request = PageRequest::from_query(request.get(), self.keywords, &settings.page_sizes);
        let count = composed.queryset.count(self.site.db()).await?;
        let paginator = Paginator::new(count, page_request.per_page);
        let (number, (offset, limit)) = paginator.bounds_or_first(page_request.number);
        let records = composed
            .queryset
            .slice(offset, limit)
            .prefetch_related(engine.prefetch_paths(&template.model, titles.iter().map(String::as_str)))
            .fetch(self.site.db())
            .await?;

        self.site.activate_language();
        let renderer = engine.renderer();
        let rows = records
            .iter()
            .map(|record| self.render_row(&renderer, record, &context.columns, buttons))
            .collect();
        context.pagination = Some(PaginationContext::new(
            paginator.page(number, rows),
            count,
            page_request.per_page,
            &settings.page_sizes,
            self.keywords,
            request.get(),
        ));
        tracing::debug!(
            template = template.title.as_str(),
            count,
            page = number,
            per_page = page_request.per_page,
            "rendered report page"
        );
        Ok(())
    }

    fn render_row(
        &self,
        renderer: &CellRenderer<'_>,
        record: &Record,
        columns: &[ColumnHeader],
        buttons: &[TableButton],
    ) -> RowContext {
        let cells = columns
            .iter()
            .flat_map(|column| {
                if column.kind == ColumnKind::Dynamic.as_str() {
                    renderer.render_dynamic(record, &column.name)
                } else {
                    vec![renderer.render_html(record, &column.name)]
                }
            })
            .collect();
        let buttons = buttons
            .iter()
            .map(|button| RowButton {
                title: button.title.clone(),
                label: button.label().to_string(),
                event: button.event.clone(),
                url: button_url(record, button, self.site.router()),
                fields: button_fields(record, button, renderer),
            })
            .collect();
        RowContext {
            pk: record.pk().clone(),
            cells,
            buttons,
        }
    }
}

#[async_trait]
impl View for ReportView {
    async fn get(&self, request: HttpRequest) -> HttpResponse {
        match self.context(&request).await {
            Ok(ReportOutcome::Context(context)) => JsonResponse::new(&context),
            Ok(ReportOutcome::Response(response)) => response,
            Err(e) => HttpResponse::from(e),
        }
    }
}
