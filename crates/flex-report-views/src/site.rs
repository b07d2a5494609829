//! Shared state of the report views.
//!
//! A [`ReportSite`] bundles what every report request needs: the engine, a
//! database handle, the named routes row buttons link to, and the optional
//! hooks an application uses to restrict access or replace the page of a
//! template that is not ready yet.

use std::fmt;
use std::sync::Arc;

use flex_report_core::{i18n, ReportError, ReportResult};
use flex_report_db::DbExecutor;
use flex_report_engine::models::{TablePage, Template};
use flex_report_engine::{ReportEngine, ReportRepository};
use flex_report_http::{HttpRequest, HttpResponse, RequestUser, UrlRouter};

/// The query parameter that selects a template of the page.
pub const TEMPLATE_PARAM: &str = "report_template";

/// Decides whether a request may see a template.
pub type AccessCheck = Arc<dyn Fn(&HttpRequest, &Template) -> bool + Send + Sync>;

/// Produces the response for a template that is still pending, or `None` to
/// render the page without rows.
pub type NotReadyHandler = Arc<dyn Fn(&HttpRequest, &Template) -> Option<HttpResponse> + Send + Sync>;

/// The templates of a report page and the one a request selected.
#[derive(Debug, Clone, Default)]
pub struct TemplateSelection {
    pub page: Option<TablePage>,
    /// Templates of the page, default first.
    pub templates: Vec<Template>,
    pub selected: Option<Template>,
}

impl TemplateSelection {
    /// Picks the template for a request from the page's templates.
    ///
    /// A requested id wins when it belongs to the page, then the page's
    /// default, then the first template.
    pub fn select(page: Option<TablePage>, templates: Vec<Template>, requested: Option<i64>) -> Self {
        let selected = requested
            .and_then(|id| templates.iter().find(|t| t.id == Some(id)))
            .or_else(|| templates.iter().find(|t| t.is_page_default))
            .or_else(|| templates.first())
            .cloned();
        Self {
            page,
            templates,
            selected,
        }
    }

    /// The title shown on the page: the page title, else the template's.
    pub fn page_title(&self) -> String {
        self.page
            .as_ref()
            .map(|p| p.title.clone())
            .filter(|t| !t.is_empty())
            .or_else(|| self.selected.as_ref().map(|t| t.title.clone()))
            .unwrap_or_default()
    }
}

/// Everything the report views share.
#[derive(Clone)]
pub struct ReportSite {
    engine: ReportEngine,
    db: Arc<dyn DbExecutor>,
    router: Arc<UrlRouter>,
    access: Option<AccessCheck>,
    export_access: Option<AccessCheck>,
    not_ready: Option<NotReadyHandler>,
}

impl fmt::Debug for ReportSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportSite")
            .field("engine", &self.engine)
            .field("router", &self.router)
            .field("access", &self.access.is_some())
            .field("export_access", &self.export_access.is_some())
            .field("not_ready", &self.not_ready.is_some())
            .finish_non_exhaustive()
    }
}

impl ReportSite {
    pub fn new(engine: ReportEngine, db: Arc<dyn DbExecutor>) -> Self {
        i18n::install_builtin_catalogs();
        Self {
            engine,
            db,
            router: Arc::new(UrlRouter::new()),
            access: None,
            export_access: None,
            not_ready: None,
        }
    }

    /// Sets the named routes that row buttons reverse.
    #[must_use]
    pub fn with_router(mut self, router: UrlRouter) -> Self {
        self.router = Arc::new(router);
        self
    }

    /// Restricts who may view a template; denied requests get a 403.
    #[must_use]
    pub fn with_access(mut self, check: AccessCheck) -> Self {
        self.access = Some(check);
        self
    }

    /// Restricts who may export a template; denied requests get a 403.
    #[must_use]
    pub fn with_export_access(mut self, check: AccessCheck) -> Self {
        self.export_access = Some(check);
        self
    }

    #[must_use]
    pub fn with_not_ready(mut self, handler: NotReadyHandler) -> Self {
        self.not_ready = Some(handler);
        self
    }

    pub const fn engine(&self) -> &ReportEngine {
        &self.engine
    }

    pub fn db(&self) -> &dyn DbExecutor {
        self.db.as_ref()
    }

    pub fn router(&self) -> &UrlRouter {
        &self.router
    }

    pub fn repository(&self) -> ReportRepository<'_> {
        self.engine.repository(self.db.as_ref())
    }

    pub fn can_view(&self, request: &HttpRequest, template: &Template) -> bool {
        self.access.as_ref().map_or(true, |check| check(request, template))
    }

    pub fn can_export(&self, request: &HttpRequest, template: &Template) -> bool {
        self.export_access.as_ref().map_or(true, |check| check(request, template))
    }

    pub fn not_ready_response(&self, request: &HttpRequest, template: &Template) -> Option<HttpResponse> {
        self.not_ready.as_ref().and_then(|handler| handler(request, template))
    }

    /// Activates the configured language on the current thread.
    ///
    /// Call again after an `.await`; the task may have moved threads.
    pub fn activate_language(&self) {
        i18n::activate(&self.engine.settings().language_code);
    }

    /// Whether `user` may edit templates.
    pub fn is_editor(&self, user: &RequestUser) -> bool {
        user.is_superuser || user.in_group(&self.engine.settings().editors_group_name)
    }

    /// Loads the templates of the request's page and selects one.
    ///
    /// # Errors
    ///
    /// Returns `ImproperlyConfigured` when the request has no resolved route
    /// name, and database errors as they occur.
    pub async fn select_template(&self, request: &HttpRequest) -> ReportResult<TemplateSelection> {
        let url_name = request
            .view_name()
            .ok_or_else(|| ReportError::ImproperlyConfigured("report request has no route name".into()))?;
        let repo = self.repository();
        let page = repo.get_page(url_name).await?;
        let templates = if page.is_some() {
            repo.page_templates(url_name).await?
        } else {
            Vec::new()
        };
        let requested = request
            .get()
            .get(TEMPLATE_PARAM)
            .and_then(|id| id.trim().parse::<i64>().ok());
        let selection = TemplateSelection::select(page, templates, requested);
        tracing::debug!(
            url_name,
            ?requested,
            template = ?selection.selected.as_ref().map(|t| &t.title),
            "resolved report template"
        );
        Ok(selection)
    }
}
