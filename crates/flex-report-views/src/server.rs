//! HTTP server integration for flex-report.
//!
//! [`report_router`] mounts the report views on an axum router:
//!
//! - `GET /reports/{url_name}` serves the context bundle of a report page;
//! - `GET /reports/{url_name}/export?format=<slug>` downloads it.
//!
//! The `url_name` path segment becomes the request's resolved route name,
//! which selects the page whose templates are served. Every request runs
//! inside a `report` span tagged with the route name and a request id.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use flex_report_core::AppSettings;
//! use flex_report_db::SchemaRegistry;
//! use flex_report_db_backends::SqliteBackend;
//! use flex_report_engine::ReportEngine;
//! use flex_report_views::server::serve;
//! use flex_report_views::site::ReportSite;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ReportEngine::new(AppSettings::default(), SchemaRegistry::new());
//! let db = Arc::new(SqliteBackend::memory()?);
//! serve(ReportSite::new(engine, db), "0.0.0.0:8000").await?;
//! # Ok(())
//! # }
//! ```

use axum::extract::{Path, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use flex_report_core::logging::report_span;
use flex_report_core::{ReportError, ReportResult};
use flex_report_http::{HttpRequest, ResolverMatch};
use tracing::Instrument;

use crate::site::ReportSite;
use crate::views::{ExportView, ReportView, View};

/// Builds the report router over `site`.
pub fn report_router(site: ReportSite) -> axum::Router {
    axum::Router::new()
        .route("/reports/{url_name}", get(report_page))
        .route("/reports/{url_name}/export", get(report_export))
        .with_state(site)
}

fn into_report_request(request: Request, url_name: &str) -> HttpRequest {
    let (parts, _body) = request.into_parts();
    let mut request = HttpRequest::from_axum(&parts);
    request.set_resolver_match(ResolverMatch::named(url_name));
    request
}

async fn run_view(view: &dyn View, url_name: &str, request: Request) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let request = into_report_request(request, url_name);
    view.dispatch(request)
        .instrument(report_span(url_name, &request_id))
        .await
        .into_response()
}

async fn report_page(State(site): State<ReportSite>, Path(url_name): Path<String>, request: Request) -> Response {
    run_view(&ReportView::new(site), &url_name, request).await
}

async fn report_export(State(site): State<ReportSite>, Path(url_name): Path<String>, request: Request) -> Response {
    run_view(&ExportView::new(site), &url_name, request).await
}

/// Runs the report router as an HTTP server on `addr`.
///
/// # Errors
///
/// Returns an error if the server fails to bind to the address or encounters
/// a runtime error.
pub async fn serve(site: ReportSite, addr: &str) -> ReportResult<()> {
    let debug = site.engine().settings().debug;
    let router = report_router(site);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ReportError::ImproperlyConfigured(format!("Failed to bind to {addr}: {e}")))?;

    if debug {
        tracing::info!("Starting report server at http://{addr}/");
    }

    axum::serve(listener, router)
        .await
        .map_err(|e| ReportError::InternalServerError(format!("Server error: {e}")))?;
    Ok(())
}
