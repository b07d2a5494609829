//! # flex-report-views
//!
//! View layer for flex-report. Serves report pages and report downloads over
//! HTTP:
//!
//! - [`site`] - Shared state and template selection
//! - [`views`] - The report page and export views
//! - [`context`] - The context bundle a report page serializes
//! - [`pagination`] - Page bounds, page-size parsing and pagination links
//! - [`server`] - The axum router and server

// - doc_markdown: backtick requirements for documentation items are too strict
// - result_large_err: views return the crate-wide error type
#![allow(clippy::doc_markdown)]
#![allow(clippy::result_large_err)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod pagination;
pub mod server;
pub mod site;
pub mod views;

pub use context::ReportContext;
pub use server::report_router;
pub use site::ReportSite;
pub use views::{ExportView, ReportView, View};
