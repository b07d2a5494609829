//! # flex-report-core
//!
//! Core types, settings, logging, and error types for the flex-report engine.
//! This crate has no engine dependencies and provides the foundation for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`utils`] - Utility types (`MultiValueDict`, text helpers)
//! - [`settings`] - Report settings and their defaults
//! - [`settings_loader`] - Loading settings from TOML/JSON and `REPORT_*` variables
//! - [`i18n`] - Translation catalog and calendar conversion
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod i18n;
pub mod logging;
pub mod settings;
pub mod settings_loader;
pub mod utils;

// Re-export the most commonly used types at the crate root.
pub use error::{ReportError, ReportResult, ValidationError};
pub use settings::{AppSettings, Calendar, MoneyFormat, TimeFormats};
