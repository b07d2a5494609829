//! Logging integration for the flex-report engine.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`AppSettings`](crate::settings::AppSettings) and for creating per-request spans.

use crate::settings::AppSettings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level`. In debug mode a pretty,
/// human-readable format is used; otherwise a structured JSON format is used.
/// Installing a subscriber twice is a silent no-op.
pub fn setup_logging(settings: &AppSettings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one report request.
///
/// # Examples
///
/// ```
/// use flex_report_core::logging::report_span;
///
/// let span = report_span("orders:list", "abc-123");
/// let _guard = span.enter();
/// tracing::info!("composing report");
/// ```
pub fn report_span(view_name: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!("report", view = view_name, id = request_id)
}
