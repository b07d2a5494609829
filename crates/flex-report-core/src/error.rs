//! Core error types for the flex-report engine.
//!
//! [`ReportError`] covers the failure categories a report request can hit:
//! client errors (bad export format, forbidden templates), configuration errors,
//! write-time validation of administrative entities, and database failures.
//! Each variant maps to an HTTP status via [`ReportError::status_code`].

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// A validation error with optional field-level errors.
///
/// Entity validation (`Column::clean`, `TableButton::clean`, ...) reports its
/// failures keyed by the offending field so forms can attach them.
///
/// # Examples
///
/// ```
/// use flex_report_core::error::ValidationError;
///
/// let err = ValidationError::for_field("title", "Title or icon is required.", "required");
/// assert!(err.field_errors.contains_key("title"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the type of validation failure (e.g. "required", "invalid").
    pub code: String,
    /// Additional parameters providing context for the error message.
    pub params: HashMap<String, String>,
    /// Per-field validation errors, keyed by field name.
    pub field_errors: HashMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::new(),
            field_errors: HashMap::new(),
        }
    }

    /// Creates a `ValidationError` containing per-field errors.
    pub fn with_field_errors(field_errors: HashMap<String, Vec<Self>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            params: HashMap::new(),
            field_errors,
        }
    }

    /// Creates a `ValidationError` carrying a single error for `field`.
    pub fn for_field(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.into(), vec![Self::new(message, code)]);
        Self::with_field_errors(field_errors)
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Returns the error codes recorded for `field`.
    pub fn codes_for(&self, field: &str) -> Vec<&str> {
        self.field_errors
            .get(field)
            .map(|errors| errors.iter().map(|e| e.code.as_str()).collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{}", self.message)?;
        } else if !self.field_errors.is_empty() {
            let mut fields: Vec<_> = self.field_errors.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let mut first = true;
            for (field, errors) in fields {
                for error in errors {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{field}: {error}")?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The primary error type for the flex-report engine.
#[derive(Error, Debug)]
pub enum ReportError {
    // ── Request errors ───────────────────────────────────────────────

    /// HTTP 400 Bad Request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP 403 Forbidden / Permission Denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// HTTP 404 Not Found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The requested export format has no registered exporter.
    #[error("The wanted format '{0}' isn't handled.")]
    UnknownFormat(String),

    // ── ORM errors ───────────────────────────────────────────────────

    /// A query expected exactly one result but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    // ── Validation ───────────────────────────────────────────────────

    /// One or more fields failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid, or an export was
    /// invoked without its required inputs.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Export ───────────────────────────────────────────────────────

    /// The exporter failed while writing its payload.
    #[error("Export error: {0}")]
    ExportError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// HTTP 500 Internal Server Error.
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl ReportError {
    /// Returns the HTTP status code associated with this error.
    ///
    /// - `BadRequest`, `UnknownFormat`, `ValidationError` -> 400
    /// - `PermissionDenied` -> 403
    /// - `NotFound`, `DoesNotExist` -> 404
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::UnknownFormat(_) | Self::ValidationError(_) => 400,
            Self::PermissionDenied(_) => 403,
            Self::NotFound(_) | Self::DoesNotExist(_) => 404,
            Self::DatabaseError(_)
            | Self::IntegrityError(_)
            | Self::ImproperlyConfigured(_)
            | Self::ExportError(_)
            | Self::SerializationError(_)
            | Self::IoError(_)
            | Self::InternalServerError(_) => 500,
        }
    }
}

impl From<ValidationError> for ReportError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience type alias for `Result<T, ReportError>`.
pub type ReportResult<T> = Result<T, ReportError>;
