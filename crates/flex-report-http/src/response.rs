//! HTTP response types.
//!
//! [`HttpResponse`] is what report views return: HTML or JSON pages, export
//! attachments, and error responses built from a [`ReportError`]. Every
//! response converts into an axum response via [`IntoResponse`].

use axum::response::IntoResponse;
use http::{HeaderMap, HeaderValue, StatusCode};

use flex_report_core::ReportError;

/// The body content of an HTTP response.
#[derive(Clone, PartialEq, Eq)]
pub enum ResponseContent {
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
}

impl std::fmt::Debug for ResponseContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Text(t) => f
                .debug_tuple("Text")
                .field(&t.chars().take(100).collect::<String>())
                .finish(),
        }
    }
}

/// An HTTP response with a status, headers, a content type and a body.
///
/// # Examples
///
/// ```
/// use flex_report_http::HttpResponse;
///
/// let response = HttpResponse::ok("Hello, World!");
/// assert_eq!(response.status(), http::StatusCode::OK);
/// ```
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    content: ResponseContent,
    charset: String,
    content_type: String,
}

impl HttpResponse {
    /// Creates a new `HttpResponse` with the given status code and text body.
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content: ResponseContent::Text(body.into()),
            charset: "utf-8".to_string(),
            content_type: "text/html".to_string(),
        }
    }

    /// Creates a new `HttpResponse` with the given status code and byte body.
    pub fn with_bytes(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content: ResponseContent::Bytes(body),
            charset: "utf-8".to_string(),
            content_type: "application/octet-stream".to_string(),
        }
    }

    /// Creates a file download response.
    ///
    /// The content type is inferred from the extension of `filename` and a
    /// `Content-Disposition: attachment` header names the file.
    pub fn attachment(filename: &str, body: Vec<u8>) -> Self {
        let content_type = filename
            .rsplit_once('.')
            .map_or("application/octet-stream", |(_, ext)| mime_from_extension(ext));
        let mut response = Self::with_bytes(StatusCode::OK, body);
        response.set_content_type(content_type);
        let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
        match HeaderValue::from_str(&disposition) {
            Ok(value) => {
                response.headers.insert(http::header::CONTENT_DISPOSITION, value);
            }
            // Non-visible ASCII (e.g. a Persian title) needs the RFC 5987 form.
            Err(_) => {
                let encoded = percent_encoding::utf8_percent_encode(filename, percent_encoding::NON_ALPHANUMERIC);
                if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename*=UTF-8''{encoded}")) {
                    response.headers.insert(http::header::CONTENT_DISPOSITION, value);
                }
            }
        }
        response
    }

    /// Creates a 200 OK response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Creates a 404 Not Found response.
    pub fn not_found(body: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, body)
    }

    /// Creates a 403 Forbidden response.
    pub fn forbidden(body: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, body)
    }

    /// Creates a 400 Bad Request response.
    pub fn bad_request(body: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, body)
    }

    /// Creates a 500 Internal Server Error response.
    pub fn server_error(body: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, body)
    }

    /// Returns the status code.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns a reference to the headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a mutable reference to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Adds a header to the response.
    #[must_use]
    pub fn set_header(mut self, name: http::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the charset.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Returns the content type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Sets the content type.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    /// Returns the response body.
    pub const fn content(&self) -> &ResponseContent {
        &self.content
    }

    /// Returns the body as bytes.
    pub fn content_bytes(&self) -> &[u8] {
        match &self.content {
            ResponseContent::Bytes(b) => b,
            ResponseContent::Text(t) => t.as_bytes(),
        }
    }

    /// Returns the full content type header value including charset.
    fn full_content_type(&self) -> String {
        if self.content_type.starts_with("text/") || self.content_type.contains("json") {
            format!("{}; charset={}", self.content_type, self.charset)
        } else {
            self.content_type.clone()
        }
    }
}

impl From<ReportError> for HttpResponse {
    fn from(err: ReportError) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %err, "Report request failed");
        } else {
            tracing::debug!(error = %err, status = status.as_u16(), "Report request rejected");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> axum::response::Response {
        let content_type = self.full_content_type();
        let body = match self.content {
            ResponseContent::Text(text) => axum::body::Body::from(text),
            ResponseContent::Bytes(bytes) => axum::body::Body::from(bytes),
        };

        let mut response = axum::response::Response::new(body);
        *response.status_mut() = self.status;
        if let Ok(ct) = HeaderValue::from_str(&content_type) {
            response.headers_mut().insert(http::header::CONTENT_TYPE, ct);
        }
        for (key, value) in &self.headers {
            response.headers_mut().insert(key, value.clone());
        }
        response
    }
}

/// A JSON response.
pub struct JsonResponse;

impl JsonResponse {
    /// Creates a new JSON response from a serializable value.
    ///
    /// Serialization failures become a 500 response.
    pub fn new<T: serde::Serialize>(data: &T) -> HttpResponse {
        Self::with_status(StatusCode::OK, data)
    }

    /// Creates a new JSON response with a custom status code.
    pub fn with_status<T: serde::Serialize>(status: StatusCode, data: &T) -> HttpResponse {
        match serde_json::to_string(data) {
            Ok(json) => {
                let mut response = HttpResponse::new(status, json);
                response.set_content_type("application/json");
                response
            }
            Err(e) => HttpResponse::server_error(format!("JSON serialization error: {e}")),
        }
    }
}

/// A 302 Found redirect.
pub struct HttpResponseRedirect;

impl HttpResponseRedirect {
    /// Creates a 302 Found redirect to the given URL.
    pub fn new(url: &str) -> HttpResponse {
        let mut response = HttpResponse::new(StatusCode::FOUND, "");
        if let Ok(value) = HeaderValue::from_str(url) {
            response.headers.insert(http::header::LOCATION, value);
        }
        response
    }
}

/// Infers a MIME type from a file extension.
///
/// ```
/// use flex_report_http::mime_from_extension;
///
/// assert_eq!(mime_from_extension("CSV"), "text/csv");
/// assert_eq!(mime_from_extension("bin"), "application/octet-stream");
/// ```
pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
