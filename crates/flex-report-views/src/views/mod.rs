//! Report views.
//!
//! - [`report`] - The report page, rendered as a JSON context bundle
//! - [`export`] - Download of a report in one of the registered formats
//!
//! Both implement [`View`], which dispatches on the request method. Reports
//! are read-only, so only `GET` and `HEAD` reach a handler.

pub mod export;
pub mod report;

use async_trait::async_trait;
use flex_report_http::{HttpRequest, HttpResponse};
use http::header::HeaderValue;
use http::{Method, StatusCode};

pub use export::ExportView;
pub use report::ReportView;

/// Method dispatch for report views.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use flex_report_http::{HttpRequest, HttpResponse};
/// use flex_report_views::views::View;
///
/// struct Ping;
///
/// #[async_trait]
/// impl View for Ping {
///     async fn get(&self, _request: HttpRequest) -> HttpResponse {
///         HttpResponse::ok("pong")
///     }
/// }
/// ```
#[async_trait]
pub trait View: Send + Sync {
    /// Returns the list of HTTP methods this view allows.
    fn allowed_methods(&self) -> Vec<Method> {
        vec![Method::GET, Method::HEAD]
    }

    /// Dispatches the request to the handler of its method.
    async fn dispatch(&self, request: HttpRequest) -> HttpResponse {
        match *request.method() {
            Method::GET => self.get(request).await,
            Method::HEAD => self.head(request).await,
            _ => self.http_method_not_allowed(request).await,
        }
    }

    async fn get(&self, request: HttpRequest) -> HttpResponse;

    /// Handles HEAD requests. Delegates to `get` by default.
    async fn head(&self, request: HttpRequest) -> HttpResponse {
        self.get(request).await
    }

    /// Returns a 405 Method Not Allowed response with the allowed methods header.
    async fn http_method_not_allowed(&self, request: HttpRequest) -> HttpResponse {
        let allowed = self.allowed_methods();
        let methods: Vec<&str> = allowed.iter().map(Method::as_str).collect();
        tracing::debug!(method = %request.method(), path = request.path(), "method not allowed");
        let mut response = HttpResponse::new(StatusCode::METHOD_NOT_ALLOWED, "");
        if let Ok(value) = HeaderValue::from_str(&methods.join(", ")) {
            response.headers_mut().insert(http::header::ALLOW, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hello;

    #[async_trait]
    impl View for Hello {
        async fn get(&self, _request: HttpRequest) -> HttpResponse {
            HttpResponse::ok("hello")
        }
    }

    #[tokio::test]
    async fn test_dispatch_get_and_head() {
        let response = Hello.dispatch(HttpRequest::builder().build()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = Hello.dispatch(HttpRequest::builder().method(Method::HEAD).build()).await;
        assert_eq!(response.content_bytes(), b"hello");
    }

    #[tokio::test]
    async fn test_dispatch_rejects_other_methods() {
        let response = Hello.dispatch(HttpRequest::builder().method(Method::POST).build()).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(http::header::ALLOW).unwrap(), "GET, HEAD");
    }
}
