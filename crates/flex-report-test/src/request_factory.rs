//! Request factory for building [`HttpRequest`] objects in tests.
//!
//! [`RequestFactory`] builds requests directly, bypassing routing. This is
//! useful when testing a report view in isolation: the factory sets the
//! resolved route name a report page is looked up by.
//!
//! ## Example
//!
//! ```rust
//! use flex_report_http::RequestUser;
//! use flex_report_test::request_factory::RequestFactory;
//!
//! let factory = RequestFactory::new().with_user(RequestUser::new(1, "ann"));
//! let request = factory.report("orders", "paid=true&report_page=2");
//! assert_eq!(request.view_name(), Some("orders"));
//! assert_eq!(request.get().get("paid"), Some("true"));
//! assert_eq!(request.user().username, "ann");
//! ```

use flex_report_http::{HttpRequest, RequestUser};
use http::Method;

/// A factory for building [`HttpRequest`] objects without a server.
#[derive(Debug, Clone, Default)]
pub struct RequestFactory {
    user: RequestUser,
    /// Default headers applied to every request.
    default_headers: Vec<(String, String)>,
}

impl RequestFactory {
    /// Creates a factory for anonymous requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `user` to every request.
    #[must_use]
    pub fn with_user(mut self, user: RequestUser) -> Self {
        self.user = user;
        self
    }

    /// Adds a default header that will be included in all requests.
    #[must_use]
    pub fn with_default_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Builds a GET request to `path` with `query` (without the leading `?`).
    pub fn get(&self, path: &str, query: &str) -> HttpRequest {
        self.build(Method::GET, path, query, None)
    }

    /// Builds a request with an arbitrary method.
    pub fn method(&self, method: Method, path: &str) -> HttpRequest {
        self.build(method, path, "", None)
    }

    /// Builds a GET request for the report page served under `url_name`.
    pub fn report(&self, url_name: &str, query: &str) -> HttpRequest {
        self.build(Method::GET, &format!("/reports/{url_name}"), query, Some(url_name))
    }

    /// Builds a GET request for the export of the page served under `url_name`.
    pub fn export(&self, url_name: &str, query: &str) -> HttpRequest {
        self.build(Method::GET, &format!("/reports/{url_name}/export"), query, Some(url_name))
    }

    fn build(&self, method: Method, path: &str, query: &str, url_name: Option<&str>) -> HttpRequest {
        let mut builder = HttpRequest::builder()
            .method(method)
            .path(path)
            .query_string(query)
            .user(self.user.clone());
        for (name, value) in &self.default_headers {
            builder = builder.header(name, value);
        }
        if let Some(url_name) = url_name {
            builder = builder.url_name(url_name);
        }
        builder.build()
    }
}
