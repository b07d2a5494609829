//! HTTP request type.
//!
//! [`HttpRequest`] carries what the report views read from a request: the
//! method and path, the query parameters, headers, the requesting user and
//! the resolved route.

use http::{HeaderMap, Method};

use crate::querydict::QueryDict;
use crate::urls::ResolverMatch;
use crate::user::RequestUser;

/// An incoming HTTP request.
///
/// # Examples
///
/// ```
/// use flex_report_http::HttpRequest;
///
/// let request = HttpRequest::builder()
///     .path("/reports/orders/")
///     .query_string("report_page=2")
///     .build();
///
/// assert_eq!(request.method(), &http::Method::GET);
/// assert_eq!(request.get().get("report_page"), Some("2"));
/// assert_eq!(request.get_full_path(), "/reports/orders/?report_page=2");
/// ```
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    path: String,
    query_string: String,
    get: QueryDict,
    headers: HeaderMap,
    user: RequestUser,
    resolver_match: Option<ResolverMatch>,
    scheme: String,
}

impl HttpRequest {
    /// Creates a new [`HttpRequestBuilder`].
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Creates an `HttpRequest` from the parts of an axum request.
    ///
    /// The user is taken from the request extensions when an authentication
    /// layer put a [`RequestUser`] there, and is anonymous otherwise.
    pub fn from_axum(parts: &http::request::Parts) -> Self {
        let query_string = parts.uri.query().unwrap_or("").to_string();
        let scheme = if parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "https")
        {
            "https"
        } else {
            "http"
        };

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            get: QueryDict::parse(&query_string),
            query_string,
            headers: parts.headers.clone(),
            user: parts.extensions.get::<RequestUser>().cloned().unwrap_or_default(),
            resolver_match: None,
            scheme: scheme.to_string(),
        }
    }

    /// Returns the HTTP method.
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`).
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Returns the GET query parameters.
    pub const fn get(&self) -> &QueryDict {
        &self.get
    }

    /// Returns the request headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the requesting user.
    pub const fn user(&self) -> &RequestUser {
        &self.user
    }

    /// Replaces the requesting user.
    pub fn set_user(&mut self, user: RequestUser) {
        self.user = user;
    }

    /// Returns the resolver match information, if the URL has been resolved.
    pub const fn resolver_match(&self) -> Option<&ResolverMatch> {
        self.resolver_match.as_ref()
    }

    /// Sets the resolver match on this request.
    pub fn set_resolver_match(&mut self, resolver_match: ResolverMatch) {
        self.resolver_match = Some(resolver_match);
    }

    /// Returns the name of the resolved route, if any.
    pub fn view_name(&self) -> Option<&str> {
        self.resolver_match.as_ref().map(ResolverMatch::view_name)
    }

    /// Returns the URL scheme (`"http"` or `"https"`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the host from the `Host` header.
    pub fn get_host(&self) -> &str {
        self.headers
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost")
    }

    /// Returns the full path including the query string.
    pub fn get_full_path(&self) -> String {
        if self.query_string.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string)
        }
    }

    /// Builds an absolute URI for `location`, or for the request itself.
    ///
    /// Locations that already carry a scheme are returned unchanged.
    pub fn build_absolute_uri(&self, location: Option<&str>) -> String {
        match location {
            Some(loc) if loc.starts_with("http://") || loc.starts_with("https://") => loc.to_string(),
            Some(loc) => {
                let path = if loc.starts_with('/') {
                    loc.to_string()
                } else {
                    format!("/{loc}")
                };
                format!("{}://{}{path}", self.scheme, self.get_host())
            }
            None => format!("{}://{}{}", self.scheme, self.get_host(), self.get_full_path()),
        }
    }
}

/// Builder for constructing [`HttpRequest`] instances without a server.
#[derive(Debug)]
pub struct HttpRequestBuilder {
    method: Method,
    path: String,
    query_string: String,
    headers: HeaderMap,
    user: RequestUser,
    resolver_match: Option<ResolverMatch>,
    scheme: String,
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query_string: String::new(),
            headers: HeaderMap::new(),
            user: RequestUser::anonymous(),
            resolver_match: None,
            scheme: "http".to_string(),
        }
    }
}

impl HttpRequestBuilder {
    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request path.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Sets the query string (without leading `?`).
    #[must_use]
    pub fn query_string(mut self, qs: &str) -> Self {
        self.query_string = qs.to_string();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::header::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the requesting user.
    #[must_use]
    pub fn user(mut self, user: RequestUser) -> Self {
        self.user = user;
        self
    }

    /// Sets the resolved route name.
    #[must_use]
    pub fn url_name(mut self, url_name: &str) -> Self {
        self.resolver_match = Some(ResolverMatch::named(url_name));
        self
    }

    /// Sets the scheme (http or https).
    #[must_use]
    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// Builds the [`HttpRequest`].
    pub fn build(self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            path: self.path,
            get: QueryDict::parse(&self.query_string),
            query_string: self.query_string,
            headers: self.headers,
            user: self.user,
            resolver_match: self.resolver_match,
            scheme: self.scheme,
        }
    }
}
