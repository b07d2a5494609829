//! HTTP test client for flex-report.
//!
//! This module provides [`TestClient`] for sending simulated requests through
//! an axum router, and [`TestResponse`] for inspecting the results.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use axum::routing::get;
//! use axum::Router;
//! use flex_report_test::client::TestClient;
//!
//! async fn example() {
//!     let app = Router::new().route("/hello", get(|| async { "Hello, World!" }));
//!     let client = TestClient::new(app);
//!
//!     let response = client.get("/hello").await;
//!     assert_eq!(response.status_code(), 200);
//!     assert_eq!(response.text(), "Hello, World!");
//! }
//! ```

use axum::Router;
use flex_report_core::{ReportError, ReportResult};
use flex_report_http::RequestUser;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// A test client for sending simulated requests through an axum router.
///
/// A user set with [`force_login`](Self::force_login) is attached to every
/// request the way an authentication layer would, as a request extension.
#[derive(Debug, Clone)]
pub struct TestClient {
    app: Router,
    user: Option<RequestUser>,
}

impl TestClient {
    /// Creates a new test client wrapping the given router.
    pub const fn new(app: Router) -> Self {
        Self { app, user: None }
    }

    /// Sends later requests as `user`.
    pub fn force_login(&mut self, user: RequestUser) {
        self.user = Some(user);
    }

    /// Sends later requests anonymously.
    pub fn logout(&mut self) {
        self.user = None;
    }

    /// Sends a GET request to the given path, query string included.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path).await
    }

    /// Sends a request with no body.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid URI.
    pub async fn request(&self, method: Method, path: &str) -> TestResponse {
        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .body(axum::body::Body::empty())
            .expect("test request path should be a valid URI");
        if let Some(user) = &self.user {
            request.extensions_mut().insert(user.clone());
        }
        self.send(request).await
    }

    async fn send(&self, request: Request<axum::body::Body>) -> TestResponse {
        let response = match self.app.clone().oneshot(request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .map(|collected| collected.to_bytes().to_vec())
            .unwrap_or_default();

        TestResponse { status, headers, body }
    }
}

/// The response from a test request.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// The response body as raw bytes.
    pub body: Vec<u8>,
}

impl TestResponse {
    /// Returns the response body as a UTF-8 string.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Deserializes the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the body is not valid JSON for `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> ReportResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ReportError::SerializationError(e.to_string()))
    }

    /// Returns the numeric status code.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns the value of a header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns `true` if the response body contains the given text.
    pub fn contains(&self, text: &str) -> bool {
        self.text().contains(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Request as AxumRequest;
    use axum::routing::get;

    fn test_app() -> Router {
        Router::new()
            .route("/hello", get(|| async { "Hello, World!" }))
            .route("/json", get(|| async { axum::Json(serde_json::json!({"key": "value"})) }))
            .route(
                "/whoami",
                get(|request: AxumRequest| async move {
                    request
                        .extensions()
                        .get::<RequestUser>()
                        .map_or_else(|| "anonymous".to_string(), |u| u.username.clone())
                }),
            )
    }

    #[tokio::test]
    async fn test_get_request() {
        let client = TestClient::new(test_app());
        let response = client.get("/hello").await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.text(), "Hello, World!");
        assert!(response.contains("World"));
    }

    #[tokio::test]
    async fn test_json_response() {
        let client = TestClient::new(test_app());
        let response = client.get("/json").await;
        let data: serde_json::Value = response.json().unwrap();
        assert_eq!(data["key"], "value");
        assert!(response.header("content-type").unwrap().contains("application/json"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let client = TestClient::new(test_app());
        assert_eq!(client.get("/missing").await.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_force_login_attaches_user() {
        let mut client = TestClient::new(test_app());
        assert_eq!(client.get("/whoami").await.text(), "anonymous");
        client.force_login(RequestUser::new(1, "ann"));
        assert_eq!(client.get("/whoami").await.text(), "ann");
        client.logout();
        assert_eq!(client.get("/whoami").await.text(), "anonymous");
    }
}
