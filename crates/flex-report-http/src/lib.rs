//! # flex-report-http
//!
//! HTTP layer for flex-report. Provides the request and response types the
//! report views work with, the multi-valued [`QueryDict`] that carries filter
//! and pagination parameters, the [`RequestUser`] a report is rendered for,
//! and a table of named routes used to link report buttons.

pub mod querydict;
pub mod request;
pub mod response;
pub mod urls;
pub mod user;

pub use querydict::QueryDict;
pub use request::{HttpRequest, HttpRequestBuilder};
pub use response::{mime_from_extension, HttpResponse, HttpResponseRedirect, JsonResponse, ResponseContent};
pub use urls::{ResolverMatch, UrlRouter};
pub use user::RequestUser;
