//! # flex-report-test
//!
//! Testing utilities for flex-report: an in-memory SQLite [`TestDatabase`]
//! that creates tables from model metadata, a [`RequestFactory`] for report
//! requests, and a [`TestClient`] that sends requests through an axum router.

pub mod client;
pub mod request_factory;
pub mod test_database;

pub use client::{TestClient, TestResponse};
pub use request_factory::RequestFactory;
pub use test_database::TestDatabase;
