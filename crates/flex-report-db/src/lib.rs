//! # flex-report-db
//!
//! Data access layer for flex-report. Report target models are described at
//! runtime by a [`ModelSchema`](schema::ModelSchema) and collected in a
//! [`SchemaRegistry`](schema::SchemaRegistry); their rows load as
//! [`Record`](record::Record)s through a lazy [`QuerySet`](query::QuerySet).
//! The report engine's own entities implement the typed [`Model`](model::Model)
//! trait and persist through the CRUD functions in [`executor`].
//!
//! ## Architecture
//!
//! A [`QuerySet`](query::QuerySet) accumulates `Q` filters without touching
//! the database. Filters spanning relations are lowered into `IN (SELECT ...)`
//! subqueries by the registry, and the [`SqlCompiler`](query::SqlCompiler)
//! renders the resulting [`Query`](query::Query) AST as parameterized SQL for
//! the target backend.
//!
//! ## Module Overview
//!
//! - [`model`] - The [`Model`](model::Model) trait and [`ModelMeta`](model::ModelMeta)
//! - [`fields`] - Field definitions ([`FieldDef`](fields::FieldDef)) and types
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`schema`] - Runtime model schemas, relation paths and filter lowering
//! - [`record`] - Dynamically typed rows with prefetched relations
//! - [`query`] - Query building, lookups, and compilation
//! - [`ddl`] - `CREATE TABLE` generation
//! - [`transactions`] - Transactions and savepoints

// - struct_excessive_bools: FieldDef carries several column flags
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - doc_markdown: backtick requirements for documentation items are too strict
// - return_self_not_must_use: builder pattern methods are self-documenting
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
// significant_drop_tightening: false positives with async Mutex guards
#![allow(clippy::significant_drop_tightening)]

pub mod ddl;
pub mod executor;
pub mod fields;
pub mod model;
pub mod query;
pub mod record;
pub mod schema;
pub mod transactions;
pub mod value;

pub use executor::{create_model, delete_model, fetch_models, get_model, refresh_model, save_model, DbExecutor};
pub use fields::{FieldDef, FieldType, OnDelete};
pub use model::{Model, ModelMeta};
pub use query::{DatabaseBackendType, Lookup, OrderBy, Query, QuerySet, Row, SelectColumn, SqlCompiler, WhereNode, Q};
pub use record::{Record, Related};
pub use schema::{
    ComputedField, CustomFieldProvider, DynamicField, Hop, Link, ModelSchema, Property, ResolvedPath, SchemaRegistry,
    LOOKUP_SEP,
};
pub use transactions::{atomic, TransactionManager};
pub use value::Value;
