//! Query building, compilation, and execution.
//!
//! - [`lookups`] - Q objects and lookup types for filtering
//! - [`compiler`] - Query AST and SQL compilation
//! - [`queryset`] - Lazy querysets over registered models

pub mod compiler;
pub mod lookups;
pub mod queryset;

pub use compiler::{DatabaseBackendType, OrderBy, Query, Row, SelectColumn, SqlCompiler, WhereNode};
pub use lookups::{Lookup, Q};
pub use queryset::QuerySet;
