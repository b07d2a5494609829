//! Utility types and functions for the flex-report engine.
//!
//! - [`MultiValueDict`]: an insertion-ordered dictionary holding multiple values per key.
//! - [`text`]: string helpers (slugs, suffix increments, truncation, HTML escaping).

mod multi_value_dict;
pub mod text;

pub use multi_value_dict::MultiValueDict;
