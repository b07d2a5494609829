//! Field lookups and composable `Q` predicates.
//!
//! A [`Lookup`] is the comparison applied to one column. Reports only ever
//! compare in a handful of ways: equality (plain or case-folded), substring
//! and prefix matching, inclusive date bounds and set membership. [`Q`]
//! combines lookups on (possibly related) field paths with AND, OR and NOT.
//!
//! ```
//! use flex_report_db::query::lookups::{Lookup, Q};
//! use flex_report_db::value::Value;
//!
//! let paid_by_ann = Q::filter("paid", Lookup::Exact(Value::from(true)))
//!     & Q::filter("customer__name", Lookup::IContains("ann".into()));
//! let not_cancelled = !Q::filter("status", Lookup::Exact(Value::from("c")));
//! let q = paid_by_ann & not_cancelled;
//! assert!(matches!(q, Q::And(ref parts) if parts.len() == 3));
//! ```

use crate::value::Value;
use std::ops;

/// A comparison against one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// `field = value`; a null value tests `IS NULL`.
    Exact(Value),
    /// Equality ignoring case for text values.
    IExact(Value),
    /// Case-insensitive substring match.
    IContains(String),
    /// Prefix match.
    StartsWith(String),
    /// `field >= value`.
    Gte(Value),
    /// `field <= value`.
    Lte(Value),
    /// `field IN (...)`; an empty list matches nothing.
    In(Vec<Value>),
}

impl Lookup {
    /// Builds a lookup from its filter-key name and a value.
    ///
    /// Text lookups take the display form of the value and `in` wraps a
    /// scalar into a one-element list. Names outside the report vocabulary
    /// give `None`.
    ///
    /// ```
    /// use flex_report_db::query::lookups::Lookup;
    /// use flex_report_db::value::Value;
    ///
    /// assert_eq!(
    ///     Lookup::build("icontains", Value::Int(10)),
    ///     Some(Lookup::IContains("10".into()))
    /// );
    /// assert_eq!(Lookup::build("in", Value::Int(3)), Some(Lookup::In(vec![Value::Int(3)])));
    /// assert_eq!(Lookup::build("endswith", Value::from("x")), None);
    /// ```
    pub fn build(name: &str, value: Value) -> Option<Self> {
        let text = |value: Value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Some(match name {
            "exact" => Self::Exact(value),
            "iexact" => Self::IExact(value),
            "icontains" => Self::IContains(text(value)),
            "startswith" => Self::StartsWith(text(value)),
            "gte" => Self::Gte(value),
            "lte" => Self::Lte(value),
            "in" => match value {
                Value::List(items) => Self::In(items),
                scalar => Self::In(vec![scalar]),
            },
            _ => return None,
        })
    }
}

/// A predicate tree over field paths.
///
/// `&` and `!` build the tree; ANDs are flattened as they are combined so
/// repeated `filter` calls stay one level deep.
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    /// One lookup on a field path such as `customer__name`.
    Filter { field: String, lookup: Lookup },
    And(Vec<Q>),
    Or(Vec<Q>),
    Not(Box<Q>),
}

impl Q {
    /// A single-lookup predicate.
    pub fn filter(field: impl Into<String>, lookup: Lookup) -> Self {
        Self::Filter {
            field: field.into(),
            lookup,
        }
    }
}

impl ops::BitAnd for Q {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        let mut parts = match self {
            Self::And(parts) => parts,
            single => vec![single],
        };
        match rhs {
            Self::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Self::And(parts)
    }
}

impl ops::Not for Q {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}
