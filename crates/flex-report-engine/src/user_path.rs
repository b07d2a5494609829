//! Row-level scoping of report results.
//!
//! A template lists [`UserPath`]s in priority order. At request time the
//! model's user-path hook returns a value per key; the first key with a
//! non-empty value has its [`PathExpr`] turned into a predicate with that
//! value injected, and the base queryset is narrowed by it.
//!
//! ```
//! use flex_report_db::{Lookup, Value, Q};
//! use flex_report_engine::user_path::PathExpr;
//!
//! let expr = PathExpr::or([PathExpr::compare("owner"), PathExpr::compare("team__lead")]);
//! assert_eq!(
//!     expr.to_q(&Value::Int(7)),
//!     Q::Or(vec![
//!         Q::filter("owner", Lookup::Exact(Value::Int(7))),
//!         Q::filter("team__lead", Lookup::Exact(Value::Int(7))),
//!     ])
//! );
//! ```

use std::collections::HashMap;

use flex_report_db::{Lookup, QuerySet, Value, Q};
use serde::{Deserialize, Serialize};

/// A predicate over field paths with the scoping value left open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathExpr {
    /// `path = value`, or `path != value` when negated.
    Compare {
        path: String,
        #[serde(default)]
        negate: bool,
    },
    And(Vec<PathExpr>),
    Or(Vec<PathExpr>),
    Not(Box<PathExpr>),
}

impl PathExpr {
    pub fn compare(path: impl Into<String>) -> Self {
        Self::Compare {
            path: path.into(),
            negate: false,
        }
    }

    pub fn not_equal(path: impl Into<String>) -> Self {
        Self::Compare {
            path: path.into(),
            negate: true,
        }
    }

    pub fn and(exprs: impl IntoIterator<Item = Self>) -> Self {
        Self::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Self>) -> Self {
        Self::Or(exprs.into_iter().collect())
    }

    pub fn negated(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Builds the predicate with `value` in every comparison.
    ///
    /// A list value compares with `IN`.
    pub fn to_q(&self, value: &Value) -> Q {
        match self {
            Self::Compare { path, negate } => {
                let lookup = match value {
                    Value::List(items) => Lookup::In(items.clone()),
                    other => Lookup::Exact(other.clone()),
                };
                let q = Q::filter(path.clone(), lookup);
                if *negate {
                    !q
                } else {
                    q
                }
            }
            Self::And(exprs) => Q::And(exprs.iter().map(|e| e.to_q(value)).collect()),
            Self::Or(exprs) => Q::Or(exprs.iter().map(|e| e.to_q(value)).collect()),
            Self::Not(expr) => !expr.to_q(value),
        }
    }

    /// Every field path the expression compares.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::Compare { path, .. } => vec![path.as_str()],
            Self::And(exprs) | Self::Or(exprs) => exprs.iter().flat_map(Self::paths).collect(),
            Self::Not(expr) => expr.paths(),
        }
    }
}

/// One scoping rule of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPath {
    /// The key looked up in the hook's result.
    pub key: String,
    pub predicate: PathExpr,
}

impl UserPath {
    pub fn new(key: impl Into<String>, predicate: PathExpr) -> Self {
        Self {
            key: key.into(),
            predicate,
        }
    }
}

/// Picks the first path whose key has a non-empty value.
pub fn select_user_path<'a>(
    paths: &'a [UserPath],
    values: &HashMap<String, Value>,
) -> Option<(&'a UserPath, Value)> {
    paths.iter().find_map(|path| {
        values
            .get(&path.key)
            .filter(|v| v.is_truthy())
            .map(|v| (path, v.clone()))
    })
}

/// Narrows `queryset` by the first applicable path.
///
/// Returns the queryset unchanged when no key has a value.
pub fn apply_user_path(queryset: QuerySet, paths: &[UserPath], values: &HashMap<String, Value>) -> QuerySet {
    match select_user_path(paths, values) {
        Some((path, value)) => {
            tracing::debug!(key = %path.key, value = %value, "scoping report by user path");
            queryset.filter(path.predicate.to_q(&value))
        }
        None => queryset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::shop_registry;
    use flex_report_db::DatabaseBackendType;
    use std::sync::Arc;

    fn paths() -> Vec<UserPath> {
        vec![
            UserPath::new("customer", PathExpr::compare("customer")),
            UserPath::new(
                "city",
                PathExpr::and([PathExpr::compare("customer__city"), PathExpr::not_equal("status")]),
            ),
        ]
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(&paths()[1]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "key": "city",
                "predicate": {"and": [
                    {"compare": {"path": "customer__city", "negate": false}},
                    {"compare": {"path": "status", "negate": true}},
                ]},
            })
        );
        let parsed: PathExpr = serde_json::from_value(serde_json::json!({"compare": {"path": "x"}})).unwrap();
        assert_eq!(parsed, PathExpr::compare("x"));
    }

    #[test]
    fn test_first_non_empty_key_wins() {
        let paths = paths();
        let mut values = HashMap::new();
        values.insert("customer".to_string(), Value::Null);
        values.insert("city".to_string(), Value::Int(9));
        let (path, value) = select_user_path(&paths, &values).unwrap();
        assert_eq!(path.key, "city");
        assert_eq!(value, Value::Int(9));

        values.insert("customer".to_string(), Value::Int(3));
        assert_eq!(select_user_path(&paths, &values).unwrap().0.key, "customer");
        assert!(select_user_path(&paths, &HashMap::new()).is_none());
    }

    #[test]
    fn test_apply_user_path() {
        let registry = Arc::new(shop_registry());
        let base = QuerySet::new(Arc::clone(&registry), "shop.order").unwrap();
        let mut values = HashMap::new();
        values.insert("city".to_string(), Value::Int(9));
        let scoped = apply_user_path(base.clone(), &paths(), &values);
        let (sql, params) = scoped.to_sql(DatabaseBackendType::SQLite).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"shop_order\" WHERE (\"customer_id\" IN (SELECT \"id\" FROM \"shop_customer\" \
             WHERE \"city_id\" = ?) AND NOT (\"status\" = ?))"
        );
        assert_eq!(params, vec![Value::Int(9), Value::Int(9)]);

        let unscoped = apply_user_path(base, &paths(), &HashMap::new());
        assert!(unscoped.q().is_none());
    }

    #[test]
    fn test_paths_lists_every_comparison() {
        let expr = PathExpr::or([PathExpr::compare("a"), PathExpr::compare("b__c").negated()]);
        assert_eq!(expr.paths(), vec!["a", "b__c"]);
    }
}
