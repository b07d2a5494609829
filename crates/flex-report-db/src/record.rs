//! Dynamically typed model instances.
//!
//! Report target models are not compiled into the engine, so their rows are
//! loaded as [`Record`]s: field values keyed by field name plus the related
//! records that were prefetched for them. Foreign keys store the raw key
//! under the field name; the related instance lives in [`Record::related`].

use std::collections::HashMap;

use crate::value::Value;

/// Related records loaded for one relation accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// A forward foreign key or one-to-one relation.
    One(Option<Box<Record>>),
    /// A many-to-many or reverse foreign key relation.
    Many(Vec<Record>),
}

/// One row of a registered model, with its prefetched relations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    model: String,
    pk: Value,
    values: HashMap<String, Value>,
    related: HashMap<String, Related>,
}

impl Record {
    /// Creates an empty record of the model with the given label.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Sets a field value, returning the record.
    ///
    /// ```
    /// use flex_report_db::record::Record;
    /// use flex_report_db::value::Value;
    ///
    /// let rec = Record::new("shop.order").with_pk(1).with("total", 12.5);
    /// assert_eq!(rec.get("total"), Some(&Value::Float(12.5)));
    /// assert_eq!(rec.pk(), &Value::Int(1));
    /// ```
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets the primary key, returning the record.
    #[must_use]
    pub fn with_pk(mut self, pk: impl Into<Value>) -> Self {
        self.pk = pk.into();
        self
    }

    /// Attaches related records, returning the record.
    #[must_use]
    pub fn with_related(mut self, name: impl Into<String>, related: Related) -> Self {
        self.related.insert(name.into(), related);
        self
    }

    /// Returns the `"app.model"` label of this record's model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the primary key value.
    pub const fn pk(&self) -> &Value {
        &self.pk
    }

    pub(crate) fn set_pk(&mut self, pk: Value) {
        self.pk = pk;
    }

    /// Returns a field value by name; `"pk"` aliases the primary key.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if name == "pk" {
            return Some(&self.pk);
        }
        self.values.get(name)
    }

    /// Sets a field value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Returns the related records loaded under `name`.
    pub fn related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    /// Stores related records under `name`.
    pub fn set_related(&mut self, name: impl Into<String>, related: Related) {
        self.related.insert(name.into(), related);
    }

    /// Returns the single related record under `name`, if loaded and present.
    pub fn one(&self, name: &str) -> Option<&Self> {
        match self.related.get(name)? {
            Related::One(rec) => rec.as_deref(),
            Related::Many(_) => None,
        }
    }

    /// Returns the related records under `name`; empty if not loaded.
    pub fn many(&self, name: &str) -> &[Self] {
        match self.related.get(name) {
            Some(Related::Many(recs)) => recs,
            _ => &[],
        }
    }

    /// Follows a `__`-separated path through single relations to a value.
    ///
    /// Returns `None` when a hop is missing or crosses a many-valued
    /// relation.
    ///
    /// ```
    /// use flex_report_db::record::{Record, Related};
    /// use flex_report_db::value::Value;
    ///
    /// let customer = Record::new("shop.customer").with("name", "Ann");
    /// let order = Record::new("shop.order")
    ///     .with_related("customer", Related::One(Some(Box::new(customer))));
    /// assert_eq!(order.lookup("customer__name"), Some(&Value::from("Ann")));
    /// assert_eq!(order.lookup("customer__missing"), None);
    /// ```
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        let mut segments = path.split("__").peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                return current.get(segment);
            }
            current = current.one(segment)?;
        }
        None
    }

    /// Iterates over the stored field values.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Record {
        let city = Record::new("geo.city").with_pk(9).with("name", "Tabriz");
        let customer = Record::new("shop.customer")
            .with_pk(3)
            .with("name", "Ann")
            .with_related("city", Related::One(Some(Box::new(city))));
        Record::new("shop.order")
            .with_pk(1)
            .with("customer", 3)
            .with_related("customer", Related::One(Some(Box::new(customer))))
            .with_related(
                "tags",
                Related::Many(vec![
                    Record::new("shop.tag").with_pk(1).with("name", "a"),
                    Record::new("shop.tag").with_pk(2).with("name", "b"),
                ]),
            )
    }

    #[test]
    fn test_get_and_pk_alias() {
        let rec = order();
        assert_eq!(rec.get("pk"), Some(&Value::Int(1)));
        assert_eq!(rec.get("customer"), Some(&Value::Int(3)));
        assert_eq!(rec.get("nope"), None);
        assert_eq!(rec.model(), "shop.order");
    }

    #[test]
    fn test_lookup_nested() {
        let rec = order();
        assert_eq!(rec.lookup("customer__city__name"), Some(&Value::from("Tabriz")));
        assert_eq!(rec.lookup("customer__pk"), Some(&Value::Int(3)));
        assert_eq!(rec.lookup("tags__name"), None);
    }

    #[test]
    fn test_one_and_many() {
        let rec = order();
        assert!(rec.one("customer").is_some());
        assert!(rec.one("tags").is_none());
        assert_eq!(rec.many("tags").len(), 2);
        assert!(rec.many("customer").is_empty());
        assert!(rec.many("unloaded").is_empty());
    }

    #[test]
    fn test_null_forward_relation() {
        let rec = Record::new("shop.order").with_related("customer", Related::One(None));
        assert!(rec.one("customer").is_none());
        assert_eq!(rec.lookup("customer__name"), None);
    }
}
