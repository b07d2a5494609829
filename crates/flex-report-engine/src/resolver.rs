//! Column classification.
//!
//! A column title names something on a report model: a field path
//! (`customer__name`), a property (`double_total`, or `customer__initials`
//! across single relations), a computed field of a custom provider
//! (`audit.created_by`, or a bare `audit` for all of them) or a dynamic
//! field. [`FieldResolver`] classifies titles once per `(model, title)` and
//! caches the resulting [`ColumnDescriptor`], which also carries the filter
//! lookups the column admits.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flex_report_db::{FieldType, ModelSchema, ResolvedPath, SchemaRegistry, LOOKUP_SEP};

/// What a column title resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// A stored field or relation, possibly across relations.
    Field,
    /// A property computed from the record.
    Property,
    /// A value of a custom field provider.
    Custom,
    /// A dynamic field that unpacks into several cells.
    Dynamic,
}

impl ColumnKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Field => "field",
            Self::Property => "property",
            Self::Custom => "custom",
            Self::Dynamic => "dynamic",
        }
    }
}

/// A resolved column title.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    /// The column title as written.
    pub name: String,
    pub kind: ColumnKind,
    /// The resolved path, for [`ColumnKind::Field`] columns.
    pub path: Option<ResolvedPath>,
    /// The model that owns the last segment of the title.
    pub owner: Arc<ModelSchema>,
    /// Single relations leading from the report model to `owner`.
    pub relation_prefix: Vec<String>,
    /// The last segment of the title, without relations.
    pub attribute: String,
    pub verbose_name: String,
    /// Lookups a general filter may apply.
    pub lookups: Vec<&'static str>,
    /// Lookups a quicksearch may apply; empty when the column is not quicksearch eligible.
    pub quicksearch_lookups: Vec<&'static str>,
}

impl ColumnDescriptor {
    /// Returns `true` if the column can back a filter predicate.
    pub fn is_filterable(&self) -> bool {
        self.kind == ColumnKind::Field && !self.lookups.is_empty()
    }

    /// Returns the field type, for field columns ending in a field.
    pub fn field_type(&self) -> Option<&FieldType> {
        self.path.as_ref().and_then(ResolvedPath::field_type)
    }

    /// Relation paths that must be loaded to render this column.
    pub fn prefetch_paths(&self) -> Vec<String> {
        match &self.path {
            Some(path) => path.relation_paths(),
            None => (1..=self.relation_prefix.len())
                .map(|n| self.relation_prefix[..n].join(LOOKUP_SEP))
                .collect(),
        }
    }
}

/// Lookups a general filter may use on a resolved path.
pub fn field_lookups(path: &ResolvedPath) -> Vec<&'static str> {
    if path.is_relation() {
        return vec!["in"];
    }
    match path.field_type() {
        Some(FieldType::MoneyField { .. }) => vec!["startswith"],
        Some(t) if t.is_temporal() => vec!["lte", "gte"],
        _ => vec!["iexact"],
    }
}

/// Lookups a quicksearch may use on a resolved path.
///
/// Dates and times are never quicksearch eligible.
pub fn quicksearch_lookups(path: &ResolvedPath) -> Vec<&'static str> {
    match path.field_type() {
        Some(t) if t.is_temporal() => Vec::new(),
        _ => vec!["icontains"],
    }
}

type CacheKey = (String, String);

/// Classifies column titles against the schema registry.
pub struct FieldResolver {
    registry: Arc<SchemaRegistry>,
    cache: RwLock<HashMap<CacheKey, Option<Arc<ColumnDescriptor>>>>,
}

impl std::fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldResolver").finish_non_exhaustive()
    }
}

impl FieldResolver {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub const fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Resolves `column` on the model labelled `model`.
    ///
    /// Fields win over properties, properties over custom fields and custom
    /// fields over dynamic fields. Returns `None` for unregistered models and
    /// titles that name nothing.
    pub fn resolve(&self, model: &str, column: &str) -> Option<Arc<ColumnDescriptor>> {
        let key = (model.to_string(), column.to_string());
        if let Ok(cache) = self.cache.read() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }
        let resolved = self
            .registry
            .get(model)
            .and_then(|schema| self.classify(&schema, column))
            .map(Arc::new);
        if resolved.is_none() {
            tracing::debug!(model, column, "column does not resolve");
        }
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, resolved.clone());
        }
        resolved
    }

    /// Resolves `column`, returning its kind only.
    pub fn kind_of(&self, model: &str, column: &str) -> Option<ColumnKind> {
        self.resolve(model, column).map(|d| d.kind)
    }

    fn classify(&self, schema: &Arc<ModelSchema>, column: &str) -> Option<ColumnDescriptor> {
        if column.is_empty() {
            return None;
        }
        if let Some(path) = self.registry.resolve_path(schema, column) {
            let relation_prefix = path.hops.iter().map(|h| h.name.clone()).collect();
            return Some(ColumnDescriptor {
                name: column.to_string(),
                kind: ColumnKind::Field,
                lookups: field_lookups(&path),
                quicksearch_lookups: quicksearch_lookups(&path),
                verbose_name: path.verbose_name(),
                owner: Arc::clone(&path.owner),
                attribute: path.name.clone(),
                relation_prefix,
                path: Some(path),
            });
        }
        if let Some(descriptor) = self.classify_property(schema, column) {
            return Some(descriptor);
        }

        let computed = |kind: ColumnKind, verbose_name: String| ColumnDescriptor {
            name: column.to_string(),
            kind,
            path: None,
            owner: Arc::clone(schema),
            relation_prefix: Vec::new(),
            attribute: column.to_string(),
            verbose_name,
            lookups: Vec::new(),
            quicksearch_lookups: Vec::new(),
        };
        if let Some(field) = schema.get_computed(column) {
            return Some(computed(ColumnKind::Custom, field.verbose_name.clone()));
        }
        if let Some(provider) = schema.get_custom_fields(column) {
            return Some(computed(ColumnKind::Custom, provider.name.replace('_', " ")));
        }
        schema
            .get_dynamic_field(column)
            .map(|dynamic| computed(ColumnKind::Dynamic, dynamic.name.replace('_', " ")))
    }

    /// Resolves `a__b__prop` by walking single relations to the property owner.
    fn classify_property(&self, schema: &Arc<ModelSchema>, column: &str) -> Option<ColumnDescriptor> {
        let segments: Vec<&str> = column.split(LOOKUP_SEP).collect();
        let (name, prefix) = segments.split_last()?;
        let mut owner = Arc::clone(schema);
        for segment in prefix {
            let hop = self.registry.relation(&owner, segment)?;
            if hop.is_many() {
                return None;
            }
            owner = hop.to;
        }
        let property = owner.get_property(name)?;
        Some(ColumnDescriptor {
            name: column.to_string(),
            kind: ColumnKind::Property,
            path: None,
            verbose_name: property.verbose_name.clone(),
            relation_prefix: prefix.iter().map(|s| (*s).to_string()).collect(),
            attribute: (*name).to_string(),
            owner,
            lookups: Vec::new(),
            quicksearch_lookups: Vec::new(),
        })
    }

    /// Drops every cached classification.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::shop_resolver;

    #[test]
    fn test_resolution_order() {
        let resolver = shop_resolver();
        let kind = |c: &str| resolver.kind_of("shop.order", c);
        assert_eq!(kind("total"), Some(ColumnKind::Field));
        assert_eq!(kind("customer__name"), Some(ColumnKind::Field));
        assert_eq!(kind("lines"), Some(ColumnKind::Field));
        assert_eq!(kind("double_total"), Some(ColumnKind::Property));
        assert_eq!(kind("customer__initials"), Some(ColumnKind::Property));
        assert_eq!(kind("audit.created_by"), Some(ColumnKind::Custom));
        assert_eq!(kind("audit"), Some(ColumnKind::Custom));
        assert_eq!(kind("scores"), Some(ColumnKind::Dynamic));
        assert_eq!(kind("audit.nope"), None);
        assert_eq!(kind("tags__initials"), None);
        assert_eq!(kind(""), None);
        assert_eq!(resolver.kind_of("shop.nope", "total"), None);
    }

    #[test]
    fn test_field_lookup_table() {
        let resolver = shop_resolver();
        let lookups = |c: &str| {
            let d = resolver.resolve("shop.order", c).unwrap();
            (d.lookups.clone(), d.quicksearch_lookups.clone())
        };
        assert_eq!(lookups("price"), (vec!["startswith"], vec!["icontains"]));
        assert_eq!(lookups("created"), (vec!["lte", "gte"], vec![]));
        assert_eq!(lookups("due"), (vec!["lte", "gte"], vec![]));
        assert_eq!(lookups("customer"), (vec!["in"], vec!["icontains"]));
        assert_eq!(lookups("tags"), (vec!["in"], vec!["icontains"]));
        assert_eq!(lookups("number"), (vec!["iexact"], vec!["icontains"]));
        assert_eq!(lookups("customer__name"), (vec!["iexact"], vec!["icontains"]));
    }

    #[test]
    fn test_descriptor_details() {
        let resolver = shop_resolver();
        let name = resolver.resolve("shop.order", "customer__name").unwrap();
        assert_eq!(name.verbose_name, "Customer name");
        assert_eq!(name.relation_prefix, vec!["customer"]);
        assert_eq!(name.prefetch_paths(), vec!["customer"]);
        assert!(name.is_filterable());

        let initials = resolver.resolve("shop.order", "customer__initials").unwrap();
        assert_eq!(initials.owner.label(), "shop.customer");
        assert_eq!(initials.prefetch_paths(), vec!["customer"]);
        assert!(!initials.is_filterable());

        let tags = resolver.resolve("shop.order", "tags").unwrap();
        assert_eq!(tags.prefetch_paths(), vec!["tags"]);
        assert_eq!(
            resolver.resolve("shop.order", "audit.created_by").unwrap().verbose_name,
            "Created by"
        );
    }

    #[test]
    fn test_cache_returns_same_descriptor() {
        let resolver = shop_resolver();
        let a = resolver.resolve("shop.order", "total").unwrap();
        let b = resolver.resolve("shop.order", "total").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        resolver.clear_cache();
        let c = resolver.resolve("shop.order", "total").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
