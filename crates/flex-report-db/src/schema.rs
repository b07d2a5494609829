//! The model schema registry.
//!
//! Reports run against models the engine knows only by label. Every such model
//! is registered once at startup as a [`ModelSchema`]: its [`ModelMeta`] plus
//! the values it computes in code ([`Property`], [`CustomFieldProvider`],
//! [`DynamicField`]) and how its instances display. The [`SchemaRegistry`]
//! owns the schemas, resolves `__`-separated field paths across relations, and
//! lowers [`Q`] trees into subquery-based [`WhereNode`]s.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use flex_report_core::{ReportError, ReportResult};

use crate::fields::{FieldDef, FieldType};
use crate::model::ModelMeta;
use crate::query::compiler::{Query, WhereNode};
use crate::query::lookups::{Lookup, Q};
use crate::record::Record;
use crate::value::Value;

/// Separator between the segments of a relation path.
pub const LOOKUP_SEP: &str = "__";

/// A value computed from a loaded record.
pub type ComputeFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Produces the display string of a record.
pub type DisplayFn = Arc<dyn Fn(&Record) -> String + Send + Sync>;

/// A read-only attribute computed from a record.
#[derive(Clone)]
pub struct Property {
    /// The attribute name used as a column title.
    pub name: String,
    /// Human-readable name.
    pub verbose_name: String,
    compute: ComputeFn,
}

impl Property {
    /// Creates a property from a compute function.
    pub fn new(name: impl Into<String>, compute: impl Fn(&Record) -> Value + Send + Sync + 'static) -> Self {
        let name = name.into();
        Self {
            verbose_name: name.replace('_', " "),
            name,
            compute: Arc::new(compute),
        }
    }

    /// Sets the verbose name.
    #[must_use]
    pub fn verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
        self.verbose_name = verbose_name.into();
        self
    }

    /// Computes the property for a record.
    pub fn compute(&self, record: &Record) -> Value {
        (self.compute)(record)
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property").field("name", &self.name).finish_non_exhaustive()
    }
}

/// One keyed value produced by a [`CustomFieldProvider`] or [`DynamicField`].
#[derive(Clone)]
pub struct ComputedField {
    /// The key selecting this value (the part after the `.` in a column title).
    pub key: String,
    /// Human-readable name.
    pub verbose_name: String,
    compute: ComputeFn,
}

impl ComputedField {
    /// Creates a computed field.
    pub fn new(key: impl Into<String>, compute: impl Fn(&Record) -> Value + Send + Sync + 'static) -> Self {
        let key = key.into();
        Self {
            verbose_name: key.replace('_', " "),
            key,
            compute: Arc::new(compute),
        }
    }

    /// Sets the verbose name.
    #[must_use]
    pub fn verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
        self.verbose_name = verbose_name.into();
        self
    }

    /// Computes the value for a record.
    pub fn compute(&self, record: &Record) -> Value {
        (self.compute)(record)
    }
}

impl fmt::Debug for ComputedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedField").field("key", &self.key).finish_non_exhaustive()
    }
}

/// A named group of computed fields, addressed as `provider.key` in columns.
#[derive(Debug, Clone)]
pub struct CustomFieldProvider {
    /// The provider name (the part before the `.`).
    pub name: String,
    /// The values this provider offers.
    pub fields: Vec<ComputedField>,
}

impl CustomFieldProvider {
    /// Creates a provider.
    pub fn new(name: impl Into<String>, fields: Vec<ComputedField>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Returns the computed field under `key`.
    pub fn get(&self, key: &str) -> Option<&ComputedField> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// A column that unpacks into several display cells.
#[derive(Debug, Clone)]
pub struct DynamicField {
    /// The column name.
    pub name: String,
    /// The cells produced, in display order.
    pub sub_fields: Vec<ComputedField>,
}

impl DynamicField {
    /// Creates a dynamic field.
    pub fn new(name: impl Into<String>, sub_fields: Vec<ComputedField>) -> Self {
        Self {
            name: name.into(),
            sub_fields,
        }
    }

    /// Returns the sub-fields this column unpacks into.
    pub fn unpack(&self) -> &[ComputedField] {
        &self.sub_fields
    }
}

/// A registered report model.
#[derive(Clone)]
pub struct ModelSchema {
    meta: ModelMeta,
    properties: Vec<Property>,
    custom_fields: Vec<CustomFieldProvider>,
    dynamic_fields: Vec<DynamicField>,
    display: Option<DisplayFn>,
    prefetch: Vec<String>,
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("label", &self.meta.label())
            .field("properties", &self.properties)
            .field("custom_fields", &self.custom_fields)
            .field("dynamic_fields", &self.dynamic_fields)
            .finish_non_exhaustive()
    }
}

impl ModelSchema {
    /// Creates a schema with no computed values.
    pub fn new(meta: ModelMeta) -> Self {
        Self {
            meta,
            properties: Vec::new(),
            custom_fields: Vec::new(),
            dynamic_fields: Vec::new(),
            display: None,
            prefetch: Vec::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Adds a custom field provider.
    #[must_use]
    pub fn custom_fields(mut self, provider: CustomFieldProvider) -> Self {
        self.custom_fields.push(provider);
        self
    }

    /// Adds a dynamic field.
    #[must_use]
    pub fn dynamic_field(mut self, field: DynamicField) -> Self {
        self.dynamic_fields.push(field);
        self
    }

    /// Sets how instances are displayed inside relation cells.
    #[must_use]
    pub fn display(mut self, display: impl Fn(&Record) -> String + Send + Sync + 'static) -> Self {
        self.display = Some(Arc::new(display));
        self
    }

    /// Declares a relation path that computed values read, so it is loaded
    /// with every row.
    #[must_use]
    pub fn prefetch(mut self, path: impl Into<String>) -> Self {
        self.prefetch.push(path.into());
        self
    }

    /// Returns the model metadata.
    pub const fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    /// Returns the `"app.model"` label.
    pub fn label(&self) -> String {
        self.meta.label()
    }

    /// Returns the properties.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Looks up a property by name.
    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns the custom field providers.
    pub fn custom_field_providers(&self) -> &[CustomFieldProvider] {
        &self.custom_fields
    }

    /// Looks up a custom field provider by name.
    pub fn get_custom_fields(&self, name: &str) -> Option<&CustomFieldProvider> {
        self.custom_fields.iter().find(|p| p.name == name)
    }

    /// Looks up a `provider.key` computed field.
    pub fn get_computed(&self, path: &str) -> Option<&ComputedField> {
        let (provider, key) = path.split_once('.')?;
        self.get_custom_fields(provider)?.get(key)
    }

    /// Returns the dynamic fields.
    pub fn dynamic_fields(&self) -> &[DynamicField] {
        &self.dynamic_fields
    }

    /// Looks up a dynamic field by name.
    pub fn get_dynamic_field(&self, name: &str) -> Option<&DynamicField> {
        self.dynamic_fields.iter().find(|d| d.name == name)
    }

    /// Returns the relation paths always loaded with rows of this model.
    pub fn prefetch_paths(&self) -> &[String] {
        &self.prefetch
    }

    /// Renders a record as a short display string.
    ///
    /// Defaults to `"<model> object (<pk>)"`.
    pub fn display_record(&self, record: &Record) -> String {
        self.display.as_ref().map_or_else(
            || format!("{} object ({})", self.meta.model_name, record.pk()),
            |display| display(record),
        )
    }

    /// Returns the primary key field, synthesizing the implicit `id`.
    pub fn pk_field(&self) -> FieldDef {
        self.meta
            .pk_field()
            .cloned()
            .unwrap_or_else(|| FieldDef::new("id", FieldType::BigAutoField).primary_key())
    }

    /// Returns a field by name, with `"pk"` aliasing the primary key.
    pub fn get_field(&self, name: &str) -> Option<FieldDef> {
        if name == "pk" {
            return Some(self.pk_field());
        }
        self.meta.get_field(name).cloned()
    }

    /// Builds a record from a database row, decoding values per field type.
    pub fn record_from_row(&self, row: crate::query::compiler::Row) -> Record {
        let mut record = Record::new(self.label());
        let pk_column = self.meta.pk_column().to_string();
        for (column, value) in row.into_pairs() {
            match self.meta.concrete_fields().find(|f| f.column == column) {
                Some(field) => {
                    let value = field.field_type.from_db_value(value);
                    if column == pk_column {
                        record.set_pk(value.clone());
                    }
                    record.set(field.name, value);
                }
                None => {
                    if column == pk_column {
                        record.set_pk(value.clone());
                    }
                    record.set(column, value);
                }
            }
        }
        record
    }

    /// Returns the name of the join table of a many-to-many field.
    pub fn m2m_table(&self, field: &FieldDef) -> String {
        match &field.field_type {
            FieldType::ManyToManyField {
                through: Some(through),
                ..
            } => through.clone(),
            _ => format!("{}_{}", self.meta.db_table, field.name),
        }
    }
}

/// How a relation hop reaches the next model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// A key column on the source table pointing at the target's primary key.
    Forward {
        /// The field holding the key.
        field: String,
        /// Its column.
        column: String,
    },
    /// A join table between the source and the target.
    ManyToMany {
        /// The join table.
        table: String,
        /// The join column holding source keys.
        source_column: String,
        /// The join column holding target keys.
        target_column: String,
    },
    /// A key column on the target table pointing at the source's primary key.
    Reverse {
        /// The field on the target holding the key.
        field: String,
        /// Its column.
        column: String,
    },
}

/// One step across a relation.
#[derive(Debug, Clone)]
pub struct Hop {
    /// The accessor name on the source model.
    pub name: String,
    /// The source model.
    pub from: Arc<ModelSchema>,
    /// The target model.
    pub to: Arc<ModelSchema>,
    /// How the two are joined.
    pub link: Link,
}

impl Hop {
    /// Returns `true` if the hop yields many target records per source.
    pub const fn is_many(&self) -> bool {
        !matches!(self.link, Link::Forward { .. })
    }

    /// Restricts source rows to those whose related rows match `inner`.
    ///
    /// `inner` is a condition on the target table.
    pub fn wrap(&self, inner: WhereNode) -> WhereNode {
        let to_pk = self.to.meta().pk_column().to_string();
        let from_pk = self.from.meta().pk_column().to_string();
        match &self.link {
            Link::Forward { column, .. } => WhereNode::InSubquery {
                column: column.clone(),
                query: Box::new(Query::column_of(&self.to.meta().db_table, to_pk, Some(inner))),
            },
            Link::ManyToMany {
                table,
                source_column,
                target_column,
            } => WhereNode::InSubquery {
                column: from_pk,
                query: Box::new(Query::column_of(
                    table,
                    source_column,
                    Some(WhereNode::InSubquery {
                        column: target_column.clone(),
                        query: Box::new(Query::column_of(&self.to.meta().db_table, to_pk, Some(inner))),
                    }),
                )),
            },
            Link::Reverse { column, .. } => WhereNode::InSubquery {
                column: from_pk,
                query: Box::new(Query::column_of(&self.to.meta().db_table, column, Some(inner))),
            },
        }
    }
}

/// A field path resolved against the registry.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// The relation hops leading to the model that owns the last segment.
    pub hops: Vec<Hop>,
    /// The model owning the last segment.
    pub owner: Arc<ModelSchema>,
    /// The last segment of the path.
    pub name: String,
    /// The field named by the last segment; `None` for reverse relations.
    pub field: Option<FieldDef>,
    /// The relation named by the last segment, when its target is registered.
    pub relation: Option<Hop>,
}

impl ResolvedPath {
    /// Returns the field type of the last segment, if it is a field.
    pub fn field_type(&self) -> Option<&FieldType> {
        self.field.as_ref().map(|f| &f.field_type)
    }

    /// Returns `true` if the path ends in a many-valued relation.
    pub fn is_many(&self) -> bool {
        self.relation.as_ref().is_some_and(Hop::is_many)
    }

    /// Returns `true` if the path ends in any relation.
    pub fn is_relation(&self) -> bool {
        self.relation.is_some() || self.field.as_ref().is_some_and(FieldDef::is_relation)
    }

    /// Returns the human-readable name of the last segment.
    pub fn verbose_name(&self) -> String {
        match (&self.field, &self.relation) {
            (Some(field), _) => field.verbose_name.clone(),
            (None, Some(hop)) => hop.to.meta().verbose_name_plural.clone(),
            (None, None) => self.name.replace('_', " "),
        }
    }

    /// The relation path prefixes that must be loaded to read this path.
    pub fn relation_paths(&self) -> Vec<String> {
        let mut names: Vec<&str> = self.hops.iter().map(|h| h.name.as_str()).collect();
        if self.relation.is_some() {
            names.push(&self.name);
        }
        (1..=names.len()).map(|n| names[..n].join(LOOKUP_SEP)).collect()
    }

    fn condition(&self, lookup: Lookup) -> WhereNode {
        match (&self.relation, &self.field) {
            (Some(hop), _) if hop.is_many() => hop.wrap(WhereNode::Condition {
                column: hop.to.meta().pk_column().to_string(),
                lookup,
            }),
            (_, Some(field)) => WhereNode::Condition {
                column: field.column.clone(),
                lookup,
            },
            _ => WhereNode::Condition {
                column: self.owner.meta().pk_column().to_string(),
                lookup,
            },
        }
    }
}

/// The set of registered report models.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    models: HashMap<String, Arc<ModelSchema>>,
    order: Vec<String>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model schema, replacing any earlier one with the same label.
    pub fn register(&mut self, schema: ModelSchema) -> Arc<ModelSchema> {
        let label = schema.label();
        let schema = Arc::new(schema);
        if self.models.insert(label.clone(), Arc::clone(&schema)).is_none() {
            self.order.push(label);
        }
        schema
    }

    /// Looks up a schema by `"app.model"` label.
    pub fn get(&self, label: &str) -> Option<Arc<ModelSchema>> {
        self.models.get(label).cloned()
    }

    /// Looks up a schema, failing with `ImproperlyConfigured` when missing.
    pub fn require(&self, label: &str) -> ReportResult<Arc<ModelSchema>> {
        self.get(label).ok_or_else(|| {
            ReportError::ImproperlyConfigured(format!("Model '{label}' is not registered for reports"))
        })
    }

    /// Iterates over the registered schemas in registration order.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelSchema>> {
        self.order.iter().filter_map(|label| self.models.get(label))
    }

    /// Returns the relation hop named `name` on `schema`, if any.
    ///
    /// Forward keys and many-to-many fields are found on the model itself;
    /// reverse accessors are found by scanning the other registered models
    /// for relations pointing at it.
    pub fn relation(&self, schema: &Arc<ModelSchema>, name: &str) -> Option<Hop> {
        if let Some(field) = schema.meta().get_field(name) {
            return self.forward_hop(schema, field);
        }
        self.reverse_hops(schema).into_iter().find(|hop| hop.name == name)
    }

    fn forward_hop(&self, schema: &Arc<ModelSchema>, field: &FieldDef) -> Option<Hop> {
        let target = self.get(field.field_type.related_model()?)?;
        let link = match field.field_type {
            FieldType::ManyToManyField { .. } => {
                let (source_column, target_column) = m2m_columns(schema.meta(), target.meta());
                Link::ManyToMany {
                    table: schema.m2m_table(field),
                    source_column,
                    target_column,
                }
            }
            _ => Link::Forward {
                field: field.name.to_string(),
                column: field.column.clone(),
            },
        };
        Some(Hop {
            name: field.name.to_string(),
            from: Arc::clone(schema),
            to: target,
            link,
        })
    }

    /// Returns the reverse relations of `schema` declared on other models.
    pub fn reverse_hops(&self, schema: &Arc<ModelSchema>) -> Vec<Hop> {
        let label = schema.label();
        let mut hops = Vec::new();
        for other in self.models() {
            for field in &other.meta().fields {
                if field.field_type.related_model() != Some(label.as_str()) {
                    continue;
                }
                let accessor = field
                    .field_type
                    .related_name()
                    .map_or_else(|| format!("{}_set", other.meta().model_name), str::to_string);
                let link = match field.field_type {
                    FieldType::ManyToManyField { .. } => {
                        let (source_column, target_column) = m2m_columns(other.meta(), schema.meta());
                        Link::ManyToMany {
                            table: other.m2m_table(field),
                            source_column: target_column,
                            target_column: source_column,
                        }
                    }
                    _ => Link::Reverse {
                        field: field.name.to_string(),
                        column: field.column.clone(),
                    },
                };
                hops.push(Hop {
                    name: accessor,
                    from: Arc::clone(schema),
                    to: Arc::clone(other),
                    link,
                });
            }
        }
        hops
    }

    /// Resolves a `__`-separated path starting at `schema`.
    ///
    /// Every segment but the last must name a relation to a registered
    /// model. The last segment may name a field, `pk`, or a reverse
    /// relation. Returns `None` when the path does not resolve.
    pub fn resolve_path(&self, schema: &Arc<ModelSchema>, path: &str) -> Option<ResolvedPath> {
        let segments: Vec<&str> = path.split(LOOKUP_SEP).collect();
        let (last, prefix) = segments.split_last()?;
        let mut owner = Arc::clone(schema);
        let mut hops = Vec::with_capacity(prefix.len());
        for segment in prefix {
            let hop = self.relation(&owner, segment)?;
            owner = Arc::clone(&hop.to);
            hops.push(hop);
        }

        let field = owner.get_field(last);
        let relation = match &field {
            Some(f) if f.is_relation() => self.forward_hop(&owner, f),
            Some(_) => None,
            None => Some(self.reverse_hops(&owner).into_iter().find(|h| h.name == *last)?),
        };
        Some(ResolvedPath {
            hops,
            owner,
            name: (*last).to_string(),
            field,
            relation,
        })
    }

    /// Lowers a `Q` tree on `schema` into a WHERE clause.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` when a filter names a path that does not resolve.
    pub fn lower(&self, schema: &Arc<ModelSchema>, q: &Q) -> ReportResult<WhereNode> {
        Ok(match q {
            Q::Filter { field, lookup } => {
                let path = self.resolve_path(schema, field).ok_or_else(|| {
                    ReportError::BadRequest(format!(
                        "Cannot resolve keyword '{field}' into field of '{}'",
                        schema.label()
                    ))
                })?;
                let node = path.condition(lookup.clone());
                path.hops.iter().rev().fold(node, |inner, hop| hop.wrap(inner))
            }
            Q::And(children) => WhereNode::And(
                children
                    .iter()
                    .map(|c| self.lower(schema, c))
                    .collect::<ReportResult<_>>()?,
            ),
            Q::Or(children) => WhereNode::Or(
                children
                    .iter()
                    .map(|c| self.lower(schema, c))
                    .collect::<ReportResult<_>>()?,
            ),
            Q::Not(inner) => WhereNode::Not(Box::new(self.lower(schema, inner)?)),
        })
    }
}

fn m2m_columns(source: &ModelMeta, target: &ModelMeta) -> (String, String) {
    if source.label() == target.label() {
        (
            format!("from_{}_id", source.model_name),
            format!("to_{}_id", target.model_name),
        )
    } else {
        (
            format!("{}_id", source.model_name),
            format!("{}_id", target.model_name),
        )
    }
}
