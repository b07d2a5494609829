//! Lazy querysets over registered models.
//!
//! A [`QuerySet`] names a registered model and accumulates filters,
//! ordering, slicing and the relations to prefetch. Nothing touches the
//! database until a terminal method ([`count`](QuerySet::count),
//! [`fetch`](QuerySet::fetch), [`first`](QuerySet::first),
//! [`get`](QuerySet::get)) runs. Rows come back as [`Record`]s with the
//! requested relations attached, each relation loaded with one extra query.
//!
//! ```
//! use std::sync::Arc;
//! use flex_report_db::fields::{FieldDef, FieldType};
//! use flex_report_db::model::ModelMeta;
//! use flex_report_db::query::compiler::DatabaseBackendType;
//! use flex_report_db::query::lookups::{Lookup, Q};
//! use flex_report_db::query::queryset::QuerySet;
//! use flex_report_db::schema::{ModelSchema, SchemaRegistry};
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register(ModelSchema::new(ModelMeta::new("shop", "order", vec![
//!     FieldDef::new("id", FieldType::BigAutoField).primary_key(),
//!     FieldDef::new("paid", FieldType::BooleanField),
//! ])));
//! let qs = QuerySet::new(Arc::new(registry), "shop.order").unwrap()
//!     .filter(Q::filter("paid", Lookup::Exact(true.into())))
//!     .order_by(["-id"]);
//! let (sql, _) = qs.to_sql(DatabaseBackendType::SQLite).unwrap();
//! assert_eq!(sql, "SELECT * FROM \"shop_order\" WHERE \"paid\" = ? ORDER BY \"id\" DESC");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use flex_report_core::{ReportError, ReportResult};

use super::compiler::{DatabaseBackendType, OrderBy, Query, SelectColumn, SqlCompiler, WhereNode};
use super::lookups::{Lookup, Q};
use crate::executor::DbExecutor;
use crate::record::{Record, Related};
use crate::schema::{Link, ModelSchema, SchemaRegistry, LOOKUP_SEP};
use crate::value::Value;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A lazy, composable query over one registered model.
#[derive(Clone)]
pub struct QuerySet {
    registry: Arc<SchemaRegistry>,
    schema: Arc<ModelSchema>,
    filter: Option<Q>,
    order_by: Vec<String>,
    distinct: bool,
    is_none: bool,
    limit: Option<usize>,
    offset: Option<usize>,
    prefetch: Vec<String>,
}

impl std::fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &self.schema.label())
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("distinct", &self.distinct)
            .finish_non_exhaustive()
    }
}

impl QuerySet {
    /// Creates a queryset over every row of the model labelled `label`.
    ///
    /// # Errors
    ///
    /// Returns `ImproperlyConfigured` if the model is not registered.
    pub fn new(registry: Arc<SchemaRegistry>, label: &str) -> ReportResult<Self> {
        let schema = registry.require(label)?;
        Ok(Self::for_schema(registry, schema))
    }

    /// Creates a queryset over an already resolved schema.
    pub const fn for_schema(registry: Arc<SchemaRegistry>, schema: Arc<ModelSchema>) -> Self {
        Self {
            registry,
            schema,
            filter: None,
            order_by: Vec::new(),
            distinct: false,
            is_none: false,
            limit: None,
            offset: None,
            prefetch: Vec::new(),
        }
    }

    /// Returns the model schema.
    pub const fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Returns the registry the queryset resolves paths against.
    pub const fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Returns the accumulated filter.
    pub const fn q(&self) -> Option<&Q> {
        self.filter.as_ref()
    }

    /// Keeps only rows matching `q`.
    #[must_use]
    pub fn filter(mut self, q: Q) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing & q,
            None => q,
        });
        self
    }

    /// Drops rows matching `q`.
    #[must_use]
    pub fn exclude(self, q: Q) -> Self {
        self.filter(!q)
    }

    /// Returns a queryset that matches nothing.
    #[must_use]
    pub const fn none(mut self) -> Self {
        self.is_none = true;
        self
    }

    /// Removes duplicate rows.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Returns `true` if duplicates are removed.
    pub const fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Orders by field names; a leading `-` sorts descending.
    #[must_use]
    pub fn order_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Applies the model's declared ordering, or the primary key.
    #[must_use]
    pub fn order_by_default(mut self) -> Self {
        let meta = self.schema.meta();
        self.order_by = if meta.ordering.is_empty() {
            vec!["pk".to_string()]
        } else {
            meta.ordering
                .iter()
                .map(|o| {
                    let name = meta
                        .concrete_fields()
                        .find(|f| f.column == o.column)
                        .map_or(o.column.as_str(), |f| f.name);
                    if o.descending {
                        format!("-{name}")
                    } else {
                        name.to_string()
                    }
                })
                .collect()
        };
        self
    }

    /// Returns `true` if an ordering is set.
    pub fn is_ordered(&self) -> bool {
        !self.order_by.is_empty()
    }

    /// Restricts the result to `limit` rows starting at `offset`.
    #[must_use]
    pub const fn slice(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Loads the given relation paths along with the rows.
    #[must_use]
    pub fn prefetch_related<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for path in paths {
            let path = path.into();
            if !self.prefetch.contains(&path) {
                self.prefetch.push(path);
            }
        }
        self
    }

    /// Intersects with another queryset over the same model.
    ///
    /// The result keeps rows matched by both filters and is distinct if
    /// either side is.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the querysets are over different models.
    pub fn intersect(mut self, other: Self) -> ReportResult<Self> {
        if self.schema.label() != other.schema.label() {
            return Err(ReportError::BadRequest(format!(
                "Cannot intersect '{}' with '{}'",
                self.schema.label(),
                other.schema.label()
            )));
        }
        self.distinct |= other.distinct;
        self.is_none |= other.is_none;
        if let Some(q) = other.filter {
            self = self.filter(q);
        }
        for path in other.prefetch {
            if !self.prefetch.contains(&path) {
                self.prefetch.push(path);
            }
        }
        Ok(self)
    }

    fn order_column(&self, spec: &str) -> ReportResult<OrderBy> {
        let order = OrderBy::parse(spec);
        let field = self.schema.get_field(&order.column).ok_or_else(|| {
            ReportError::BadRequest(format!(
                "Cannot order '{}' by unknown field '{}'",
                self.schema.label(),
                order.column
            ))
        })?;
        Ok(OrderBy {
            column: field.column,
            descending: order.descending,
        })
    }

    /// Builds the query AST.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if a filter or ordering names an unknown field.
    pub fn query(&self) -> ReportResult<Query> {
        let mut query = Query::new(&self.schema.meta().db_table);
        query.where_clause = if self.is_none {
            Some(WhereNode::Or(Vec::new()))
        } else {
            self.filter
                .as_ref()
                .map(|q| self.registry.lower(&self.schema, q))
                .transpose()?
        };
        query.order_by = self
            .order_by
            .iter()
            .map(|spec| self.order_column(spec))
            .collect::<ReportResult<_>>()?;
        query.distinct = self.distinct;
        query.limit = self.limit;
        query.offset = self.offset;
        Ok(query)
    }

    /// Compiles the SELECT statement for a backend.
    pub fn to_sql(&self, backend: DatabaseBackendType) -> ReportResult<(String, Vec<Value>)> {
        Ok(SqlCompiler::new(backend).compile_select(&self.query()?))
    }

    /// Counts the matching rows.
    pub async fn count(&self, db: &dyn DbExecutor) -> ReportResult<usize> {
        if self.is_none {
            return Ok(0);
        }
        let (sql, params) = SqlCompiler::new(db.backend_type()).compile_count(&self.query()?);
        tracing::debug!(model = %self.schema.label(), sql = %sql, "counting records");
        let row = db.query_one(&sql, &params).await?;
        let count: i64 = row.get("count")?;
        usize::try_from(count).map_err(|e| ReportError::DatabaseError(e.to_string()))
    }

    /// Runs the query and loads the requested relations.
    pub async fn fetch(&self, db: &dyn DbExecutor) -> ReportResult<Vec<Record>> {
        self.fetch_boxed(db).await
    }

    /// Returns the first matching record.
    pub async fn first(&self, db: &dyn DbExecutor) -> ReportResult<Option<Record>> {
        let mut qs = self.clone();
        qs.limit = Some(1);
        Ok(qs.fetch(db).await?.into_iter().next())
    }

    /// Returns the record with the given primary key.
    ///
    /// # Errors
    ///
    /// Returns `DoesNotExist` if no matching record exists.
    pub async fn get(&self, db: &dyn DbExecutor, pk: Value) -> ReportResult<Record> {
        self.clone()
            .filter(Q::filter("pk", Lookup::Exact(pk.clone())))
            .first(db)
            .await?
            .ok_or_else(|| {
                ReportError::DoesNotExist(format!(
                    "{} matching pk={pk} does not exist",
                    self.schema.meta().model_name
                ))
            })
    }

    fn fetch_boxed<'a>(&'a self, db: &'a dyn DbExecutor) -> BoxFuture<'a, ReportResult<Vec<Record>>> {
        Box::pin(async move {
            if self.is_none {
                return Ok(Vec::new());
            }
            let (sql, params) = SqlCompiler::new(db.backend_type()).compile_select(&self.query()?);
            tracing::debug!(model = %self.schema.label(), sql = %sql, "fetching records");
            let mut records: Vec<Record> = db
                .query(&sql, &params)
                .await?
                .into_iter()
                .map(|row| self.schema.record_from_row(row))
                .collect();

            let mut paths = self.schema.prefetch_paths().to_vec();
            paths.extend(self.prefetch.iter().cloned());
            if !records.is_empty() && !paths.is_empty() {
                self.load_relations(&mut records, &paths, db).await?;
            }
            Ok(records)
        })
    }

    async fn load_relations(
        &self,
        records: &mut [Record],
        paths: &[String],
        db: &dyn DbExecutor,
    ) -> ReportResult<()> {
        let mut tree: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for path in paths {
            match path.split_once(LOOKUP_SEP) {
                Some((head, rest)) => tree.entry(head).or_default().push(rest.to_string()),
                None => {
                    tree.entry(path.as_str()).or_default();
                }
            }
        }

        for (name, rest) in tree {
            let hop = self.registry.relation(&self.schema, name).ok_or_else(|| {
                ReportError::BadRequest(format!(
                    "'{name}' is not a relation of '{}'",
                    self.schema.label()
                ))
            })?;
            let children =
                Self::for_schema(Arc::clone(&self.registry), Arc::clone(&hop.to)).prefetch_related(rest);

            match &hop.link {
                Link::Forward { field, .. } => {
                    let keys = distinct_values(records.iter().filter_map(|r| r.get(field)));
                    let by_pk = index_by_pk(if keys.is_empty() {
                        Vec::new()
                    } else {
                        children
                            .filter(Q::filter("pk", Lookup::In(keys)))
                            .fetch_boxed(db)
                            .await?
                    });
                    for record in records.iter_mut() {
                        let target = record
                            .get(field)
                            .and_then(|key| by_pk.get(&key.to_string()))
                            .cloned()
                            .map(Box::new);
                        record.set_related(name, Related::One(target));
                    }
                }
                Link::ManyToMany {
                    table,
                    source_column,
                    target_column,
                } => {
                    let mut join = Query::new(table);
                    join.select = vec![
                        SelectColumn::Column(source_column.clone()),
                        SelectColumn::Column(target_column.clone()),
                    ];
                    join.where_clause = Some(WhereNode::Condition {
                        column: source_column.clone(),
                        lookup: Lookup::In(distinct_values(records.iter().map(Record::pk))),
                    });
                    join.order_by = vec![OrderBy::asc("id")];
                    let (sql, params) = SqlCompiler::new(db.backend_type()).compile_select(&join);
                    let pairs = db
                        .query(&sql, &params)
                        .await?
                        .iter()
                        .map(|row| Ok((row.get::<Value>(source_column)?.to_string(), row.get::<Value>(target_column)?)))
                        .collect::<ReportResult<Vec<(String, Value)>>>()?;

                    let targets = distinct_values(pairs.iter().map(|(_, target)| target));
                    let by_pk = index_by_pk(if targets.is_empty() {
                        Vec::new()
                    } else {
                        children
                            .filter(Q::filter("pk", Lookup::In(targets)))
                            .fetch_boxed(db)
                            .await?
                    });
                    for record in records.iter_mut() {
                        let source = record.pk().to_string();
                        let related = pairs
                            .iter()
                            .filter(|(s, _)| *s == source)
                            .filter_map(|(_, target)| by_pk.get(&target.to_string()).cloned())
                            .collect();
                        record.set_related(name, Related::Many(related));
                    }
                }
                Link::Reverse { field, .. } => {
                    let pks = distinct_values(records.iter().map(Record::pk));
                    let fetched = children
                        .filter(Q::filter(field.as_str(), Lookup::In(pks)))
                        .order_by_default()
                        .fetch_boxed(db)
                        .await?;
                    let mut groups: HashMap<String, Vec<Record>> = HashMap::new();
                    for child in fetched {
                        let key = child.get(field).map(ToString::to_string).unwrap_or_default();
                        groups.entry(key).or_default().push(child);
                    }
                    for record in records.iter_mut() {
                        let related = groups.get(&record.pk().to_string()).cloned().unwrap_or_default();
                        record.set_related(name, Related::Many(related));
                    }
                }
            }
        }
        Ok(())
    }
}

fn distinct_values<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for value in values {
        if !value.is_null() && !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

fn index_by_pk(records: Vec<Record>) -> HashMap<String, Record> {
    records
        .into_iter()
        .map(|r| (r.pk().to_string(), r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::RecordingExecutor;
    use crate::query::compiler::Row;
    use crate::schema::tests::shop_registry;

    fn orders() -> QuerySet {
        QuerySet::new(Arc::new(shop_registry()), "shop.order").unwrap()
    }

    fn sql(qs: &QuerySet) -> String {
        qs.to_sql(DatabaseBackendType::SQLite).unwrap().0
    }

    fn row(columns: &[&str], values: Vec<Value>) -> Row {
        Row::new(columns.iter().map(|c| (*c).to_string()).collect(), values)
    }

    #[test]
    fn test_unregistered_model() {
        let err = QuerySet::new(Arc::new(SchemaRegistry::new()), "x.y").unwrap_err();
        assert!(matches!(err, ReportError::ImproperlyConfigured(_)));
    }

    #[test]
    fn test_filter_exclude_chain() {
        let qs = orders()
            .filter(Q::filter("total", Lookup::Gte(Value::Int(10))))
            .exclude(Q::filter("customer", Lookup::Exact(Value::Int(2))));
        assert_eq!(
            sql(&qs),
            "SELECT * FROM \"shop_order\" WHERE (\"total\" >= ? AND NOT (\"customer_id\" = ?))"
        );
    }

    #[test]
    fn test_distinct_order_slice() {
        let qs = orders().distinct().order_by(["-total", "pk"]).slice(25, 25);
        assert_eq!(
            sql(&qs),
            "SELECT DISTINCT * FROM \"shop_order\" ORDER BY \"total\" DESC, \"id\" ASC LIMIT 25 OFFSET 25"
        );
        assert!(qs.is_ordered());
        assert!(orders().order_by(["nope"]).query().is_err());
    }

    #[test]
    fn test_order_by_default_falls_back_to_pk() {
        assert_eq!(
            sql(&orders().order_by_default()),
            "SELECT * FROM \"shop_order\" ORDER BY \"id\" ASC"
        );
    }

    #[test]
    fn test_none_matches_nothing() {
        assert_eq!(sql(&orders().none()), "SELECT * FROM \"shop_order\" WHERE 1=0");
    }

    #[test]
    fn test_intersect() {
        let a = orders().distinct();
        let b = orders().filter(Q::filter("total", Lookup::Lte(Value::Int(5))));
        let c = orders().filter(Q::filter("customer__name", Lookup::IExact("ann".into())));
        let qs = a.intersect(b).unwrap().intersect(c).unwrap();
        assert!(qs.is_distinct());
        assert_eq!(
            sql(&qs),
            "SELECT DISTINCT * FROM \"shop_order\" WHERE (\"total\" <= ? AND \"customer_id\" IN \
             (SELECT \"id\" FROM \"shop_customer\" WHERE LOWER(\"name\") = LOWER(?)))"
        );

        let registry = Arc::new(shop_registry());
        let tags = QuerySet::new(Arc::clone(&registry), "shop.tag").unwrap();
        assert!(orders().intersect(tags).is_err());
    }

    #[tokio::test]
    async fn test_count() {
        let db = RecordingExecutor::with_rows(vec![vec![row(&["count"], vec![Value::Int(3)])]]);
        assert_eq!(orders().distinct().count(&db).await.unwrap(), 3);
        assert_eq!(
            db.sql()[0],
            "SELECT COUNT(*) AS \"count\" FROM (SELECT DISTINCT * FROM \"shop_order\") AS \"counted\""
        );
        assert_eq!(orders().none().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_prefetches_forward_relation() {
        let db = RecordingExecutor::with_rows(vec![
            vec![
                row(&["id", "total", "customer_id"], vec![Value::Int(1), Value::Float(9.5), Value::Int(7)]),
                row(&["id", "total", "customer_id"], vec![Value::Int(2), Value::Float(1.0), Value::Int(7)]),
            ],
            vec![row(
                &["id", "name", "city_id"],
                vec![Value::Int(7), Value::from("Ann"), Value::Null],
            )],
        ]);
        let records = orders().prefetch_related(["customer"]).fetch(&db).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].lookup("customer__name"), Some(&Value::from("Ann")));
        assert_eq!(
            db.sql()[1],
            "SELECT * FROM \"shop_customer\" WHERE \"id\" IN (?)"
        );
    }

    #[tokio::test]
    async fn test_fetch_prefetches_m2m_in_join_order() {
        let db = RecordingExecutor::with_rows(vec![
            vec![row(&["id", "total", "customer_id"], vec![Value::Int(1), Value::Float(1.0), Value::Int(7)])],
            vec![
                row(&["order_id", "tag_id"], vec![Value::Int(1), Value::Int(5)]),
                row(&["order_id", "tag_id"], vec![Value::Int(1), Value::Int(4)]),
            ],
            vec![
                row(&["id", "name"], vec![Value::Int(4), Value::from("b")]),
                row(&["id", "name"], vec![Value::Int(5), Value::from("a")]),
            ],
        ]);
        let records = orders().prefetch_related(["tags"]).fetch(&db).await.unwrap();
        let names: Vec<_> = records[0]
            .many("tags")
            .iter()
            .map(|t| t.get("name").cloned().unwrap())
            .collect();
        assert_eq!(names, vec![Value::from("a"), Value::from("b")]);
        assert_eq!(
            db.sql()[1],
            "SELECT \"order_id\", \"tag_id\" FROM \"shop_order_tags\" WHERE \"order_id\" IN (?) ORDER BY \"id\" ASC"
        );
    }

    #[tokio::test]
    async fn test_fetch_prefetches_reverse_relation() {
        let db = RecordingExecutor::with_rows(vec![
            vec![
                row(&["id", "total", "customer_id"], vec![Value::Int(1), Value::Float(1.0), Value::Int(7)]),
                row(&["id", "total", "customer_id"], vec![Value::Int(2), Value::Float(1.0), Value::Int(7)]),
            ],
            vec![
                row(&["id", "qty", "order_id"], vec![Value::Int(10), Value::Int(3), Value::Int(2)]),
                row(&["id", "qty", "order_id"], vec![Value::Int(11), Value::Int(4), Value::Int(2)]),
            ],
        ]);
        let records = orders().prefetch_related(["lines"]).fetch(&db).await.unwrap();
        assert!(records[0].many("lines").is_empty());
        assert_eq!(records[1].many("lines").len(), 2);
        assert_eq!(
            db.sql()[1],
            "SELECT * FROM \"shop_line\" WHERE \"order_id\" IN (?, ?) ORDER BY \"id\" ASC"
        );
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = RecordingExecutor::default();
        let err = orders().get(&db, Value::Int(1)).await.unwrap_err();
        assert!(matches!(err, ReportError::DoesNotExist(_)));
        assert_eq!(
            db.sql()[0],
            "SELECT * FROM \"shop_order\" WHERE \"id\" = ? LIMIT 1"
        );
    }
}
