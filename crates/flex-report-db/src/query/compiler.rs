//! SQL query AST and compiler.
//!
//! This module defines the [`Query`] AST that represents a database query, and
//! the [`SqlCompiler`] that translates it into parameterized SQL strings. The
//! compiler supports PostgreSQL (`$1, $2, ...`) and SQLite (`?`) parameter
//! placeholder styles.
//!
//! Relation traversal never uses joins: a filter on `customer__name` is
//! compiled into `"customer_id" IN (SELECT "id" FROM ... WHERE ...)` through
//! [`WhereNode::InSubquery`], so a filtered result never contains duplicate
//! rows of the base table.

use super::lookups::Lookup;
use crate::value::Value;
use flex_report_core::ReportError;

/// The type of database backend, used by the compiler to generate
/// backend-specific SQL syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackendType {
    /// PostgreSQL (uses `$1, $2, ...` placeholders).
    PostgreSQL,
    /// SQLite (uses `?` placeholders).
    SQLite,
}

/// A column ordering direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The column to order by.
    pub column: String,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl OrderBy {
    /// Creates an ascending order.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Creates a descending order.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    /// Parses `"name"` / `"-name"` ordering notation.
    pub fn parse(spec: &str) -> Self {
        spec.strip_prefix('-')
            .map_or_else(|| Self::asc(spec), Self::desc)
    }
}

/// A column to select in a query.
#[derive(Debug, Clone)]
pub enum SelectColumn {
    /// A simple column name.
    Column(String),
    /// All columns (`*`).
    Star,
}

/// A WHERE clause node in the query AST.
#[derive(Debug, Clone)]
pub enum WhereNode {
    /// A single condition.
    Condition {
        /// The column name.
        column: String,
        /// The lookup type.
        lookup: Lookup,
    },
    /// `column IN (SELECT ...)`.
    InSubquery {
        /// The column of the outer table.
        column: String,
        /// The inner query; it must select exactly one column.
        query: Box<Query>,
    },
    /// Logical AND of conditions.
    And(Vec<WhereNode>),
    /// Logical OR of conditions.
    Or(Vec<WhereNode>),
    /// Logical NOT of a condition.
    Not(Box<WhereNode>),
}

impl WhereNode {
    /// Combines two optional clauses with AND.
    pub fn and(left: Option<Self>, right: Option<Self>) -> Option<Self> {
        match (left, right) {
            (Some(Self::And(mut l)), Some(r)) => {
                l.push(r);
                Some(Self::And(l))
            }
            (Some(l), Some(r)) => Some(Self::And(vec![l, r])),
            (l, None) => l,
            (None, r) => r,
        }
    }
}

/// The query AST, equivalent to a single `SELECT` statement.
#[derive(Debug, Clone)]
pub struct Query {
    /// The table to select from.
    pub table: String,
    /// The columns to select (empty means `*`).
    pub select: Vec<SelectColumn>,
    /// The WHERE clause.
    pub where_clause: Option<WhereNode>,
    /// ORDER BY clauses.
    pub order_by: Vec<OrderBy>,
    /// LIMIT value.
    pub limit: Option<usize>,
    /// OFFSET value.
    pub offset: Option<usize>,
    /// Whether to use SELECT DISTINCT.
    pub distinct: bool,
}

impl Query {
    /// Creates a new query for the given table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: Vec::new(),
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// Creates a query selecting one column, for use as a subquery.
    pub fn column_of(table: impl Into<String>, column: impl Into<String>, where_clause: Option<WhereNode>) -> Self {
        let mut query = Self::new(table);
        query.select = vec![SelectColumn::Column(column.into())];
        query.where_clause = where_clause;
        query
    }
}

/// A single result row returned from a database query.
///
/// `Row` holds a list of column names and their corresponding values. It
/// provides typed access via the [`get`](Row::get) method.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist or the value cannot be
    /// converted to the requested type.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T, ReportError> {
        let value = self.get_value(column).ok_or_else(|| {
            ReportError::DatabaseError(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Gets a typed value by column index.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> Result<T, ReportError> {
        let value = self.values.get(idx).ok_or_else(|| {
            ReportError::DatabaseError(format!(
                "Column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Returns a reference to the raw Value at the given column name.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Consumes the row, yielding `(column, value)` pairs.
    pub fn into_pairs(self) -> impl Iterator<Item = (String, Value)> {
        self.columns.into_iter().zip(self.values)
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> Result<Self, ReportError>;
}

fn type_mismatch(expected: &str, value: &Value) -> ReportError {
    ReportError::DatabaseError(format!("Expected {expected}, got {value:?}"))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ReportError> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(type_mismatch("Int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ReportError> {
        match value {
            Value::Int(i) => i32::try_from(*i).map_err(|e| {
                ReportError::DatabaseError(format!("Int value out of i32 range: {e}"))
            }),
            _ => Err(type_mismatch("Int", value)),
        }
    }
}

impl FromValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: &Value) -> Result<Self, ReportError> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(type_mismatch("Float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ReportError> {
        match value {
            Value::Bool(b) => Ok(*b),
            // SQLite stores booleans as integers.
            Value::Int(i) => Ok(*i != 0),
            _ => Err(type_mismatch("Bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ReportError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(type_mismatch("String", value)),
        }
    }
}

impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, ReportError> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::DateTimeTz(dt) => Ok(dt.naive_utc()),
            Value::String(s) => Self::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|e| ReportError::DatabaseError(format!("Invalid datetime '{s}': {e}"))),
            _ => Err(type_mismatch("DateTime", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, ReportError> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            Value::String(s) => Ok(serde_json::from_str(s)?),
            _ => Err(type_mismatch("Json", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ReportError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ReportError> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

/// The SQL compiler translates a [`Query`] AST into parameterized SQL.
///
/// Different backends use different placeholder styles:
/// - PostgreSQL: `$1, $2, $3, ...`
/// - SQLite: `?, ?, ?, ...`
pub struct SqlCompiler {
    backend: DatabaseBackendType,
}

impl SqlCompiler {
    /// Creates a new compiler for the given backend type.
    pub const fn new(backend: DatabaseBackendType) -> Self {
        Self { backend }
    }

    /// Returns a parameter placeholder for the given 1-based index.
    fn placeholder(&self, index: usize) -> String {
        match self.backend {
            DatabaseBackendType::PostgreSQL => format!("${index}"),
            DatabaseBackendType::SQLite => "?".to_string(),
        }
    }

    /// Compiles a SELECT query into SQL and parameters.
    pub fn compile_select(&self, query: &Query) -> (String, Vec<Value>) {
        let mut params: Vec<Value> = Vec::new();
        let mut sql = String::new();
        self.compile_select_into(query, &mut sql, &mut params);
        (sql, params)
    }

    /// Compiles `SELECT COUNT(*)` over the query's rows.
    ///
    /// Ordering and slicing are dropped; a DISTINCT query is counted through
    /// a derived table.
    pub fn compile_count(&self, query: &Query) -> (String, Vec<Value>) {
        let mut inner = query.clone();
        inner.order_by.clear();
        inner.limit = None;
        inner.offset = None;
        if inner.distinct {
            let (inner_sql, params) = self.compile_select(&inner);
            return (
                format!("SELECT COUNT(*) AS \"count\" FROM ({inner_sql}) AS \"counted\""),
                params,
            );
        }
        let mut params = Vec::new();
        let mut sql = format!("SELECT COUNT(*) AS \"count\" FROM \"{}\"", inner.table);
        if let Some(ref where_clause) = inner.where_clause {
            sql.push_str(" WHERE ");
            self.compile_where_node(where_clause, &mut sql, &mut params);
        }
        (sql, params)
    }

    fn compile_select_into(&self, query: &Query, sql: &mut String, params: &mut Vec<Value>) {
        sql.push_str("SELECT ");

        if query.distinct {
            sql.push_str("DISTINCT ");
        }

        // SELECT columns
        let select_parts: Vec<String> = if query.select.is_empty() {
            vec!["*".to_string()]
        } else {
            query
                .select
                .iter()
                .map(|col| match col {
                    SelectColumn::Column(name) => format!("\"{name}\""),
                    SelectColumn::Star => "*".to_string(),
                })
                .collect()
        };
        sql.push_str(&select_parts.join(", "));

        // FROM
        sql.push_str(&format!(" FROM \"{}\"", query.table));

        // WHERE
        if let Some(ref where_clause) = query.where_clause {
            sql.push_str(" WHERE ");
            self.compile_where_node(where_clause, sql, params);
        }

        // ORDER BY
        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| {
                    let dir = if o.descending { " DESC" } else { " ASC" };
                    format!("\"{}\"{dir}", o.column)
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        // LIMIT / OFFSET
        match (query.limit, query.offset) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {limit}"));
                if let Some(offset) = offset {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            (None, Some(offset)) => match self.backend {
                // SQLite requires a LIMIT before OFFSET.
                DatabaseBackendType::SQLite => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                DatabaseBackendType::PostgreSQL => sql.push_str(&format!(" OFFSET {offset}")),
            },
            (None, None) => {}
        }
    }

    /// Compiles an INSERT statement.
    pub fn compile_insert(&self, table: &str, fields: &[(&str, Value)]) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        if fields.is_empty() {
            return (format!("INSERT INTO \"{table}\" DEFAULT VALUES"), params);
        }
        let columns: Vec<String> = fields.iter().map(|(name, _)| format!("\"{name}\"")).collect();
        let placeholders: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (_, val))| {
                params.push(val.clone());
                self.placeholder(i + 1)
            })
            .collect();

        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        (sql, params)
    }

    /// Compiles an UPDATE statement.
    pub fn compile_update(
        &self,
        table: &str,
        fields: &[(&str, Value)],
        where_clause: &WhereNode,
    ) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let set_parts: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (name, val))| {
                params.push(val.clone());
                let ph = self.placeholder(i + 1);
                format!("\"{name}\" = {ph}")
            })
            .collect();

        let mut sql = format!("UPDATE \"{}\" SET {} WHERE ", table, set_parts.join(", "));

        self.compile_where_node(where_clause, &mut sql, &mut params);

        (sql, params)
    }

    /// Compiles a DELETE statement.
    pub fn compile_delete(&self, table: &str, where_clause: &WhereNode) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM \"{table}\" WHERE ");
        self.compile_where_node(where_clause, &mut sql, &mut params);
        (sql, params)
    }

    /// Compiles a `WhereNode` into SQL, appending to the provided string.
    fn compile_where_node(&self, node: &WhereNode, sql: &mut String, params: &mut Vec<Value>) {
        match node {
            WhereNode::Condition { column, lookup } => {
                self.compile_lookup(column, lookup, sql, params);
            }
            WhereNode::InSubquery { column, query } => {
                sql.push_str(&format!("\"{column}\" IN ("));
                self.compile_select_into(query, sql, params);
                sql.push(')');
            }
            WhereNode::And(children) => {
                if children.is_empty() {
                    sql.push_str("1=1");
                    return;
                }
                sql.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    self.compile_where_node(child, sql, params);
                }
                sql.push(')');
            }
            WhereNode::Or(children) => {
                if children.is_empty() {
                    sql.push_str("1=0");
                    return;
                }
                sql.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" OR ");
                    }
                    self.compile_where_node(child, sql, params);
                }
                sql.push(')');
            }
            WhereNode::Not(inner) => {
                sql.push_str("NOT (");
                self.compile_where_node(inner, sql, params);
                sql.push(')');
            }
        }
    }

    fn push_param(&self, params: &mut Vec<Value>, value: Value) -> String {
        params.push(value);
        self.placeholder(params.len())
    }

    fn compile_pattern(
        &self,
        column: &str,
        pattern: String,
        case_insensitive: bool,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        let ph = self.push_param(params, Value::String(pattern));
        match (case_insensitive, self.backend) {
            (false, DatabaseBackendType::PostgreSQL) => {
                sql.push_str(&format!("\"{column}\"::text LIKE {ph}"));
            }
            (false, DatabaseBackendType::SQLite) => sql.push_str(&format!("\"{column}\" LIKE {ph}")),
            (true, DatabaseBackendType::PostgreSQL) => {
                sql.push_str(&format!("\"{column}\"::text ILIKE {ph}"));
            }
            (true, DatabaseBackendType::SQLite) => {
                sql.push_str(&format!("LOWER(\"{column}\") LIKE LOWER({ph})"));
            }
        }
    }

    /// Compiles a single lookup into SQL.
    fn compile_lookup(&self, column: &str, lookup: &Lookup, sql: &mut String, params: &mut Vec<Value>) {
        match lookup {
            Lookup::Exact(val) => {
                if val.is_null() {
                    sql.push_str(&format!("\"{column}\" IS NULL"));
                } else {
                    let ph = self.push_param(params, val.clone());
                    sql.push_str(&format!("\"{column}\" = {ph}"));
                }
            }
            Lookup::IExact(val) => match val {
                Value::Null => sql.push_str(&format!("\"{column}\" IS NULL")),
                Value::String(_) => {
                    let ph = self.push_param(params, val.clone());
                    match self.backend {
                        DatabaseBackendType::PostgreSQL => {
                            sql.push_str(&format!("\"{column}\"::text ILIKE {ph}"));
                        }
                        DatabaseBackendType::SQLite => {
                            sql.push_str(&format!("LOWER(\"{column}\") = LOWER({ph})"));
                        }
                    }
                }
                // Case folding is meaningless for non-text values.
                _ => {
                    let ph = self.push_param(params, val.clone());
                    sql.push_str(&format!("\"{column}\" = {ph}"));
                }
            },
            Lookup::IContains(val) => self.compile_pattern(column, format!("%{val}%"), true, sql, params),
            Lookup::StartsWith(val) => self.compile_pattern(column, format!("{val}%"), false, sql, params),
            Lookup::In(vals) => {
                if vals.is_empty() {
                    sql.push_str("1=0");
                    return;
                }
                let placeholders: Vec<String> = vals
                    .iter()
                    .map(|v| self.push_param(params, v.clone()))
                    .collect();
                sql.push_str(&format!("\"{column}\" IN ({})", placeholders.join(", ")));
            }
            Lookup::Gte(val) | Lookup::Lte(val) => {
                let op = if matches!(lookup, Lookup::Gte(_)) { ">=" } else { "<=" };
                let ph = self.push_param(params, val.clone());
                sql.push_str(&format!("\"{column}\" {op} {ph}"));
            }
        }
    }
}
