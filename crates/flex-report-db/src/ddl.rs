//! `CREATE TABLE` generation for registered models.
//!
//! Only table creation is supported: report deployments create their tables
//! once at startup (or in tests against an in-memory database). Many-to-many
//! fields get a separate join table with an `id` column, whose insertion
//! order doubles as the relation's sort order.

use crate::fields::{FieldDef, FieldType};
use crate::model::ModelMeta;
use crate::query::compiler::DatabaseBackendType;
use crate::value::Value;

fn default_sql(field: &FieldDef) -> String {
    match &field.default {
        Some(Value::Null) => " DEFAULT NULL".to_string(),
        Some(Value::Bool(b)) => format!(" DEFAULT {}", if *b { "TRUE" } else { "FALSE" }),
        Some(Value::Int(i)) => format!(" DEFAULT {i}"),
        Some(Value::Float(f)) => format!(" DEFAULT {f}"),
        Some(Value::String(s)) => format!(" DEFAULT '{}'", s.replace('\'', "''")),
        _ => String::new(),
    }
}

fn target_table(to: &str) -> String {
    to.replace('.', "_")
}

fn column_sql(field: &FieldDef, backend: DatabaseBackendType) -> String {
    let mut sql = field.field_type.column_type(backend, field.max_length);
    if field.primary_key {
        sql.push_str(" PRIMARY KEY");
        if backend == DatabaseBackendType::SQLite
            && matches!(field.field_type, FieldType::AutoField | FieldType::BigAutoField)
        {
            sql.push_str(" AUTOINCREMENT");
        }
        return sql;
    }
    if !field.null {
        sql.push_str(" NOT NULL");
    }
    if field.unique {
        sql.push_str(" UNIQUE");
    }
    sql.push_str(&default_sql(field));
    sql
}

fn id_column(backend: DatabaseBackendType) -> &'static str {
    match backend {
        DatabaseBackendType::PostgreSQL => "\"id\" BIGSERIAL PRIMARY KEY",
        DatabaseBackendType::SQLite => "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT",
    }
}

/// Returns the `CREATE TABLE` statements for a model and its join tables.
///
/// ```
/// use flex_report_db::ddl::create_table_sql;
/// use flex_report_db::fields::{FieldDef, FieldType};
/// use flex_report_db::model::ModelMeta;
/// use flex_report_db::query::compiler::DatabaseBackendType;
///
/// let meta = ModelMeta::new("shop", "tag", vec![
///     FieldDef::new("id", FieldType::BigAutoField).primary_key(),
///     FieldDef::new("name", FieldType::CharField).max_length(50),
/// ]);
/// assert_eq!(
///     create_table_sql(&meta, DatabaseBackendType::PostgreSQL),
///     vec!["CREATE TABLE IF NOT EXISTS \"shop_tag\" (\"id\" BIGSERIAL PRIMARY KEY, \"name\" VARCHAR(50) NOT NULL)"],
/// );
/// ```
pub fn create_table_sql(meta: &ModelMeta, backend: DatabaseBackendType) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let mut constraints: Vec<String> = Vec::new();
    let mut join_tables: Vec<String> = Vec::new();

    if meta.pk_field().is_none() {
        columns.push(id_column(backend).to_string());
    }

    for field in &meta.fields {
        match &field.field_type {
            FieldType::ManyToManyField { to, through, .. } => {
                if through.is_none() {
                    join_tables.push(join_table_sql(meta, field, to, backend));
                }
                continue;
            }
            FieldType::ForeignKey { to, on_delete, .. } | FieldType::OneToOneField { to, on_delete, .. } => {
                constraints.push(format!(
                    "FOREIGN KEY (\"{}\") REFERENCES \"{}\" (\"id\") ON DELETE {}",
                    field.column,
                    target_table(to),
                    on_delete.as_sql()
                ));
            }
            _ => {}
        }
        columns.push(format!("\"{}\" {}", field.column, column_sql(field, backend)));
    }

    for group in &meta.unique_together {
        let cols: Vec<String> = group
            .iter()
            .filter_map(|name| meta.get_field(name))
            .map(|f| format!("\"{}\"", f.column))
            .collect();
        constraints.push(format!("UNIQUE ({})", cols.join(", ")));
    }

    columns.extend(constraints);
    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
        meta.db_table,
        columns.join(", ")
    )];
    statements.extend(join_tables);
    statements
}

fn join_table_sql(meta: &ModelMeta, field: &FieldDef, to: &str, backend: DatabaseBackendType) -> String {
    let target_model = to.rsplit('.').next().unwrap_or(to);
    let (source_column, target_column) = if meta.label() == to {
        (format!("from_{}_id", meta.model_name), format!("to_{target_model}_id"))
    } else {
        (format!("{}_id", meta.model_name), format!("{target_model}_id"))
    };
    format!(
        "CREATE TABLE IF NOT EXISTS \"{table}_{name}\" ({id}, \"{source_column}\" BIGINT NOT NULL, \
         \"{target_column}\" BIGINT NOT NULL, \
         FOREIGN KEY (\"{source_column}\") REFERENCES \"{table}\" (\"id\") ON DELETE CASCADE, \
         FOREIGN KEY (\"{target_column}\") REFERENCES \"{target}\" (\"id\") ON DELETE CASCADE, \
         UNIQUE (\"{source_column}\", \"{target_column}\"))",
        table = meta.db_table,
        name = field.name,
        id = id_column(backend),
        target = target_table(to),
    )
}
