//! Persistence of the administrative entities.
//!
//! [`ReportRepository`] wraps a [`DbExecutor`] and is the only place the
//! engine writes to the database. Every `save_*` runs the entity's `clean()`
//! and the uniqueness checks of its table before touching a row, so invalid
//! entities never reach storage.
//!
//! Template columns and buttons live in join tables; the insertion order of
//! the column join rows is the display order of the columns.

use std::collections::HashMap;

use flex_report_core::utils::text::increment_string_suffix;
use flex_report_core::{ReportError, ReportResult, ValidationError};
use flex_report_db::ddl::create_table_sql;
use flex_report_db::{
    atomic, delete_model, fetch_models, get_model, save_model, DbExecutor, Lookup, Model, OrderBy, Query, SqlCompiler,
    Value, WhereNode,
};

use crate::models::{Column, TableButton, TableButtonColor, TablePage, Template, TemplateSavedFilter};
use crate::resolver::FieldResolver;

const TEMPLATE_COLUMNS: &str = "flex_report_template_columns";
const TEMPLATE_BUTTONS: &str = "flex_report_template_buttons";

fn exact(column: &str, value: impl Into<Value>) -> WhereNode {
    WhereNode::Condition {
        column: column.to_string(),
        lookup: Lookup::Exact(value.into()),
    }
}

fn all_of(mut conditions: Vec<WhereNode>) -> Option<WhereNode> {
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(WhereNode::And(conditions)),
    }
}

fn unique_error(field: &str, message: impl Into<String>) -> ReportError {
    ReportError::ValidationError(ValidationError::for_field(field, message, "unique"))
}

fn unsaved(what: &str) -> ReportError {
    ReportError::DatabaseError(format!("Cannot use an unsaved {what}"))
}

/// Reads and writes templates, columns, pages, buttons and saved filters.
#[derive(Clone, Copy)]
pub struct ReportRepository<'a> {
    db: &'a dyn DbExecutor,
    resolver: &'a FieldResolver,
}

impl std::fmt::Debug for ReportRepository<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportRepository")
            .field("backend", &self.db.backend_type())
            .finish_non_exhaustive()
    }
}

impl<'a> ReportRepository<'a> {
    pub const fn new(db: &'a dyn DbExecutor, resolver: &'a FieldResolver) -> Self {
        Self { db, resolver }
    }

    /// Creates the entity tables and join tables when missing.
    pub async fn create_tables(&self) -> ReportResult<()> {
        let backend = self.db.backend_type();
        let metas = [
            TablePage::meta(),
            TableButtonColor::meta(),
            TableButton::meta(),
            Column::meta(),
            Template::meta(),
            TemplateSavedFilter::meta(),
        ];
        for meta in metas {
            for sql in create_table_sql(meta, backend) {
                self.db.execute_sql(&sql, &[]).await?;
            }
        }
        tracing::debug!(?backend, "created report tables");
        Ok(())
    }

    async fn select<M: Model>(&self, where_clause: Option<WhereNode>) -> ReportResult<Vec<M>> {
        let mut query = Query::new(M::table_name());
        query.where_clause = where_clause;
        fetch_models::<M>(&query, self.db).await
    }

    /// Returns `true` if a row other than `exclude` matches every condition.
    async fn exists<M: Model>(&self, mut conditions: Vec<WhereNode>, exclude: Option<Value>) -> ReportResult<bool> {
        if let Some(pk) = exclude {
            conditions.push(WhereNode::Not(Box::new(exact(M::pk_field_name(), pk))));
        }
        let mut query = Query::new(M::table_name());
        query.where_clause = all_of(conditions);
        query.limit = Some(1);
        Ok(!fetch_models::<M>(&query, self.db).await?.is_empty())
    }

    // ── pages and buttons ──────────────────────────────────────────────

    pub async fn save_page(&self, page: &mut TablePage) -> ReportResult<()> {
        page.clean()?;
        if self
            .exists::<TablePage>(vec![exact("url_name", page.url_name.as_str())], page.pk())
            .await?
        {
            return Err(unique_error("url_name", "Table Page with this URL name already exists."));
        }
        save_model(page, self.db).await
    }

    /// Finds the page served under `url_name`.
    pub async fn get_page(&self, url_name: &str) -> ReportResult<Option<TablePage>> {
        Ok(self
            .select::<TablePage>(Some(exact("url_name", url_name)))
            .await?
            .into_iter()
            .next())
    }

    pub async fn save_color(&self, color: &mut TableButtonColor) -> ReportResult<()> {
        color.clean()?;
        if self
            .exists::<TableButtonColor>(vec![exact("title", color.title.as_str())], color.pk())
            .await?
        {
            return Err(unique_error("title", "Table Button Color with this title already exists."));
        }
        save_model(color, self.db).await
    }

    pub async fn save_button(&self, button: &mut TableButton) -> ReportResult<()> {
        button.clean()?;
        if self
            .exists::<TableButton>(vec![exact("title", button.title.as_str())], button.pk())
            .await?
        {
            return Err(unique_error("title", "Table Button with this title already exists."));
        }
        save_model(button, self.db).await
    }

    /// The colors referenced by `buttons`, keyed by id.
    pub async fn button_colors(&self, buttons: &[TableButton]) -> ReportResult<HashMap<i64, TableButtonColor>> {
        let ids: Vec<Value> = buttons.iter().filter_map(|b| b.color_id).map(Value::Int).collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let colors = self
            .select::<TableButtonColor>(Some(WhereNode::Condition {
                column: "id".into(),
                lookup: Lookup::In(ids),
            }))
            .await?;
        Ok(colors.into_iter().filter_map(|c| c.id.map(|id| (id, c))).collect())
    }

    // ── columns ────────────────────────────────────────────────────────

    pub async fn save_column(&self, column: &mut Column) -> ReportResult<()> {
        column.clean(self.resolver)?;
        let conditions = vec![
            exact("model", column.model.as_str()),
            exact("title", column.title.as_str()),
        ];
        if self.exists::<Column>(conditions, column.pk()).await? {
            return Err(unique_error("title", "Column with this Model and Title already exists."));
        }
        save_model(column, self.db).await
    }

    /// The columns defined for `model`, by title.
    pub async fn model_columns(&self, model: &str, searchables_only: bool) -> ReportResult<Vec<Column>> {
        let mut conditions = vec![exact("model", model)];
        if searchables_only {
            conditions.push(exact("searchable", true));
        }
        self.select::<Column>(all_of(conditions)).await
    }

    // ── templates ──────────────────────────────────────────────────────

    /// Validates and writes a template.
    ///
    /// A page keeps at most one default template; use
    /// [`set_template_as_page_default`](Self::set_template_as_page_default)
    /// to move the flag.
    pub async fn save_template(&self, template: &mut Template) -> ReportResult<()> {
        template.clean()?;
        if let (true, Some(page_id)) = (template.is_page_default, template.page_id) {
            let conditions = vec![exact("page_id", page_id), exact("is_page_default", true)];
            if self.exists::<Template>(conditions, template.pk()).await? {
                return Err(unique_error("is_page_default", "This page already has a default template."));
            }
        }
        template.modified_date = crate::models::now();
        save_model(template, self.db).await?;
        tracing::debug!(id = ?template.id, title = %template.title, "saved template");
        Ok(())
    }

    pub async fn get_template(&self, id: i64) -> ReportResult<Template> {
        get_model::<Template>(Value::Int(id), self.db).await
    }

    /// The templates of the page served under `url_name`, default first.
    pub async fn page_templates(&self, url_name: &str) -> ReportResult<Vec<Template>> {
        let Some(page_id) = self.get_page(url_name).await?.and_then(|p| p.id) else {
            return Ok(Vec::new());
        };
        self.select::<Template>(Some(exact("page_id", page_id))).await
    }

    async fn join_ids(&self, table: &str, column: &str, template_id: i64) -> ReportResult<Vec<i64>> {
        let mut query = Query::column_of(table, column, Some(exact("template_id", template_id)));
        query.order_by = vec![OrderBy::asc("id")];
        let (sql, params) = SqlCompiler::new(self.db.backend_type()).compile_select(&query);
        self.db
            .query(&sql, &params)
            .await?
            .iter()
            .map(|row| row.get::<i64>(column))
            .collect()
    }

    async fn replace_joins(
        &self,
        table: &'static str,
        column: &'static str,
        template_id: i64,
        ids: Vec<i64>,
    ) -> ReportResult<()> {
        let compiler = SqlCompiler::new(self.db.backend_type());
        atomic(self.db, |txn| async move {
            let (sql, params) = compiler.compile_delete(table, &exact("template_id", template_id));
            txn.execute_sql(&sql, &params).await?;
            for id in ids {
                let fields = [("template_id", Value::Int(template_id)), (column, Value::Int(id))];
                let (sql, params) = compiler.compile_insert(table, &fields);
                txn.execute_sql(&sql, &params).await?;
            }
            Ok(())
        })
        .await
    }

    /// The columns of `template` in display order.
    pub async fn template_columns(&self, template: &Template, searchables_only: bool) -> ReportResult<Vec<Column>> {
        let template_id = template.id.ok_or_else(|| unsaved("template"))?;
        let ids = self.join_ids(TEMPLATE_COLUMNS, "column_id", template_id).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut columns = self
            .select::<Column>(Some(WhereNode::Condition {
                column: "id".into(),
                lookup: Lookup::In(ids.iter().copied().map(Value::Int).collect()),
            }))
            .await?;
        columns.sort_by_key(|c| c.id.and_then(|id| ids.iter().position(|i| *i == id)));
        if searchables_only {
            columns.retain(|c| c.searchable);
        }
        Ok(columns)
    }

    /// Replaces the columns of `template`, keeping the given order.
    ///
    /// # Errors
    ///
    /// Fails with a validation error on `columns` when a column belongs to
    /// another model.
    pub async fn set_template_columns(&self, template: &Template, columns: &[Column]) -> ReportResult<()> {
        let template_id = template.id.ok_or_else(|| unsaved("template"))?;
        let mut ids = Vec::with_capacity(columns.len());
        for column in columns {
            if column.model != template.model {
                return Err(ValidationError::for_field(
                    "columns",
                    format!("Column '{}' does not belong to '{}'.", column.title, template.model),
                    "invalid",
                )
                .into());
            }
            let id = column.id.ok_or_else(|| unsaved("column"))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        self.replace_joins(TEMPLATE_COLUMNS, "column_id", template_id, ids).await
    }

    pub async fn template_buttons(&self, template: &Template) -> ReportResult<Vec<TableButton>> {
        let template_id = template.id.ok_or_else(|| unsaved("template"))?;
        let ids = self.join_ids(TEMPLATE_BUTTONS, "tablebutton_id", template_id).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select::<TableButton>(Some(WhereNode::Condition {
            column: "id".into(),
            lookup: Lookup::In(ids.into_iter().map(Value::Int).collect()),
        }))
        .await
    }

    pub async fn set_template_buttons(&self, template: &Template, buttons: &[TableButton]) -> ReportResult<()> {
        let template_id = template.id.ok_or_else(|| unsaved("template"))?;
        let ids = buttons
            .iter()
            .map(|b| b.id.ok_or_else(|| unsaved("button")))
            .collect::<ReportResult<Vec<_>>>()?;
        self.replace_joins(TEMPLATE_BUTTONS, "tablebutton_id", template_id, ids).await
    }

    /// Makes `template` the default of its page.
    ///
    /// The flag is cleared on every sibling and set on `template` in one
    /// transaction. Templates without a page are left alone.
    pub async fn set_template_as_page_default(&self, template: &mut Template) -> ReportResult<()> {
        let (Some(id), Some(page_id)) = (template.id, template.page_id) else {
            return Ok(());
        };
        let compiler = SqlCompiler::new(self.db.backend_type());
        atomic(self.db, |txn| async move {
            let (sql, params) = compiler.compile_update(
                Template::table_name(),
                &[("is_page_default", Value::Bool(false))],
                &exact("page_id", page_id),
            );
            txn.execute_sql(&sql, &params).await?;
            let (sql, params) = compiler.compile_update(
                Template::table_name(),
                &[("is_page_default", Value::Bool(true))],
                &exact("id", id),
            );
            txn.execute_sql(&sql, &params).await?;
            Ok(())
        })
        .await?;
        template.is_page_default = true;
        tracing::info!(template = id, page = page_id, "set page default template");
        Ok(())
    }

    /// Copies a template with its columns, buttons and filters.
    ///
    /// The copy gets the first free title obtained by incrementing the
    /// numeric suffix of the original title, and is never a page default.
    pub async fn clone_template(&self, template: &Template) -> ReportResult<Template> {
        let mut title = increment_string_suffix(&template.title);
        while self.exists::<Template>(vec![exact("title", title.as_str())], None).await? {
            title = increment_string_suffix(&title);
        }
        let now = crate::models::now();
        let mut copy = Template {
            id: None,
            title,
            is_page_default: false,
            created_date: now,
            modified_date: now,
            ..template.clone()
        };
        save_model(&mut copy, self.db).await?;
        let columns = self.template_columns(template, false).await?;
        self.set_template_columns(&copy, &columns).await?;
        let buttons = self.template_buttons(template).await?;
        self.set_template_buttons(&copy, &buttons).await?;
        tracing::info!(from = ?template.id, to = ?copy.id, title = %copy.title, "cloned template");
        Ok(copy)
    }

    /// Deletes a template; its join rows and saved filters go with it.
    pub async fn delete_template(&self, template: &Template) -> ReportResult<u64> {
        delete_model(template, self.db).await
    }

    // ── saved filters ──────────────────────────────────────────────────

    pub async fn save_saved_filter(&self, saved: &mut TemplateSavedFilter) -> ReportResult<()> {
        saved.clean()?;
        let template_id = saved.template_id;
        let title = vec![exact("title", saved.title.as_str()), exact("template_id", template_id)];
        if self.exists::<TemplateSavedFilter>(title, saved.pk()).await? {
            return Err(unique_error("title", "A saved filter with this title already exists."));
        }
        let slug = vec![exact("slug", saved.slug.as_str()), exact("template_id", template_id)];
        if self.exists::<TemplateSavedFilter>(slug, saved.pk()).await? {
            return Err(unique_error("slug", "A saved filter with this slug already exists."));
        }
        save_model(saved, self.db).await
    }

    pub async fn saved_filters(&self, template: &Template) -> ReportResult<Vec<TemplateSavedFilter>> {
        let template_id = template.id.ok_or_else(|| unsaved("template"))?;
        self.select::<TemplateSavedFilter>(Some(exact("template_id", template_id)))
            .await
    }
}
