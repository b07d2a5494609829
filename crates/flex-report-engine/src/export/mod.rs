//! Report export.
//!
//! An [`ExportTable`] is the rendered form of a report: one header row and
//! one text row per record, each cell produced by the
//! [`CellRenderer`](crate::render::CellRenderer) with relative file URLs.
//! [`Exporter`]s turn a table into file bytes and are looked up by slug in an
//! [`ExportRegistry`].

pub mod csv;
pub mod xlsx;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use flex_report_core::i18n::calendar;
use flex_report_core::{Calendar, ReportError, ReportResult};
use flex_report_db::Record;
use serde::Serialize;

pub use self::csv::CsvExporter;
pub use self::xlsx::XlsxExporter;
use crate::render::CellRenderer;
use crate::resolver::ColumnKind;

/// Per-request exporter options, usually returned by a model's export hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub sheet_name: Option<String>,
    /// Header labels keyed by column title.
    pub headers: BTreeMap<String, String>,
}

impl ExportOptions {
    #[must_use]
    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn header(mut self, column: impl Into<String>, label: impl Into<String>) -> Self {
        self.headers.insert(column.into(), label.into());
        self
    }
}

/// A rendered report ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTable {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    /// Renders `records` over `columns`.
    ///
    /// Headers come from `headers`, falling back to the column title. A
    /// dynamic column expands into one cell per sub-field.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::ImproperlyConfigured`] when `records` or
    /// `columns` is empty.
    pub fn build(
        renderer: &CellRenderer<'_>,
        records: &[Record],
        columns: &[String],
        headers: &BTreeMap<String, String>,
        sheet_name: impl Into<String>,
    ) -> ReportResult<Self> {
        if records.is_empty() {
            return Err(ReportError::ImproperlyConfigured(
                "missing required export input: 'rows'".into(),
            ));
        }
        if columns.is_empty() {
            return Err(ReportError::ImproperlyConfigured(
                "missing required export input: 'columns'".into(),
            ));
        }
        let model = records[0].model();
        let dynamic: Vec<Option<Vec<String>>> = columns
            .iter()
            .map(|column| {
                let descriptor = renderer.resolver().resolve(model, column)?;
                if descriptor.kind != ColumnKind::Dynamic {
                    return None;
                }
                descriptor
                    .owner
                    .get_dynamic_field(column)
                    .map(|d| d.unpack().iter().map(|f| f.verbose_name.clone()).collect())
            })
            .collect();

        let header_row = columns
            .iter()
            .zip(&dynamic)
            .flat_map(|(column, subs)| match subs {
                Some(subs) => subs.clone(),
                None => vec![headers.get(column).cloned().unwrap_or_else(|| column.clone())],
            })
            .collect();
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .zip(&dynamic)
                    .flat_map(|(column, subs)| match subs {
                        Some(_) => renderer.render_dynamic(record, column),
                        None => vec![renderer.render(record, column)],
                    })
                    .collect()
            })
            .collect();
        Ok(Self {
            sheet_name: sheet_name.into(),
            headers: header_row,
            rows,
        })
    }
}

/// Writes an [`ExportTable`] in one file format.
pub trait Exporter: Send + Sync {
    /// The format slug selected by the `format` query parameter.
    fn slug(&self) -> &'static str;

    /// Human-readable format name.
    fn name(&self) -> &'static str;

    /// File extension, without the dot.
    fn extension(&self) -> &'static str;

    fn export(&self, table: &ExportTable) -> ReportResult<Vec<u8>>;
}

/// A format entry of the report context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFormat {
    pub name: &'static str,
    pub slug: &'static str,
}

/// Exporters keyed by slug, in registration order.
#[derive(Clone)]
pub struct ExportRegistry {
    exporters: Vec<Arc<dyn Exporter>>,
}

impl std::fmt::Debug for ExportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.exporters.iter().map(|e| e.slug())).finish()
    }
}

impl Default for ExportRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(XlsxExporter::default()));
        registry.register(Arc::new(CsvExporter));
        registry
    }
}

impl ExportRegistry {
    pub const fn empty() -> Self {
        Self { exporters: Vec::new() }
    }

    /// Adds an exporter, replacing one with the same slug.
    pub fn register(&mut self, exporter: Arc<dyn Exporter>) {
        match self.exporters.iter_mut().find(|e| e.slug() == exporter.slug()) {
            Some(existing) => *existing = exporter,
            None => self.exporters.push(exporter),
        }
    }

    /// Looks up an exporter; slugs match case-insensitively.
    pub fn get(&self, slug: &str) -> ReportResult<Arc<dyn Exporter>> {
        self.exporters
            .iter()
            .find(|e| e.slug().eq_ignore_ascii_case(slug))
            .cloned()
            .ok_or_else(|| ReportError::UnknownFormat(format!("The wanted format '{slug}' isn't handled.")))
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.get(slug).is_ok()
    }

    pub fn formats(&self) -> Vec<ExportFormat> {
        self.exporters
            .iter()
            .map(|e| ExportFormat {
                name: e.name(),
                slug: e.slug(),
            })
            .collect()
    }
}

/// The download name of an export, without extension.
///
/// ```
/// use chrono::NaiveDate;
/// use flex_report_core::Calendar;
/// use flex_report_engine::export::export_filename;
///
/// let now = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(9, 7, 1).unwrap();
/// assert_eq!(export_filename("Orders", &now, Calendar::Gregorian), "Orders_2024-03-05_09-07-01");
/// ```
pub fn export_filename(title: &str, now: &NaiveDateTime, cal: Calendar) -> String {
    format!("{title}_{}", calendar::strftime(now, "%Y-%m-%d_%H-%M-%S", cal))
}
