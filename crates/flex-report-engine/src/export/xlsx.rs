use std::sync::Arc;

use flex_report_core::{ReportError, ReportResult};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use super::{ExportTable, Exporter};

/// How a rendered cell is written to the sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum XlsxCell {
    Number(f64),
    Text(String),
    Blank,
}

type Classifier = Arc<dyn Fn(&str) -> Option<XlsxCell> + Send + Sync>;

/// A cell style applied to the rendered values it classifies.
#[derive(Clone)]
pub struct StyleRule {
    pub name: &'static str,
    classify: Classifier,
    format: Format,
}

impl std::fmt::Debug for StyleRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleRule").field("name", &self.name).finish_non_exhaustive()
    }
}

impl StyleRule {
    /// A rule that writes `format` for every value `classify` accepts.
    ///
    /// The classifier may also transform the value it accepts.
    pub fn new(
        name: &'static str,
        format: Format,
        classify: impl Fn(&str) -> Option<XlsxCell> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            classify: Arc::new(classify),
            format,
        }
    }
}

/// Returns `true` for text that reads as a plain number.
///
/// Leading zeros and signs are kept as text, so codes such as phone numbers
/// do not turn into numbers.
fn is_plain_number(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let leading_zero = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");
    !digits.is_empty()
        && !leading_zero
        && digits.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && digits.bytes().filter(|b| *b == b'.').count() <= 1
        && !digits.ends_with('.')
        && !digits.starts_with('.')
}

/// Reads `text` as a number cell only when the number prints back as the
/// same text, so `1.10` or a 20-digit code stay strings.
fn exact_number(text: &str) -> Option<XlsxCell> {
    if !is_plain_number(text) {
        return None;
    }
    let number: f64 = text.parse().ok()?;
    (number.to_string() == text).then_some(XlsxCell::Number(number))
}

fn default_rules() -> Vec<StyleRule> {
    vec![
        StyleRule::new("empty", Format::new(), |text| {
            text.trim().is_empty().then_some(XlsxCell::Blank)
        }),
        StyleRule::new("number", Format::new().set_num_format("General"), exact_number),
        StyleRule::new("text", Format::new(), |text| Some(XlsxCell::Text(text.to_string()))),
    ]
}

/// Excel workbook with a bold header row and one sheet.
#[derive(Debug, Clone)]
pub struct XlsxExporter {
    header_format: Format,
    rules: Vec<StyleRule>,
}

impl Default for XlsxExporter {
    fn default() -> Self {
        Self {
            header_format: Format::new().set_bold(),
            rules: default_rules(),
        }
    }
}

fn xlsx_error(e: XlsxError) -> ReportError {
    ReportError::ExportError(format!("Failed to write XLSX: {e}"))
}

/// Makes a title usable as a worksheet name.
///
/// ```
/// use flex_report_engine::export::xlsx::sheet_name;
///
/// assert_eq!(sheet_name("Orders [2024/03]"), "Orders 202403");
/// assert_eq!(sheet_name(""), "Sheet1");
/// ```
pub fn sheet_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect();
    let cleaned: String = cleaned.trim().trim_matches('\'').chars().take(31).collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

impl XlsxExporter {
    /// Adds a rule that is tried before all existing ones.
    #[must_use]
    pub fn with_rule(mut self, rule: StyleRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Classifies a rendered value; the first matching rule wins.
    pub fn classify(&self, text: &str) -> (XlsxCell, &Format) {
        self.rules
            .iter()
            .find_map(|rule| (rule.classify)(text).map(|cell| (cell, &rule.format)))
            .unwrap_or_else(|| (XlsxCell::Text(text.to_string()), &self.header_format))
    }
}

impl Exporter for XlsxExporter {
    fn slug(&self) -> &'static str {
        "xlsx"
    }

    fn name(&self) -> &'static str {
        "Excel"
    }

    fn extension(&self) -> &'static str {
        "xlsx"
    }

    fn export(&self, table: &ExportTable) -> ReportResult<Vec<u8>> {
        let too_large = || ReportError::ExportError("Too many rows or columns for a worksheet".into());
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name(&table.sheet_name)).map_err(xlsx_error)?;

        for (col, header) in table.headers.iter().enumerate() {
            let col = u16::try_from(col).map_err(|_| too_large())?;
            worksheet
                .write_string_with_format(0, col, header, &self.header_format)
                .map_err(xlsx_error)?;
        }
        for (row_idx, row) in table.rows.iter().enumerate() {
            let row_num = u32::try_from(row_idx + 1).map_err(|_| too_large())?;
            for (col, text) in row.iter().enumerate() {
                let col = u16::try_from(col).map_err(|_| too_large())?;
                let (cell, format) = self.classify(text);
                match cell {
                    XlsxCell::Number(number) => {
                        worksheet.write_number_with_format(row_num, col, number, format)
                    }
                    XlsxCell::Text(text) => worksheet.write_string_with_format(row_num, col, text, format),
                    XlsxCell::Blank => worksheet.write_blank(row_num, col, format),
                }
                .map_err(xlsx_error)?;
            }
        }

        let output = workbook.save_to_buffer().map_err(xlsx_error)?;
        tracing::info!(rows = table.rows.len(), bytes = output.len(), "exported xlsx");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use std::io::Cursor;

    fn sample_table() -> ExportTable {
        ExportTable {
            sheet_name: "orders".into(),
            headers: vec!["Number".into(), "Total".into(), "Due".into(), "Phone".into()],
            rows: vec![
                vec!["A-100".into(), "12.5".into(), String::new(), "0914".into()],
                vec!["A-101".into(), "7".into(), "2024/03/05".into(), "+98 914".into()],
            ],
        }
    }

    #[test]
    fn test_classify_first_match_wins() {
        let exporter = XlsxExporter::default();
        assert_eq!(exporter.classify("12.5").0, XlsxCell::Number(12.5));
        assert_eq!(exporter.classify("-3").0, XlsxCell::Number(-3.0));
        assert_eq!(exporter.classify("0").0, XlsxCell::Number(0.0));
        assert_eq!(exporter.classify("0912").0, XlsxCell::Text("0912".into()));
        assert_eq!(exporter.classify("1.2.3").0, XlsxCell::Text("1.2.3".into()));
        assert_eq!(exporter.classify("1.10").0, XlsxCell::Text("1.10".into()));
        assert_eq!(exporter.classify("12.0").0, XlsxCell::Text("12.0".into()));
        assert_eq!(
            exporter.classify("12345678901234567890").0,
            XlsxCell::Text("12345678901234567890".into())
        );
        assert_eq!(exporter.classify("+5").0, XlsxCell::Text("+5".into()));
        assert_eq!(exporter.classify("  ").0, XlsxCell::Blank);

        let exporter = exporter.with_rule(StyleRule::new("money", Format::new(), |text| {
            text.strip_suffix(" USD").map(|amount| XlsxCell::Text(format!("${amount}")))
        }));
        assert_eq!(exporter.classify("12.50 USD").0, XlsxCell::Text("$12.50".into()));
    }

    #[test]
    fn test_workbook_reads_back() {
        let bytes = XlsxExporter::default().export(&sample_table()).unwrap();
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["orders".to_string()]);
        let range = workbook.worksheet_range("orders").unwrap();
        assert_eq!(range.height(), 3);
        assert_eq!(range.get((0, 1)), Some(&Data::String("Total".into())));
        assert_eq!(range.get((1, 0)), Some(&Data::String("A-100".into())));
        assert_eq!(range.get((1, 1)), Some(&Data::Float(12.5)));
        assert!(matches!(range.get((1, 2)), Some(Data::Empty) | None));
        assert_eq!(range.get((1, 3)), Some(&Data::String("0914".into())));
        assert_eq!(range.get((2, 1)), Some(&Data::Float(7.0)));
        assert_eq!(range.get((2, 3)), Some(&Data::String("+98 914".into())));
    }

    #[test]
    fn test_sheet_name_is_sanitized() {
        let mut table = sample_table();
        table.sheet_name = "a very long report title that exceeds the limit".into();
        let bytes = XlsxExporter::default().export(&table).unwrap();
        let workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["a very long report title that e".to_string()]);
    }
}
