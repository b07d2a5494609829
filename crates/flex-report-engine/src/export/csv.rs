use flex_report_core::{ReportError, ReportResult};

use super::{ExportTable, Exporter};

/// Comma-separated text, one header row then one row per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

fn csv_error(e: impl std::fmt::Display) -> ReportError {
    ReportError::ExportError(format!("Failed to write CSV: {e}"))
}

impl Exporter for CsvExporter {
    fn slug(&self) -> &'static str {
        "csv"
    }

    fn name(&self) -> &'static str {
        "CSV"
    }

    fn extension(&self) -> &'static str {
        "csv"
    }

    fn export(&self, table: &ExportTable) -> ReportResult<Vec<u8>> {
        let mut writer = ::csv::Writer::from_writer(Vec::new());
        writer.write_record(&table.headers).map_err(csv_error)?;
        for row in &table.rows {
            writer.write_record(row).map_err(csv_error)?;
        }
        writer.flush()?;
        let output = writer.into_inner().map_err(csv_error)?;
        tracing::info!(rows = table.rows.len(), bytes = output.len(), "exported csv");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quotes_and_header() {
        let table = ExportTable {
            sheet_name: "orders".into(),
            headers: vec!["Number".into(), "Customer".into()],
            rows: vec![
                vec!["A-100".into(), "Lee, Ann".into()],
                vec!["A-101".into(), "Bob \"B\"".into()],
            ],
        };
        let bytes = CsvExporter.export(&table).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Number,Customer\nA-100,\"Lee, Ann\"\nA-101,\"Bob \"\"B\"\"\"\n"
        );
    }
}
