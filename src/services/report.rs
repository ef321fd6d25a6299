use thiserror::Error;

use crate::domain::diff::{DiffKind, ProductDiff};

pub const DIFF_REPORT_HEADERS: [&str; 6] = ["product_id", "external_id", "kind", "field", "old", "new"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to render csv")]
    CsvRender,
}

/// Renders a diff for operator review, one row per changed field and one row
/// per new product.
pub fn render_diff_csv(diffs: &[ProductDiff]) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(DIFF_REPORT_HEADERS)
        .map_err(|_| ReportError::CsvRender)?;

    for row in diffs.iter().flat_map(diff_rows) {
        let escaped: Vec<String> = row.iter().map(|value| escape_csv_cell(value)).collect();
        writer
            .write_record(&escaped)
            .map_err(|_| ReportError::CsvRender)?;
    }

    writer.into_inner().map_err(|_| ReportError::CsvRender)
}

fn diff_rows(diff: &ProductDiff) -> Vec<[String; 6]> {
    let id = diff.product_id.to_string();
    let external_id = diff.new.external_id.to_string();
    match diff.kind {
        DiffKind::New => vec![[
            id,
            external_id,
            "new".to_string(),
            String::new(),
            String::new(),
            diff.new.name.clone(),
        ]],
        DiffKind::Changed => diff
            .fields
            .iter()
            .map(|(field, change)| {
                [
                    id.clone(),
                    external_id.clone(),
                    "changed".to_string(),
                    field.to_string(),
                    change.old.to_string(),
                    change.new.to_string(),
                ]
            })
            .collect(),
    }
}

/// Neutralises cells a spreadsheet would evaluate as formulas.
fn escape_csv_cell(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some('=' | '+' | '-' | '@') => format!("'{value}"),
        _ => value.to_string(),
    }
}
