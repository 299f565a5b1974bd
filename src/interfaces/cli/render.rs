// ============================================================
// RESULT RENDERING
// ============================================================
// Plain-text tables and summaries for terminal output

use crate::domain::data_source::DataSource;
use crate::domain::dataset::ImportSummary;
use serde_json::Value;

pub const NO_RESULTS: &str = "(No results found)";

/// Display form of one cell.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// `col | col` header, dashed separator, one line per row.
pub fn render_table(columns: &[String], rows: &[Vec<Value>]) -> String {
    if rows.is_empty() {
        return NO_RESULTS.to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|idx| row.get(idx).map(format_value).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            cells
                .iter()
                .map(|row| row[idx].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let join = |parts: Vec<String>| parts.join(" | ").trim_end().to_string();

    let mut lines = Vec::with_capacity(cells.len() + 2);
    lines.push(join(
        columns
            .iter()
            .zip(&widths)
            .map(|(name, width)| pad(name, *width))
            .collect(),
    ));
    lines.push(join(widths.iter().map(|width| "-".repeat(*width)).collect()));
    for row in &cells {
        lines.push(join(
            row.iter()
                .zip(&widths)
                .map(|(cell, width)| pad(cell, *width))
                .collect(),
        ));
    }
    lines.join("\n")
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

pub fn render_sources<'a>(
    sources: impl Iterator<Item = &'a DataSource>,
    is_active: impl Fn(&str) -> bool,
) -> String {
    let mut out = String::new();
    for source in sources {
        let marker = if is_active(&source.name) { "*" } else { " " };
        out.push_str(&format!(
            "{} {} [{}] {}",
            marker,
            source.name,
            source.kind,
            source.location()
        ));
        if !source.description.is_empty() {
            out.push_str(&format!("  - {}", source.description));
        }
        out.push('\n');
    }
    if out.is_empty() {
        out.push_str("No data sources configured.\n");
    }
    out
}

pub fn render_import_summary(summary: &ImportSummary) -> String {
    let mut out = String::new();
    for table in &summary.tables {
        out.push_str(&format!(
            "  {} ({} rows): {}\n",
            table.name,
            table.rows,
            table.columns.join(", ")
        ));
    }
    out.push_str(&format!(
        "Imported {} table(s), {} row(s)",
        summary.tables.len(),
        summary.total_rows()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data_source::SourceKind;
    use crate::domain::dataset::ImportedTable;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_render_table() {
        let columns = vec!["city".to_string(), "total".to_string()];
        let rows = vec![
            vec![json!("NYC"), json!(17.75)],
            vec![json!("Los Angeles"), json!(null)],
        ];
        let expected = "\
city        | total
----------- | -----
NYC         | 17.75
Los Angeles | NULL";
        assert_eq!(render_table(&columns, &rows), expected);
    }

    #[test]
    fn test_render_empty_table() {
        assert_eq!(render_table(&["a".to_string()], &[]), NO_RESULTS);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let rows = vec![vec![json!(1)]];
        assert_eq!(render_table(&columns, &rows), "a | b\n- | -\n1 |");
    }

    #[test]
    fn test_render_sources_marks_active() {
        let sources = vec![DataSource {
            name: "sales".into(),
            kind: SourceKind::Csv,
            database_path: PathBuf::from("/d/sales.db"),
            url: None,
            password_ref: None,
            origin: None,
            description: "Q1 orders".into(),
            created_at: chrono::Utc::now(),
        }];
        let out = render_sources(sources.iter(), |name| name == "sales");
        assert_eq!(out, "* sales [csv] /d/sales.db  - Q1 orders\n");
        assert_eq!(
            render_sources(std::iter::empty(), |_| false),
            "No data sources configured.\n"
        );
    }

    #[test]
    fn test_render_import_summary() {
        let summary = ImportSummary {
            tables: vec![ImportedTable {
                name: "data".into(),
                columns: vec!["id".into(), "city".into()],
                rows: 2,
            }],
        };
        assert_eq!(
            render_import_summary(&summary),
            "  data (2 rows): id, city\nImported 1 table(s), 2 row(s)"
        );
    }
}
