//! Tabular data staged for import into SQLite.

use crate::domain::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Storage class inferred for an imported column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Widen this type so that `value` still fits.
    pub fn widen(self, value: &str) -> Self {
        let trimmed = value.trim();
        match self {
            ColumnType::Text => ColumnType::Text,
            ColumnType::Integer if trimmed.parse::<i64>().is_ok() => ColumnType::Integer,
            _ if trimmed.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false) => {
                ColumnType::Real
            }
            _ => ColumnType::Text,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One table worth of rows. Empty cells are `None` and become SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl StagedTable {
    /// Cleans headers and cells of a freshly read sheet and rejects tables
    /// that cannot be loaded: no rows, or headers that collide once cleaned.
    pub fn from_raw(
        name: &str,
        headers: &[String],
        raw_rows: Vec<Vec<Option<String>>>,
    ) -> Result<Self> {
        if headers.is_empty() {
            return Err(AppError::ValidationError(format!(
                "Table '{}' has no columns",
                name
            )));
        }

        let columns: Vec<String> = headers.iter().map(|h| clean_identifier(h)).collect();
        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = columns
            .iter()
            .filter(|column| !seen.insert(column.as_str()))
            .map(String::as_str)
            .collect();
        if !duplicates.is_empty() {
            return Err(AppError::ValidationError(format!(
                "Duplicate column names found in table '{}': {}",
                name,
                duplicates.join(", ")
            )));
        }

        let width = columns.len();
        let rows: Vec<Vec<Option<String>>> = raw_rows
            .into_iter()
            .map(|row| {
                let mut cells: Vec<Option<String>> = row
                    .into_iter()
                    .map(|cell| {
                        cell.map(|value| value.trim().to_string())
                            .filter(|value| !value.is_empty())
                    })
                    .collect();
                cells.resize(width, None);
                cells
            })
            .filter(|cells| cells.iter().any(Option::is_some))
            .collect();

        if rows.is_empty() {
            return Err(AppError::ValidationError(format!(
                "Table '{}' is empty",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            columns,
            rows,
        })
    }

    /// Infer a type per column from every non-empty cell.
    pub fn infer_column_types(&self) -> Vec<ColumnType> {
        (0..self.columns.len())
            .map(|idx| {
                let mut seen_value = false;
                let column_type = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(idx).and_then(|cell| cell.as_deref()))
                    .fold(ColumnType::Integer, |acc, value| {
                        seen_value = true;
                        acc.widen(value)
                    });
                if seen_value {
                    column_type
                } else {
                    ColumnType::Text
                }
            })
            .collect()
    }
}

/// Summary returned after a file has been loaded into SQLite.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub tables: Vec<ImportedTable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: usize,
}

impl ImportSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|table| table.rows).sum()
    }
}

/// Turn an arbitrary header or sheet name into a SQL-safe lowercase identifier.
pub fn clean_identifier(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        let mapped = if c.is_ascii_alphanumeric() { c } else { '_' };
        if mapped == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(mapped.to_ascii_lowercase());
    }

    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        return "unnamed_column".to_string();
    }
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("col_{}", cleaned);
    }
    cleaned.to_string()
}

/// `base`, or `base_2`, `base_3`, ... when an earlier table already took it.
/// Every returned name is recorded in `taken`.
pub fn unique_table_name(base: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Fails when two staged tables would land in the same SQLite table.
pub fn ensure_distinct_table_names(tables: &[StagedTable]) -> Result<()> {
    let mut seen = HashSet::new();
    for table in tables {
        if !seen.insert(table.name.to_ascii_lowercase()) {
            return Err(AppError::ValidationError(format!(
                "Two tables would both be imported as '{}'",
                table.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_identifier() {
        assert_eq!(clean_identifier("First Name"), "first_name");
        assert_eq!(clean_identifier("  Revenue ($) "), "revenue");
        assert_eq!(clean_identifier("a--b__c"), "a_b_c");
        assert_eq!(clean_identifier("2024 Sales"), "col_2024_sales");
        assert_eq!(clean_identifier("%%%"), "unnamed_column");
        assert_eq!(clean_identifier("Café"), "caf");
    }

    #[test]
    fn test_from_raw_cleans_and_pads() {
        let headers = vec!["First Name".to_string(), "Age".to_string()];
        let table = StagedTable::from_raw(
            "data",
            &headers,
            vec![
                vec![Some(" Alice ".into())],
                vec![Some("".into()), Some("  ".into())],
                vec![Some("Bob".into()), Some("25".into()), Some("extra".into())],
            ],
        )
        .unwrap();

        assert_eq!(table.columns, vec!["first_name", "age"]);
        assert_eq!(
            table.rows,
            vec![
                vec![Some("Alice".to_string()), None],
                vec![Some("Bob".to_string()), Some("25".to_string())],
            ]
        );
    }

    #[test]
    fn test_from_raw_rejects_duplicates_and_empty() {
        let headers = vec!["Name".to_string(), "name ".to_string()];
        let err = StagedTable::from_raw("data", &headers, vec![vec![Some("a".into())]])
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate column names"));

        let headers = vec!["name".to_string()];
        let err = StagedTable::from_raw("data", &headers, vec![vec![None]]).unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn test_unique_table_name() {
        let mut taken = HashSet::new();
        let names: Vec<String> = ["Sales 2024", "Sales-2024", "sales_2024", "Costs"]
            .iter()
            .map(|sheet| unique_table_name(&clean_identifier(sheet), &mut taken))
            .collect();
        assert_eq!(names, vec!["sales_2024", "sales_2024_2", "sales_2024_3", "costs"]);

        // a later sheet literally named like a generated suffix still gets its own table
        let mut taken = HashSet::new();
        assert_eq!(unique_table_name("a", &mut taken), "a");
        assert_eq!(unique_table_name("a_2", &mut taken), "a_2");
        assert_eq!(unique_table_name("a", &mut taken), "a_3");
    }

    #[test]
    fn test_ensure_distinct_table_names() {
        let table = |name: &str| StagedTable {
            name: name.to_string(),
            columns: vec!["a".into()],
            rows: vec![vec![Some("1".into())]],
        };
        assert!(ensure_distinct_table_names(&[table("a"), table("b")]).is_ok());
        let err = ensure_distinct_table_names(&[table("sales"), table("b"), table("SALES")])
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_infer_column_types() {
        let table = StagedTable {
            name: "data".to_string(),
            columns: vec!["id".into(), "price".into(), "city".into(), "blank".into()],
            rows: vec![
                vec![Some("1".into()), Some("9.5".into()), Some("NYC".into()), None],
                vec![Some("2".into()), Some("10".into()), Some("42".into()), None],
                vec![None, None, Some("LA".into()), None],
            ],
        };

        assert_eq!(
            table.infer_column_types(),
            vec![
                ColumnType::Integer,
                ColumnType::Real,
                ColumnType::Text,
                ColumnType::Text
            ]
        );
    }
}
