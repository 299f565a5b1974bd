// ============================================================
// EXCEL READER
// ============================================================
// Every worksheet of an .xlsx/.xls workbook becomes one staged table

use crate::domain::dataset::{clean_identifier, unique_table_name, StagedTable};
use crate::domain::error::{AppError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Table name used when a workbook has a single sheet (or one was selected)
pub const SINGLE_TABLE_NAME: &str = "data";

pub struct ExcelReader;

impl ExcelReader {
    /// Read the workbook. A single (or selected) sheet lands in table `data`;
    /// several sheets each get a table named after the cleaned sheet name,
    /// suffixed `_2`, `_3`, ... when two sheets clean to the same name.
    pub fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<Vec<StagedTable>> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| AppError::ParseError(format!("Failed to open Excel file: {}", e)))?;

        let sheet_names = workbook.sheet_names().to_vec();
        if sheet_names.is_empty() {
            return Err(AppError::ValidationError(
                "No worksheet found in Excel file".to_string(),
            ));
        }

        let selected: Vec<(usize, String)> = match sheet {
            Some(wanted) => {
                let index = sheet_names
                    .iter()
                    .position(|name| name == wanted)
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "Sheet '{}' not found (available: {})",
                            wanted,
                            sheet_names.join(", ")
                        ))
                    })?;
                vec![(index, wanted.to_string())]
            }
            None => sheet_names.iter().cloned().enumerate().collect(),
        };

        let single = selected.len() == 1;
        let mut tables = Vec::with_capacity(selected.len());
        let mut taken_names = HashSet::new();

        for (index, sheet_name) in selected {
            let range = workbook
                .worksheet_range_at(index)
                .ok_or_else(|| AppError::NotFound(format!("Worksheet '{}' missing", sheet_name)))?
                .map_err(|e| {
                    AppError::ParseError(format!(
                        "Failed to read worksheet '{}': {}",
                        sheet_name, e
                    ))
                })?;

            let mut rows = range.rows();
            let Some(header_row) = rows.next() else {
                if single {
                    return Err(AppError::ValidationError(format!(
                        "Sheet '{}' is empty",
                        sheet_name
                    )));
                }
                warn!("Skipping empty worksheet '{}'", sheet_name);
                continue;
            };

            let headers: Vec<String> = header_row
                .iter()
                .map(|cell| cell_to_string(cell).unwrap_or_default())
                .collect();
            let body: Vec<Vec<Option<String>>> = rows
                .map(|row| row.iter().map(cell_to_string).collect())
                .collect();

            // sheets like "Sales 2024" and "Sales-2024" clean to the same name
            let table_name = if single {
                SINGLE_TABLE_NAME.to_string()
            } else {
                unique_table_name(&clean_identifier(&sheet_name), &mut taken_names)
            };

            debug!(
                "Read worksheet '{}' as table '{}' ({} rows)",
                sheet_name,
                table_name,
                body.len()
            );
            tables.push(StagedTable::from_raw(&table_name, &headers, body)?);
        }

        if tables.is_empty() {
            return Err(AppError::ValidationError(
                "Workbook contains no data".to_string(),
            ));
        }

        Ok(tables)
    }
}

/// Excel stores every number as a float; whole values are written back as
/// integers so the column can be typed INTEGER.
fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(n) => Some(n.to_string()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        other => Some(format!("{}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Empty), None);
        assert_eq!(cell_to_string(&Data::Float(3.0)).as_deref(), Some("3"));
        assert_eq!(cell_to_string(&Data::Float(2.5)).as_deref(), Some("2.5"));
        assert_eq!(cell_to_string(&Data::Int(-7)).as_deref(), Some("-7"));
        assert_eq!(cell_to_string(&Data::Bool(true)).as_deref(), Some("1"));
        assert_eq!(
            cell_to_string(&Data::String("NYC".into())).as_deref(),
            Some("NYC")
        );
    }

    #[test]
    fn test_missing_workbook() {
        let path = std::env::temp_dir().join(format!("missing-{}.xlsx", uuid::Uuid::new_v4()));
        assert!(ExcelReader::read_workbook(&path, None).is_err());
    }
}
