//! Spreadsheet import
//!
//! Loads a CSV file or an Excel workbook into a fresh SQLite database under the
//! data directory so it can be queried like any other source.

use crate::domain::data_source::SourceKind;
use crate::domain::dataset::{
    clean_identifier, ensure_distinct_table_names, ImportSummary, ImportedTable, StagedTable,
};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::csv::{CsvParser, ExcelReader, SINGLE_TABLE_NAME};
use crate::infrastructure::db::sqlite::SqliteDatabase;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

const DATABASES_DIR: &str = "databases";

/// Where an import landed and what it contains.
#[derive(Debug, Clone)]
pub struct ImportedDatabase {
    pub kind: SourceKind,
    pub database_path: PathBuf,
    pub summary: ImportSummary,
}

pub struct DataImportUseCase {
    data_dir: PathBuf,
}

impl DataImportUseCase {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Source kind from the file extension.
    pub fn detect_kind(path: &Path) -> Result<SourceKind> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "tsv" | "txt" => Ok(SourceKind::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceKind::Excel),
            "db" | "sqlite" | "sqlite3" => Ok(SourceKind::Sqlite),
            other => Err(AppError::ValidationError(format!(
                "Unsupported file type '{}'. Expected .csv, .tsv, .xlsx, .xls or .ods",
                other
            ))),
        }
    }

    /// Read the file into staged tables without touching any database.
    pub fn stage(path: &Path, sheet: Option<&str>) -> Result<(SourceKind, Vec<StagedTable>)> {
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }

        match Self::detect_kind(path)? {
            SourceKind::Csv => {
                if sheet.is_some() {
                    return Err(AppError::ValidationError(
                        "A sheet can only be selected for Excel workbooks".to_string(),
                    ));
                }
                let parser = match path.extension().and_then(|ext| ext.to_str()) {
                    Some(ext) if ext.eq_ignore_ascii_case("tsv") => {
                        CsvParser::new().with_delimiter(b'\t')
                    }
                    _ => CsvParser::new(),
                };
                let table = parser.parse_file(path, SINGLE_TABLE_NAME)?;
                Ok((SourceKind::Csv, vec![table]))
            }
            SourceKind::Excel => Ok((SourceKind::Excel, ExcelReader::read_workbook(path, sheet)?)),
            SourceKind::Sqlite | SourceKind::Postgres => Err(AppError::ValidationError(
                "Databases are registered in place, not imported".to_string(),
            )),
        }
    }

    /// Import `path` into a new database file and return its location.
    pub async fn import_file(&self, path: &Path, sheet: Option<&str>) -> Result<ImportedDatabase> {
        let (kind, tables) = Self::stage(path, sheet)?;
        self.load_tables(path, kind, &tables).await
    }

    /// Writes already staged tables into a new database file named after
    /// `source`. Nothing is created when two tables share a name.
    pub async fn load_tables(
        &self,
        source: &Path,
        kind: SourceKind,
        tables: &[StagedTable],
    ) -> Result<ImportedDatabase> {
        ensure_distinct_table_names(tables)?;

        let database_path = self.new_database_path(source)?;
        let database = SqliteDatabase::create(&database_path).await?;

        let mut summary = ImportSummary { tables: Vec::new() };
        for table in tables {
            let rows = match database.import_table(table).await {
                Ok(rows) => rows,
                Err(e) => {
                    database.close().await;
                    let _ = std::fs::remove_file(&database_path);
                    return Err(e);
                }
            };
            summary.tables.push(ImportedTable {
                name: table.name.clone(),
                columns: table.columns.clone(),
                rows,
            });
        }
        database.close().await;

        info!(
            source = %source.display(),
            database = %database_path.display(),
            tables = summary.tables.len(),
            rows = summary.total_rows(),
            "Import finished"
        );

        Ok(ImportedDatabase {
            kind,
            database_path,
            summary,
        })
    }

    fn new_database_path(&self, source: &Path) -> Result<PathBuf> {
        let dir = self.data_dir.join(DATABASES_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| {
            AppError::IoError(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let stem = source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(clean_identifier)
            .unwrap_or_else(|| "import".to_string());
        let suffix = Uuid::new_v4().simple().to_string();

        Ok(dir.join(format!("{}_{}.db", stem, &suffix[..8])))
    }
}
