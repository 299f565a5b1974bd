use super::QueryDatabase;
use crate::domain::dataset::{ColumnType, StagedTable};
use crate::domain::error::{AppError, Result};
use crate::domain::query::{ExecutionOutcome, QueryRows};
use crate::domain::schema::{ColumnSchema, SchemaDescriptor, TableSchema};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, Statement};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// SQLite database handle backed by a small sqlx pool.
pub struct SqliteDatabase {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl SqliteDatabase {
    /// Opens an existing database file. A missing file is an error, never
    /// silently created.
    pub async fn open(path: &Path, query_timeout_secs: u64) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "Database file not found: {}",
                path.display()
            )));
        }
        Self::connect(path, false, query_timeout_secs).await
    }

    /// Opens a database file, creating it when missing. Used for imports.
    pub async fn create(path: &Path) -> Result<Self> {
        Self::connect(path, true, DEFAULT_QUERY_TIMEOUT_SECS).await
    }

    /// Private in-memory database. A single long-lived connection keeps the
    /// data alive for as long as the handle exists.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            AppError::DatabaseError(format!("Failed to parse connection string: {}", e))
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {}", e)))?;

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        })
    }

    async fn connect(path: &Path, create_if_missing: bool, query_timeout_secs: u64) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create_if_missing)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {}", e)))?;

        debug!("Opened SQLite database at {}", path.display());

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(query_timeout_secs.max(1)),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Replaces `table.name` with the staged rows, typed per inferred column.
    pub async fn import_table(&self, table: &StagedTable) -> Result<usize> {
        let column_types = table.infer_column_types();
        let table_name = quote_identifier(&table.name);

        let column_defs = table
            .columns
            .iter()
            .zip(&column_types)
            .map(|(name, column_type)| format!("{} {}", quote_identifier(name), column_type))
            .collect::<Vec<_>>()
            .join(", ");

        let placeholders = vec!["?"; table.columns.len()].join(", ");
        let insert_sql = format!("INSERT INTO {} VALUES ({})", table_name, placeholders);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin import: {}", e)))?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table_name))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to drop table: {}", e)))?;

        sqlx::query(&format!("CREATE TABLE {} ({})", table_name, column_defs))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create table: {}", e)))?;

        for row in &table.rows {
            let mut query = sqlx::query(&insert_sql);
            for (idx, column_type) in column_types.iter().enumerate() {
                let cell = row.get(idx).and_then(|cell| cell.as_deref()).map(str::trim);
                query = match (cell, column_type) {
                    (None, _) => query.bind(Option::<String>::None),
                    (Some(value), ColumnType::Integer) => match value.parse::<i64>() {
                        Ok(n) => query.bind(n),
                        Err(_) => query.bind(value.to_string()),
                    },
                    (Some(value), ColumnType::Real) => match value.parse::<f64>() {
                        Ok(n) => query.bind(n),
                        Err(_) => query.bind(value.to_string()),
                    },
                    (Some(value), ColumnType::Text) => query.bind(value.to_string()),
                };
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to insert row: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit import: {}", e)))?;

        info!(
            table = %table.name,
            rows = table.rows.len(),
            "Imported table into SQLite"
        );

        Ok(table.rows.len())
    }

    async fn list_tables(&self) -> std::result::Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row.try_get::<String, _>("name")).collect()
    }

    async fn list_columns(&self, table: &str) -> std::result::Result<Vec<ColumnSchema>, sqlx::Error> {
        let rows = sqlx::query(
            r#"SELECT name, type, "notnull" AS not_null FROM pragma_table_info(?) ORDER BY cid"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let data_type: String = row.try_get("type")?;
            let not_null: i64 = row.try_get("not_null")?;
            columns.push(ColumnSchema {
                name,
                data_type: if data_type.trim().is_empty() {
                    "ANY".to_string()
                } else {
                    data_type
                },
                nullable: not_null == 0,
            });
        }
        Ok(columns)
    }

    async fn run_select(&self, sql: &str) -> std::result::Result<QueryRows, sqlx::Error> {
        // preparing first yields column names even when no rows come back
        let statement = (&self.pool).prepare(sql).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        let rows = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| extract_column_value(row, idx))
                    .collect()
            })
            .collect();

        Ok(QueryRows { columns, rows })
    }
}

#[async_trait]
impl QueryDatabase for SqliteDatabase {
    async fn extract_schema(&self) -> Result<SchemaDescriptor> {
        let unavailable =
            |e: sqlx::Error| AppError::SchemaUnavailable(format!("Failed to read schema: {}", e));

        let table_names = self.list_tables().await.map_err(unavailable)?;
        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let columns = self.list_columns(&name).await.map_err(unavailable)?;
            tables.push(TableSchema { name, columns });
        }

        debug!("Extracted schema with {} tables", tables.len());
        Ok(SchemaDescriptor::new(tables))
    }

    async fn execute(&self, sql: &str) -> ExecutionOutcome {
        let started = std::time::Instant::now();
        match tokio::time::timeout(self.query_timeout, self.run_select(sql)).await {
            Ok(Ok(rows)) => {
                debug!(
                    rows = rows.row_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "SQL executed"
                );
                ExecutionOutcome::Success(rows)
            }
            Ok(Err(e)) => ExecutionOutcome::Failure(engine_error_text(&e)),
            Err(_) => ExecutionOutcome::Failure(format!(
                "Query timed out after {} seconds",
                self.query_timeout.as_secs()
            )),
        }
    }

    fn dialect(&self) -> &'static str {
        "SQLite"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Engine message without sqlx's wrapper text, so the model sees what SQLite said.
fn engine_error_text(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => format!("SQLite error: {}", db_err.message()),
        other => format!("SQLite error: {}", other),
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Extract a column value from a row as serde_json::Value
fn extract_column_value(row: &SqliteRow, index: usize) -> serde_json::Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v
            .map(|n| serde_json::Value::Number(n.into()))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v
            .map(|bytes| serde_json::Value::String(format!("x'{}'", hex::encode(bytes))))
            .unwrap_or(serde_json::Value::Null);
    }

    serde_json::Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> SqliteDatabase {
        let db = SqliteDatabase::in_memory().await.unwrap();
        sqlx::query(
            "CREATE TABLE data (id INTEGER PRIMARY KEY, city TEXT NOT NULL, price REAL, note)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO data (id, city, price, note) VALUES (1, 'NYC', 9.5, NULL), (2, 'LA', 12.0, 'x')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_extract_schema() {
        let db = seeded().await;
        let schema = db.extract_schema().await.unwrap();

        assert_eq!(schema.table_names(), vec!["data"]);
        let columns = &schema.tables[0].columns;
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].data_type, "INTEGER");
        assert!(!columns[1].nullable);
        assert!(columns[2].nullable);
        assert_eq!(columns[3].data_type, "ANY");
    }

    #[tokio::test]
    async fn test_extract_schema_from_closed_pool_is_unavailable() {
        let db = seeded().await;
        db.close().await;
        let err = db.extract_schema().await.unwrap_err();
        assert!(matches!(err, AppError::SchemaUnavailable(_)));
    }

    #[tokio::test]
    async fn test_execute_returns_typed_rows() {
        let db = seeded().await;
        let outcome = db
            .execute("SELECT id, city, price, note FROM data ORDER BY id")
            .await;

        let ExecutionOutcome::Success(rows) = outcome else {
            panic!("expected success, got {:?}", outcome);
        };
        assert_eq!(rows.columns, vec!["id", "city", "price", "note"]);
        assert_eq!(rows.row_count(), 2);
        assert_eq!(rows.rows[0], vec![json!(1), json!("NYC"), json!(9.5), json!(null)]);
    }

    #[tokio::test]
    async fn test_execute_empty_result_keeps_columns() {
        let db = seeded().await;
        let outcome = db.execute("SELECT city FROM data WHERE id > 100").await;
        let ExecutionOutcome::Success(rows) = outcome else {
            panic!("expected success, got {:?}", outcome);
        };
        assert_eq!(rows.columns, vec!["city"]);
        assert_eq!(rows.row_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_reports_engine_error_text() {
        let db = seeded().await;
        let outcome = db.execute("SELECT nonexistent_col FROM data").await;
        match outcome {
            ExecutionOutcome::Failure(message) => {
                assert!(message.contains("no such column"), "{}", message)
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import_table_replaces_existing() {
        let db = seeded().await;
        let staged = StagedTable {
            name: "data".to_string(),
            columns: vec!["name".into(), "qty".into()],
            rows: vec![
                vec![Some("apple".into()), Some("3".into())],
                vec![Some("pear".into()), None],
            ],
        };

        assert_eq!(db.import_table(&staged).await.unwrap(), 2);

        let schema = db.extract_schema().await.unwrap();
        let columns = &schema.tables[0].columns;
        assert_eq!(columns[0].data_type, "TEXT");
        assert_eq!(columns[1].data_type, "INTEGER");

        let outcome = db.execute("SELECT SUM(qty) AS total FROM data").await;
        let ExecutionOutcome::Success(rows) = outcome else {
            panic!("expected success");
        };
        assert_eq!(rows.rows, vec![vec![json!(3)]]);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let path = std::env::temp_dir().join(format!("missing-{}.db", uuid::Uuid::new_v4()));
        let result = SqliteDatabase::open(&path, 5).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("data"), "\"data\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
