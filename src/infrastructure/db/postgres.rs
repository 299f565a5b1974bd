use super::QueryDatabase;
use crate::domain::error::{AppError, Result};
use crate::domain::query::{ExecutionOutcome, QueryRows};
use crate::domain::schema::{ColumnSchema, SchemaDescriptor, TableSchema};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Row, Statement};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

const SCHEMA_QUERY: &str = r#"
    SELECT
        c.table_name::text AS table_name,
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.is_nullable = 'YES' AS is_nullable
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON t.table_schema = c.table_schema
        AND t.table_name = c.table_name
    WHERE c.table_schema = 'public'
        AND t.table_type IN ('BASE TABLE', 'VIEW')
    ORDER BY c.table_name, c.ordinal_position
"#;

/// PostgreSQL handle. Every session runs with
/// `default_transaction_read_only = on`, so the server refuses writes even if
/// one slips past the validator.
pub struct PostgresDatabase {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresDatabase {
    pub async fn connect(url: &str, password: Option<&str>, query_timeout_secs: u64) -> Result<Self> {
        let options = connect_options(url, password)?;

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                AppError::DatabaseError(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        info!("Connected to PostgreSQL");

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(query_timeout_secs.max(1)),
        })
    }

    async fn run_select(&self, sql: &str) -> std::result::Result<QueryRows, sqlx::Error> {
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

/// Parses `url` and applies the password and read-only session settings.
pub fn connect_options(url: &str, password: Option<&str>) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(url).map_err(|e| {
        AppError::ValidationError(format!("Invalid PostgreSQL connection URL: {}", e))
    })?;

    let options = match password {
        Some(password) => options.password(password),
        None => options,
    };

    Ok(options
        .application_name("text2sql")
        .options([("default_transaction_read_only", "on")]))
}

#[async_trait]
impl QueryDatabase for PostgresDatabase {
    async fn extract_schema(&self) -> Result<SchemaDescriptor> {
        let unavailable =
            |e: sqlx::Error| AppError::SchemaUnavailable(format!("Failed to read schema: {}", e));

        let rows = sqlx::query(SCHEMA_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        let mut tables: Vec<TableSchema> = Vec::new();
        for row in rows {
            let table: String = row.try_get("table_name").map_err(unavailable)?;
            let column = ColumnSchema {
                name: row.try_get("column_name").map_err(unavailable)?,
                data_type: row.try_get("data_type").map_err(unavailable)?,
                nullable: row.try_get("is_nullable").map_err(unavailable)?,
            };
            // rows arrive ordered by table, so a new name starts a new table
            if tables.last().map(|last| last.name != table).unwrap_or(true) {
                tables.push(TableSchema {
                    name: table,
                    columns: Vec::new(),
                });
            }
            if let Some(last) = tables.last_mut() {
                last.columns.push(column);
            }
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
        "PostgreSQL"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn engine_error_text(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => format!("PostgreSQL error: {}", db_err.message()),
        other => format!("PostgreSQL error: {}", other),
    }
}

/// Extract a column value from a row as serde_json::Value
fn extract_column_value(row: &PgRow, index: usize) -> serde_json::Value {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v
            .map(|n| serde_json::Value::Number(n.into()))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v
            .map(|n| serde_json::Value::Number(n.into()))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(index) {
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
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return v
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(index) {
        return v.map(decimal_to_json).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v
            .map(serde_json::Value::Bool)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
        return v
            .map(|dt| serde_json::Value::String(dt.to_rfc3339()))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v
            .map(|dt| serde_json::Value::String(dt.to_string()))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v
            .map(|d| serde_json::Value::String(d.to_string()))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v
            .map(|bytes| serde_json::Value::String(format!("\\x{}", hex::encode(bytes))))
            .unwrap_or(serde_json::Value::Null);
    }

    serde_json::Value::Null
}

/// Whole numerics become integers, others floats; values too large for
/// either keep their exact text.
fn decimal_to_json(value: BigDecimal) -> serde_json::Value {
    if value.is_integer() {
        if let Some(n) = value.to_i64() {
            return serde_json::Value::Number(n.into());
        }
    } else if let Some(n) = value.to_f64().and_then(serde_json::Number::from_f64) {
        return serde_json::Value::Number(n);
    }
    serde_json::Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_options_from_url() {
        let options =
            connect_options("postgres://analyst@db.internal:6543/warehouse", Some("pw")).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("warehouse"));
        assert_eq!(options.get_username(), "analyst");
        assert_eq!(options.get_application_name(), Some("text2sql"));
        assert!(options
            .get_options()
            .unwrap_or_default()
            .contains("default_transaction_read_only=on"));
    }

    #[test]
    fn test_connect_options_rejects_bad_url() {
        let err = connect_options("not a url", None).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_decimal_to_json() {
        let parse = |s: &str| BigDecimal::from_str(s).unwrap();
        assert_eq!(decimal_to_json(parse("42")), json!(42));
        assert_eq!(decimal_to_json(parse("42.000")), json!(42));
        assert_eq!(decimal_to_json(parse("12.5")), json!(12.5));
        assert_eq!(
            decimal_to_json(parse("123456789012345678901234567890")),
            json!("123456789012345678901234567890")
        );
    }

    // Needs a reachable server: TEXT2SQL_TEST_POSTGRES_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_live_server_round_trip() {
        let url = std::env::var("TEXT2SQL_TEST_POSTGRES_URL").unwrap();
        let db = PostgresDatabase::connect(&url, None, 10).await.unwrap();

        db.extract_schema().await.unwrap();

        match db
            .execute("SELECT 1 AS one, 'a'::text AS t, 2.5::numeric AS n, NULL::int AS z")
            .await
        {
            ExecutionOutcome::Success(rows) => {
                assert_eq!(rows.columns, vec!["one", "t", "n", "z"]);
                assert_eq!(rows.rows, vec![vec![json!(1), json!("a"), json!(2.5), json!(null)]]);
            }
            ExecutionOutcome::Failure(e) => panic!("query failed: {e}"),
        }

        match db.execute("SELECT no_such_column").await {
            ExecutionOutcome::Failure(message) => assert!(message.starts_with("PostgreSQL error")),
            other => panic!("expected failure, got {:?}", other),
        }

        match db.execute("CREATE TABLE text2sql_should_fail (a int)").await {
            ExecutionOutcome::Failure(message) => assert!(message.contains("read-only"), "{message}"),
            other => panic!("expected read-only failure, got {:?}", other),
        }

        db.close().await;
    }
}
