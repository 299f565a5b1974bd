pub mod postgres;
pub mod sqlite;

use crate::domain::error::Result;
use crate::domain::query::ExecutionOutcome;
use crate::domain::schema::SchemaDescriptor;
use async_trait::async_trait;

/// A SQL-queryable store the text-to-SQL loop can ground on and run against.
#[async_trait]
pub trait QueryDatabase: Send + Sync {
    /// Table and column metadata. Fails with `SchemaUnavailable`.
    async fn extract_schema(&self) -> Result<SchemaDescriptor>;

    /// Runs exactly one statement. Engine errors come back as
    /// `ExecutionOutcome::Failure` carrying the engine's own text.
    async fn execute(&self, sql: &str) -> ExecutionOutcome;

    /// SQL dialect named in prompts, e.g. "SQLite".
    fn dialect(&self) -> &'static str;

    async fn close(&self);
}
