//! Text-to-SQL Execution & Repair Loop
//!
//! Drives one natural-language request to a terminal state:
//!
//! ```text
//! Generating -> Validating -> Executing -> Succeeded
//!     ^             |             |
//!     +--- reject --+-- failure --+      (bounded by max_debug_attempts)
//! ```
//!
//! Validator rejections and engine failures share one repair channel and one
//! attempt counter. Generation failures end the request at once. Schema
//! extraction failures are returned as errors before the loop starts.

use crate::application::use_cases::prompt_builder::{PromptBuilder, RepairContext};
use crate::application::use_cases::query_validator::QueryValidator;
use crate::application::use_cases::sql_generator::SqlGenerator;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::query::{
    AttemptRecord, ExecutionOutcome, FailedQuery, FailureKind, NaturalLanguageRequest,
    QueryOutcome, RepairState, SucceededQuery, Verdict,
};
use crate::infrastructure::db::QueryDatabase;
use crate::infrastructure::llm_clients::LLMClient;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_DEBUG_ATTEMPTS: u32 = 3;

/// Everything one request needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct TextToSqlSettings {
    /// Provider, model and credential for every generation call.
    pub llm: LLMConfig,
    /// Regeneration cycles allowed after the first candidate.
    pub max_debug_attempts: u32,
}

impl Default for TextToSqlSettings {
    fn default() -> Self {
        Self {
            llm: LLMConfig::default(),
            max_debug_attempts: DEFAULT_MAX_DEBUG_ATTEMPTS,
        }
    }
}

pub struct TextToSqlUseCase {
    database: Arc<dyn QueryDatabase>,
    generator: SqlGenerator,
    prompt_builder: PromptBuilder,
    validator: QueryValidator,
    settings: TextToSqlSettings,
}

impl TextToSqlUseCase {
    pub fn new(
        llm_client: Arc<dyn LLMClient + Send + Sync>,
        database: Arc<dyn QueryDatabase>,
        settings: TextToSqlSettings,
    ) -> Self {
        Self {
            prompt_builder: PromptBuilder::with_dialect(database.dialect()),
            database,
            generator: SqlGenerator::new(llm_client),
            validator: QueryValidator::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &TextToSqlSettings {
        &self.settings
    }

    /// Answer one question. `Ok` always carries a terminal state; `Err` means
    /// the request never started (bad question or unreadable schema).
    pub async fn answer(&self, question: &str) -> Result<QueryOutcome> {
        let request = NaturalLanguageRequest::new(question)?;

        let schema = self.database.extract_schema().await.map_err(|e| match e {
            AppError::SchemaUnavailable(_) => e,
            other => AppError::SchemaUnavailable(other.to_string()),
        })?;
        if schema.is_empty() {
            warn!("Database has no tables; the model has nothing to ground on");
        }

        let max_attempts = self.settings.max_debug_attempts;
        info!(
            tables = schema.tables.len(),
            max_attempts,
            "Answering question: {}",
            request.question
        );

        let mut attempt: u32 = 0;
        let mut repair: Option<RepairContext> = None;
        let mut history: Vec<AttemptRecord> = Vec::new();

        loop {
            debug!(state = %RepairState::Generating, attempt, "Building prompt");
            let prompt = self
                .prompt_builder
                .build(&schema, &request.question, repair.as_ref());

            let sql = match self.generator.generate(&self.settings.llm, &prompt).await {
                Ok(sql) => sql,
                Err(e) if e.is_generation_failure() => {
                    warn!(state = %RepairState::Failed, attempt, "Generation failed: {}", e);
                    let guidance = match &e {
                        AppError::GenerationCallError { kind, .. } => Some(kind.hint().to_string()),
                        _ => Some(
                            "The model answer did not contain a SQL statement. Try rephrasing the question."
                                .to_string(),
                        ),
                    };
                    return Ok(QueryOutcome::Failed(FailedQuery {
                        last_sql: repair.map(|context| context.failed_sql),
                        reason: e.to_string(),
                        attempts: attempt,
                        kind: FailureKind::Generation,
                        guidance,
                        history,
                    }));
                }
                Err(e) => return Err(e),
            };

            debug!(state = %RepairState::Validating, attempt, sql = %sql, "Validating candidate");
            let error = match self.validator.validate(&sql) {
                Verdict::Reject(reason) => {
                    warn!(attempt, "Candidate rejected: {}", reason);
                    reason.to_string()
                }
                Verdict::Accept => {
                    debug!(state = %RepairState::Executing, attempt, "Executing candidate");
                    match self.database.execute(&sql).await {
                        ExecutionOutcome::Success(result) => {
                            info!(
                                state = %RepairState::Succeeded,
                                attempt,
                                rows = result.row_count(),
                                "Query succeeded"
                            );
                            return Ok(QueryOutcome::Succeeded(SucceededQuery {
                                sql,
                                columns: result.columns,
                                rows: result.rows,
                                attempts: attempt,
                                history,
                            }));
                        }
                        ExecutionOutcome::Failure(message) => {
                            warn!(attempt, "Execution failed: {}", message);
                            message
                        }
                    }
                }
            };

            history.push(AttemptRecord {
                sql: sql.clone(),
                error: error.clone(),
            });

            if attempt >= max_attempts {
                warn!(state = %RepairState::Failed, attempt, "Repair attempts exhausted");
                return Ok(QueryOutcome::Failed(FailedQuery {
                    last_sql: Some(sql),
                    reason: error,
                    attempts: attempt,
                    kind: FailureKind::AttemptsExhausted,
                    guidance: None,
                    history,
                }));
            }

            attempt += 1;
            repair = Some(RepairContext {
                failed_sql: sql,
                error,
            });
        }
    }
}
