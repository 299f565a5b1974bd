use crate::domain::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// A single free-text question. Not retained once its request completes.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NaturalLanguageRequest {
    #[validate(length(min = 1, max = 4096))]
    pub question: String,
}

impl NaturalLanguageRequest {
    pub fn new(question: impl Into<String>) -> Result<Self> {
        let request = Self {
            question: question.into().trim().to_string(),
        };
        request
            .validate()
            .map_err(|e| AppError::ValidationError(format!("Invalid question: {}", e)))?;
        Ok(request)
    }
}

/// Rows returned by a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryRows {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Result of running one candidate statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success(QueryRows),
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    NonReadOnly,
    DisallowedKeyword(String),
    CommentNotAllowed,
    MultipleStatements,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NonReadOnly => {
                f.write_str("non-read-only: only SELECT statements are allowed")
            }
            RejectReason::DisallowedKeyword(keyword) => {
                write!(f, "disallowed keyword: {}", keyword)
            }
            RejectReason::CommentNotAllowed => f.write_str("comment not allowed"),
            RejectReason::MultipleStatements => {
                f.write_str("multiple statements: only a single statement is allowed")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// States of the generate / validate / execute loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    Generating,
    Validating,
    Executing,
    Succeeded,
    Failed,
}

impl fmt::Display for RepairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RepairState::Generating => "generating",
            RepairState::Validating => "validating",
            RepairState::Executing => "executing",
            RepairState::Succeeded => "succeeded",
            RepairState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One failed attempt, kept so the caller can see how the query evolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub sql: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SucceededQuery {
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub attempts: u32,
    pub history: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The model call or its response was unusable.
    Generation,
    /// Every repair attempt was used up.
    AttemptsExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedQuery {
    pub last_sql: Option<String>,
    pub reason: String,
    pub attempts: u32,
    pub kind: FailureKind,
    /// What the user can do about it, when the failure class is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    pub history: Vec<AttemptRecord>,
}

/// Terminal state of one natural-language request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Succeeded(SucceededQuery),
    Failed(FailedQuery),
}

impl QueryOutcome {
    pub fn state(&self) -> RepairState {
        match self {
            QueryOutcome::Succeeded(_) => RepairState::Succeeded,
            QueryOutcome::Failed(_) => RepairState::Failed,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            QueryOutcome::Succeeded(ok) => ok.attempts,
            QueryOutcome::Failed(failed) => failed.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_trimmed() {
        let request = NaturalLanguageRequest::new("  count rows \n").unwrap();
        assert_eq!(request.question, "count rows");
    }

    #[test]
    fn test_blank_request_is_rejected() {
        let result = NaturalLanguageRequest::new("   ");
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_overlong_request_is_rejected() {
        let result = NaturalLanguageRequest::new("x".repeat(5000));
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_reason_labels() {
        assert!(RejectReason::NonReadOnly.to_string().starts_with("non-read-only"));
        assert_eq!(
            RejectReason::DisallowedKeyword("DROP".into()).to_string(),
            "disallowed keyword: DROP"
        );
        assert_eq!(RejectReason::CommentNotAllowed.to_string(), "comment not allowed");
        assert!(RejectReason::MultipleStatements
            .to_string()
            .starts_with("multiple statements"));
    }
}
