use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failed language-model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    InvalidCredential,
    RateLimited,
    QuotaExceeded,
    Network,
    ContentBlocked,
    Other,
}

impl LlmErrorKind {
    /// Guidance shown to the end user next to the raw error text.
    pub fn hint(&self) -> &'static str {
        match self {
            LlmErrorKind::InvalidCredential => {
                "Check the API key (config, environment variable or `key set`)."
            }
            LlmErrorKind::RateLimited => "Rate limit hit. Wait a moment and try again.",
            LlmErrorKind::QuotaExceeded => "API quota exceeded. Check the provider dashboard.",
            LlmErrorKind::Network => "Could not reach the provider. Check the network and base URL.",
            LlmErrorKind::ContentBlocked => {
                "The provider blocked the response. Try rephrasing the question."
            }
            LlmErrorKind::Other => "The provider returned an unexpected error.",
        }
    }
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LlmErrorKind::InvalidCredential => "invalid credential",
            LlmErrorKind::RateLimited => "rate limit",
            LlmErrorKind::QuotaExceeded => "quota exceeded",
            LlmErrorKind::Network => "network failure",
            LlmErrorKind::ContentBlocked => "content blocked",
            LlmErrorKind::Other => "provider error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    Internal(String),
    NotFound(String),
    ValidationError(String),
    ParseError(String),
    ConfigError(String),
    SchemaUnavailable(String),
    GenerationCallError { kind: LlmErrorKind, message: String },
    GenerationParseError(String),
    SecurityError(String),
    DatabaseError(String),
    IoError(String),
}

impl AppError {
    pub fn llm(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        AppError::GenerationCallError {
            kind,
            message: message.into(),
        }
    }

    /// Fatal errors end a request immediately; the repair loop never retries them.
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            AppError::GenerationCallError { .. } | AppError::GenerationParseError(_)
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::SchemaUnavailable(msg) => write!(f, "Schema unavailable: {}", msg),
            AppError::GenerationCallError { kind, message } => {
                write!(f, "LLM call failed ({}): {}", kind, message)
            }
            AppError::GenerationParseError(msg) => {
                write!(f, "Could not extract SQL from LLM response: {}", msg)
            }
            AppError::SecurityError(msg) => write!(f, "Security error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_failures_are_flagged() {
        assert!(AppError::llm(LlmErrorKind::Network, "timeout").is_generation_failure());
        assert!(AppError::GenerationParseError("empty".into()).is_generation_failure());
        assert!(!AppError::DatabaseError("locked".into()).is_generation_failure());
    }

    #[test]
    fn test_call_error_display_includes_kind() {
        let err = AppError::llm(LlmErrorKind::QuotaExceeded, "429 Too Many Requests");
        assert_eq!(
            err.to_string(),
            "LLM call failed (quota exceeded): 429 Too Many Requests"
        );
    }
}
