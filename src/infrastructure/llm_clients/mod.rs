pub mod gemini;
pub mod openai;

use crate::domain::error::{AppError, LlmErrorKind, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::llm_config::LLMProvider;
use async_trait::async_trait;
use gemini::GeminiClient;
use openai::OpenAIClient;
use reqwest::StatusCode;

#[async_trait]
pub trait LLMClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String>;
    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>>;
}

pub struct RouterClient {
    openai: OpenAIClient,
    gemini: GeminiClient,
}

impl RouterClient {
    pub fn new() -> Self {
        Self {
            openai: OpenAIClient::new(),
            gemini: GeminiClient::new(),
        }
    }
}

impl Default for RouterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        match config.provider {
            LLMProvider::Google => self.gemini.generate(config, system, user).await,
            _ => self.openai.generate(config, system, user).await,
        }
    }

    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>> {
        match config.provider {
            LLMProvider::Google => self.gemini.list_models(config).await,
            _ => self.openai.list_models(config).await,
        }
    }
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Maps a non-success HTTP response onto the error classes callers act on.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> LlmErrorKind {
    let lowered = body.to_lowercase();
    match status.as_u16() {
        401 | 403 => LlmErrorKind::InvalidCredential,
        400 if lowered.contains("api key") || lowered.contains("api_key") => {
            LlmErrorKind::InvalidCredential
        }
        429 if lowered.contains("quota") || lowered.contains("billing") => {
            LlmErrorKind::QuotaExceeded
        }
        429 => LlmErrorKind::RateLimited,
        402 => LlmErrorKind::QuotaExceeded,
        _ if lowered.contains("safety") || lowered.contains("blocked") => {
            LlmErrorKind::ContentBlocked
        }
        500..=599 => LlmErrorKind::Network,
        _ => LlmErrorKind::Other,
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() || err.is_connect() || err.is_request() {
        LlmErrorKind::Network
    } else {
        LlmErrorKind::Other
    };
    AppError::llm(kind, format!("Request failed: {}", err))
}

pub(crate) async fn error_from_response(response: reqwest::Response) -> AppError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let kind = classify_status(status, &text);
    AppError::llm(kind, format!("API error ({}): {}", status, text.trim()))
}

pub(crate) fn require_api_key(config: &LLMConfig) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            AppError::llm(
                LlmErrorKind::InvalidCredential,
                format!("Missing API key for {:?} provider", config.provider),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            LlmErrorKind::InvalidCredential
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "API key not valid. Please pass a valid API key."),
            LlmErrorKind::InvalidCredential
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "Resource has been exhausted (e.g. check quota)."),
            LlmErrorKind::QuotaExceeded
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            LlmErrorKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "overloaded"),
            LlmErrorKind::Network
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "malformed request"),
            LlmErrorKind::Other
        );
    }

    #[test]
    fn test_require_api_key() {
        let mut config = LLMConfig::default();
        let err = require_api_key(&config).unwrap_err();
        assert!(matches!(
            err,
            AppError::GenerationCallError {
                kind: LlmErrorKind::InvalidCredential,
                ..
            }
        ));

        config.api_key = Some("  ".to_string());
        assert!(require_api_key(&config).is_err());

        config.api_key = Some("abc".to_string());
        assert_eq!(require_api_key(&config).unwrap(), "abc");
    }
}
