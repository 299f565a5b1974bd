use super::{error_from_response, http_client, require_api_key, transport_error, LLMClient};
use crate::domain::error::{AppError, LlmErrorKind, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use async_trait::async_trait;
use serde_json::json;

/// Client for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, OpenRouter, LM Studio and similar local servers).
pub struct OpenAIClient {
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }

    fn endpoint(config: &LLMConfig, path: &str) -> String {
        if config.base_url.ends_with('/') {
            format!("{}{}", config.base_url, path)
        } else {
            format!("{}/{}", config.base_url, path)
        }
    }

    /// Local servers usually run without authentication.
    fn authorize(config: &LLMConfig, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match config.provider {
            LLMProvider::Local => Ok(match config.api_key.as_deref() {
                Some(key) if !key.trim().is_empty() => request.bearer_auth(key),
                _ => request,
            }),
            _ => Ok(request.bearer_auth(require_api_key(config)?)),
        }
    }

    fn message_content(json: &serde_json::Value) -> Result<String> {
        let choice = &json["choices"][0];
        if choice["finish_reason"].as_str() == Some("content_filter") {
            return Err(AppError::llm(
                LlmErrorKind::ContentBlocked,
                "Response withheld by the provider's content filter",
            ));
        }

        choice["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::llm(LlmErrorKind::Other, "Invalid response format"))
    }
}

impl Default for OpenAIClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        let url = Self::endpoint(config, "chat/completions");

        let mut messages = Vec::new();
        if !system.trim().is_empty() {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": user }));

        let body = json!({
            "model": config.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        });

        let request = Self::authorize(config, self.client.post(&url))?;
        let response = request.json(&body).send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            AppError::llm(LlmErrorKind::Other, format!("Failed to parse JSON: {}", e))
        })?;

        Self::message_content(&json)
    }

    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>> {
        let url = Self::endpoint(config, "models");

        let request = Self::authorize(config, self.client.get(&url))?;
        let response = request.send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            AppError::llm(LlmErrorKind::Other, format!("Failed to parse JSON: {}", e))
        })?;

        let models = json["data"]
            .as_array()
            .ok_or_else(|| {
                AppError::llm(
                    LlmErrorKind::Other,
                    "Invalid response format: missing data array",
                )
            })?
            .iter()
            .filter_map(|m| m["id"].as_str())
            .map(|id| id.to_string())
            .collect();

        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_paths() {
        let mut config = LLMConfig {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            ..LLMConfig::default()
        };
        assert_eq!(
            OpenAIClient::endpoint(&config, "models"),
            "https://openrouter.ai/api/v1/models"
        );
        config.base_url.push('/');
        assert_eq!(
            OpenAIClient::endpoint(&config, "chat/completions"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn test_message_content() {
        let json = json!({
            "choices": [{ "message": { "content": "SELECT 1" }, "finish_reason": "stop" }]
        });
        assert_eq!(OpenAIClient::message_content(&json).unwrap(), "SELECT 1");

        let filtered = json!({
            "choices": [{ "message": { "content": null }, "finish_reason": "content_filter" }]
        });
        assert!(matches!(
            OpenAIClient::message_content(&filtered),
            Err(AppError::GenerationCallError {
                kind: LlmErrorKind::ContentBlocked,
                ..
            })
        ));
    }
}
