use super::{error_from_response, http_client, require_api_key, transport_error, LLMClient};
use crate::domain::error::{AppError, LlmErrorKind, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiModelsResponse {
    models: Option<Vec<GeminiModelInfo>>,
}

#[derive(Deserialize)]
struct GeminiModelInfo {
    name: String,
    #[serde(rename = "supportedGenerationMethods", default)]
    supported_generation_methods: Vec<String>,
}

pub struct GeminiClient {
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }

    /// Accepts both `gemini-2.5-flash` and `models/gemini-2.5-flash`.
    fn normalize_model(model: &str) -> String {
        let trimmed = model.trim();
        trimmed
            .strip_prefix("models/")
            .unwrap_or(trimmed)
            .to_string()
    }

    fn response_text(json: GeminiResponse) -> Result<String> {
        if let Some(reason) = json.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AppError::llm(
                LlmErrorKind::ContentBlocked,
                format!("Prompt blocked: {}", reason),
            ));
        }

        let candidate = json.candidates.into_iter().next().ok_or_else(|| {
            AppError::llm(LlmErrorKind::Other, "Response contained no candidates")
        })?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let kind = match candidate.finish_reason.as_deref() {
                Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => {
                    LlmErrorKind::ContentBlocked
                }
                _ => LlmErrorKind::Other,
            };
            return Err(AppError::llm(
                kind,
                format!(
                    "Empty response (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        Ok(text)
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for GeminiClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        let api_key = require_api_key(config)?;
        let model_id = Self::normalize_model(&config.model);
        let base_url = config.base_url.trim_end_matches('/');
        let url = format!("{}/{}:generateContent", base_url, model_id);

        let system_instruction = if system.trim().is_empty() {
            None
        } else {
            Some(GeminiContent {
                parts: vec![GeminiPart {
                    text: system.to_string(),
                }],
                role: None,
            })
        };

        let body = GeminiRequest {
            system_instruction,
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: user.to_string(),
                }],
                role: Some("user".to_string()),
            }],
            generation_config: Some(GenerationConfig {
                temperature: config.temperature.unwrap_or(0.1) as f64,
                max_output_tokens: config.max_tokens,
            }),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let json: GeminiResponse = response.json().await.map_err(|e| {
            AppError::llm(LlmErrorKind::Other, format!("Failed to parse JSON: {}", e))
        })?;

        Self::response_text(json)
    }

    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>> {
        let api_key = require_api_key(config)?;
        let base_url = config.base_url.trim_end_matches('/');

        let response = self
            .client
            .get(base_url)
            .header("x-goog-api-key", api_key)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let json: GeminiModelsResponse = response.json().await.map_err(|e| {
            AppError::llm(LlmErrorKind::Other, format!("Failed to parse JSON: {}", e))
        })?;

        let models = json
            .models
            .unwrap_or_default()
            .into_iter()
            .filter(|model| {
                model.supported_generation_methods.is_empty()
                    || model
                        .supported_generation_methods
                        .iter()
                        .any(|method| method == "generateContent")
            })
            .map(|model| Self::normalize_model(&model.name))
            .collect();

        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_model() {
        assert_eq!(
            GeminiClient::normalize_model(" models/gemini-2.5-flash "),
            "gemini-2.5-flash"
        );
        assert_eq!(GeminiClient::normalize_model("gemini-pro"), "gemini-pro");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let json: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"sql: "},{"text":"SELECT 1"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(GeminiClient::response_text(json).unwrap(), "sql: SELECT 1");
    }

    #[test]
    fn test_blocked_prompt_is_classified() {
        let json: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = GeminiClient::response_text(json).unwrap_err();
        assert!(matches!(
            err,
            AppError::GenerationCallError {
                kind: LlmErrorKind::ContentBlocked,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_safety_candidate_is_blocked() {
        let json: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        let err = GeminiClient::response_text(json).unwrap_err();
        assert!(matches!(
            err,
            AppError::GenerationCallError {
                kind: LlmErrorKind::ContentBlocked,
                ..
            }
        ));
    }
}
