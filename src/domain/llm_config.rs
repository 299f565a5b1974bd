use serde::{Deserialize, Serialize};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const LOCAL_BASE_URL: &str = "http://localhost:1234/v1";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    Local,
    OpenAI,
    OpenRouter,
    Google,
}

impl LLMProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProvider::Local => LOCAL_BASE_URL,
            LLMProvider::OpenAI => OPENAI_BASE_URL,
            LLMProvider::OpenRouter => OPENROUTER_BASE_URL,
            LLMProvider::Google => GEMINI_BASE_URL,
        }
    }

    /// Environment variable conventionally holding this provider's key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            LLMProvider::Google => Some("GEMINI_API_KEY"),
            LLMProvider::OpenAI => Some("OPENAI_API_KEY"),
            LLMProvider::OpenRouter => Some("OPENROUTER_API_KEY"),
            LLMProvider::Local => None,
        }
    }

    /// Keychain account name used for this provider's key.
    pub fn keyring_account(&self) -> &'static str {
        match self {
            LLMProvider::Local => "local",
            LLMProvider::OpenAI => "openai",
            LLMProvider::OpenRouter => "openrouter",
            LLMProvider::Google => "google",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LLMConfig {
    /// Key masked for display, keeping a short prefix and suffix.
    pub fn masked_api_key(&self) -> Option<String> {
        self.api_key.as_deref().map(|key| {
            let chars: Vec<char> = key.chars().collect();
            if chars.len() <= 8 {
                "*".repeat(chars.len())
            } else {
                let head: String = chars[..4].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{}...{}", head, tail)
            }
        })
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Google,
            base_url: GEMINI_BASE_URL.to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            max_tokens: Some(2000),
            // low temperature keeps generated SQL stable across runs
            temperature: Some(0.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_api_key() {
        let mut config = LLMConfig::default();
        assert_eq!(config.masked_api_key(), None);

        config.api_key = Some("AIzaSyExampleKey1234".to_string());
        assert_eq!(config.masked_api_key().as_deref(), Some("AIza...1234"));

        config.api_key = Some("short".to_string());
        assert_eq!(config.masked_api_key().as_deref(), Some("*****"));
    }
}
