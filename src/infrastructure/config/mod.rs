//! Layered application configuration.
//!
//! Precedence, lowest first: built-in defaults, `text2sql.toml` (or the file
//! passed with `--config`), then `TEXT2SQL_*` environment variables where `__`
//! separates nested keys (`TEXT2SQL_LLM__MODEL=gemini-2.0-flash`).

use crate::domain::data_source::PasswordRef;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider, GEMINI_BASE_URL};
use crate::infrastructure::security::keyring::KeyringManager;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "text2sql.toml";
pub const ENV_PREFIX: &str = "TEXT2SQL_";
pub const KEYRING_SERVICE: &str = "text2sql";
const REGISTRY_FILE: &str = "sources.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Regeneration cycles allowed after the first candidate statement.
    pub max_debug_attempts: u32,
    /// Upper bound for a single statement execution.
    pub database_timeout_secs: u64,
    /// Holds the source registry and imported databases.
    pub data_dir: PathBuf,
    pub llm: LLMConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_debug_attempts: 3,
            database_timeout_secs: 30,
            data_dir: PathBuf::from(".text2sql"),
            llm: LLMConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_file {
            if !path.exists() {
                return Err(AppError::ConfigError(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
        }

        let mut config: AppConfig = Self::figment(config_file)
            .extract()
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        // switching provider without a base url means "that provider's default"
        let base_url = config.llm.base_url.trim();
        if base_url.is_empty()
            || (base_url == GEMINI_BASE_URL && config.llm.provider != LLMProvider::Google)
        {
            config.llm.base_url = config.llm.provider.default_base_url().to_string();
        }

        if let Some(temperature) = config.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(AppError::ConfigError(format!(
                    "llm.temperature must be between 0 and 2, got {}",
                    temperature
                )));
            }
        }

        debug!(
            provider = ?config.llm.provider,
            model = %config.llm.model,
            max_debug_attempts = config.max_debug_attempts,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE)
    }
}

/// Where a resolved API key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Config,
    Environment(&'static str),
    Keychain,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Config => f.write_str("configuration"),
            KeySource::Environment(var) => write!(f, "environment variable {}", var),
            KeySource::Keychain => f.write_str("system keychain"),
        }
    }
}

/// Provider credentials: configuration first, then the provider's usual
/// environment variable, then the system keychain.
pub struct ConfigService {
    keyring: KeyringManager,
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigService {
    pub fn new() -> Self {
        Self {
            keyring: KeyringManager::new(KEYRING_SERVICE),
        }
    }

    pub fn save_api_key(&self, provider: LLMProvider, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::ValidationError("API key is empty".to_string()));
        }
        self.keyring.set_secret(provider.keyring_account(), key)
    }

    pub fn delete_api_key(&self, provider: LLMProvider) -> Result<bool> {
        self.keyring.delete_secret(provider.keyring_account())
    }

    pub fn save_database_password(&self, name: &str, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(AppError::ValidationError("Password is empty".to_string()));
        }
        self.keyring.set_secret(&database_account(name), password)
    }

    /// Password for a server source, from its `env:`, `keychain:` or literal
    /// reference.
    pub fn resolve_database_password(&self, reference: &str) -> Result<String> {
        let reference = PasswordRef::parse(reference)?;
        resolve_password(
            &reference,
            |var| std::env::var(var).ok(),
            |name| self.keyring.get_secret(&database_account(name)),
        )
    }

    /// Fill `config.api_key` if it is unset. Keychain failures are logged and
    /// treated as "no key"; the provider call reports the missing credential.
    pub fn resolve_api_key(&self, config: &mut LLMConfig) -> Option<KeySource> {
        let lookup_env = |var: &str| std::env::var(var).ok();
        let from_keychain = || match self.keyring.get_secret(config.provider.keyring_account()) {
            Ok(secret) => secret,
            Err(e) => {
                debug!("Keychain lookup skipped: {}", e);
                None
            }
        };
        let resolved = resolve_key(config, lookup_env, from_keychain);
        if let Some((key, source)) = resolved {
            config.api_key = Some(key);
            return Some(source);
        }
        None
    }
}

fn resolve_password(
    reference: &PasswordRef,
    lookup_env: impl Fn(&str) -> Option<String>,
    from_keychain: impl FnOnce(&str) -> Result<Option<String>>,
) -> Result<String> {
    match reference {
        PasswordRef::Plain(secret) => Ok(secret.clone()),
        PasswordRef::Env(var) => lookup_env(var).ok_or_else(|| {
            AppError::ConfigError(format!(
                "Environment variable '{}' not found for password",
                var
            ))
        }),
        PasswordRef::Keychain(name) => from_keychain(name)?.ok_or_else(|| {
            AppError::ConfigError(format!(
                "No password stored in the keychain for '{}' (use `key set-password {}`)",
                name, name
            ))
        }),
    }
}

fn resolve_key(
    config: &LLMConfig,
    lookup_env: impl Fn(&str) -> Option<String>,
    from_keychain: impl FnOnce() -> Option<String>,
) -> Option<(String, KeySource)> {
    let non_blank = |value: String| {
        let trimmed = value.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    if let Some(key) = config.api_key.clone().and_then(non_blank) {
        return Some((key, KeySource::Config));
    }
    if let Some(var) = config.provider.api_key_env() {
        if let Some(key) = lookup_env(var).and_then(non_blank) {
            return Some((key, KeySource::Environment(var)));
        }
    }
    from_keychain()
        .and_then(non_blank)
        .map(|key| (key, KeySource::Keychain))
}

/// Keychain account holding the password of database source `name`.
fn database_account(name: &str) -> String {
    format!("db:{}", name)
}
