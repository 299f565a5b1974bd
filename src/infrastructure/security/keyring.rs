use crate::domain::error::{AppError, Result};
use keyring::Entry;
use tracing::debug;

/// API keys stored in the operating system keychain, one entry per account.
pub struct KeyringManager {
    service: String,
}

impl KeyringManager {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, account: &str) -> Result<Entry> {
        Entry::new(&self.service, account)
            .map_err(|e| AppError::SecurityError(format!("Failed to open keychain entry: {}", e)))
    }

    /// Stores `secret` and reads it back, so a store that drops writes is an
    /// error rather than a silent success.
    pub fn set_secret(&self, account: &str, secret: &str) -> Result<()> {
        self.entry(account)?
            .set_password(secret)
            .map_err(|e| AppError::SecurityError(format!("Failed to store secret: {}", e)))?;

        match self.get_secret(account)? {
            Some(stored) if stored == secret => {
                debug!(service = %self.service, account, "Stored secret in keychain");
                Ok(())
            }
            _ => Err(AppError::SecurityError(format!(
                "Keychain did not keep the secret for '{}'; no persistent credential store is available",
                account
            ))),
        }
    }

    /// `None` when nothing is stored for `account`.
    pub fn get_secret(&self, account: &str) -> Result<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AppError::SecurityError(format!(
                "Failed to read secret: {}",
                e
            ))),
        }
    }

    /// Returns whether an entry existed.
    pub fn delete_secret(&self, account: &str) -> Result<bool> {
        match self.entry(account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(AppError::SecurityError(format!(
                "Failed to delete secret: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a real credential store (macOS Keychain, Windows Credential
    // Manager or a Secret Service daemon). Run with `--ignored`.
    #[test]
    #[ignore]
    fn test_secret_survives_a_new_manager() {
        let account = format!("roundtrip-{}", uuid::Uuid::new_v4());
        let writer = KeyringManager::new("text2sql-test");
        writer.set_secret(&account, "secret-value").unwrap();

        let reader = KeyringManager::new("text2sql-test");
        assert_eq!(
            reader.get_secret(&account).unwrap().as_deref(),
            Some("secret-value")
        );

        assert!(reader.delete_secret(&account).unwrap());
        assert_eq!(reader.get_secret(&account).unwrap(), None);
        assert!(!reader.delete_secret(&account).unwrap());
    }
}
