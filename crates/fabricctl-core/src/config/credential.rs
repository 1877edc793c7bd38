//! Credential resolution with optional keyring support
//!
//! A credential value in a profile is either plaintext or a `keyring:<key>`
//! reference into the OS keyring. An environment variable, when set, wins
//! over both.

use super::error::{ConfigError, Result};
use std::env;

/// Overrides the profile's client id
pub const CLIENT_ID_ENV: &str = "FABRIC_CLIENT_ID";
/// Overrides the profile's client secret
pub const CLIENT_SECRET_ENV: &str = "FABRIC_CLIENT_SECRET";
/// Overrides the profile's tenant id
pub const TENANT_ID_ENV: &str = "FABRIC_TENANT_ID";

/// Prefix that indicates a value should be retrieved from the keyring
const KEYRING_PREFIX: &str = "keyring:";

/// Service name for keyring entries
#[cfg(feature = "secure-storage")]
const SERVICE_NAME: &str = "fabricctl";

/// Storage backend for credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStorage {
    /// Store in OS keyring
    #[cfg(feature = "secure-storage")]
    Keyring,
    /// Store as plaintext
    Plaintext,
}

/// Credential store abstraction
#[derive(Debug, Clone)]
pub struct CredentialStore {
    storage: CredentialStorage,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    /// Keyring when the feature is enabled and a keyring answers, plaintext otherwise
    pub fn new() -> Self {
        #[cfg(feature = "secure-storage")]
        {
            if Self::is_keyring_available() {
                return Self {
                    storage: CredentialStorage::Keyring,
                };
            }
        }
        Self {
            storage: CredentialStorage::Plaintext,
        }
    }

    pub fn storage(&self) -> CredentialStorage {
        self.storage
    }

    #[cfg(feature = "secure-storage")]
    fn is_keyring_available() -> bool {
        match keyring::Entry::new(SERVICE_NAME, "__probe__") {
            Ok(entry) => {
                let _ = entry.get_password();
                true
            }
            Err(_) => false,
        }
    }

    /// Store a secret and return the value to write into the profile
    ///
    /// With a keyring this is a `keyring:<key>` reference; otherwise the
    /// plaintext value itself.
    pub fn store_credential(&self, key: &str, value: &str) -> Result<String> {
        match self.storage {
            #[cfg(feature = "secure-storage")]
            CredentialStorage::Keyring => {
                let entry = keyring::Entry::new(SERVICE_NAME, key)
                    .map_err(|e| ConfigError::KeyringError(e.to_string()))?;
                entry.set_password(value).map_err(|e| {
                    ConfigError::KeyringError(format!("Failed to store '{key}' in keyring: {e}"))
                })?;
                Ok(format!("{KEYRING_PREFIX}{key}"))
            }
            CredentialStorage::Plaintext => {
                let _ = key;
                Ok(value.to_string())
            }
        }
    }

    /// Resolve a credential value
    ///
    /// Resolution order:
    /// 1. Environment variable (if `env_var` is given and set)
    /// 2. Keyring, for `keyring:` references
    /// 3. The value as-is
    pub fn get_credential(&self, value: &str, env_var: Option<&str>) -> Result<String> {
        if let Some(var) = env_var
            && let Ok(env_value) = env::var(var)
        {
            return Ok(env_value);
        }

        let Some(key) = value.strip_prefix(KEYRING_PREFIX) else {
            return Ok(value.to_string());
        };

        #[cfg(feature = "secure-storage")]
        {
            let entry = keyring::Entry::new(SERVICE_NAME, key)
                .map_err(|e| ConfigError::KeyringError(e.to_string()))?;
            entry.get_password().map_err(|e| {
                ConfigError::KeyringError(format!(
                    "Failed to retrieve credential '{key}' from keyring: {e}"
                ))
            })
        }
        #[cfg(not(feature = "secure-storage"))]
        {
            Err(ConfigError::CredentialError(format!(
                "Credential '{key}' references keyring but secure-storage feature is not enabled"
            )))
        }
    }

    /// Delete a stored secret; a missing entry is not an error
    pub fn delete_credential(&self, key: &str) -> Result<()> {
        match self.storage {
            #[cfg(feature = "secure-storage")]
            CredentialStorage::Keyring => {
                let entry = keyring::Entry::new(SERVICE_NAME, key)
                    .map_err(|e| ConfigError::KeyringError(e.to_string()))?;
                match entry.delete_credential() {
                    Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                    Err(e) => Err(ConfigError::KeyringError(format!(
                        "Failed to delete '{key}' from keyring: {e}"
                    ))),
                }
            }
            CredentialStorage::Plaintext => {
                let _ = key;
                Ok(())
            }
        }
    }

    pub fn is_keyring_reference(value: &str) -> bool {
        value.starts_with(KEYRING_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_plaintext_value_is_returned_as_is() {
        let store = CredentialStore::new();
        assert_eq!(store.get_credential("my-secret", None).unwrap(), "my-secret");
    }

    #[test]
    #[serial]
    fn test_env_var_override() {
        unsafe {
            env::set_var("FABRICCTL_TEST_CREDENTIAL", "env-value");
        }

        let store = CredentialStore::new();
        let result = store
            .get_credential("config-value", Some("FABRICCTL_TEST_CREDENTIAL"))
            .unwrap();
        assert_eq!(result, "env-value");

        unsafe {
            env::remove_var("FABRICCTL_TEST_CREDENTIAL");
        }
    }

    #[test]
    fn test_keyring_reference_detection() {
        assert!(CredentialStore::is_keyring_reference("keyring:client-secret"));
        assert!(!CredentialStore::is_keyring_reference("client-secret"));
        assert!(!CredentialStore::is_keyring_reference(""));
    }

    #[cfg(not(feature = "secure-storage"))]
    #[test]
    fn test_keyring_reference_without_feature_fails() {
        let store = CredentialStore::new();
        let err = store.get_credential("keyring:client-secret", None).unwrap_err();
        assert!(matches!(err, ConfigError::CredentialError(_)));
        assert_eq!(store.storage(), CredentialStorage::Plaintext);
    }

    #[cfg(feature = "secure-storage")]
    #[test]
    #[ignore = "Requires keyring service to be available"]
    fn test_keyring_round_trip() {
        let store = CredentialStore::new();
        let reference = store.store_credential("fabricctl-test", "s3cret").unwrap();
        assert!(reference.starts_with(KEYRING_PREFIX));
        assert_eq!(store.get_credential(&reference, None).unwrap(), "s3cret");
        let _ = store.delete_credential("fabricctl-test");
    }
}
