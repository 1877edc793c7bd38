//! Configuration management for Fabric tooling
//!
//! Configuration is stored in TOML format with support for multiple named
//! profiles. Values may reference environment variables, and credentials may
//! reference the OS keyring.

#[cfg(target_os = "macos")]
use directories::BaseDirs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::credential::{CLIENT_ID_ENV, CLIENT_SECRET_ENV, CredentialStore, TENANT_ID_ENV};
use super::error::{ConfigError, Result};
use super::resilience::ResilienceConfig;
use crate::auth::Credentials;
use crate::client::FabricClient;
use crate::progress::PollConfig;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Profile used when none is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// Map of profile name -> profile configuration
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// A service principal and the client settings that go with it
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Profile {
    pub client_id: String,
    /// Plaintext or `keyring:<key>`
    pub client_secret: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Plaintext or `keyring:<key>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Where the access token is cached between runs; `~` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub powerbi_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resilience: Option<ResilienceConfig>,
}

impl Profile {
    /// Profile with only the service principal set
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_id: tenant_id.into(),
            username: None,
            password: None,
            token_file: None,
            authority_host: None,
            fabric_base_url: None,
            powerbi_base_url: None,
            resilience: None,
        }
    }

    /// Resolve credentials (environment overrides, keyring references)
    pub fn resolve_credentials(&self) -> Result<Credentials> {
        let store = CredentialStore::new();
        let resolve = |value: &str, env_var: Option<&str>, what: &str| {
            store.get_credential(value, env_var).map_err(|e| {
                ConfigError::CredentialError(format!("Failed to resolve {what}: {e}"))
            })
        };

        let mut credentials = Credentials::new(
            resolve(&self.client_id, Some(CLIENT_ID_ENV), "client id")?,
            resolve(&self.client_secret, Some(CLIENT_SECRET_ENV), "client secret")?,
            resolve(&self.tenant_id, Some(TENANT_ID_ENV), "tenant id")?,
        );
        credentials.username = self.username.clone();
        credentials.password = self
            .password
            .as_deref()
            .map(|p| resolve(p, None, "password"))
            .transpose()?
            .map(Into::into);

        Ok(credentials)
    }

    /// Token file path with `~` and environment variables expanded
    pub fn token_file_path(&self) -> Option<PathBuf> {
        self.token_file
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }

    pub fn resilience(&self) -> ResilienceConfig {
        self.resilience.clone().unwrap_or_default()
    }

    /// Build an API client for this profile
    pub fn build_client(&self) -> Result<FabricClient> {
        let resilience = self.resilience();
        let mut builder = FabricClient::builder(self.resolve_credentials()?)
            .request_timeout(resilience.request_timeout())
            .poll_config(PollConfig::from(&resilience.polling))
            .settle_delay(resilience.settle_delay());

        if let Some(host) = &self.authority_host {
            builder = builder.authority_host(host);
        }
        if let Some(url) = &self.fabric_base_url {
            builder = builder.fabric_base_url(url);
        }
        if let Some(url) = &self.powerbi_base_url {
            builder = builder.powerbi_base_url(url);
        }
        if let Some(path) = self.token_file_path() {
            builder = builder.token_file(path);
        }

        Ok(builder.build()?)
    }
}

impl Config {
    /// Resolve which profile to use
    ///
    /// An explicit name must exist. Otherwise the default profile is used,
    /// then the first profile by name.
    pub fn resolve_profile(&self, explicit_profile: Option<&str>) -> Result<String> {
        if let Some(name) = explicit_profile {
            if !self.profiles.contains_key(name) {
                return Err(ConfigError::ProfileNotFound {
                    name: name.to_string(),
                });
            }
            return Ok(name.to_string());
        }

        if let Some(ref default) = self.default_profile {
            return Ok(default.clone());
        }

        self.list_profiles()
            .first()
            .map(|(name, _)| (*name).clone())
            .ok_or_else(|| ConfigError::NoProfiles {
                suggestion: format!(
                    "Add a [profiles.<name>] table to {} or set {CLIENT_ID_ENV}, {CLIENT_SECRET_ENV} and {TENANT_ID_ENV}.",
                    Self::config_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|_| "the config file".to_string())
                ),
            })
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })
    }

    /// Resolve a profile and build its client
    pub fn build_client(&self, explicit_profile: Option<&str>) -> Result<FabricClient> {
        let name = self.resolve_profile(explicit_profile)?;
        debug!(profile = %name, "building client");
        self.profile(&name)?.build_client()
    }

    /// Load configuration from the standard location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields an empty configuration.
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::LoadError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        let expanded_content = Self::expand_env_vars(&content);
        let config: Config = toml::from_str(&expanded_content)?;

        Ok(config)
    }

    /// Save configuration to the standard location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveError {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(config_path, content).map_err(|e| ConfigError::SaveError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        Ok(())
    }

    /// Set or update a profile
    pub fn set_profile(&mut self, name: String, profile: Profile) {
        self.profiles.insert(name, profile);
    }

    /// Remove a profile by name, clearing the default if it pointed there
    pub fn remove_profile(&mut self, name: &str) -> Option<Profile> {
        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        self.profiles.remove(name)
    }

    /// List all profiles sorted by name
    pub fn list_profiles(&self) -> Vec<(&String, &Profile)> {
        let mut profiles: Vec<_> = self.profiles.iter().collect();
        profiles.sort_by_key(|(name, _)| *name);
        profiles
    }

    /// Get the path to the configuration file
    ///
    /// On Linux: ~/.config/fabricctl/config.toml
    /// On macOS: ~/.config/fabricctl/config.toml if that directory exists,
    /// otherwise ~/Library/Application Support/com.fabricctl.fabricctl/config.toml
    /// On Windows: %APPDATA%\fabricctl\fabricctl\config.toml
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(base_dirs) = BaseDirs::new() {
                let linux_style_path = base_dirs
                    .home_dir()
                    .join(".config")
                    .join("fabricctl")
                    .join("config.toml");

                if linux_style_path.parent().is_some_and(Path::exists) {
                    return Ok(linux_style_path);
                }
            }
        }

        let proj_dirs = ProjectDirs::from("com", "fabricctl", "fabricctl")
            .ok_or(ConfigError::ConfigDirError)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Expand environment variables in configuration content
    ///
    /// Supports `${VAR}` and `${VAR:-default}`. Unset variables without a
    /// default are left as-is, so profiles that are never used do not need
    /// their variables set.
    ///
    /// ```toml
    /// client_secret = "${FABRIC_SP_SECRET}"
    /// fabric_base_url = "${FABRIC_API:-https://api.fabric.microsoft.com/v1}"
    /// ```
    fn expand_env_vars(content: &str) -> String {
        shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok())
            .into_owned()
    }
}
