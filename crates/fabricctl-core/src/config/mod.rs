//! Profiles for Fabric tooling
//!
// Allow nested config module - this is intentional for the config subsystem

#![allow(clippy::module_inception)]
//!
//! A TOML file holds named profiles, each carrying service principal
//! credentials, an optional token cache file, endpoint overrides for
//! sovereign clouds, and client tuning.
//!
//! # Features
//!
//! - Multiple named profiles with a default
//! - Secure credential storage using OS keyring (optional)
//! - Environment variable expansion in config files
//! - Environment overrides for the service principal
//! - Platform-specific config file locations

pub mod config;
pub mod credential;
pub mod error;
pub mod resilience;

// Re-export main types for convenience
pub use config::{Config, Profile};
pub use credential::{CredentialStorage, CredentialStore};
pub use error::{ConfigError, Result};
pub use resilience::{PollingConfig, ResilienceConfig};
