//! Application configuration.
//!
//! # Responsibility
//! - Resolve service endpoint, key and resource names from the environment.
//! - Hand one explicit value to the repository constructor; no process globals.
//!
//! # Invariants
//! - Blank environment values are treated as unset.
//! - The authorization key never appears in `Debug` output.

use std::fmt::{Debug, Formatter};

pub const HOST_ENV: &str = "HOST";
pub const AUTH_KEY_ENV: &str = "AUTH_KEY";
pub const DATABASE_ID_ENV: &str = "DATABASE_ID";
pub const COLLECTION_ID_ENV: &str = "COLLECTION_ID";

pub const DEFAULT_HOST: &str = "[document service endpoint URI]";
pub const DEFAULT_AUTH_KEY: &str = "[document service primary key]";
pub const DEFAULT_DATABASE_ID: &str = "ToDoList";
pub const DEFAULT_COLLECTION_ID: &str = "Items";

/// Connection and resource naming settings.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub auth_key: String,
    pub database_id: String,
    pub collection_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            auth_key: DEFAULT_AUTH_KEY.to_string(),
            database_id: DEFAULT_DATABASE_ID.to_string(),
            collection_id: DEFAULT_COLLECTION_ID.to_string(),
        }
    }
}

impl AppConfig {
    /// Reads overrides from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves every setting through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let resolve = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            host: resolve(HOST_ENV, DEFAULT_HOST),
            auth_key: resolve(AUTH_KEY_ENV, DEFAULT_AUTH_KEY),
            database_id: resolve(DATABASE_ID_ENV, DEFAULT_DATABASE_ID),
            collection_id: resolve(COLLECTION_ID_ENV, DEFAULT_COLLECTION_ID),
        }
    }

    /// Returns whether host or key still hold their placeholder defaults.
    pub fn uses_placeholder_credentials(&self) -> bool {
        self.host == DEFAULT_HOST || self.auth_key == DEFAULT_AUTH_KEY
    }
}

impl Debug for AppConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("auth_key", &"<redacted>")
            .field("database_id", &self.database_id)
            .field("collection_id", &self.collection_id)
            .finish()
    }
}
