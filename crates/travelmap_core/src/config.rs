//! Hosted backend client configuration.
//!
//! # Responsibility
//! - Describe where the hosted record table lives and which public key to send.
//! - Load settings from environment variables or a JSON file.
//!
//! # Invariants
//! - `base_url` is an absolute `http`/`https` URL.
//! - `anon_key` is never empty and never printed by `Debug`.
//! - `table` is a plain lowercase identifier.

use reqwest::Url;
use serde::Deserialize;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use thiserror::Error;

pub const ENV_BASE_URL: &str = "TRAVELMAP_SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "TRAVELMAP_SUPABASE_ANON_KEY";
pub const ENV_TABLE: &str = "TRAVELMAP_TABLE";
pub const DEFAULT_TABLE: &str = "destinations";

const REST_PATH: &str = "rest/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid backend url `{0}`")]
    InvalidUrl(String),
    #[error("anon key cannot be empty")]
    EmptyAnonKey,
    #[error("invalid table name `{0}`")]
    InvalidTable(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Connection settings for the hosted record backend.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Project URL, e.g. `https://<project>.supabase.co`.
    pub base_url: String,
    /// Public (anon) API key sent as `apikey`.
    pub anon_key: String,
    #[serde(default = "default_table")]
    pub table: String,
}

impl ClientConfig {
    /// Builds and validates a config.
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            table: default_table(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let config = Self {
            base_url: read(ENV_BASE_URL).ok_or(ConfigError::Missing(ENV_BASE_URL))?,
            anon_key: read(ENV_ANON_KEY).ok_or(ConfigError::Missing(ENV_ANON_KEY))?,
            table: read(ENV_TABLE).unwrap_or_else(default_table),
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(self.base_url.trim())
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }
        if self.anon_key.trim().is_empty() {
            return Err(ConfigError::EmptyAnonKey);
        }
        if !is_valid_table_name(&self.table) {
            return Err(ConfigError::InvalidTable(self.table.clone()));
        }
        Ok(())
    }

    /// Full REST endpoint for the record table.
    pub fn table_url(&self) -> String {
        format!(
            "{}/{REST_PATH}/{}",
            self.base_url.trim().trim_end_matches('/'),
            self.table
        )
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("anon_key", &"<redacted>")
            .field("table", &self.table)
            .finish()
    }
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn is_valid_table_name(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_lowercase() || first == '_')
        && chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, ConfigError, ENV_ANON_KEY, ENV_BASE_URL, ENV_TABLE};
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_applies_default_table() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_BASE_URL, "https://demo.supabase.co/"),
            (ENV_ANON_KEY, "anon"),
        ]))
        .expect("config should load");
        assert_eq!(config.table, "destinations");
        assert_eq!(
            config.table_url(),
            "https://demo.supabase.co/rest/v1/destinations"
        );
    }

    #[test]
    fn from_lookup_reports_missing_keys() {
        let err = ClientConfig::from_lookup(lookup_from(&[(ENV_BASE_URL, "https://x.dev")]))
            .expect_err("anon key is required");
        assert!(matches!(err, ConfigError::Missing(key) if key == ENV_ANON_KEY));
    }

    #[test]
    fn validate_rejects_bad_url_and_table() {
        assert!(matches!(
            ClientConfig::new("ftp://example.com", "anon").unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));

        let err = ClientConfig::from_lookup(lookup_from(&[
            (ENV_BASE_URL, "https://x.dev"),
            (ENV_ANON_KEY, "anon"),
            (ENV_TABLE, "dest;drop"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTable(_)));
    }

    #[test]
    fn json_config_parses_and_redacts_key_in_debug() {
        let config = ClientConfig::from_json_str(
            r#"{"base_url": "http://localhost:54321", "anon_key": "super-secret"}"#,
        )
        .unwrap();
        assert_eq!(config.table, "destinations");
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn json_file_loads_and_reports_missing_or_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("travelmap.json");
        std::fs::write(
            &path,
            r#"{"base_url": "https://demo.supabase.co", "anon_key": "anon", "table": "trips"}"#,
        )
        .unwrap();

        let config = ClientConfig::from_json_file(&path).unwrap();
        assert_eq!(config.table_url(), "https://demo.supabase.co/rest/v1/trips");

        let missing = ClientConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));

        std::fs::write(&path, r#"{"base_url": "https://demo.supabase.co", "anon_key": ""}"#)
            .unwrap();
        let empty_key = ClientConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(empty_key, ConfigError::EmptyAnonKey));
    }
}
