// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration: the YAML source list and process settings.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default delay between sync cycles (seconds).
pub const DEFAULT_INTERVAL_SECS: u64 = 600;

/// Default destination URL.
pub const DEFAULT_DEST_URL: &str = "http://localhost:8086";

/// Default destination organization.
pub const DEFAULT_DEST_ORG: &str = "maybell";

/// Default timeout (seconds) for destination requests and for connecting to
/// sources. Source query bodies are streamed without a total timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "DBDIR";
/// Environment variable overriding the destination URL.
pub const ENV_DEST_URL: &str = "CENTRALDB_DEST_URL";
/// Environment variable overriding the destination organization.
pub const ENV_DEST_ORG: &str = "CENTRALDB_DEST_ORG";
/// Environment variable holding the destination token.
pub const ENV_DEST_TOKEN: &str = "CENTRALDB_DEST_TOKEN";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One source store to replicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique name; also the destination bucket name.
    pub name: String,
    /// InfluxDB URL (e.g., "http://fridge-a.local:8086").
    pub url: String,
    /// Authentication token.
    pub token: String,
    /// InfluxDB organization.
    pub org: String,
    /// Bucket to read from.
    pub bucket: String,
}

/// Contents of the source list file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Sources, synced in this order.
    pub sources: Vec<SourceConfig>,
    /// Delay between sync cycles (seconds).
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl SourcesConfig {
    /// Parse and validate from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: SourcesConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Delay between sync cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == 0 {
            return Err(ConfigError::Invalid("interval must be at least 1 second".into()));
        }

        let mut names = HashSet::new();
        for (i, source) in self.sources.iter().enumerate() {
            for (key, value) in [
                ("name", &source.name),
                ("url", &source.url),
                ("org", &source.org),
                ("bucket", &source.bucket),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "Source {} has an empty '{}'",
                        i, key
                    )));
                }
            }

            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Source name '{}' is used more than once",
                    source.name
                )));
            }
        }

        Ok(())
    }
}

/// Provides the source list at the start of every cycle.
pub trait SourceLoader {
    fn load(&self) -> Result<SourcesConfig, ConfigError>;
}

/// Loads the source list from a YAML file, re-reading it on every call.
#[derive(Debug, Clone)]
pub struct SourcesFile {
    path: PathBuf,
}

impl SourcesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceLoader for SourcesFile {
    fn load(&self) -> Result<SourcesConfig, ConfigError> {
        SourcesConfig::from_file(&self.path)
    }
}

impl<F> SourceLoader for F
where
    F: Fn() -> Result<SourcesConfig, ConfigError>,
{
    fn load(&self) -> Result<SourcesConfig, ConfigError> {
        self()
    }
}

/// Connection settings for the central (destination) store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationConfig {
    /// InfluxDB URL.
    pub url: String,
    /// InfluxDB organization.
    pub org: String,
    /// Authentication token.
    pub token: String,
}

/// Process settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Directory holding the cursor database.
    pub data_dir: PathBuf,
    /// Destination store.
    pub destination: DestinationConfig,
    /// Destination request timeout, also used as the source connect timeout.
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(None),
            destination: DestinationConfig {
                url: DEFAULT_DEST_URL.to_string(),
                org: DEFAULT_DEST_ORG.to_string(),
                token: String::new(),
            },
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

fn default_data_dir(home: Option<String>) -> PathBuf {
    home.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".centraldb")
}

impl Settings {
    /// Create a new settings builder.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Settings {
            data_dir: non_empty(ENV_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| default_data_dir(non_empty("HOME"))),
            destination: DestinationConfig {
                url: non_empty(ENV_DEST_URL).unwrap_or(defaults.destination.url),
                org: non_empty(ENV_DEST_ORG).unwrap_or(defaults.destination.org),
                token: non_empty(ENV_DEST_TOKEN).unwrap_or(defaults.destination.token),
            },
            request_timeout: defaults.request_timeout,
        }
    }
}

/// Settings builder; unset values fall back to the given base settings.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    base: Option<Settings>,
    data_dir: Option<PathBuf>,
    dest_url: Option<String>,
    dest_org: Option<String>,
    dest_token: Option<String>,
    request_timeout: Option<Duration>,
}

impl SettingsBuilder {
    /// Start from these settings instead of the defaults.
    pub fn base(mut self, base: Settings) -> Self {
        self.base = Some(base);
        self
    }

    /// Set the data directory.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the destination URL.
    pub fn dest_url(mut self, url: impl Into<String>) -> Self {
        self.dest_url = Some(url.into());
        self
    }

    /// Set the destination organization.
    pub fn dest_org(mut self, org: impl Into<String>) -> Self {
        self.dest_org = Some(org.into());
        self
    }

    /// Set the destination token.
    pub fn dest_token(mut self, token: impl Into<String>) -> Self {
        self.dest_token = Some(token.into());
        self
    }

    /// Set the HTTP request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the settings.
    pub fn build(self) -> Settings {
        let base = self.base.unwrap_or_default();

        Settings {
            data_dir: self.data_dir.unwrap_or(base.data_dir),
            destination: DestinationConfig {
                url: self.dest_url.unwrap_or(base.destination.url),
                org: self.dest_org.unwrap_or(base.destination.org),
                token: self.dest_token.unwrap_or(base.destination.token),
            },
            request_timeout: self.request_timeout.unwrap_or(base.request_timeout),
        }
    }
}
