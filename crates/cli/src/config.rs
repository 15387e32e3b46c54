//! Configuration management for the CLI
//!
//! Values are layered: `~/.config/cromwell-tools/config.json`, then
//! `CROMWELL_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use cromwell_lib::storage::DEFAULT_STORAGE_ENDPOINT;
use cromwell_lib::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cromwell server URL
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Delay between status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// How long `submit` waits for the server to accept a workflow
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,

    /// OAuth bearer token for storage downloads
    #[serde(default)]
    pub storage_token: Option<String>,
}

fn default_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_poll_interval() -> u64 {
    3
}

fn default_timeout() -> u64 {
    15
}

fn default_storage_endpoint() -> String {
    DEFAULT_STORAGE_ENDPOINT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            api_version: default_api_version(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
            storage_endpoint: default_storage_endpoint(),
            storage_token: None,
        }
    }
}

impl Config {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path = Self::config_path().ok();
        Self::load_from(path.as_deref())
    }

    /// Load with an explicit config file; a missing file is not an error
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            );
        }

        let config = builder
            .add_source(config::Environment::with_prefix("CROMWELL"))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("cromwell-tools").join("config.json"))
    }

    /// Apply command-line overrides on top of file and environment values
    pub fn with_overrides(
        mut self,
        url: Option<String>,
        username: Option<String>,
        password: Option<String>,
        api_version: Option<String>,
    ) -> Self {
        if let Some(url) = url {
            self.url = url;
        }
        if username.is_some() {
            self.username = username;
        }
        if password.is_some() {
            self.password = password;
        }
        if let Some(version) = api_version {
            self.api_version = version;
        }
        self
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            api_version: self.api_version.clone(),
            ..Default::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
