use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "memoize";
const CONFIG_FILE: &str = "config.json";

/// Default API base for local development against `memoize serve`.
pub const DEFAULT_API_URL: &str = "http://localhost:17010/api";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the notes API, including the `/api` prefix.
    pub api_url: String,
    /// Where the local database lives. Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
    /// Timeout applied to every API request.
    pub request_timeout_secs: u64,
    /// How often the connectivity probe checks the API.
    pub probe_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_dir: None,
            request_timeout_secs: 10,
            probe_interval_secs: 15,
        }
    }
}

impl Config {
    /// Load configuration from the user's config directory, then apply
    /// `MEMOIZE_API_URL` / `MEMOIZE_DATA_DIR` overrides.
    /// Falls back to defaults if the file doesn't exist or fails to parse.
    pub fn load() -> Self {
        let config = match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// The config file alone, without environment overrides. A missing file
    /// reads as defaults; an unreadable one is an error.
    pub fn try_load() -> Result<Self> {
        Self::read_from(&get_config_path()?)
    }

    fn read_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse config file")
    }

    fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = var("MEMOIZE_API_URL").filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(dir) = var("MEMOIZE_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Save the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Set one field by its file key. An empty `data_dir` resets it to the
    /// platform default.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_url" => self.api_url = value.to_string(),
            "data_dir" if value.is_empty() => self.data_dir = None,
            "data_dir" => self.data_dir = Some(PathBuf::from(value)),
            "request_timeout_secs" => {
                self.request_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number of seconds: {}", value))?;
            }
            "probe_interval_secs" => {
                self.probe_interval_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number of seconds: {}", value))?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    /// Path of the local SQLite file.
    pub fn database_path(&self) -> Result<PathBuf> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => crate::db::default_data_dir()?,
        };
        Ok(dir.join("memoize.db"))
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
