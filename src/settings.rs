use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dates::DisplayZone;
use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;

pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub slack: SlackSettings,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SlackSettings {
    pub api_base_url: String,
    pub history_page_limit: u16,
    pub replies_page_limit: u16,
    pub request_timeout_secs: u64,
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://slack.com/api".to_string(),
            history_page_limit: 200,
            replies_page_limit: 100,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExportSettings {
    pub output_root: PathBuf,
    pub history_page_delay_ms: u64,
    pub thread_page_delay_ms: u64,
    pub timezone: DisplayZone,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            history_page_delay_ms: 1000,
            thread_page_delay_ms: 500,
            timezone: DisplayZone::Local,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetrySettings {
    pub max_retries: u32,
    pub max_rate_limit_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub default_rate_limit_wait_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_rate_limit_retries: 10,
            base_backoff_ms: 1000,
            max_backoff_ms: 60_000,
            default_rate_limit_wait_secs: 30,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            max_rate_limit_retries: self.max_rate_limit_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            default_rate_limit_wait: Duration::from_secs(self.default_rate_limit_wait_secs),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file does
    /// not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        let settings: Settings =
            toml::from_str(&content).map_err(|e| AppError::TomlParse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::TomlSerialize(e.to_string()))?;
        fs::write(path, content).map_err(|e| AppError::WriteFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.slack.history_page_limit == 0 || self.slack.replies_page_limit == 0 {
            return Err(AppError::InvalidConfig(
                "page limits must be greater than zero".to_string(),
            ));
        }
        match url::Url::parse(&self.slack.api_base_url) {
            Ok(url) if url.scheme() == "https" => {}
            Ok(_) => {
                return Err(AppError::InvalidConfig(format!(
                    "api-base-url must use https: {}",
                    self.slack.api_base_url
                )));
            }
            Err(_) => {
                return Err(AppError::InvalidConfig(format!(
                    "api-base-url is not a valid URL: {}",
                    self.slack.api_base_url
                )));
            }
        }
        Ok(())
    }
}
