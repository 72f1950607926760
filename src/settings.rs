//! Persistent settings for the mobile-agent CLI.
//! Stored in the platform-specific config directory via `directories::ProjectDirs`,
//! then overridden by environment variables.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::AgentConfig;
use crate::config::Lang;
use crate::device::DeviceKind;
use crate::model::{
    ModelConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS, DEFAULT_TIMEOUT_SECS,
};

const SETTINGS_FILE: &str = "settings.json";

/// Settings errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot determine config directory")]
    NoConfigDir,
    #[error("Settings I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Application settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Model API base URL
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    /// Maximum attempts for transient model failures
    pub max_retries: u32,
    /// Retry delay in seconds
    pub retry_delay: u64,
    /// Per-request timeout in seconds
    pub timeout: u64,
    pub device_type: DeviceKind,
    /// Device serial or HDC target; empty selects the only connected device
    pub device_id: String,
    /// WebDriverAgent URL for iOS
    pub wda_url: String,
    pub lang: Lang,
    /// Maximum steps for agent
    pub max_steps: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: "autoglm-phone-9b".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            timeout: DEFAULT_TIMEOUT_SECS,
            device_type: DeviceKind::Adb,
            device_id: String::new(),
            wda_url: crate::device::DEFAULT_WDA_URL.to_string(),
            lang: Lang::Cn,
            max_steps: 100,
        }
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "moderras", "mobile-agent")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join(SETTINGS_FILE))
    }

    /// Load saved settings, then apply `.env` and environment overrides.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = match Self::settings_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };

        // A missing .env file is fine
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Ignoring .env: {}", e);
            }
        }
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Load settings from a file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply overrides from a variable lookup such as `std::env::var`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MODEL_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("MODEL_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = get("MODEL_NAME") {
            self.model_name = v;
        }
        if let Some(v) = get("MODEL_MAX_RETRIES") {
            self.max_retries = parse_value("MODEL_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("MODEL_RETRY_DELAY") {
            self.retry_delay = parse_value("MODEL_RETRY_DELAY", &v)?;
        }
        if let Some(v) = get("MODEL_TIMEOUT") {
            self.timeout = parse_value("MODEL_TIMEOUT", &v)?;
        }
        if let Some(v) = get("DEVICE_TYPE") {
            self.device_type = parse_value("DEVICE_TYPE", &v)?;
        }
        if let Some(v) = get("DEVICE_ID") {
            self.device_id = v;
        }
        if let Some(v) = get("WDA_URL") {
            self.wda_url = v;
        }
        if let Some(v) = get("AGENT_LANG") {
            self.lang = parse_value("AGENT_LANG", &v)?;
        }
        if let Some(v) = get("AGENT_MAX_STEPS") {
            self.max_steps = parse_value("AGENT_MAX_STEPS", &v)?;
        }
        Ok(())
    }

    /// Save settings to the config file, returning its path.
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Device ID, if one was configured.
    pub fn device_id(&self) -> Option<String> {
        Some(self.device_id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn to_model_config(&self) -> ModelConfig {
        ModelConfig::default()
            .with_base_url(&self.base_url)
            .with_api_key(&self.api_key)
            .with_model_name(&self.model_name)
            .with_max_retries(self.max_retries)
            .with_retry_delay(self.retry_delay)
            .with_timeout(self.timeout)
    }

    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig::default()
            .with_lang(self.lang)
            .with_max_steps(self.max_steps)
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, SettingsError>
where
    T: std::str::FromStr,
{
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("mobile-agent-{}", uuid::Uuid::new_v4()))
            .join(SETTINGS_FILE)
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = AppSettings::default();
        settings
            .apply_overrides(lookup(&[
                ("MODEL_BASE_URL", "http://gpu:8000/v1"),
                ("MODEL_MAX_RETRIES", "5"),
                ("DEVICE_TYPE", "ios"),
                ("AGENT_LANG", "en"),
                ("AGENT_MAX_STEPS", "20"),
                ("DEVICE_ID", "  "),
            ]))
            .unwrap();

        assert_eq!(settings.base_url, "http://gpu:8000/v1");
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.device_type, DeviceKind::Wda);
        assert_eq!(settings.lang, Lang::En);
        assert_eq!(settings.max_steps, 20);
        assert_eq!(settings.device_id(), None);
    }

    #[test]
    fn test_invalid_override_is_reported() {
        let mut settings = AppSettings::default();
        let err = settings
            .apply_overrides(lookup(&[("AGENT_MAX_STEPS", "many")]))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue { key: "AGENT_MAX_STEPS", .. }
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path();
        let settings = AppSettings {
            device_type: DeviceKind::Hdc,
            device_id: "FMR0223".to_string(),
            max_steps: 7,
            ..Default::default()
        };
        settings.save_to(&path).unwrap();

        let loaded = AppSettings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.device_id(), Some("FMR0223".to_string()));

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let loaded = AppSettings::load_from(&temp_path()).unwrap();
        assert_eq!(loaded, AppSettings::default());
    }

    #[test]
    fn test_older_file_keeps_defaults_for_new_fields() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"model_name": "custom", "lang": "en"}"#).unwrap();
        assert_eq!(settings.model_name, "custom");
        assert_eq!(settings.lang, Lang::En);
        assert_eq!(settings.max_steps, 100);
        assert_eq!(settings.device_type, DeviceKind::Adb);
    }

    #[test]
    fn test_conversions() {
        let settings = AppSettings {
            timeout: 30,
            max_steps: 12,
            lang: Lang::En,
            ..Default::default()
        };
        let model = settings.to_model_config();
        assert_eq!(model.timeout_secs, 30);
        assert_eq!(model.model_name, "autoglm-phone-9b");

        let agent = settings.to_agent_config();
        assert_eq!(agent.max_steps, 12);
        assert_eq!(agent.lang, Lang::En);
    }
}
