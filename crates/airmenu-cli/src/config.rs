//! Configuration file management.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use airmenu_core::client::{DEFAULT_BASE_URL, DEFAULT_TOKEN_URL, Endpoints};

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Airthings API endpoints.
    pub api: ApiConfig,
    /// Where credentials and the focused metric are kept.
    pub settings: SettingsConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults if absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path = path.to_path_buf();
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Check every field and report all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.api.validate());
        errors.extend(self.settings.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// API endpoints for the HTTP client.
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        Endpoints::new(&self.api.base_url, &self.api.token_url).map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: "api".to_string(),
                message: e.to_string(),
            }])
        })
    }
}

/// API endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        [("api.base_url", &self.base_url), ("api.token_url", &self.token_url)]
            .into_iter()
            .filter_map(|(field, url)| {
                let message = if url.is_empty() {
                    "URL cannot be empty".to_string()
                } else if !url.starts_with("http://") && !url.starts_with("https://") {
                    format!("'{}' must start with http:// or https://", url)
                } else {
                    return None;
                };
                Some(ValidationError {
                    field: field.to_string(),
                    message,
                })
            })
            .collect()
    }
}

/// Settings file configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Path of the settings file.
    pub path: PathBuf,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

impl SettingsConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "settings.path".to_string(),
                message: "path cannot be empty".to_string(),
            });
        }
        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {}", list(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `api.base_url`).
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn list(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ValidationError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airmenu")
}

/// Default configuration file path.
fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default settings file path.
fn default_settings_path() -> PathBuf {
    config_dir().join("settings.toml")
}
