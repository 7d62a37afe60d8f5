//! Tuner configuration, persisted as TOML.
//!
//! Values are layered: built-in defaults, then the config file, then a few
//! environment overrides. The API key is never part of the file; only the
//! name of the environment variable holding it is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::TunerResult;
use crate::paths::TunerPaths;
use crate::translate::service::ServiceConfig;

/// Errors from loading or saving the config.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(tuner::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(tuner::config::parse),
        help("Check the TOML syntax. Run `effect-tuner init-config` to write a fresh default file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(tuner::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {key}: {message}")]
    #[diagnostic(
        code(tuner::config::invalid),
        help("Fix or unset the environment variable.")
    )]
    Invalid { key: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Reasoning service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Transport timeout for one request; the caller's deadline still
    /// applies when it is shorter.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_response_bytes() -> usize {
    64 * 1024
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

/// What to do when an adjustment is requested on an effect that is already
/// mid-cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    #[default]
    Reject,
}

/// Adjustment cycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustSection {
    /// Caller-side deadline when none is given explicitly.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

impl Default for AdjustSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            busy_policy: BusyPolicy::default(),
        }
    }
}

/// Full tuner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub adjust: AdjustSection,
}

impl TunerConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load from a TOML file, or return defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Defaults, then `explicit` (or the XDG config file), then environment
    /// overrides. Returns the config and the file location that was used.
    pub fn resolve(explicit: Option<&Path>) -> TunerResult<(Self, PathBuf)> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => TunerPaths::resolve()?.config_file(),
        };
        let mut config = Self::load_or_default(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok((config, path))
    }

    /// Apply `OPENAI_MODEL`, `OPENAI_TEMPERATURE` and `OPENAI_BASE_URL`.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<()> {
        if let Some(model) = lookup("OPENAI_MODEL").filter(|v| !v.trim().is_empty()) {
            self.service.model = model.trim().to_string();
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.service.base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup("OPENAI_TEMPERATURE").filter(|v| !v.trim().is_empty()) {
            self.service.temperature =
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "OPENAI_TEMPERATURE".into(),
                    message: format!("{raw:?} is not a number"),
                })?;
        }
        Ok(())
    }

    /// Whether the credential variable is set and non-empty.
    pub fn has_credential(&self) -> bool {
        std::env::var(&self.service.api_key_env)
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    /// Human-readable problems that would stop adjustments from working.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !self.has_credential() {
            issues.push(format!(
                "API key not set: export {} before running adjustments",
                self.service.api_key_env
            ));
        }
        if !(0.0..=2.0).contains(&self.service.temperature) {
            issues.push(format!(
                "service.temperature {} is outside [0, 2]",
                self.service.temperature
            ));
        }
        if self.service.timeout_secs == 0 {
            issues.push("service.timeout_secs must be greater than 0".into());
        }
        if self.adjust.default_timeout_secs == 0 {
            issues.push("adjust.default_timeout_secs must be greater than 0".into());
        }
        if self.service.max_response_bytes == 0 {
            issues.push("service.max_response_bytes must be greater than 0".into());
        }
        issues
    }

    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig {
            base_url: self.service.base_url.clone(),
            model: self.service.model.clone(),
            temperature: self.service.temperature,
            api_key_env: self.service.api_key_env.clone(),
            max_response_bytes: self.service.max_response_bytes,
            timeout: self.service_timeout(),
        }
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.adjust.default_timeout_secs)
    }
}
