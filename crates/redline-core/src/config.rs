//! Run configuration.
//!
//! Every field has a default. A TOML file can override any subset, and
//! `REDLINE_*` environment variables override the file.
//!
//! | Variable | Field |
//! |---|---|
//! | `REDLINE_INPUT` | `input_path` |
//! | `REDLINE_OUTPUT` | `output_path` |
//! | `REDLINE_LOG_DIR` | `log_dir` |
//! | `REDLINE_REQUIREMENTS_FILE` | `requirements_path` |
//! | `REDLINE_MAX_LENGTH` | `max_length` |
//! | `REDLINE_EDITOR_WORD_LIMIT` | `editor_word_limit` |
//! | `REDLINE_CALL_TIMEOUT_SECS` | `call_timeout_secs` (`0` disables) |
//! | `REDLINE_RETRY_ATTEMPTS` | `retry.max_attempts` |
//! | `REDLINE_STRICT_DECOMPOSITION` | `strict_decomposition` |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{RedlineError, Requirements, Result};
use crate::participant::RetryPolicy;

/// Sampling temperature per role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleTemperatures {
    pub decomposer: f32,
    pub conservative: f32,
    pub creative: f32,
    pub integrator: f32,
}

impl Default for RoleTemperatures {
    fn default() -> Self {
        Self {
            decomposer: 0.3,
            conservative: 0.3,
            creative: 0.7,
            integrator: 0.5,
        }
    }
}

impl RoleTemperatures {
    fn all(&self) -> [(&'static str, f32); 4] {
        [
            ("decomposer", self.decomposer),
            ("conservative", self.conservative),
            ("creative", self.creative),
            ("integrator", self.integrator),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedlineConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub log_dir: PathBuf,
    /// Inline requirements; ignored when `requirements_path` is set.
    pub requirements: Vec<String>,
    pub requirements_path: Option<PathBuf>,
    /// Word ceiling for the final version.
    pub max_length: usize,
    /// Word ceiling for each editor's version.
    pub editor_word_limit: usize,
    pub temperatures: RoleTemperatures,
    pub call_timeout_secs: Option<u64>,
    pub retry: RetryPolicy,
    /// Treat a decomposer response without numbered items as fatal.
    pub strict_decomposition: bool,
}

impl Default for RedlineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("article.txt"),
            output_path: PathBuf::from("Final.txt"),
            log_dir: PathBuf::from("log"),
            requirements: Vec::new(),
            requirements_path: None,
            max_length: 200,
            editor_word_limit: 250,
            temperatures: RoleTemperatures::default(),
            call_timeout_secs: Some(120),
            retry: RetryPolicy::default(),
            strict_decomposition: false,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| RedlineError::Config(format!("{key}={raw:?}: {e}")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RedlineError::Config(format!(
            "{key}={other:?}: expected true or false"
        ))),
    }
}

impl RedlineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| RedlineError::Config(e.to_string()))
    }

    /// Read a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RedlineError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `REDLINE_*` overrides from an arbitrary lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REDLINE_INPUT") {
            self.input_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REDLINE_OUTPUT") {
            self.output_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REDLINE_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REDLINE_REQUIREMENTS_FILE") {
            self.requirements_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("REDLINE_MAX_LENGTH") {
            self.max_length = parse_var("REDLINE_MAX_LENGTH", &v)?;
        }
        if let Some(v) = lookup("REDLINE_EDITOR_WORD_LIMIT") {
            self.editor_word_limit = parse_var("REDLINE_EDITOR_WORD_LIMIT", &v)?;
        }
        if let Some(v) = lookup("REDLINE_CALL_TIMEOUT_SECS") {
            let secs: u64 = parse_var("REDLINE_CALL_TIMEOUT_SECS", &v)?;
            self.call_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(v) = lookup("REDLINE_RETRY_ATTEMPTS") {
            self.retry.max_attempts = parse_var("REDLINE_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("REDLINE_STRICT_DECOMPOSITION") {
            self.strict_decomposition = parse_flag("REDLINE_STRICT_DECOMPOSITION", &v)?;
        }
        Ok(self)
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(RedlineError::Config("max_length must be positive".into()));
        }
        if self.editor_word_limit == 0 {
            return Err(RedlineError::Config(
                "editor_word_limit must be positive".into(),
            ));
        }
        for (role, t) in self.temperatures.all() {
            if !(0.0..=2.0).contains(&t) {
                return Err(RedlineError::Config(format!(
                    "temperature for {role} is {t}; expected 0.0..=2.0"
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(RedlineError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    /// The requirement list: the requirements file when set, otherwise the
    /// inline list. An empty result is an input error.
    pub fn load_requirements(&self) -> Result<Requirements> {
        let requirements = match &self.requirements_path {
            Some(path) => Requirements::load(path)?,
            None => Requirements::new(&self.requirements),
        };
        if requirements.is_empty() {
            return Err(RedlineError::InvalidInput(
                "no editing requirements supplied".to_string(),
            ));
        }
        Ok(requirements)
    }
}
