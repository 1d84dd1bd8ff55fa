//! Endpoint configuration.
//!
//! The endpoint list is a JSON array in the common `OAI_CONFIG_LIST` shape:
//!
//! ```json
//! [{ "model": "gpt-4o", "api_key": "sk-...", "base_url": "https://api.openai.com/v1" }]
//! ```
//!
//! `api_key` may be omitted, in which case `OPENAI_API_KEY` is used.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LlmError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// One chat-completion endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Endpoint {
    pub fn new(model: &str, base_url: &str) -> Self {
        Self {
            model: model.to_string(),
            api_key: None,
            base_url: base_url.to_string(),
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Endpoint from `REDLINE_MODEL`, `OPENAI_BASE_URL` and `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            model: std::env::var("REDLINE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| default_base_url()),
        }
    }

    /// Fill a missing key from `OPENAI_API_KEY`.
    pub fn with_env_key_fallback(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        self
    }

    /// `<base_url>/chat/completions`, tolerating a trailing slash.
    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Parse an endpoint list.
pub fn parse_config_list(raw: &str) -> Result<Vec<Endpoint>> {
    Ok(serde_json::from_str(raw)?)
}

/// Read an endpoint list file.
pub fn load_config_list(path: &Path) -> Result<Vec<Endpoint>> {
    let raw = std::fs::read_to_string(path).map_err(|source| LlmError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_list(&raw)
}

/// Pick the first endpoint, or the first one serving `model`.
pub fn select_endpoint(list: Vec<Endpoint>, model: Option<&str>) -> Result<Endpoint> {
    match model {
        Some(wanted) => list
            .into_iter()
            .find(|e| e.model == wanted)
            .ok_or_else(|| LlmError::UnknownModel(wanted.to_string())),
        None => list.into_iter().next().ok_or(LlmError::EmptyList),
    }
}
