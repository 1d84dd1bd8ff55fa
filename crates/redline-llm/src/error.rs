//! Error types for redline-llm

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring a completion backend.
///
/// Errors during a call are reported as
/// [`CompletionError`](redline_core::CompletionError) instead.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("cannot read endpoint list {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid endpoint list: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("endpoint list is empty")]
    EmptyList,

    #[error("no endpoint configured for model {0}")]
    UnknownModel(String),

    #[error("HTTP client error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
