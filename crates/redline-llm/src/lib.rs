//! OpenAI-compatible completion backend for redline.
//!
//! [`OpenAiCompatClient`] implements [`redline_core::Completion`] over any
//! server speaking the `/chat/completions` protocol. Endpoints come from an
//! `OAI_CONFIG_LIST`-style JSON file or from the environment.

pub mod client;
pub mod endpoint;
pub mod error;

pub use client::OpenAiCompatClient;
pub use endpoint::{
    load_config_list, parse_config_list, select_endpoint, Endpoint, DEFAULT_BASE_URL,
};
pub use error::{LlmError, Result};
