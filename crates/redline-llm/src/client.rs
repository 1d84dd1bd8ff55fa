//! `Completion` over an OpenAI-compatible `/chat/completions` endpoint.
//!
//! Each call sends the participant's instructions as the system message and
//! replays the shared history: turns the participant spoke itself go out as
//! `assistant`, everyone else's as `user` tagged with the speaker's name.

use async_trait::async_trait;
use redline_core::{Completion, CompletionError, CompletionRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::error::Result;

/// Upper bound on the error body kept in `CompletionError::Service`.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Names must match `^[a-zA-Z0-9_-]+$` on most compatible servers.
fn wire_name(speaker: &str) -> String {
    speaker
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn build_request(model: &str, request: &CompletionRequest) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.history.len() + 1);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: request.system_instructions.clone(),
        name: None,
    });
    for turn in request.history.messages() {
        let own = turn.speaker == request.participant;
        messages.push(ChatMessage {
            role: if own { "assistant" } else { "user" }.to_string(),
            content: turn.content.clone(),
            name: (!own).then(|| wire_name(&turn.speaker)),
        });
    }
    ChatRequest {
        model: model.to_string(),
        temperature: request.sampling.temperature,
        messages,
    }
}

pub(crate) fn parse_response(body: &str) -> std::result::Result<String, CompletionError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Malformed(format!("invalid response body: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionError::Malformed("response has no message content".to_string()))
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

fn transport_error(err: reqwest::Error) -> CompletionError {
    if err.is_decode() || err.is_body() {
        CompletionError::Malformed(err.to_string())
    } else {
        CompletionError::Transient(err.to_string())
    }
}

/// HTTP completion backend.
pub struct OpenAiCompatClient {
    endpoint: Endpoint,
    http: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("redline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Completion for OpenAiCompatClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<String, CompletionError> {
        let url = self.endpoint.chat_url();
        let body = build_request(&self.endpoint.model, &request);
        debug!(
            participant = %request.participant,
            model = %self.endpoint.model,
            messages = body.messages.len(),
            "sending chat completion"
        );

        let mut call = self.http.post(&url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            call = call.bearer_auth(key);
        }
        let response = call.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            warn!(
                participant = %request.participant,
                status = status.as_u16(),
                "chat completion rejected"
            );
            return Err(CompletionError::Service {
                status: status.as_u16(),
                body: truncate(&text),
            });
        }
        parse_response(&text)
    }
}
