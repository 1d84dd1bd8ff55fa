//! Participants: role-bound wrappers over the completion capability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{
    CompletionError, ConversationHistory, ParticipantProfile, Requirements, SamplingParams,
};

/// Everything the completion capability sees for one call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Name of the participant asking; backends use it to tell the
    /// participant's own turns apart from everyone else's.
    pub participant: String,
    pub system_instructions: String,
    pub history: ConversationHistory,
    pub sampling: SamplingParams,
}

/// The external text-completion capability.
///
/// Implementations may be non-deterministic; two identical requests can
/// yield different text.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Bounded retry with exponential backoff for retryable completion errors.
///
/// `max_attempts = 1` (the default) disables retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    /// Delay before retry number `attempt` (1-based count of failures so far).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

/// A named role with a fixed profile. Holds no per-run state.
#[derive(Clone)]
pub struct Participant {
    profile: Arc<ParticipantProfile>,
    instructions: Arc<str>,
    backend: Arc<dyn Completion>,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.profile.name)
            .field("role", &self.profile.role)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Participant {
    pub fn new(
        profile: ParticipantProfile,
        requirements: &Requirements,
        backend: Arc<dyn Completion>,
    ) -> Self {
        let instructions = profile.render_instructions(requirements);
        Self {
            profile: Arc::new(profile),
            instructions: instructions.into(),
            backend,
            timeout: None,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &ParticipantProfile {
        &self.profile
    }

    /// Produce this participant's next turn for the given history.
    pub async fn respond(&self, history: &ConversationHistory) -> Result<String, CompletionError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.call_once(history).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        participant = %self.profile.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(&self, history: &ConversationHistory) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            participant: self.profile.name.clone(),
            system_instructions: self.instructions.to_string(),
            history: history.snapshot(),
            sampling: self.profile.sampling,
        };
        debug!(
            participant = %self.profile.name,
            turns = request.history.len(),
            temperature = request.sampling.temperature,
            "requesting completion"
        );

        let call = self.backend.complete(request);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| CompletionError::Timeout {
                    after_ms: limit.as_millis() as u64,
                })?,
            None => call.await,
        }
    }
}
