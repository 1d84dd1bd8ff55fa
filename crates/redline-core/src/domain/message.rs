//! Messages and the append-only conversation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role tag attached to every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    Admin,
    Decomposer,
    Editor,
    Integrator,
    System,
}

impl std::fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpeakerRole::Admin => "admin",
            SpeakerRole::Decomposer => "decomposer",
            SpeakerRole::Editor => "editor",
            SpeakerRole::Integrator => "integrator",
            SpeakerRole::System => "system",
        };
        write!(f, "{s}")
    }
}

/// A single turn in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub speaker: String,
    pub role: SpeakerRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(speaker: impl Into<String>, role: SpeakerRole, content: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only sequence of messages.
///
/// Insertion order is the turn order replayed to every participant. There is
/// no way to edit or remove a message once appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a history with a single seed message.
    pub fn seeded(seed: Message) -> Self {
        Self {
            messages: vec![seed],
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Independent copy handed to participants; later appends to `self` are
    /// not visible through it.
    pub fn snapshot(&self) -> ConversationHistory {
        self.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Count of messages carrying the given role tag.
    pub fn count_role(&self, role: SpeakerRole) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}
