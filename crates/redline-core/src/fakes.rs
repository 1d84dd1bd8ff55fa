//! In-memory fakes for the completion capability and the transcript (testing only)
//!
//! `ScriptedCompletion` replays canned replies per participant and records
//! every request; `MemoryTranscript` keeps entries in memory and can be told
//! to fail writes.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{CompletionError, Message, RedlineError, Result};
use crate::participant::{Completion, CompletionRequest};
use crate::transcript::Transcript;

// ---------------------------------------------------------------------------
// ScriptedCompletion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(CompletionError),
    /// Never resolves; only cancellation ends the call.
    Hang,
}

#[derive(Debug, Default)]
struct Journal {
    requests: Vec<CompletionRequest>,
    completed: Vec<String>,
    aborted: Vec<String>,
}

/// Completion backend driven by per-participant scripts.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    delays: HashMap<String, Duration>,
    journal: Arc<Mutex<Journal>>,
}

/// Marks a call as aborted if it is dropped before finishing.
struct InFlight {
    participant: String,
    journal: Arc<Mutex<Journal>>,
    finished: AtomicBool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::SeqCst) {
            if let Ok(mut journal) = self.journal.lock() {
                journal.aborted.push(self.participant.clone());
            }
        }
    }
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, participant: &str, step: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(participant.to_string())
            .or_default()
            .push_back(step);
        self
    }

    /// Queue a successful reply.
    pub fn reply(self, participant: &str, text: impl Into<String>) -> Self {
        self.push(participant, Scripted::Reply(text.into()))
    }

    /// Queue a failure.
    pub fn fail(self, participant: &str, error: CompletionError) -> Self {
        self.push(participant, Scripted::Fail(error))
    }

    /// Queue a call that never completes.
    pub fn hang(self, participant: &str) -> Self {
        self.push(participant, Scripted::Hang)
    }

    /// Delay every call from `participant` by `delay` before it resolves.
    pub fn delay(mut self, participant: &str, delay: Duration) -> Self {
        self.delays.insert(participant.to_string(), delay);
        self
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.journal.lock().unwrap().requests.clone()
    }

    /// Participants whose calls resolved, in completion order.
    pub fn completion_order(&self) -> Vec<String> {
        self.journal.lock().unwrap().completed.clone()
    }

    /// Participants whose calls were dropped before resolving.
    pub fn aborted(&self) -> Vec<String> {
        self.journal.lock().unwrap().aborted.clone()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<String, CompletionError> {
        let participant = request.participant.clone();
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&participant)
            .and_then(VecDeque::pop_front);
        self.journal.lock().unwrap().requests.push(request);

        let guard = InFlight {
            participant: participant.clone(),
            journal: Arc::clone(&self.journal),
            finished: AtomicBool::new(false),
        };

        if let Some(delay) = self.delays.get(&participant) {
            tokio::time::sleep(*delay).await;
        }

        let outcome = match step {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(CompletionError::Malformed(format!(
                "no scripted response left for {participant}"
            ))),
        };

        guard.finished.store(true, Ordering::SeqCst);
        self.journal.lock().unwrap().completed.push(participant);
        outcome
    }
}

// ---------------------------------------------------------------------------
// MemoryTranscript
// ---------------------------------------------------------------------------

/// Transcript that keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryTranscript {
    entries: Mutex<Vec<Message>>,
    fail_writes: AtomicBool,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript whose every write fails.
    pub fn failing() -> Self {
        let transcript = Self::default();
        transcript.fail_writes.store(true, Ordering::SeqCst);
        transcript
    }

    pub fn entries(&self) -> Vec<Message> {
        self.entries.lock().unwrap().clone()
    }

    pub fn speakers(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.speaker.clone())
            .collect()
    }
}

impl Transcript for MemoryTranscript {
    fn record(&self, message: &Message) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RedlineError::Logging("disk full".to_string()));
        }
        self.entries.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        None
    }
}
