//! Fan-out/fan-in of independent participants over one history snapshot.
//!
//! Every participant runs as its own task in a [`JoinSet`] and sees its own
//! copy of the same history. Fan-in is all-or-nothing: the first failure
//! aborts the siblings and waits for them to stop before returning, so no
//! call is left running. Results come back in participant order regardless
//! of which task finished first.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::domain::{CompletionError, ConversationHistory};
use crate::participant::Participant;

/// Why a fan-out round produced no results.
#[derive(Debug, thiserror::Error)]
pub enum FanOutError {
    #[error("completion error from {participant}: {source}")]
    Completion {
        participant: String,
        #[source]
        source: CompletionError,
    },

    #[error("participant {participant} panicked: {detail}")]
    Panicked { participant: String, detail: String },

    #[error("fan-out cancelled")]
    Cancelled,
}

/// One participant's reply from a fan-out round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutReply {
    pub participant: String,
    pub text: String,
}

enum TaskOutcome {
    Reply(String),
    Failed(CompletionError),
    Panicked(String),
}

type TaskOutput = (usize, String, TaskOutcome);

fn panic_detail(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run `participants` concurrently against `shared` and collect every reply.
///
/// Cancelling `cancel` aborts the round just like a participant failure.
#[instrument(skip_all, fields(width = participants.len(), turns = shared.len()))]
pub async fn run_parallel(
    participants: &[Participant],
    shared: &ConversationHistory,
    cancel: &CancellationToken,
) -> Result<Vec<FanOutReply>, FanOutError> {
    let mut join_set: JoinSet<TaskOutput> = JoinSet::new();

    for (idx, participant) in participants.iter().cloned().enumerate() {
        let snapshot = shared.snapshot();
        join_set.spawn(async move {
            let name = participant.name().to_string();
            match AssertUnwindSafe(participant.respond(&snapshot))
                .catch_unwind()
                .await
            {
                Ok(Ok(text)) => (idx, name, TaskOutcome::Reply(text)),
                Ok(Err(e)) => (idx, name, TaskOutcome::Failed(e)),
                Err(payload) => (idx, name, TaskOutcome::Panicked(panic_detail(payload))),
            }
        });
    }

    let mut slots: Vec<Option<String>> = vec![None; participants.len()];
    let outcome: Result<(), FanOutError> = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Err(FanOutError::Cancelled),
            joined = join_set.join_next() => match joined {
                None => break Ok(()),
                Some(Ok((idx, name, TaskOutcome::Reply(text)))) => {
                    debug!(participant = %name, "fan-out reply received");
                    slots[idx] = Some(text);
                }
                Some(Ok((_, name, TaskOutcome::Failed(source)))) => {
                    break Err(FanOutError::Completion { participant: name, source });
                }
                Some(Ok((_, name, TaskOutcome::Panicked(detail)))) => {
                    break Err(FanOutError::Panicked { participant: name, detail });
                }
                Some(Err(e)) if e.is_cancelled() => break Err(FanOutError::Cancelled),
                Some(Err(e)) => {
                    break Err(FanOutError::Panicked {
                        participant: "unknown".to_string(),
                        detail: e.to_string(),
                    });
                }
            },
        }
    };

    if let Err(e) = outcome {
        let in_flight = join_set.len();
        join_set.abort_all();
        while join_set.join_next().await.is_some() {}
        warn!(error = %e, aborted = in_flight, "fan-out round failed, siblings aborted");
        return Err(e);
    }

    Ok(participants
        .iter()
        .zip(slots)
        .map(|(p, text)| FanOutReply {
            participant: p.name().to_string(),
            text: text.unwrap_or_default(),
        })
        .collect())
}
