//! Structured lifecycle events for revision runs.
//!
//! `run_span` tags everything inside a run with its `run_id`; the `emit_*`
//! functions log one event each with a stable `event` field, so a JSON log
//! can be filtered by `event = "stage.completed"` and the like.

use tracing::{info, warn};

/// Span tagging every event of one run with its `run_id`.
///
/// Attach it with `tracing::Instrument` so it stays entered across awaits:
///
/// ```ignore
/// controller_future.instrument(run_span(&run_id)).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("redline.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, stages: usize, words: usize) {
    info!(event = "run.started", run_id = %run_id, stages = stages, words = words);
}

/// Run reached Done or Failed.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, final_state: &str, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        final_state = %final_state,
        success = success,
    );
}

pub fn emit_stage_started(run_id: &str, state: &str, participants: usize) {
    info!(
        event = "stage.started",
        run_id = %run_id,
        state = %state,
        participants = participants,
    );
}

/// One participant's output was accepted into the history.
pub fn emit_stage_completed(run_id: &str, state: &str, participant: &str, words: usize) {
    info!(
        event = "stage.completed",
        run_id = %run_id,
        state = %state,
        participant = %participant,
        words = words,
    );
}

/// A non-fatal contract deviation (warning level).
pub fn emit_validation_warning(run_id: &str, participant: &str, detail: &dyn std::fmt::Display) {
    warn!(
        event = "validation.warning",
        run_id = %run_id,
        participant = %participant,
        detail = %detail,
    );
}

/// A transcript append failed; the run continues (warning level).
pub fn emit_transcript_write_failed(run_id: &str, speaker: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "transcript.write_failed",
        run_id = %run_id,
        speaker = %speaker,
        error = %error,
    );
}
