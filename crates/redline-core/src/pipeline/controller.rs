//! The pipeline state machine.
//!
//! ```text
//! Init → Decompose → FanOutEdit → FanInEdit → Integrate → Extract → Done
//!   └──────────┴───────────┴───────────┴──────────┴──────────┴────→ Failed
//! ```
//!
//! The controller owns the history and is its only writer. A stage's output is
//! validated before anything is appended, so a failed stage leaves no partial
//! trace in the history. Transcript failures are reported and the run goes on.
//! [`PipelineController::run`] never returns an error: every run ends in a
//! [`RunReport`] whose outcome is either Done or Failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use super::stage::{StageKind, StagePlan, StageSpec, ViolationPolicy};
use crate::config::RedlineConfig;
use crate::contract::{validate_format, ValidationResult};
use crate::domain::{
    admin_brief, word_count, CompletionError, ConversationHistory, Document, ErrorKind, Message,
    RedlineError, Requirements, Result, SpeakerRole,
};
use crate::extract::{extract_final_version, Extraction};
use crate::fanout::{run_parallel, FanOutError};
use crate::obs;
use crate::participant::{Completion, Participant, RetryPolicy};
use crate::transcript::Transcript;

/// Speaker name of the seed message.
pub const ADMIN: &str = "Admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Init,
    Decompose,
    FanOutEdit,
    FanInEdit,
    Integrate,
    Extract,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Init => "Init",
            PipelineState::Decompose => "Decompose",
            PipelineState::FanOutEdit => "FanOutEdit",
            PipelineState::FanInEdit => "FanInEdit",
            PipelineState::Integrate => "Integrate",
            PipelineState::Extract => "Extract",
            PipelineState::Done => "Done",
            PipelineState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    fn entered_by(kind: StageKind) -> Self {
        match kind {
            StageKind::Decompose => PipelineState::Decompose,
            StageKind::Edit => PipelineState::FanOutEdit,
            StageKind::Integrate => PipelineState::Integrate,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted participant output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub state: PipelineState,
    pub participant: String,
    pub validation: ValidationResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunArtifacts {
    pub output_path: PathBuf,
    pub final_text: String,
    pub words_before: usize,
    pub words_after: usize,
}

/// The first failure of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    /// State the run was in when it failed.
    pub state: PipelineState,
    pub kind: ErrorKind,
    pub reason: String,
    /// The transcript kept for inspection, when it is file-backed.
    pub transcript_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Done(RunArtifacts),
    Failed(RunFailure),
}

/// Everything a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    /// States in the order they were entered, ending in Done or Failed.
    pub visited: Vec<PipelineState>,
    pub stages: Vec<StageReport>,
    /// Non-fatal problems: contract deviations and transcript write failures.
    pub warnings: Vec<String>,
    pub transcript_path: Option<PathBuf>,
    pub history: ConversationHistory,
    /// The document with the last revision the run produced.
    pub document: Document,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, RunOutcome::Done(_))
    }

    pub fn artifacts(&self) -> Option<&RunArtifacts> {
        match &self.outcome {
            RunOutcome::Done(artifacts) => Some(artifacts),
            RunOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match &self.outcome {
            RunOutcome::Done(_) => None,
            RunOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Drives one plan against a completion backend.
///
/// The controller is reusable: every call to [`run`](Self::run) starts from a
/// fresh history.
pub struct PipelineController {
    plan: StagePlan,
    backend: Arc<dyn Completion>,
    transcript: Arc<dyn Transcript>,
    output_path: PathBuf,
    call_timeout: Option<Duration>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("stages", &self.plan.stages().len())
            .field("output_path", &self.output_path)
            .field("call_timeout", &self.call_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PipelineController {
    pub fn new(
        plan: StagePlan,
        backend: Arc<dyn Completion>,
        transcript: Arc<dyn Transcript>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            plan,
            backend,
            transcript,
            output_path: output_path.into(),
            call_timeout: None,
            retry: RetryPolicy::none(),
            cancel: CancellationToken::new(),
        }
    }

    /// Standard plan, output path, timeout and retry taken from `config`.
    pub fn from_config(
        config: &RedlineConfig,
        backend: Arc<dyn Completion>,
        transcript: Arc<dyn Transcript>,
    ) -> Result<Self> {
        config.validate()?;
        let plan = StagePlan::from_config(config)?;
        Ok(Self::new(plan, backend, transcript, &config.output_path)
            .with_call_timeout(config.call_timeout())
            .with_retry(config.retry))
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use an external token; cancelling it fails the run as `Cancelled`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Load the input artifact during Init, then run.
    pub async fn run_from_file(&self, input: &Path, requirements: Requirements) -> RunReport {
        match Document::load(input) {
            Ok(document) => self.run(document, requirements).await,
            Err(e) => {
                let mut run = Run::new(self, Document::new(""), requirements);
                run.enter(PipelineState::Init);
                run.finish(Err(e), Instant::now())
            }
        }
    }

    /// Execute the plan once.
    pub async fn run(&self, document: Document, requirements: Requirements) -> RunReport {
        let started = Instant::now();
        let mut run = Run::new(self, document, requirements);
        let span = obs::run_span(&run.run_id);
        let result = run.execute().instrument(span.clone()).await;
        let _entered = span.entered();
        run.finish(result, started)
    }

    fn build_participants(&self, requirements: &Requirements) -> Vec<Vec<Participant>> {
        self.plan
            .stages()
            .iter()
            .map(|stage| {
                stage
                    .participants
                    .iter()
                    .map(|profile| {
                        let participant = Participant::new(
                            profile.clone(),
                            requirements,
                            Arc::clone(&self.backend),
                        )
                        .with_retry(self.retry);
                        match self.call_timeout {
                            Some(limit) => participant.with_timeout(limit),
                            None => participant,
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Per-run state. Lives for exactly one `run` call.
struct Run<'a> {
    ctl: &'a PipelineController,
    run_id: String,
    document: Document,
    requirements: Requirements,
    history: ConversationHistory,
    current: PipelineState,
    visited: Vec<PipelineState>,
    stages: Vec<StageReport>,
    warnings: Vec<String>,
}

impl<'a> Run<'a> {
    fn new(ctl: &'a PipelineController, document: Document, requirements: Requirements) -> Self {
        Self {
            ctl,
            run_id: Uuid::new_v4().to_string(),
            document,
            requirements,
            history: ConversationHistory::new(),
            current: PipelineState::Init,
            visited: Vec::new(),
            stages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, state: PipelineState) {
        debug!(from = %self.current, to = %state, "state transition");
        self.current = state;
        self.visited.push(state);
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.ctl.cancel.is_cancelled() {
            return Err(RedlineError::Cancelled {
                stage: self.current.to_string(),
            });
        }
        Ok(())
    }

    fn warn(&mut self, participant: &str, detail: String) {
        obs::emit_validation_warning(&self.run_id, participant, &detail);
        self.warnings.push(format!("{participant}: {detail}"));
    }

    fn record(&mut self, message: &Message) {
        if let Err(e) = self.ctl.transcript.record(message) {
            obs::emit_transcript_write_failed(&self.run_id, &message.speaker, &e);
            self.warnings.push(e.to_string());
        }
    }

    async fn execute(&mut self) -> Result<RunArtifacts> {
        self.enter(PipelineState::Init);
        if self.document.original().is_empty() {
            return Err(RedlineError::InvalidInput("document is empty".to_string()));
        }
        if self.requirements.is_empty() {
            return Err(RedlineError::InvalidInput(
                "no editing requirements supplied".to_string(),
            ));
        }

        let participants = self.ctl.build_participants(&self.requirements);
        self.history = ConversationHistory::seeded(Message::new(
            ADMIN,
            SpeakerRole::Admin,
            admin_brief(&self.document, &self.requirements),
        ));
        obs::emit_run_started(
            &self.run_id,
            self.ctl.plan.stages().len(),
            word_count(self.document.original()),
        );

        let ctl = self.ctl;
        for (stage, members) in ctl.plan.stages().iter().zip(&participants) {
            self.ensure_not_cancelled()?;
            match stage.kind {
                StageKind::Edit => self.run_fan_out(stage, members).await?,
                StageKind::Decompose | StageKind::Integrate => {
                    self.run_single(stage, &members[0]).await?
                }
            }
        }

        self.ensure_not_cancelled()?;
        self.enter(PipelineState::Extract);
        let final_text = self.extract()?;
        self.document.revise(final_text.clone());

        self.ensure_not_cancelled()?;
        self.enter(PipelineState::Done);
        write_output(&self.ctl.output_path, &final_text).await?;

        Ok(RunArtifacts {
            output_path: self.ctl.output_path.clone(),
            words_before: word_count(self.document.original()),
            words_after: word_count(self.document.current()),
            final_text,
        })
    }

    async fn run_single(&mut self, stage: &StageSpec, participant: &Participant) -> Result<()> {
        let state = PipelineState::entered_by(stage.kind);
        self.enter(state);
        obs::emit_stage_started(&self.run_id, state.as_str(), 1);

        let cancel = &self.ctl.cancel;
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            reply = participant.respond(&self.history) => reply,
        };
        let text = match reply {
            Ok(text) => text,
            Err(CompletionError::Cancelled) if cancel.is_cancelled() => {
                return Err(RedlineError::Cancelled {
                    stage: state.to_string(),
                })
            }
            Err(source) => {
                return Err(RedlineError::Completion {
                    participant: participant.name().to_string(),
                    source,
                })
            }
        };

        let validation = self.judge(stage, participant, state, &text)?;
        if stage.kind == StageKind::Integrate {
            self.carry_forward(&validation);
        }
        self.accept(state, participant, text, validation);
        Ok(())
    }

    async fn run_fan_out(&mut self, stage: &StageSpec, members: &[Participant]) -> Result<()> {
        self.enter(PipelineState::FanOutEdit);
        obs::emit_stage_started(&self.run_id, PipelineState::FanOutEdit.as_str(), members.len());

        let replies = run_parallel(members, &self.history, &self.ctl.cancel)
            .await
            .map_err(|e| match e {
                FanOutError::Completion {
                    participant,
                    source,
                } => RedlineError::Completion {
                    participant,
                    source,
                },
                FanOutError::Panicked {
                    participant,
                    detail,
                } => RedlineError::Completion {
                    participant,
                    source: CompletionError::Malformed(format!("participant panicked: {detail}")),
                },
                FanOutError::Cancelled => RedlineError::Cancelled {
                    stage: PipelineState::FanOutEdit.to_string(),
                },
            })?;

        self.enter(PipelineState::FanInEdit);
        let mut accepted = Vec::with_capacity(replies.len());
        for (member, reply) in members.iter().zip(replies) {
            let validation = self.judge(stage, member, PipelineState::FanInEdit, &reply.text)?;
            accepted.push((member, reply.text, validation));
        }
        for (index, (member, text, validation)) in accepted.into_iter().enumerate() {
            if index == 0 {
                self.carry_forward(&validation);
            }
            self.accept(PipelineState::FanInEdit, member, text, validation);
        }
        Ok(())
    }

    /// Validate one response and apply the stage's violation policy.
    fn judge(
        &mut self,
        stage: &StageSpec,
        participant: &Participant,
        state: PipelineState,
        raw: &str,
    ) -> Result<ValidationResult> {
        let profile = participant.profile();
        if raw.trim().is_empty() {
            return Err(RedlineError::FormatViolation {
                stage: state.to_string(),
                detail: format!("{} returned an empty response", profile.name),
            });
        }

        let validation = validate_format(raw, &profile.format, profile.word_limit);
        if validation.has_format_violations() {
            let detail = validation
                .format_violations()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            if stage.policy == ViolationPolicy::Fatal {
                return Err(RedlineError::FormatViolation {
                    stage: state.to_string(),
                    detail: format!("{}: {detail}", profile.name),
                });
            }
            self.warn(&profile.name, detail);
        }
        if let Some(overrun) = validation.length_violation() {
            let detail = overrun.to_string();
            self.warn(&profile.name, detail);
        }
        if stage.kind == StageKind::Integrate && validation.has_format_violations() {
            warn!(participant = %profile.name, "integrator output is degraded; extraction may fail");
        }
        Ok(validation)
    }

    /// Revising stages replace the current text with their primary section.
    fn carry_forward(&mut self, validation: &ValidationResult) {
        if let Some(text) = validation.primary() {
            self.document.revise(text);
        }
    }

    fn accept(
        &mut self,
        state: PipelineState,
        participant: &Participant,
        text: String,
        validation: ValidationResult,
    ) {
        let profile = participant.profile();
        let message = Message::new(profile.name.as_str(), profile.role, text);
        self.record(&message);
        obs::emit_stage_completed(
            &self.run_id,
            state.as_str(),
            &profile.name,
            validation.primary_word_count,
        );
        self.stages.push(StageReport {
            state,
            participant: profile.name.clone(),
            validation,
        });
        self.history.append(message);
    }

    /// Strictly pull the final version out of the integrator's raw message.
    fn extract(&self) -> Result<String> {
        let message = self
            .history
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == SpeakerRole::Integrator)
            .ok_or_else(|| RedlineError::InvalidFinalFormat {
                detail: "no integrator message in history".to_string(),
            })?;
        match extract_final_version(&message.content) {
            Extraction::Found(text) => Ok(text),
            Extraction::Empty => Err(RedlineError::InvalidFinalFormat {
                detail: "Final Version section is empty".to_string(),
            }),
            Extraction::MarkerAbsent => Err(RedlineError::InvalidFinalFormat {
                detail: "missing ### Final Version ### marker".to_string(),
            }),
        }
    }

    fn finish(mut self, result: Result<RunArtifacts>, started: Instant) -> RunReport {
        let transcript_path = self.ctl.transcript.location().map(Path::to_path_buf);
        let outcome = match result {
            Ok(artifacts) => RunOutcome::Done(artifacts),
            Err(e) => {
                let failure = RunFailure {
                    state: self.current,
                    kind: e.kind(),
                    reason: e.to_string(),
                    transcript_path: transcript_path.clone(),
                };
                warn!(state = %failure.state, kind = %failure.kind, error = %e, "run failed");
                self.enter(PipelineState::Failed);
                RunOutcome::Failed(failure)
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_run_finished(
            &self.run_id,
            duration_ms,
            self.current.as_str(),
            matches!(outcome, RunOutcome::Done(_)),
        );

        RunReport {
            run_id: self.run_id,
            outcome,
            visited: self.visited,
            stages: self.stages,
            warnings: self.warnings,
            transcript_path,
            history: self.history,
            document: self.document,
            duration_ms,
        }
    }
}

/// Write the final text, replacing any previous content.
async fn write_output(path: &Path, text: &str) -> Result<()> {
    let output_error = |e: std::io::Error| RedlineError::Output {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(output_error)?;
    }
    tokio::fs::write(path, text).await.map_err(output_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{MemoryTranscript, ScriptedCompletion};

    const DECOMPOSITION: &str = "1. Raise the register\n2. Remove contractions";
    const CONSERVATIVE: &str = "### Version ###\nA formal text.\n\n### Feedback ###\nTone raised.";
    const CREATIVE: &str = "### Version ###\nA lively text.\n\n### Feedback ###\nFlow improved.";
    const INTEGRATED: &str =
        "### Final Version ###\nThe final formal text.\n\n### Feedback ###\nMerged both.";

    fn happy_backend() -> ScriptedCompletion {
        ScriptedCompletion::new()
            .reply("Task_Decomposer", DECOMPOSITION)
            .reply("Editor_Conservative", CONSERVATIVE)
            .reply("Editor_Creative", CREATIVE)
            .reply("Integrator", INTEGRATED)
    }

    fn controller(
        backend: ScriptedCompletion,
        transcript: Arc<MemoryTranscript>,
        output: &Path,
    ) -> PipelineController {
        let plan = StagePlan::from_config(&RedlineConfig::default()).unwrap();
        PipelineController::new(plan, Arc::new(backend), transcript, output)
    }

    fn inputs() -> (Document, Requirements) {
        (
            Document::new("we're gonna fix the thing soon"),
            Requirements::new(["make formal"]),
        )
    }

    #[tokio::test]
    async fn test_happy_path_visits_every_state_once() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Final.txt");
        let transcript = Arc::new(MemoryTranscript::new());
        let (doc, reqs) = inputs();

        let report = controller(happy_backend(), transcript.clone(), &output)
            .run(doc, reqs)
            .await;

        assert!(report.is_done(), "{:?}", report.outcome);
        assert_eq!(
            report.visited,
            vec![
                PipelineState::Init,
                PipelineState::Decompose,
                PipelineState::FanOutEdit,
                PipelineState::FanInEdit,
                PipelineState::Integrate,
                PipelineState::Extract,
                PipelineState::Done,
            ]
        );
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "The final formal text."
        );
        let artifacts = report.artifacts().unwrap();
        assert_eq!(artifacts.words_before, 6);
        assert_eq!(artifacts.words_after, 4);
        assert_eq!(
            transcript.speakers(),
            vec![
                "Task_Decomposer",
                "Editor_Conservative",
                "Editor_Creative",
                "Integrator"
            ]
        );
        assert_eq!(report.history.len(), 5);
        assert_eq!(report.history.messages()[0].speaker, ADMIN);
        assert!(report.warnings.is_empty());
        assert_eq!(report.document.current(), "The final formal text.");
        assert_eq!(report.document.original(), "we're gonna fix the thing soon");
    }

    #[tokio::test]
    async fn test_failed_run_keeps_last_revision() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedCompletion::new()
            .reply("Task_Decomposer", DECOMPOSITION)
            .reply("Editor_Conservative", CONSERVATIVE)
            .reply("Editor_Creative", CREATIVE)
            .fail("Integrator", CompletionError::Transient("reset".to_string()));
        let (doc, reqs) = inputs();

        let report = controller(
            backend,
            Arc::new(MemoryTranscript::new()),
            &dir.path().join("o.txt"),
        )
        .run(doc, reqs)
        .await;

        let failure = report.failure().unwrap();
        assert_eq!(failure.state, PipelineState::Integrate);
        assert_eq!(failure.transcript_path, None);
        assert_eq!(report.document.current(), "A formal text.");
    }

    #[tokio::test]
    async fn test_decomposition_does_not_revise_document() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedCompletion::new()
            .reply("Task_Decomposer", DECOMPOSITION)
            .fail("Editor_Conservative", CompletionError::Malformed("bad".to_string()))
            .reply("Editor_Creative", CREATIVE);
        let (doc, reqs) = inputs();

        let report = controller(
            backend,
            Arc::new(MemoryTranscript::new()),
            &dir.path().join("o.txt"),
        )
        .run(doc, reqs)
        .await;

        assert_eq!(report.failure().unwrap().state, PipelineState::FanOutEdit);
        assert_eq!(report.document.current(), "we're gonna fix the thing soon");
    }

    #[tokio::test]
    async fn test_editors_see_history_through_decomposition() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(happy_backend());
        let plan = StagePlan::from_config(&RedlineConfig::default()).unwrap();
        let ctl = PipelineController::new(
            plan,
            backend.clone(),
            Arc::new(MemoryTranscript::new()),
            dir.path().join("out.txt"),
        );
        let (doc, reqs) = inputs();
        ctl.run(doc, reqs).await;

        let requests = backend.requests();
        let editors: Vec<_> = requests
            .iter()
            .filter(|r| r.participant.starts_with("Editor_"))
            .collect();
        assert_eq!(editors.len(), 2);
        assert_eq!(editors[0].history.len(), 2);
        assert_eq!(editors[0].history, editors[1].history);

        let integrator = requests.iter().find(|r| r.participant == "Integrator").unwrap();
        assert_eq!(integrator.history.len(), 4);
        assert!(integrator.history.messages()[0]
            .content
            .starts_with("Article to edit:\nwe're gonna fix the thing soon"));
    }

    #[tokio::test]
    async fn test_blank_response_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = Arc::new(MemoryTranscript::new());
        let backend = ScriptedCompletion::new().reply("Task_Decomposer", "   \n");
        let (doc, reqs) = inputs();

        let report = controller(backend, transcript.clone(), &dir.path().join("o.txt"))
            .run(doc, reqs)
            .await;

        let failure = report.failure().unwrap();
        assert_eq!(failure.state, PipelineState::Decompose);
        assert_eq!(failure.kind, ErrorKind::FormatViolation);
        assert!(transcript.entries().is_empty());
        assert_eq!(report.history.len(), 1);
    }

    #[tokio::test]
    async fn test_strict_decomposition_rejects_prose() {
        let dir = tempfile::tempdir().unwrap();
        let config = RedlineConfig {
            strict_decomposition: true,
            output_path: dir.path().join("o.txt"),
            ..RedlineConfig::default()
        };
        let backend = ScriptedCompletion::new().reply("Task_Decomposer", "Just make it formal.");
        let ctl = PipelineController::from_config(
            &config,
            Arc::new(backend),
            Arc::new(MemoryTranscript::new()),
        )
        .unwrap();
        let (doc, reqs) = inputs();

        let report = ctl.run(doc, reqs).await;
        assert_eq!(report.failure().unwrap().kind, ErrorKind::FormatViolation);
        assert_eq!(
            report.visited,
            vec![
                PipelineState::Init,
                PipelineState::Decompose,
                PipelineState::Failed
            ]
        );
    }

    #[tokio::test]
    async fn test_editor_without_markers_warns_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedCompletion::new()
            .reply("Task_Decomposer", DECOMPOSITION)
            .reply("Editor_Conservative", "A formal text without any markers.")
            .reply("Editor_Creative", CREATIVE)
            .reply("Integrator", INTEGRATED);
        let (doc, reqs) = inputs();

        let report = controller(
            backend,
            Arc::new(MemoryTranscript::new()),
            &dir.path().join("o.txt"),
        )
        .run(doc, reqs)
        .await;

        assert!(report.is_done());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("Editor_Conservative"));
        let conservative = &report.stages[1];
        assert_eq!(
            conservative.validation.section("Version"),
            Some("A formal text without any markers.")
        );
    }

    #[tokio::test]
    async fn test_empty_final_version_fails_with_invalid_final_format() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("o.txt");
        let backend = ScriptedCompletion::new()
            .reply("Task_Decomposer", DECOMPOSITION)
            .reply("Editor_Conservative", CONSERVATIVE)
            .reply("Editor_Creative", CREATIVE)
            .reply("Integrator", "### Final Version ###\n\n### Feedback ###\nNothing.");
        let (doc, reqs) = inputs();

        let report = controller(backend, Arc::new(MemoryTranscript::new()), &output)
            .run(doc, reqs)
            .await;

        let failure = report.failure().unwrap();
        assert_eq!(failure.state, PipelineState::Extract);
        assert!(failure.reason.starts_with("invalid final format"));
        assert!(failure.reason.contains("empty"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (doc, reqs) = inputs();

        let report = controller(
            happy_backend(),
            Arc::new(MemoryTranscript::new()),
            &dir.path().join("o.txt"),
        )
        .with_cancellation(cancel)
        .run(doc, reqs)
        .await;

        let failure = report.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::Cancelled);
        assert_eq!(failure.state, PipelineState::Init);
    }

    #[tokio::test]
    async fn test_missing_input_fails_in_init() {
        let dir = tempfile::tempdir().unwrap();
        let report = controller(
            happy_backend(),
            Arc::new(MemoryTranscript::new()),
            &dir.path().join("o.txt"),
        )
        .run_from_file(&dir.path().join("absent.txt"), Requirements::new(["x"]))
        .await;

        let failure = report.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::InputError);
        assert_eq!(
            report.visited,
            vec![PipelineState::Init, PipelineState::Failed]
        );
    }

    #[tokio::test]
    async fn test_output_is_fully_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("Final.txt");
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, "stale content that is much longer than the result").unwrap();
        let (doc, reqs) = inputs();

        let report = controller(happy_backend(), Arc::new(MemoryTranscript::new()), &output)
            .run(doc, reqs)
            .await;

        assert!(report.is_done());
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "The final formal text."
        );
    }
}
