//! Declarative stage list interpreted by the controller.
//!
//! A plan is an ordered list of [`StageSpec`]s, each kind at most once and in
//! pipeline order.
//! Decompose and Integrate stages run one call; Edit stages fan out to up to
//! [`MAX_FAN_OUT`] participants. Dropping the decomposer or swapping a
//! participant is a data change, not new control flow.

use serde::{Deserialize, Serialize};

use crate::config::RedlineConfig;
use crate::domain::{ParticipantProfile, RedlineError, Result};

/// Upper bound on concurrent calls inside one stage.
pub const MAX_FAN_OUT: usize = 2;

/// What a stage contributes to the run. Declaration order is pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Break the work into subtasks.
    Decompose,
    /// Produce revised versions of the document.
    Edit,
    /// Merge the revisions into the final message.
    Integrate,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageKind::Decompose => "decompose",
            StageKind::Edit => "edit",
            StageKind::Integrate => "integrate",
        };
        write!(f, "{s}")
    }
}

/// What to do when a response breaks its format contract.
///
/// Word-count overruns are always warnings; a blank response is always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Record a warning and keep the best-effort content.
    Warn,
    /// Fail the run before the response is appended.
    Fatal,
}

/// One entry of the stage list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub kind: StageKind,
    /// Participants in the order their replies are appended.
    pub participants: Vec<ParticipantProfile>,
    pub policy: ViolationPolicy,
}

impl StageSpec {
    pub fn single(kind: StageKind, participant: ParticipantProfile, policy: ViolationPolicy) -> Self {
        Self {
            kind,
            participants: vec![participant],
            policy,
        }
    }

    pub fn is_fan_out(&self) -> bool {
        self.participants.len() > 1
    }
}

/// Ordered, validated stage list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePlan {
    stages: Vec<StageSpec>,
}

impl StagePlan {
    /// Build a plan, rejecting shapes the controller cannot run.
    pub fn new(stages: Vec<StageSpec>) -> Result<Self> {
        if stages.is_empty() {
            return Err(RedlineError::Config("stage plan is empty".to_string()));
        }
        for (idx, stage) in stages.iter().enumerate() {
            let width = if stage.kind == StageKind::Edit { MAX_FAN_OUT } else { 1 };
            if stage.participants.is_empty() || stage.participants.len() > width {
                return Err(RedlineError::Config(format!(
                    "stage {idx} ({}) has {} participants; expected 1..={width}",
                    stage.kind,
                    stage.participants.len()
                )));
            }
            if let Some(prev) = idx.checked_sub(1).map(|p| stages[p].kind) {
                if prev == stage.kind {
                    return Err(RedlineError::Config(format!(
                        "stage kind {} appears more than once",
                        stage.kind
                    )));
                }
                if prev > stage.kind {
                    return Err(RedlineError::Config(format!(
                        "stage {} cannot follow {prev}",
                        stage.kind
                    )));
                }
            }
        }
        match stages.last().map(|s| (s.kind, s.participants.len())) {
            Some((StageKind::Integrate, 1)) => {}
            _ => {
                return Err(RedlineError::Config(
                    "stage plan must end with a single-participant integrate stage".to_string(),
                ))
            }
        }
        Ok(Self { stages })
    }

    /// Decompose → Edit(conservative, creative) → Integrate.
    pub fn standard(
        decomposer: ParticipantProfile,
        conservative: ParticipantProfile,
        creative: ParticipantProfile,
        integrator: ParticipantProfile,
        decomposition_policy: ViolationPolicy,
    ) -> Result<Self> {
        Self::new(vec![
            StageSpec::single(StageKind::Decompose, decomposer, decomposition_policy),
            StageSpec {
                kind: StageKind::Edit,
                participants: vec![conservative, creative],
                policy: ViolationPolicy::Warn,
            },
            StageSpec::single(StageKind::Integrate, integrator, ViolationPolicy::Warn),
        ])
    }

    /// The standard plan with limits and temperatures taken from config.
    pub fn from_config(config: &RedlineConfig) -> Result<Self> {
        let t = &config.temperatures;
        let policy = if config.strict_decomposition {
            ViolationPolicy::Fatal
        } else {
            ViolationPolicy::Warn
        };
        Self::standard(
            ParticipantProfile::task_decomposer(t.decomposer),
            ParticipantProfile::conservative_editor(t.conservative, config.editor_word_limit),
            ParticipantProfile::creative_editor(t.creative, config.editor_word_limit),
            ParticipantProfile::integrator(t.integrator, config.max_length),
            policy,
        )
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }
}
