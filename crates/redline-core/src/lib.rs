//! Redline core library
//!
//! Runs a document through a fixed revision pipeline: a task decomposer, two
//! editors working in parallel, and an integrator whose final version is
//! extracted strictly and written out. Every stage output is validated against
//! its response contract and appended to a per-run transcript.

pub mod config;
pub mod contract;
pub mod domain;
pub mod extract;
pub mod fakes;
pub mod fanout;
pub mod obs;
pub mod participant;
pub mod pipeline;
pub mod telemetry;
pub mod transcript;

pub use config::{RedlineConfig, RoleTemperatures};
pub use contract::{
    validate, validate_format, validate_numbered_list, MatchKind, Section, SectionMarker,
    ValidationResult, Violation,
};
pub use domain::{
    admin_brief, word_count, CompletionError, ConversationHistory, Document, ErrorKind, Message,
    ParticipantProfile, RedlineError, Requirements, ResponseFormat, Result, SamplingParams,
    SpeakerRole,
};
pub use extract::{extract, extract_final_version, Extraction};
pub use fanout::{run_parallel, FanOutError, FanOutReply};
pub use participant::{Completion, CompletionRequest, Participant, RetryPolicy};
pub use pipeline::{
    PipelineController, PipelineState, RunArtifacts, RunFailure, RunOutcome, RunReport,
    StageKind, StagePlan, StageSpec, ViolationPolicy,
};
pub use transcript::{DiscardTranscript, FileTranscript, Transcript};
