//! Revision pipeline: a declarative stage list and the controller that runs it.
//!
//! # Module layout
//!
//! - [`stage`]: `StagePlan`, `StageSpec`, `StageKind`, `ViolationPolicy`
//! - [`controller`]: `PipelineController`, `PipelineState`, `RunReport`, `RunOutcome`

pub mod controller;
pub mod stage;

pub use controller::{
    PipelineController, PipelineState, RunArtifacts, RunFailure, RunOutcome, RunReport,
    StageReport, ADMIN,
};
pub use stage::{StageKind, StagePlan, StageSpec, ViolationPolicy, MAX_FAN_OUT};
