//! Check resolution pipeline
//!
//! `PipelineCoordinator` owns the lifecycle of every check instance:
//! validation, the roll, the preview, the wait for confirmation, sub-steps
//! and the commit. The registry holds resume handles in memory; the kingdom
//! document holds a mirror of each instance so a reload can reconcile.

pub mod coordinator;
pub mod instance;
pub mod reconcile;
pub mod registry;

pub use coordinator::{
    ExecutionResult, PipelineCoordinator, PipelineOutcome, RollSummary, TurnSummary,
};
pub use instance::{
    CheckContext, InstanceStatus, PipelineInstance, PipelineStage, ProficiencyRank, RollModifier,
};
pub use reconcile::{ResumeReport, ResumedPipeline};
pub use registry::{InstanceRegistry, SignalOutcome};
