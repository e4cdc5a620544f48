//! Outcome previews: what a check will do once confirmed
//!
//! pending -> resolved (outcome stored) -> applied (committed) -> swept at
//! the phase boundary, or reset to pending if the event is ongoing.

pub mod record;
pub mod store;

pub use record::{
    AppliedOutcome, OutcomePreview, PreviewStatus, ResolutionProgress, ResolvedModifier,
    ResourceShortfall,
};
pub use store::OutcomePreviewStore;
