//! Kingdom document and the counters checks modify

pub mod resources;
pub mod state;

pub use resources::{apply_modifiers, compute_shortfalls, AppliedDelta};
pub use state::{
    Army, KingdomState, LedgerTransfer, ResourceCounters, Section, Settlement, Territory, TurnState,
};
