//! Check catalog
//!
//! Static data describing every check: its type, the skills that may be
//! rolled, and what each degree of success does. The pipeline only reads
//! it, and snapshots the entry into the preview so later catalog edits
//! cannot change a check already in flight.

pub mod definition;
pub mod loader;

pub use definition::{
    CheckDefinition, ModifierSpec, ModifierValue, OutcomeDefinition, Outcomes, Persistence,
    ResourceCost,
};
pub use loader::{CatalogLoadError, StaticCatalog};

use crate::core::types::CheckId;

/// Lookup from check id to definition
pub trait CheckCatalog: Send + Sync {
    fn get_check_definition(&self, id: &CheckId) -> Option<CheckDefinition>;
}
