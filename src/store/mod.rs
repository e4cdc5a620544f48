//! Shared state store
//!
//! The kingdom document is read as a snapshot and written as a whole:
//! every `write_atomic` call runs its updater against a private copy and
//! swaps the copy in only if the updater succeeds. Subscribers see exactly
//! one revision bump per successful write.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::core::error::Result;
use crate::kingdom::KingdomState;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Mutation run against a private copy of the document
pub type StateUpdater<'a> = Box<dyn FnOnce(&mut KingdomState) -> Result<()> + Send + 'a>;

#[async_trait]
pub trait SharedStateStore: Send + Sync {
    /// Snapshot of the current document
    async fn read(&self) -> Result<KingdomState>;

    /// Replace the document with the updater's result; returns the new revision
    ///
    /// If the updater fails nothing is written and no revision is published.
    async fn write_atomic(&self, updater: StateUpdater<'_>) -> Result<u64>;

    /// Revision feed for change detection
    fn subscribe(&self) -> watch::Receiver<u64>;
}
