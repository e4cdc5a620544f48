//! In-memory store

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use crate::core::error::Result;
use crate::kingdom::KingdomState;
use crate::store::{SharedStateStore, StateUpdater};

pub struct MemoryStore {
    state: Mutex<KingdomState>,
    revisions: watch::Sender<u64>,
}

impl MemoryStore {
    pub fn new(initial: KingdomState) -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            state: Mutex::new(initial),
            revisions,
        }
    }

    pub fn revision(&self) -> u64 {
        *self.revisions.borrow()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(KingdomState::default())
    }
}

#[async_trait]
impl SharedStateStore for MemoryStore {
    async fn read(&self) -> Result<KingdomState> {
        Ok(self.state.lock().await.clone())
    }

    async fn write_atomic(&self, updater: StateUpdater<'_>) -> Result<u64> {
        let mut current = self.state.lock().await;
        let mut next = current.clone();
        updater(&mut next)?;
        *current = next;

        let revision = self.revision() + 1;
        self.revisions.send_replace(revision);
        tracing::trace!(revision, "Kingdom document replaced");
        Ok(revision)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PipelineError;
    use crate::core::types::ResourceKind;

    #[tokio::test]
    async fn test_write_replaces_document() {
        let store = MemoryStore::default();
        let revision = store
            .write_atomic(Box::new(|state| {
                state.set_amount(ResourceKind::Gold, 9);
                Ok(())
            }))
            .await
            .unwrap();

        assert_eq!(revision, 1);
        assert_eq!(store.read().await.unwrap().amount(ResourceKind::Gold), 9);
    }

    #[tokio::test]
    async fn test_failed_updater_leaves_no_trace() {
        let store = MemoryStore::default();
        let mut changes = store.subscribe();

        let result = store
            .write_atomic(Box::new(|state| {
                state.set_amount(ResourceKind::Gold, 9);
                Err(PipelineError::InvalidState("nope".into()))
            }))
            .await;

        assert!(result.is_err());
        assert_eq!(store.read().await.unwrap().amount(ResourceKind::Gold), 0);
        assert!(!changes.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_one_notification_per_write() {
        let store = MemoryStore::default();
        let mut changes = store.subscribe();

        store
            .write_atomic(Box::new(|state| {
                state.unrest += 1;
                state.unrest += 1;
                Ok(())
            }))
            .await
            .unwrap();

        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 1);
        assert!(!changes.has_changed().unwrap());
    }
}
