//! JSON file store
//!
//! Survives process restarts: the document is written to a sibling temp
//! file and renamed over the real one, so a crash mid-write leaves the
//! previous revision intact.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::{watch, Mutex};

use crate::core::error::Result;
use crate::kingdom::KingdomState;
use crate::store::{SharedStateStore, StateUpdater};

pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<KingdomState>,
    revisions: watch::Sender<u64>,
}

impl JsonFileStore {
    /// Open an existing document, or start from `initial` if the file is absent
    pub async fn open(path: impl Into<PathBuf>, initial: KingdomState) -> Result<Self> {
        let path = path.into();
        let state = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            let state: KingdomState = serde_json::from_str(&content)?;
            tracing::info!(
                path = %path.display(),
                turn = state.turn_state.turn,
                "Loaded kingdom document"
            );
            state
        } else {
            write_document(&path, &initial).await?;
            initial
        };

        let (revisions, _) = watch::channel(0);
        Ok(Self {
            path,
            state: Mutex::new(state),
            revisions,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn write_document(path: &Path, state: &KingdomState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl SharedStateStore for JsonFileStore {
    async fn read(&self) -> Result<KingdomState> {
        Ok(self.state.lock().await.clone())
    }

    async fn write_atomic(&self, updater: StateUpdater<'_>) -> Result<u64> {
        let mut current = self.state.lock().await;
        let mut next = current.clone();
        updater(&mut next)?;
        write_document(&self.path, &next).await?;
        *current = next;

        let revision = *self.revisions.borrow() + 1;
        self.revisions.send_replace(revision);
        Ok(revision)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }
}
