//! Outcome preview lifecycle
//!
//! Every operation is a single `write_atomic` that builds a fresh preview
//! list and swaps it in, so a reader never sees a half-updated record and
//! change detection fires once per operation.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::catalog::{CheckDefinition, Persistence};
use crate::core::error::{PipelineError, Result};
use crate::core::types::{CheckId, CheckType, PreviewId, Turn};
use crate::preview::{
    AppliedOutcome, OutcomePreview, PreviewStatus, ResolutionProgress, ResourceShortfall,
};
use crate::store::SharedStateStore;

pub struct OutcomePreviewStore {
    store: Arc<dyn SharedStateStore>,
}

/// Rebuild the list with one record transformed
fn replace_one(
    previews: &[OutcomePreview],
    preview_id: PreviewId,
    f: impl FnOnce(&mut OutcomePreview),
) -> Result<Vec<OutcomePreview>> {
    let idx = previews
        .iter()
        .position(|p| p.preview_id == preview_id)
        .ok_or(PipelineError::PreviewNotFound(preview_id))?;
    let mut next = previews.to_vec();
    f(&mut next[idx]);
    Ok(next)
}

impl OutcomePreviewStore {
    pub fn new(store: Arc<dyn SharedStateStore>) -> Self {
        Self { store }
    }

    /// Add a pending preview for a check that just finished rolling
    pub async fn create_instance(
        &self,
        check_type: CheckType,
        check_id: CheckId,
        check_data: CheckDefinition,
        metadata: Map<String, Value>,
        turn: Turn,
    ) -> Result<PreviewId> {
        let preview = OutcomePreview::new(check_type, check_id, check_data, metadata, turn);
        let preview_id = preview.preview_id;
        self.store
            .write_atomic(Box::new(move |state| {
                let mut next = state.previews.clone();
                next.push(preview);
                state.previews = next;
                Ok(())
            }))
            .await?;
        Ok(preview_id)
    }

    /// Record the rolled outcome; status becomes resolved
    pub async fn store_outcome(
        &self,
        preview_id: PreviewId,
        outcome: AppliedOutcome,
        ongoing: bool,
    ) -> Result<()> {
        self.store
            .write_atomic(Box::new(move |state| {
                state.previews = replace_one(&state.previews, preview_id, |p| {
                    p.applied_outcome = Some(outcome);
                    p.status = PreviewStatus::Resolved;
                    p.ongoing = ongoing;
                })?;
                Ok(())
            }))
            .await?;
        Ok(())
    }

    /// Committed: status applied, effects_applied set
    pub async fn mark_applied(&self, preview_id: PreviewId) -> Result<()> {
        self.store
            .write_atomic(Box::new(move |state| {
                state.previews = replace_one(&state.previews, preview_id, |p| {
                    p.status = PreviewStatus::Applied;
                    if let Some(outcome) = p.applied_outcome.as_mut() {
                        outcome.effects_applied = true;
                    }
                })?;
                Ok(())
            }))
            .await?;
        Ok(())
    }

    pub async fn update_shortfall_resources(
        &self,
        preview_id: PreviewId,
        shortfall: Vec<ResourceShortfall>,
    ) -> Result<()> {
        self.store
            .write_atomic(Box::new(move |state| {
                state.previews =
                    replace_one(&state.previews, preview_id, |p| p.shortfall = shortfall)?;
                Ok(())
            }))
            .await?;
        Ok(())
    }

    /// End-of-phase sweep; returns how many records were removed
    ///
    /// Pending records always survive. Events that are still ongoing are
    /// kept and reset to pending with their outcome cleared so they can be
    /// resolved again next turn.
    pub async fn clear_completed(&self, check_type: CheckType) -> Result<usize> {
        let mut removed = 0;
        let removed_ref = &mut removed;
        self.store
            .write_atomic(Box::new(move |state| {
                let mut next = Vec::with_capacity(state.previews.len());
                for preview in &state.previews {
                    if preview.check_type != check_type || preview.is_pending() {
                        next.push(preview.clone());
                        continue;
                    }
                    if check_type == CheckType::Event && preview.ongoing {
                        let mut kept = preview.clone();
                        kept.status = PreviewStatus::Pending;
                        kept.applied_outcome = None;
                        kept.resolution_progress = None;
                        kept.shortfall.clear();
                        next.push(kept);
                        continue;
                    }
                    *removed_ref += 1;
                }
                state.previews = next;
                Ok(())
            }))
            .await?;
        tracing::debug!(%check_type, removed, "Cleared completed previews");
        Ok(removed)
    }

    /// Start-of-phase reset of leftover resolution state on pending records
    pub async fn clear_ongoing_resolutions(&self, check_type: CheckType) -> Result<usize> {
        let mut touched = 0;
        let touched_ref = &mut touched;
        self.store
            .write_atomic(Box::new(move |state| {
                state.previews = state
                    .previews
                    .iter()
                    .map(|p| {
                        let mut p = p.clone();
                        if p.check_type == check_type
                            && p.is_pending()
                            && (p.applied_outcome.is_some() || p.resolution_progress.is_some())
                        {
                            p.applied_outcome = None;
                            p.resolution_progress = None;
                            *touched_ref += 1;
                        }
                        p
                    })
                    .collect();
                Ok(())
            }))
            .await?;
        Ok(touched)
    }

    /// Drop one record; absent ids are ignored
    pub async fn clear_instance(&self, preview_id: PreviewId) -> Result<bool> {
        let mut found = false;
        let found_ref = &mut found;
        self.store
            .write_atomic(Box::new(move |state| {
                let before = state.previews.len();
                let next: Vec<OutcomePreview> = state
                    .previews
                    .iter()
                    .filter(|p| p.preview_id != preview_id)
                    .cloned()
                    .collect();
                *found_ref = next.len() != before;
                state.previews = next;
                Ok(())
            }))
            .await?;
        Ok(found)
    }

    /// Put a record back to pending with its outcome dropped (abandoned
    /// resolution of an ongoing event)
    pub async fn reset_to_pending(&self, preview_id: PreviewId) -> Result<()> {
        self.store
            .write_atomic(Box::new(move |state| {
                state.previews = replace_one(&state.previews, preview_id, |p| {
                    p.ongoing |= p.check_data.persistence == Persistence::Ongoing;
                    p.status = PreviewStatus::Pending;
                    p.applied_outcome = None;
                    p.resolution_progress = None;
                    p.shortfall.clear();
                })?;
                Ok(())
            }))
            .await?;
        Ok(())
    }

    pub async fn update_resolution_progress(
        &self,
        preview_id: PreviewId,
        progress: ResolutionProgress,
    ) -> Result<()> {
        self.store
            .write_atomic(Box::new(move |state| {
                state.previews = replace_one(&state.previews, preview_id, |p| {
                    p.resolution_progress = Some(progress);
                })?;
                Ok(())
            }))
            .await?;
        Ok(())
    }

    pub async fn clear_resolution_progress(&self, preview_id: PreviewId) -> Result<()> {
        self.store
            .write_atomic(Box::new(move |state| {
                state.previews =
                    replace_one(&state.previews, preview_id, |p| p.resolution_progress = None)?;
                Ok(())
            }))
            .await?;
        Ok(())
    }

    /// Whether the record belongs to an event that outlives a single turn
    pub async fn is_ongoing_event(&self, preview_id: PreviewId) -> bool {
        match self.get(preview_id).await {
            Ok(Some(p)) => p.ongoing || p.check_data.persistence == Persistence::Ongoing,
            _ => false,
        }
    }

    pub async fn get(&self, preview_id: PreviewId) -> Result<Option<OutcomePreview>> {
        let state = self.store.read().await?;
        Ok(state.previews.into_iter().find(|p| p.preview_id == preview_id))
    }

    pub async fn list(&self, check_type: CheckType) -> Result<Vec<OutcomePreview>> {
        let state = self.store.read().await?;
        Ok(state
            .previews
            .into_iter()
            .filter(|p| p.check_type == check_type)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::core::types::Degree;
    use crate::store::MemoryStore;

    fn definition(id: &str) -> CheckDefinition {
        let catalog = StaticCatalog::builtin().unwrap();
        catalog.definition(&CheckId::from(id)).unwrap().clone()
    }

    fn outcome() -> AppliedOutcome {
        AppliedOutcome {
            degree: Degree::Failure,
            actor_name: None,
            skill: None,
            effect: "Bandits raid the roads".into(),
            modifiers: Vec::new(),
            manual_effects: Vec::new(),
            roll_breakdown: "1d20 (8) = 8".into(),
            effects_applied: false,
        }
    }

    async fn create(previews: &OutcomePreviewStore, check_type: CheckType, id: &str) -> PreviewId {
        previews
            .create_instance(check_type, id.into(), definition(id), Map::new(), 1)
            .await
            .unwrap()
    }

    async fn setup() -> (Arc<MemoryStore>, OutcomePreviewStore) {
        let store = Arc::new(MemoryStore::default());
        let previews = OutcomePreviewStore::new(store.clone());
        (store, previews)
    }

    #[tokio::test]
    async fn test_lifecycle_pending_resolved_applied() {
        let (_, previews) = setup().await;
        let id = create(&previews, CheckType::Event, "bandit-activity").await;

        assert_eq!(previews.get(id).await.unwrap().unwrap().status, PreviewStatus::Pending);

        previews.store_outcome(id, outcome(), true).await.unwrap();
        let record = previews.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, PreviewStatus::Resolved);
        assert!(!record.applied_outcome.unwrap().effects_applied);

        previews.mark_applied(id).await.unwrap();
        let record = previews.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, PreviewStatus::Applied);
        assert!(record.applied_outcome.unwrap().effects_applied);
    }

    #[tokio::test]
    async fn test_event_sweep_keeps_pending_and_ongoing() {
        let (_, previews) = setup().await;
        let pending = create(&previews, CheckType::Event, "bandit-activity").await;
        let ongoing = create(&previews, CheckType::Event, "bandit-activity").await;
        let finished = create(&previews, CheckType::Event, "bandit-activity").await;

        previews.store_outcome(ongoing, outcome(), true).await.unwrap();
        previews.mark_applied(ongoing).await.unwrap();
        previews.store_outcome(finished, outcome(), false).await.unwrap();
        previews.mark_applied(finished).await.unwrap();

        let removed = previews.clear_completed(CheckType::Event).await.unwrap();
        assert_eq!(removed, 1);

        assert!(previews.get(pending).await.unwrap().is_some());
        let kept = previews.get(ongoing).await.unwrap().unwrap();
        assert_eq!(kept.status, PreviewStatus::Pending);
        assert!(kept.applied_outcome.is_none());
        assert!(previews.get(finished).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incident_sweep_discards_everything_non_pending() {
        let (_, previews) = setup().await;
        let resolved = create(&previews, CheckType::Incident, "riot").await;
        previews.store_outcome(resolved, outcome(), true).await.unwrap();
        let pending = create(&previews, CheckType::Incident, "riot").await;

        assert_eq!(previews.clear_completed(CheckType::Incident).await.unwrap(), 1);
        assert!(previews.get(resolved).await.unwrap().is_none());
        assert!(previews.get(pending).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_each_operation_publishes_one_revision() {
        let (store, previews) = setup().await;
        let mut changes = store.subscribe();

        let id = create(&previews, CheckType::Action, "deal-with-unrest").await;
        assert_eq!(*changes.borrow_and_update(), 1);

        previews
            .update_resolution_progress(
                id,
                ResolutionProgress {
                    resolving_user: Some("u1".into()),
                    ..ResolutionProgress::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(*changes.borrow_and_update(), 2);

        previews.clear_resolution_progress(id).await.unwrap();
        assert_eq!(*changes.borrow_and_update(), 3);
        assert!(previews.get(id).await.unwrap().unwrap().resolution_progress.is_none());
    }

    #[tokio::test]
    async fn test_missing_preview_is_an_error_and_writes_nothing() {
        let (store, previews) = setup().await;
        let result = previews.mark_applied(PreviewId::new()).await;
        assert!(matches!(result, Err(PipelineError::PreviewNotFound(_))));
        assert_eq!(store.revision(), 0);
        assert!(!previews.clear_instance(PreviewId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_to_pending_keeps_ongoing_flag() {
        let (_, previews) = setup().await;
        let id = create(&previews, CheckType::Event, "bandit-activity").await;
        previews.store_outcome(id, outcome(), true).await.unwrap();

        previews.reset_to_pending(id).await.unwrap();
        let record = previews.get(id).await.unwrap().unwrap();
        assert!(record.is_pending());
        assert!(record.ongoing);
        assert!(record.applied_outcome.is_none());
    }

    #[tokio::test]
    async fn test_unresolved_ongoing_event_is_marked_on_reset() {
        let (_, previews) = setup().await;
        let bandits = create(&previews, CheckType::Event, "bandit-activity").await;
        let weather = create(&previews, CheckType::Event, "good-weather").await;

        assert!(previews.is_ongoing_event(bandits).await);
        assert!(!previews.is_ongoing_event(weather).await);
        assert!(!previews.is_ongoing_event(PreviewId::new()).await);

        previews.reset_to_pending(bandits).await.unwrap();
        assert!(previews.get(bandits).await.unwrap().unwrap().ongoing);
    }

    #[tokio::test]
    async fn test_clear_ongoing_resolutions_only_touches_pending_of_type() {
        let (_, previews) = setup().await;
        let id = create(&previews, CheckType::Event, "bandit-activity").await;
        previews
            .update_resolution_progress(id, ResolutionProgress::default())
            .await
            .unwrap();

        assert_eq!(previews.clear_ongoing_resolutions(CheckType::Incident).await.unwrap(), 0);
        assert_eq!(previews.clear_ongoing_resolutions(CheckType::Event).await.unwrap(), 1);
        assert!(previews.get(id).await.unwrap().unwrap().resolution_progress.is_none());
    }
}
