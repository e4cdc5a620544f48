//! Reload reconciliation
//!
//! After a restart the registry is empty, but `TurnState.pipelines` still
//! lists every instance that was live when the document was last written.
//! Each entry is discarded, suspended again awaiting confirmation, or
//! finalized when its commit write had already landed. Effects are never
//! run a second time.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::core::error::Result;
use crate::core::types::InstanceId;
use crate::kingdom::KingdomState;
use crate::pipeline::coordinator::{PipelineCoordinator, PipelineOutcome};
use crate::pipeline::{InstanceStatus, PipelineInstance, PipelineStage};
use crate::preview::PreviewStatus;

/// A persisted instance waiting for confirmation again
#[derive(Debug)]
pub struct ResumedPipeline {
    pub instance_id: InstanceId,
    pub handle: JoinHandle<Result<PipelineOutcome>>,
}

#[derive(Debug, Default)]
pub struct ResumeReport {
    pub resumed: Vec<ResumedPipeline>,
    pub discarded: Vec<InstanceId>,
    pub finalized: Vec<InstanceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconcile {
    Discard,
    Resume,
    Finalize,
}

fn classify(instance: &PipelineInstance, state: &KingdomState) -> Reconcile {
    // The mirror only reaches Committing inside the commit write itself
    if matches!(instance.stage, PipelineStage::Committing | PipelineStage::CleanedUp)
        || instance.status == InstanceStatus::Applied
    {
        return Reconcile::Finalize;
    }

    match instance.status {
        InstanceStatus::AwaitingConfirmation | InstanceStatus::Resolved => {
            if instance.turn != state.turn_state.turn {
                return Reconcile::Discard;
            }
            let previewed = instance
                .preview_id
                .and_then(|id| state.previews.iter().find(|p| p.preview_id == id))
                .map(|p| p.applied_outcome.is_some() && p.status == PreviewStatus::Resolved)
                .unwrap_or(false);
            if previewed {
                Reconcile::Resume
            } else {
                Reconcile::Discard
            }
        }
        _ => Reconcile::Discard,
    }
}

impl PipelineCoordinator {
    /// Reconcile persisted instances with the (empty) registry after a reload
    pub async fn resume_persisted(self: &Arc<Self>) -> Result<ResumeReport> {
        let state = self.store.read().await?;
        let persisted: Vec<PipelineInstance> = state.pipelines().cloned().collect();
        let mut report = ResumeReport::default();

        for instance in persisted {
            let instance_id = instance.instance_id;
            if self.registry.contains(instance_id) {
                continue;
            }
            match classify(&instance, &state) {
                Reconcile::Discard => {
                    self.discard(&instance).await;
                    tracing::info!(
                        instance_id = %instance_id,
                        status = ?instance.status,
                        "Discarded stale instance"
                    );
                    report.discarded.push(instance_id);
                }
                Reconcile::Finalize => {
                    self.finalize(&instance).await?;
                    report.finalized.push(instance_id);
                }
                Reconcile::Resume => match self.rehydrate(instance).await? {
                    Some(resumed) => report.resumed.push(resumed),
                    None => report.discarded.push(instance_id),
                },
            }
        }

        tracing::info!(
            resumed = report.resumed.len(),
            discarded = report.discarded.len(),
            finalized = report.finalized.len(),
            "Persisted pipelines reconciled"
        );
        Ok(report)
    }

    /// Commit already landed: finish the bookkeeping only
    async fn finalize(&self, instance: &PipelineInstance) -> Result<()> {
        if let Some(preview_id) = instance.preview_id {
            if let Some(preview) = self.previews.get(preview_id).await? {
                if preview.status != PreviewStatus::Applied {
                    self.previews.mark_applied(preview_id).await?;
                }
                if preview.resolution_progress.is_some() {
                    self.previews.clear_resolution_progress(preview_id).await?;
                }
            }
        }
        self.forget(instance.instance_id).await?;
        tracing::info!(instance_id = %instance.instance_id, "Finalized committed instance");
        Ok(())
    }

    /// Register a fresh handle and spawn the continuation
    async fn rehydrate(
        self: &Arc<Self>,
        mut instance: PipelineInstance,
    ) -> Result<Option<ResumedPipeline>> {
        let instance_id = instance.instance_id;

        // Confirmation and sub-steps restart from the top; the status goes
        // back explicitly since `advance` never moves it backward.
        instance.status = InstanceStatus::AwaitingConfirmation;
        instance.stage = PipelineStage::AwaitingConfirmation;

        let signals = self.registry.insert(instance.clone());
        if !instance.repeatable
            && !self.registry.try_lock(instance.check_type, &instance.check_id, instance_id)
        {
            self.registry.remove(instance_id);
            self.discard(&instance).await;
            tracing::warn!(
                instance_id = %instance_id,
                check_id = %instance.check_id,
                "Check already in progress, dropped"
            );
            return Ok(None);
        }
        if let Err(e) = self.record(&instance).await {
            self.registry.remove(instance_id);
            return Err(e);
        }
        if let Some(preview_id) = instance.preview_id {
            if let Err(e) = self.previews.clear_resolution_progress(preview_id).await {
                tracing::warn!(
                    instance_id = %instance_id,
                    error = %e,
                    "Could not clear stale progress"
                );
            }
        }

        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _registration = coordinator.registry.registration(instance_id);
            coordinator.await_and_commit(instance_id, signals).await
        });
        tracing::info!(
            instance_id = %instance_id,
            check_id = %instance.check_id,
            "Resumed awaiting confirmation"
        );

        Ok(Some(ResumedPipeline { instance_id, handle }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::core::types::{CheckType, Degree, KingdomPhase};
    use crate::pipeline::CheckContext;
    use crate::preview::{AppliedOutcome, OutcomePreview};

    fn awaiting() -> (PipelineInstance, KingdomState) {
        setup(InstanceStatus::AwaitingConfirmation, PipelineStage::AwaitingConfirmation, true)
    }

    fn setup(
        status: InstanceStatus,
        stage: PipelineStage,
        with_outcome: bool,
    ) -> (PipelineInstance, KingdomState) {
        let catalog = StaticCatalog::builtin().unwrap();
        let definition = catalog.definition(&"deal-with-unrest".into()).unwrap();
        let mut state = KingdomState::default();
        let mut preview = OutcomePreview::new(
            CheckType::Action,
            definition.id.clone(),
            definition.clone(),
            Default::default(),
            state.turn_state.turn,
        );
        if with_outcome {
            preview.status = PreviewStatus::Resolved;
            preview.applied_outcome = Some(AppliedOutcome {
                degree: Degree::Success,
                actor_name: None,
                skill: None,
                effect: String::new(),
                modifiers: Vec::new(),
                manual_effects: Vec::new(),
                roll_breakdown: String::new(),
                effects_applied: false,
            });
        }

        let mut instance = PipelineInstance::new(
            definition,
            CheckContext::new(CheckType::Action),
            state.turn_state.turn,
            KingdomPhase::Actions,
        );
        instance.status = status;
        instance.stage = stage;
        instance.preview_id = Some(preview.preview_id);
        state.previews.push(preview);
        (instance, state)
    }

    #[test]
    fn test_mid_roll_instances_are_discarded() {
        let (instance, state) = setup(InstanceStatus::Rolling, PipelineStage::Validated, false);
        assert_eq!(classify(&instance, &state), Reconcile::Discard);
    }

    #[test]
    fn test_awaiting_with_preview_resumes() {
        let (instance, state) = awaiting();
        assert_eq!(classify(&instance, &state), Reconcile::Resume);
    }

    #[test]
    fn test_interrupted_sub_steps_resume() {
        let (instance, state) = setup(InstanceStatus::Resolved, PipelineStage::Interacting, true);
        assert_eq!(classify(&instance, &state), Reconcile::Resume);
    }

    #[test]
    fn test_committing_is_finalized() {
        let (instance, state) = setup(InstanceStatus::Resolved, PipelineStage::Committing, true);
        assert_eq!(classify(&instance, &state), Reconcile::Finalize);
    }

    #[test]
    fn test_previous_turn_is_discarded() {
        let (mut instance, state) = awaiting();
        instance.turn = 0;
        assert_eq!(classify(&instance, &state), Reconcile::Discard);
    }
}
