//! In-memory registry of live pipeline instances
//!
//! Holds the resume handles (one-shot confirm, cancel watch) and the
//! non-repeatable lock set. Critical sections are short and never span an
//! `.await`.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};

use crate::core::types::{CheckId, CheckType, InstanceId};
use crate::pipeline::{InstanceStatus, PipelineInstance, PipelineStage};

/// What happened to a confirm or cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOutcome {
    Delivered,
    /// The instance already received its signal
    AlreadyConsumed,
    /// Not waiting for confirmation yet, or a reroll is running
    NotReady,
    /// Commit already began
    TooLate,
    Unknown,
}

/// Receiving ends handed to the pipeline future
pub struct InstanceSignals {
    pub confirm: oneshot::Receiver<()>,
    pub cancel: watch::Receiver<bool>,
}

struct InstanceHandle {
    instance: PipelineInstance,
    confirm: Option<oneshot::Sender<()>>,
    cancel: watch::Sender<bool>,
    rerolling: bool,
}

#[derive(Default)]
struct RegistryInner {
    handles: AHashMap<InstanceId, InstanceHandle>,
    locks: AHashMap<(CheckType, CheckId), InstanceId>,
}

#[derive(Default)]
pub struct InstanceRegistry {
    inner: Mutex<RegistryInner>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, RegistryInner> {
        // Nothing panics while holding the lock, so a poisoned guard still
        // holds consistent data.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the non-repeatable lock for `(check_type, check_id)`
    pub fn try_lock(&self, check_type: CheckType, check_id: &CheckId, holder: InstanceId) -> bool {
        let mut inner = self.inner();
        let key = (check_type, check_id.clone());
        match inner.locks.get(&key) {
            Some(current) => *current == holder,
            None => {
                inner.locks.insert(key, holder);
                true
            }
        }
    }

    pub fn is_locked(&self, check_type: CheckType, check_id: &CheckId) -> bool {
        self.inner().locks.contains_key(&(check_type, check_id.clone()))
    }

    /// Register an instance and create its signal channels
    pub fn insert(&self, instance: PipelineInstance) -> InstanceSignals {
        let (confirm_tx, confirm_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.inner().handles.insert(
            instance.instance_id,
            InstanceHandle {
                instance,
                confirm: Some(confirm_tx),
                cancel: cancel_tx,
                rerolling: false,
            },
        );
        InstanceSignals {
            confirm: confirm_rx,
            cancel: cancel_rx,
        }
    }

    /// Replace the stored snapshot
    pub fn update(&self, instance: &PipelineInstance) {
        if let Some(handle) = self.inner().handles.get_mut(&instance.instance_id) {
            handle.instance = instance.clone();
        }
    }

    pub fn get(&self, instance_id: InstanceId) -> Option<PipelineInstance> {
        self.inner().handles.get(&instance_id).map(|h| h.instance.clone())
    }

    pub fn contains(&self, instance_id: InstanceId) -> bool {
        self.inner().handles.contains_key(&instance_id)
    }

    /// The live instance for a check, preferring one awaiting confirmation
    pub fn find(&self, check_type: CheckType, check_id: &CheckId) -> Option<PipelineInstance> {
        let inner = self.inner();
        let mut matching: Vec<&PipelineInstance> = inner
            .handles
            .values()
            .map(|h| &h.instance)
            .filter(|i| {
                i.check_type == check_type && &i.check_id == check_id && !i.status.is_terminal()
            })
            .collect();
        matching.sort_by_key(|i| i.status != InstanceStatus::AwaitingConfirmation);
        matching.first().map(|i| (*i).clone())
    }

    pub fn instances(&self) -> Vec<PipelineInstance> {
        self.inner().handles.values().map(|h| h.instance.clone()).collect()
    }

    pub fn pre_commit_ids(&self) -> Vec<InstanceId> {
        self.inner()
            .handles
            .values()
            .filter(|h| h.instance.stage.is_pre_commit())
            .map(|h| h.instance.instance_id)
            .collect()
    }

    /// Fire the one-shot confirm; only the first caller gets `Delivered`
    pub fn signal_confirm(&self, instance_id: InstanceId) -> SignalOutcome {
        let mut inner = self.inner();
        let Some(handle) = inner.handles.get_mut(&instance_id) else {
            return SignalOutcome::Unknown;
        };
        let previewed = !matches!(
            handle.instance.status,
            InstanceStatus::Pending | InstanceStatus::Rolling
        );
        if handle.rerolling || !previewed {
            if handle.confirm.is_none() {
                return SignalOutcome::AlreadyConsumed;
            }
            return SignalOutcome::NotReady;
        }
        match handle.confirm.take() {
            Some(tx) => match tx.send(()) {
                Ok(()) => SignalOutcome::Delivered,
                Err(()) => SignalOutcome::AlreadyConsumed,
            },
            None => SignalOutcome::AlreadyConsumed,
        }
    }

    /// Raise the cancel flag if commit has not begun
    ///
    /// Returns a receiver whose `changed()` errors once the instance leaves
    /// the registry, so the caller can wait for cleanup.
    pub fn request_cancel(
        &self,
        instance_id: InstanceId,
    ) -> (SignalOutcome, Option<watch::Receiver<bool>>) {
        let mut inner = self.inner();
        let Some(handle) = inner.handles.get_mut(&instance_id) else {
            return (SignalOutcome::Unknown, None);
        };
        if !handle.instance.stage.is_pre_commit() {
            return (SignalOutcome::TooLate, None);
        }
        if *handle.cancel.borrow() {
            return (SignalOutcome::AlreadyConsumed, Some(handle.cancel.subscribe()));
        }
        handle.cancel.send_replace(true);
        // A cancelled instance can no longer be confirmed
        handle.confirm = None;
        (SignalOutcome::Delivered, Some(handle.cancel.subscribe()))
    }

    /// Enter the commit stage unless a cancel got there first
    pub fn begin_commit(&self, instance_id: InstanceId) -> bool {
        let mut inner = self.inner();
        let Some(handle) = inner.handles.get_mut(&instance_id) else {
            return false;
        };
        if *handle.cancel.borrow() || !handle.instance.stage.is_pre_commit() {
            return false;
        }
        handle.instance.stage = PipelineStage::Committing;
        true
    }

    /// Mark a reroll in progress; only valid while awaiting confirmation
    pub fn begin_reroll(&self, instance_id: InstanceId) -> Result<PipelineInstance, SignalOutcome> {
        let mut inner = self.inner();
        let Some(handle) = inner.handles.get_mut(&instance_id) else {
            return Err(SignalOutcome::Unknown);
        };
        if handle.confirm.is_none() {
            return Err(SignalOutcome::AlreadyConsumed);
        }
        if handle.rerolling || handle.instance.status != InstanceStatus::AwaitingConfirmation {
            return Err(SignalOutcome::NotReady);
        }
        handle.rerolling = true;
        Ok(handle.instance.clone())
    }

    pub fn end_reroll(&self, instance_id: InstanceId) {
        if let Some(handle) = self.inner().handles.get_mut(&instance_id) {
            handle.rerolling = false;
        }
    }

    /// Drop the handle and any lock it held; idempotent
    pub fn remove(&self, instance_id: InstanceId) -> Option<PipelineInstance> {
        let mut inner = self.inner();
        inner.locks.retain(|_, holder| *holder != instance_id);
        inner.handles.remove(&instance_id).map(|h| h.instance)
    }

    /// Guard that removes the instance when dropped
    pub fn registration(&self, instance_id: InstanceId) -> Registration<'_> {
        Registration {
            registry: self,
            instance_id,
        }
    }
}

/// Removes an instance from the registry when the owning future ends,
/// including when it is dropped mid-await
pub struct Registration<'a> {
    registry: &'a InstanceRegistry,
    instance_id: InstanceId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::core::types::KingdomPhase;
    use crate::pipeline::CheckContext;

    fn awaiting() -> PipelineInstance {
        instance(InstanceStatus::AwaitingConfirmation, PipelineStage::AwaitingConfirmation)
    }

    fn instance(status: InstanceStatus, stage: PipelineStage) -> PipelineInstance {
        let catalog = StaticCatalog::builtin().unwrap();
        let definition = catalog.definition(&"deal-with-unrest".into()).unwrap();
        let context = CheckContext::new(CheckType::Action);
        let mut instance = PipelineInstance::new(definition, context, 1, KingdomPhase::Actions);
        instance.status = status;
        instance.stage = stage;
        instance
    }

    #[test]
    fn test_lock_is_exclusive_per_check() {
        let registry = InstanceRegistry::new();
        let check: CheckId = "deal-with-unrest".into();
        let a = InstanceId::new();
        let b = InstanceId::new();

        assert!(registry.try_lock(CheckType::Action, &check, a));
        assert!(!registry.try_lock(CheckType::Action, &check, b));
        assert!(registry.try_lock(CheckType::Event, &check, b));

        registry.remove(a);
        assert!(registry.try_lock(CheckType::Action, &check, b));
    }

    #[test]
    fn test_confirm_consumed_once() {
        let registry = InstanceRegistry::new();
        let record = awaiting();
        let id = record.instance_id;
        let mut signals = registry.insert(record);

        assert_eq!(registry.signal_confirm(id), SignalOutcome::Delivered);
        assert_eq!(registry.signal_confirm(id), SignalOutcome::AlreadyConsumed);
        assert!(signals.confirm.try_recv().is_ok());
        assert_eq!(registry.signal_confirm(InstanceId::new()), SignalOutcome::Unknown);
    }

    #[test]
    fn test_confirm_before_preview_is_not_ready() {
        let registry = InstanceRegistry::new();
        let record = instance(InstanceStatus::Rolling, PipelineStage::Validated);
        let id = record.instance_id;
        let _signals = registry.insert(record);
        assert_eq!(registry.signal_confirm(id), SignalOutcome::NotReady);
    }

    #[test]
    fn test_cancel_blocks_commit_and_confirm() {
        let registry = InstanceRegistry::new();
        let record = awaiting();
        let id = record.instance_id;
        let signals = registry.insert(record);

        let (outcome, _) = registry.request_cancel(id);
        assert_eq!(outcome, SignalOutcome::Delivered);
        assert!(*signals.cancel.borrow());
        assert!(!registry.begin_commit(id));
        assert_eq!(registry.signal_confirm(id), SignalOutcome::AlreadyConsumed);
    }

    #[test]
    fn test_cancel_after_commit_is_too_late() {
        let registry = InstanceRegistry::new();
        let record = instance(InstanceStatus::Resolved, PipelineStage::Confirmed);
        let id = record.instance_id;
        let _signals = registry.insert(record);

        assert!(registry.begin_commit(id));
        assert_eq!(registry.request_cancel(id).0, SignalOutcome::TooLate);
    }

    #[test]
    fn test_registration_guard_cleans_up() {
        let registry = InstanceRegistry::new();
        let record = instance(InstanceStatus::Pending, PipelineStage::Created);
        let id = record.instance_id;
        let check = record.check_id.clone();
        registry.try_lock(CheckType::Action, &check, id);
        let _signals = registry.insert(record);
        {
            let _registration = registry.registration(id);
        }
        assert!(!registry.contains(id));
        assert!(!registry.is_locked(CheckType::Action, &check));
    }

    #[test]
    fn test_reroll_flag_blocks_confirm() {
        let registry = InstanceRegistry::new();
        let record = awaiting();
        let id = record.instance_id;
        let _signals = registry.insert(record);

        assert!(registry.begin_reroll(id).is_ok());
        assert_eq!(registry.begin_reroll(id).unwrap_err(), SignalOutcome::NotReady);
        assert_eq!(registry.signal_confirm(id), SignalOutcome::NotReady);
        registry.end_reroll(id);
        assert_eq!(registry.signal_confirm(id), SignalOutcome::Delivered);
    }
}
