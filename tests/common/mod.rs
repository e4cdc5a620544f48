//! Shared fixtures for the pipeline integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use kingdom_checks::catalog::StaticCatalog;
use kingdom_checks::core::error::Result;
use kingdom_checks::core::types::{CheckId, CheckType, HexId, ResourceKind};
use kingdom_checks::core::PipelineConfig;
use kingdom_checks::dice::ScriptedDice;
use kingdom_checks::interaction::{ChannelCollector, PendingInput};
use kingdom_checks::kingdom::{Army, KingdomState, Settlement};
use kingdom_checks::pipeline::{
    CheckContext, InstanceStatus, PipelineCoordinator, PipelineInstance, PipelineOutcome,
};
use kingdom_checks::store::{MemoryStore, SharedStateStore};

/// Empty dice script, for checks that must not roll
pub const NO_DICE: [i32; 0] = [];

/// A coordinator over an in-memory kingdom with scripted dice
pub struct Harness {
    pub coordinator: Arc<PipelineCoordinator>,
    pub store: Arc<dyn SharedStateStore>,
    pub dice: Arc<ScriptedDice>,
    pub inputs: UnboundedReceiver<PendingInput>,
}

/// Small kingdom: some of everything, one settlement, one army
pub fn kingdom() -> KingdomState {
    let mut state = KingdomState::new("Test March")
        .with_amount(ResourceKind::Gold, 10)
        .with_amount(ResourceKind::Food, 4)
        .with_amount(ResourceKind::Lumber, 4)
        .with_amount(ResourceKind::Unrest, 4)
        .with_amount(ResourceKind::Fame, 2);
    state.claim_hex(HexId::from("0.0"));
    state.settlements.push(Settlement {
        id: "capital".into(),
        name: "Capital".into(),
        hex: HexId::from("0.0"),
        garrison: Vec::new(),
    });
    state.armies.push(Army {
        id: "army-1".into(),
        name: "First Army".into(),
        home_settlement: Some("capital".into()),
        location: Some(HexId::from("0.0")),
        route: Vec::new(),
    });
    state
}

pub fn harness(faces: impl IntoIterator<Item = i32>) -> Harness {
    harness_with(builtin(), kingdom(), faces)
}

pub fn harness_with(
    catalog: StaticCatalog,
    state: KingdomState,
    faces: impl IntoIterator<Item = i32>,
) -> Harness {
    let store: Arc<dyn SharedStateStore> = Arc::new(MemoryStore::new(state));
    harness_over(catalog, store, faces)
}

pub fn harness_over(
    catalog: StaticCatalog,
    store: Arc<dyn SharedStateStore>,
    faces: impl IntoIterator<Item = i32>,
) -> Harness {
    let dice = Arc::new(ScriptedDice::new(faces));
    let (collector, inputs) = ChannelCollector::new();
    let coordinator = Arc::new(PipelineCoordinator::new(
        Arc::new(catalog),
        dice.clone(),
        store.clone(),
        Arc::new(collector),
        PipelineConfig::default(),
    ));
    Harness {
        coordinator,
        store,
        dice,
        inputs,
    }
}

pub fn builtin() -> StaticCatalog {
    StaticCatalog::builtin().expect("builtin catalog parses")
}

impl Harness {
    /// Start a check on its own task
    pub fn spawn(
        &self,
        check_id: &str,
        context: CheckContext,
    ) -> JoinHandle<Result<PipelineOutcome>> {
        let coordinator = self.coordinator.clone();
        let id = CheckId::from(check_id);
        tokio::spawn(async move { coordinator.execute_pipeline(&id, context).await })
    }

    /// Wait until the check has a stored preview and is waiting for confirmation
    pub async fn awaiting(&self, check_type: CheckType, check_id: &str) -> PipelineInstance {
        let id = CheckId::from(check_id);
        for _ in 0..500 {
            if let Some(instance) = self.coordinator.get_pending_instance(check_type, &id) {
                if instance.status == InstanceStatus::AwaitingConfirmation {
                    return instance;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("{} never reached awaiting confirmation", check_id);
    }

    /// Next sub-step request from the collector
    pub async fn next_input(&mut self) -> PendingInput {
        tokio::time::timeout(Duration::from_secs(2), self.inputs.recv())
            .await
            .expect("timed out waiting for an input request")
            .expect("collector channel closed")
    }

    pub async fn state(&self) -> KingdomState {
        self.store.read().await.expect("store read")
    }
}

pub async fn finish(handle: JoinHandle<Result<PipelineOutcome>>) -> PipelineOutcome {
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("pipeline did not finish")
        .expect("pipeline task panicked")
        .expect("pipeline returned an error")
}

pub fn action() -> CheckContext {
    CheckContext::new(CheckType::Action).with_user("tester")
}

pub fn event() -> CheckContext {
    CheckContext::new(CheckType::Event).with_user("tester")
}
