//! Pipeline coordinator - drives one check from request to commit
//!
//! validate -> roll -> preview -> await confirm -> sub-steps -> commit -> cleanup
//!
//! Each `execute_pipeline` call is its own future. It suspends after the
//! preview is stored and resumes on `confirm_apply` or `cancel`. Resource
//! counters are only touched in the single commit write.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::catalog::{CheckCatalog, CheckDefinition, ModifierValue, OutcomeDefinition, Persistence};
use crate::command::{command_class, CommandClass, CommandDispatcher, CommandResult, GameCommand};
use crate::core::config::PipelineConfig;
use crate::core::error::{PipelineError, Result};
use crate::core::types::{
    CheckId, CheckType, Degree, InstanceId, KingdomPhase, PreviewId, ResourceKind, Turn,
};
use crate::dice::{degree_of_success, DiceResolver};
use crate::interaction::{validate_input, InputRequest, InteractionCollector};
use crate::kingdom::{apply_modifiers, compute_shortfalls, AppliedDelta, KingdomState, TurnState};
use crate::pipeline::registry::{InstanceRegistry, InstanceSignals, SignalOutcome};
use crate::pipeline::{CheckContext, InstanceStatus, PipelineInstance, PipelineStage};
use crate::preview::{
    AppliedOutcome, OutcomePreview, OutcomePreviewStore, ResolutionProgress, ResolvedModifier,
};
use crate::store::SharedStateStore;

/// Result of running a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// What `execute_pipeline` resolves to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub execution_result: ExecutionResult,
    /// None when requirements failed before an instance existed
    pub instance_id: Option<InstanceId>,
    pub preview_id: Option<PreviewId>,
    pub status: Option<InstanceStatus>,
    pub degree: Option<Degree>,
    pub command_results: Vec<CommandResult>,
    pub applied: Vec<AppliedDelta>,
}

impl PipelineOutcome {
    fn rejected(error: String) -> Self {
        Self {
            execution_result: ExecutionResult::failed(error),
            instance_id: None,
            preview_id: None,
            status: None,
            degree: None,
            command_results: Vec::new(),
            applied: Vec::new(),
        }
    }

    fn cancelled(
        instance: Option<&PipelineInstance>,
        instance_id: InstanceId,
        reason: &str,
    ) -> Self {
        Self {
            execution_result: ExecutionResult::failed(reason),
            instance_id: Some(instance_id),
            preview_id: instance.and_then(|i| i.preview_id),
            status: Some(InstanceStatus::Cancelled),
            degree: None,
            command_results: Vec::new(),
            applied: Vec::new(),
        }
    }
}

/// A roll and the preview it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollSummary {
    pub instance_id: InstanceId,
    pub preview_id: PreviewId,
    pub degree: Degree,
    pub total: i32,
    pub natural: Option<i32>,
    pub breakdown: String,
    pub modifiers: Vec<ResolvedModifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub turn: Turn,
    pub cancelled: usize,
    pub cleared: usize,
}

/// Why interactive sub-steps stopped short of commit
enum StepFailure {
    Cancelled,
    Invalid(String),
}

impl From<PipelineError> for StepFailure {
    fn from(e: PipelineError) -> Self {
        StepFailure::Invalid(e.to_string())
    }
}

fn resolution_error(check_id: &CheckId, message: impl fmt::Display) -> PipelineError {
    PipelineError::Resolution {
        check_id: check_id.clone(),
        message: message.to_string(),
    }
}

/// Resolves when the cancel flag goes up or the instance leaves the registry
async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

pub struct PipelineCoordinator {
    pub(super) catalog: Arc<dyn CheckCatalog>,
    pub(super) dice: Arc<dyn DiceResolver>,
    pub(super) store: Arc<dyn SharedStateStore>,
    pub(super) previews: OutcomePreviewStore,
    pub(super) collector: Arc<dyn InteractionCollector>,
    pub(super) dispatcher: CommandDispatcher,
    pub(super) registry: InstanceRegistry,
    pub(super) config: PipelineConfig,
}

impl PipelineCoordinator {
    pub fn new(
        catalog: Arc<dyn CheckCatalog>,
        dice: Arc<dyn DiceResolver>,
        store: Arc<dyn SharedStateStore>,
        collector: Arc<dyn InteractionCollector>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            dice,
            previews: OutcomePreviewStore::new(store.clone()),
            store,
            collector,
            dispatcher: CommandDispatcher::new(),
            registry: InstanceRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn previews(&self) -> &OutcomePreviewStore {
        &self.previews
    }

    pub fn store(&self) -> &Arc<dyn SharedStateStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Run a check through to commit or cancellation
    ///
    /// Unknown checks and type mismatches are errors. Unmet requirements
    /// resolve to an unsuccessful outcome with no instance.
    pub async fn execute_pipeline(
        &self,
        check_id: &CheckId,
        context: CheckContext,
    ) -> Result<PipelineOutcome> {
        let definition = self
            .catalog
            .get_check_definition(check_id)
            .ok_or_else(|| PipelineError::UnknownCheck(check_id.clone()))?;
        if context.check_type != definition.check_type {
            return Err(PipelineError::CheckTypeMismatch {
                check_id: check_id.clone(),
                expected: definition.check_type,
                actual: context.check_type,
            });
        }

        let state = self.store.read().await?;
        let (turn, phase) = (state.turn_state.turn, state.turn_state.phase);
        let mut instance = PipelineInstance::new(&definition, context, turn, phase);
        let instance_id = instance.instance_id;

        if let Some(missing) = unmet_requirement(&definition, &instance, &state) {
            tracing::warn!(check_id = %check_id, %missing, "Requirements not met");
            return Ok(PipelineOutcome::rejected(format!("requirements not met: {}", missing)));
        }

        let signals = self.registry.insert(instance.clone());
        let _registration = self.registry.registration(instance_id);
        if !definition.repeatable
            && !self.registry.try_lock(definition.check_type, check_id, instance_id)
        {
            tracing::warn!(check_id = %check_id, "Non-repeatable check already in progress");
            return Ok(PipelineOutcome::rejected(format!(
                "requirements not met: {} is already in progress",
                definition.name
            )));
        }

        instance.advance(InstanceStatus::Pending, PipelineStage::Validated);
        self.record(&instance).await?;
        tracing::info!(
            instance_id = %instance_id,
            check_id = %check_id,
            check_type = %definition.check_type,
            "Pipeline started"
        );

        instance.advance(InstanceStatus::Rolling, PipelineStage::Validated);
        let rolled = match self.record(&instance).await {
            Ok(()) => self.roll_and_preview(&mut instance, &definition).await,
            Err(e) => Err(e),
        };
        let summary = match rolled {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(
                    instance_id = %instance_id,
                    check_id = %check_id,
                    error = %e,
                    "Resolution failed"
                );
                self.discard(&instance).await;
                return Err(match e {
                    PipelineError::Resolution { .. } => e,
                    other => resolution_error(check_id, other),
                });
            }
        };

        instance.advance(InstanceStatus::AwaitingConfirmation, PipelineStage::AwaitingConfirmation);
        self.record(&instance).await?;
        tracing::info!(
            instance_id = %instance_id,
            check_id = %check_id,
            degree = %summary.degree,
            total = summary.total,
            "Awaiting confirmation"
        );

        self.await_and_commit(instance_id, signals).await
    }

    /// Roll, resolve the outcome and write it into the preview
    pub(super) async fn roll_and_preview(
        &self,
        instance: &mut PipelineInstance,
        definition: &CheckDefinition,
    ) -> Result<RollSummary> {
        let roll = self
            .dice
            .roll(&self.config.check_formula, &instance.roll_modifiers)
            .map_err(|e| resolution_error(&instance.check_id, e))?;
        let dc = definition.dc.unwrap_or(self.config.default_dc);
        let degree = degree_of_success(roll.total, roll.natural(), dc, self.config.critical_margin);
        instance.stage = PipelineStage::Rolled;

        let outcome = definition.outcome(degree).ok_or_else(|| {
            resolution_error(&instance.check_id, format!("no {} outcome defined", degree))
        })?;
        let modifiers = self.resolve_modifiers(definition, outcome, instance)?;

        let applied = AppliedOutcome {
            degree,
            actor_name: instance.context.actor_name.clone(),
            skill: instance.context.skill.clone(),
            effect: outcome.description.clone(),
            modifiers: modifiers.clone(),
            manual_effects: outcome.manual_effects.clone(),
            roll_breakdown: format!("{} vs DC {}", roll.breakdown, dc),
            effects_applied: false,
        };
        let ongoing = definition.persistence == Persistence::Ongoing && !outcome.ends_event;

        let preview_id = match instance.preview_id {
            Some(id) => id,
            None => self.open_preview(instance, definition).await?,
        };
        self.previews.store_outcome(preview_id, applied, ongoing).await?;
        let state = self.store.read().await?;
        self.previews
            .update_shortfall_resources(preview_id, compute_shortfalls(&state, &modifiers))
            .await?;
        instance.stage = PipelineStage::Previewed;

        Ok(RollSummary {
            instance_id: instance.instance_id,
            preview_id,
            degree,
            total: roll.total,
            natural: roll.natural(),
            breakdown: roll.breakdown,
            modifiers,
        })
    }

    /// Create the preview, or pick up the pending record of an ongoing event
    async fn open_preview(
        &self,
        instance: &mut PipelineInstance,
        definition: &CheckDefinition,
    ) -> Result<PreviewId> {
        let state = self.store.read().await?;
        let in_use: Vec<PreviewId> =
            self.registry.instances().iter().filter_map(|i| i.preview_id).collect();
        let reusable = state
            .previews
            .iter()
            .find(|p: &&OutcomePreview| {
                p.check_type == instance.check_type
                    && p.check_id == instance.check_id
                    && p.ongoing
                    && p.is_pending()
                    && !in_use.contains(&p.preview_id)
            })
            .map(|p| p.preview_id);

        let preview_id = match reusable {
            Some(id) => {
                instance.preview_id = Some(id);
                instance.reused_preview = true;
                self.registry.update(instance);
                tracing::debug!(
                    instance_id = %instance.instance_id,
                    preview_id = %id,
                    "Resuming ongoing event"
                );
                id
            }
            None => {
                let id = self
                    .previews
                    .create_instance(
                        instance.check_type,
                        instance.check_id.clone(),
                        definition.clone(),
                        instance.context.metadata.clone(),
                        instance.turn,
                    )
                    .await?;
                instance.preview_id = Some(id);
                self.registry.update(instance);
                id
            }
        };
        Ok(preview_id)
    }

    /// Outcome modifiers with dice rolled, plus the check's cost and any reroll spend
    fn resolve_modifiers(
        &self,
        definition: &CheckDefinition,
        outcome: &OutcomeDefinition,
        instance: &PipelineInstance,
    ) -> Result<Vec<ResolvedModifier>> {
        let mut resolved = Vec::with_capacity(outcome.modifiers.len() + definition.cost.len() + 1);
        for spec in &outcome.modifiers {
            let value = match &spec.value {
                ModifierValue::Fixed(value) => *value,
                ModifierValue::Dice(formula) => {
                    self.dice
                        .roll(formula, &[])
                        .map_err(|e| resolution_error(&instance.check_id, e))?
                        .total
                }
            };
            resolved.push(ResolvedModifier::new(spec.resource, value, "outcome"));
        }
        for cost in &definition.cost {
            resolved.push(ResolvedModifier::new(cost.resource, -cost.amount, "cost"));
        }
        let spent = instance.context.rerolls_used as i32 * self.config.reroll_fame_cost;
        if spent > 0 {
            resolved.push(ResolvedModifier::new(ResourceKind::Fame, -spent, "reroll"));
        }
        Ok(resolved)
    }

    /// Suspend until confirmed or cancelled, then run sub-steps and commit
    pub(super) async fn await_and_commit(
        &self,
        instance_id: InstanceId,
        signals: InstanceSignals,
    ) -> Result<PipelineOutcome> {
        let InstanceSignals { confirm, cancel } = signals;
        let confirmed = tokio::select! {
            received = confirm => received.is_ok(),
            _ = wait_cancelled(cancel.clone()) => false,
        };
        if !confirmed {
            return self.abort(instance_id, "cancelled").await;
        }

        let mut instance = self
            .registry
            .get(instance_id)
            .ok_or(PipelineError::UnknownInstance(instance_id))?;
        instance.advance(InstanceStatus::Resolved, PipelineStage::Confirmed);
        self.record(&instance).await?;
        tracing::info!(instance_id = %instance_id, check_id = %instance.check_id, "Confirmed");

        let Some(preview_id) = instance.preview_id else {
            return self.abort(instance_id, "no preview to apply").await;
        };
        let preview = match self.previews.get(preview_id).await? {
            Some(preview) => preview,
            None => return self.abort(instance_id, "preview no longer exists").await,
        };
        let Some(outcome) = preview.applied_outcome.clone() else {
            return self.abort(instance_id, "preview has no outcome").await;
        };
        let Some(outcome_def) = preview.check_data.outcome(outcome.degree).cloned() else {
            return self.abort(instance_id, "outcome missing from check data").await;
        };

        let commands = match self
            .collect_inputs(&mut instance, preview_id, &outcome_def, &cancel)
            .await
        {
            Ok(commands) => commands,
            Err(StepFailure::Cancelled) => return self.abort(instance_id, "cancelled").await,
            Err(StepFailure::Invalid(reason)) => {
                tracing::warn!(instance_id = %instance_id, %reason, "Sub-step failed");
                return self.abort(instance_id, &reason).await;
            }
        };

        if !self.registry.begin_commit(instance_id) {
            return self.abort(instance_id, "cancelled").await;
        }
        instance.advance(InstanceStatus::Resolved, PipelineStage::Committing);
        self.commit(instance, preview_id, outcome, commands).await
    }

    /// Run the outcome's sub-steps in order and prepare two-phase commands
    async fn collect_inputs(
        &self,
        instance: &mut PipelineInstance,
        preview_id: PreviewId,
        outcome: &OutcomeDefinition,
        cancel: &watch::Receiver<bool>,
    ) -> std::result::Result<Vec<GameCommand>, StepFailure> {
        let mut commands = outcome.commands.clone();

        if !outcome.interactions.is_empty() {
            instance.advance(InstanceStatus::Resolved, PipelineStage::Interacting);
            self.record(instance).await?;

            let mut progress = ResolutionProgress {
                resolving_user: instance.context.user_id.clone(),
                ..ResolutionProgress::default()
            };
            for step in &outcome.interactions {
                let request = InputRequest {
                    instance_id: instance.instance_id,
                    check_id: instance.check_id.clone(),
                    step_id: step.id.clone(),
                    kind: step.kind.clone(),
                    prompt: step.prompt.clone(),
                };
                let answer = tokio::select! {
                    answer = self.collector.request_input(request) => answer,
                    _ = wait_cancelled(cancel.clone()) => return Err(StepFailure::Cancelled),
                };
                let value = match answer? {
                    Some(value) => value,
                    None => return Err(StepFailure::Cancelled),
                };

                let state = self.store.read().await?;
                validate_input(&step.kind, &value, &state).map_err(StepFailure::Invalid)?;

                for command in &mut commands {
                    command.payload.insert(step.id.clone(), value.clone());
                }
                progress
                    .choices
                    .insert(step.id.clone(), serde_json::to_value(&value).unwrap_or(Value::Null));
                self.previews.update_resolution_progress(preview_id, progress.clone()).await?;
                tracing::debug!(
                    instance_id = %instance.instance_id,
                    step = %step.id,
                    "Input collected"
                );
            }
        }

        let two_phase: Vec<&GameCommand> = commands
            .iter()
            .filter(|c| command_class(&c.command_type) == Some(CommandClass::Prepared))
            .collect();
        if !two_phase.is_empty() {
            let state = self.store.read().await?;
            for command in two_phase {
                self.dispatcher
                    .prepare(instance.instance_id, command, &state)
                    .map_err(StepFailure::Invalid)?;
            }
        }

        Ok(commands)
    }

    /// The single write that applies an outcome, then cleanup
    async fn commit(
        &self,
        mut instance: PipelineInstance,
        preview_id: PreviewId,
        outcome: AppliedOutcome,
        commands: Vec<GameCommand>,
    ) -> Result<PipelineOutcome> {
        let instance_id = instance.instance_id;
        let modifiers = outcome.modifiers.clone();
        let unrest_per_shortfall = self.config.unrest_per_shortfall;
        let performed = (!instance.repeatable)
            .then(|| TurnState::performed_key(instance.check_type, &instance.check_id));
        let dispatcher = &self.dispatcher;
        let mirror = instance.clone();

        let mut command_results = Vec::new();
        let mut applied = Vec::new();
        let results_ref = &mut command_results;
        let applied_ref = &mut applied;
        let written = self
            .store
            .write_atomic(Box::new(move |state: &mut KingdomState| {
                for command in &commands {
                    results_ref.push(dispatcher.dispatch(command, state));
                }
                results_ref.extend(dispatcher.commit_prepared(instance_id, state));
                *applied_ref = apply_modifiers(state, &modifiers, unrest_per_shortfall);
                if let Some(key) = performed {
                    state.turn_state.performed.insert(key);
                }
                state.turn_state.pipelines.get_or_init().insert(mirror.instance_id, mirror);
                Ok(())
            }))
            .await;
        if let Err(e) = written {
            tracing::error!(instance_id = %instance_id, error = %e, "Commit write failed");
            self.discard(&instance).await;
            self.registry.remove(instance_id);
            return Err(e);
        }

        instance.advance(InstanceStatus::Applied, PipelineStage::CleanedUp);
        if let Err(e) = self.previews.mark_applied(preview_id).await {
            tracing::warn!(
                instance_id = %instance_id,
                error = %e,
                "Could not mark preview applied"
            );
        }
        if let Err(e) = self.previews.clear_resolution_progress(preview_id).await {
            tracing::warn!(
                instance_id = %instance_id,
                error = %e,
                "Could not clear resolution progress"
            );
        }
        if let Err(e) = self.forget(instance_id).await {
            tracing::warn!(
                instance_id = %instance_id,
                error = %e,
                "Could not drop persisted instance"
            );
        }
        self.registry.remove(instance_id);

        let errors: Vec<&str> = command_results.iter().filter_map(CommandResult::error).collect();
        for error in &errors {
            tracing::warn!(instance_id = %instance_id, %error, "Command failed");
        }
        tracing::info!(
            instance_id = %instance_id,
            check_id = %instance.check_id,
            degree = %outcome.degree,
            commands = command_results.len(),
            "Pipeline applied"
        );

        let execution_result = if errors.is_empty() {
            ExecutionResult::ok()
        } else {
            ExecutionResult::failed(errors.join("; "))
        };
        Ok(PipelineOutcome {
            execution_result,
            instance_id: Some(instance_id),
            preview_id: Some(preview_id),
            status: Some(InstanceStatus::Applied),
            degree: Some(outcome.degree),
            command_results,
            applied,
        })
    }

    /// Cancelled or failed before commit: undo everything the instance left behind
    async fn abort(&self, instance_id: InstanceId, reason: &str) -> Result<PipelineOutcome> {
        let instance = self.registry.get(instance_id);
        if let Some(instance) = &instance {
            self.discard(instance).await;
        }
        self.registry.remove(instance_id);
        tracing::info!(instance_id = %instance_id, %reason, "Pipeline cancelled");
        Ok(PipelineOutcome::cancelled(instance.as_ref(), instance_id, reason))
    }

    /// Drop prepared work, the preview and the persisted mirror; best effort
    pub(super) async fn discard(&self, instance: &PipelineInstance) {
        self.dispatcher.discard_prepared(instance.instance_id);
        if let Some(preview_id) = instance.preview_id {
            let keep = instance.reused_preview || self.previews.is_ongoing_event(preview_id).await;
            let cleared = if keep {
                self.previews.reset_to_pending(preview_id).await
            } else {
                self.previews.clear_instance(preview_id).await.map(|_| ())
            };
            if let Err(e) = cleared {
                tracing::warn!(
                    instance_id = %instance.instance_id,
                    error = %e,
                    "Could not clear preview"
                );
            }
        }
        if let Err(e) = self.forget(instance.instance_id).await {
            tracing::warn!(
                instance_id = %instance.instance_id,
                error = %e,
                "Could not drop persisted instance"
            );
        }
    }

    /// Write the instance through to the persisted mirror and the registry
    pub(super) async fn record(&self, instance: &PipelineInstance) -> Result<()> {
        let mirror = instance.clone();
        self.store
            .write_atomic(Box::new(move |state| {
                state.turn_state.pipelines.get_or_init().insert(mirror.instance_id, mirror);
                Ok(())
            }))
            .await?;
        self.registry.update(instance);
        Ok(())
    }

    pub(super) async fn forget(&self, instance_id: InstanceId) -> Result<()> {
        self.store
            .write_atomic(Box::new(move |state| {
                if let Some(pipelines) = state.turn_state.pipelines.get_mut() {
                    pipelines.remove(&instance_id);
                }
                Ok(())
            }))
            .await?;
        Ok(())
    }

    /// Resume a suspended instance. The handle is consumed on first use.
    pub fn confirm_apply(&self, instance_id: InstanceId) -> SignalOutcome {
        let outcome = self.registry.signal_confirm(instance_id);
        match outcome {
            SignalOutcome::Delivered => {
                tracing::info!(instance_id = %instance_id, "Confirm delivered")
            }
            other => tracing::debug!(instance_id = %instance_id, ?other, "Confirm ignored"),
        }
        outcome
    }

    /// Cancel an instance that has not begun committing
    ///
    /// Returns once the instance has cleaned up after itself.
    pub async fn cancel(&self, instance_id: InstanceId) -> SignalOutcome {
        let (outcome, done) = self.registry.request_cancel(instance_id);
        match outcome {
            SignalOutcome::Delivered => {
                tracing::info!(instance_id = %instance_id, "Cancel requested")
            }
            other => tracing::debug!(instance_id = %instance_id, ?other, "Cancel ignored"),
        }
        if let Some(mut done) = done {
            while done.changed().await.is_ok() {}
        }
        outcome
    }

    pub fn get_pending_instance(
        &self,
        check_type: CheckType,
        check_id: &CheckId,
    ) -> Option<PipelineInstance> {
        self.registry.find(check_type, check_id)
    }

    pub fn pending_instances(&self) -> Vec<PipelineInstance> {
        let mut instances = self.registry.instances();
        instances.sort_by(|a, b| a.check_id.cmp(&b.check_id));
        instances
    }

    /// Roll again with the captured modifiers; fame is spent at commit
    pub async fn reroll(&self, instance_id: InstanceId) -> Result<RollSummary> {
        let mut instance = self
            .registry
            .begin_reroll(instance_id)
            .map_err(|outcome| match outcome {
                SignalOutcome::Unknown => PipelineError::UnknownInstance(instance_id),
                other => PipelineError::InvalidState(format!(
                    "cannot reroll {}: {:?}",
                    instance_id, other
                )),
            })?;
        let result = self.reroll_instance(&mut instance).await;
        self.registry.end_reroll(instance_id);
        result
    }

    async fn reroll_instance(&self, instance: &mut PipelineInstance) -> Result<RollSummary> {
        let state = self.store.read().await?;
        let needed = self.config.reroll_fame_cost * (instance.context.rerolls_used as i32 + 1);
        if state.fame < needed {
            return Err(PipelineError::InvalidState(format!(
                "rerolling needs {} fame, the kingdom has {}",
                needed, state.fame
            )));
        }

        let preview_id = instance
            .preview_id
            .ok_or_else(|| PipelineError::InvalidState("no preview to reroll".into()))?;
        let definition = self
            .previews
            .get(preview_id)
            .await?
            .ok_or(PipelineError::PreviewNotFound(preview_id))?
            .check_data;

        instance.context.rerolls_used += 1;
        let summary = self.roll_and_preview(instance, &definition).await?;
        instance.stage = PipelineStage::AwaitingConfirmation;
        self.record(instance).await?;
        tracing::info!(
            instance_id = %instance.instance_id,
            rerolls = instance.context.rerolls_used,
            degree = %summary.degree,
            "Rerolled"
        );
        Ok(summary)
    }

    /// Cancel everything not yet committing, sweep previews, advance the turn
    pub async fn end_turn(&self) -> Result<TurnSummary> {
        let mut cancelled = 0;
        for instance_id in self.registry.pre_commit_ids() {
            if self.cancel(instance_id).await == SignalOutcome::Delivered {
                cancelled += 1;
            }
        }

        let mut cleared = 0;
        for check_type in CheckType::ALL {
            cleared += self.previews.clear_completed(check_type).await?;
        }

        let mut turn = 0;
        let turn_ref = &mut turn;
        self.store
            .write_atomic(Box::new(move |state| {
                state.turn_state.turn += 1;
                state.turn_state.phase = KingdomPhase::default();
                state.turn_state.performed.clear();
                *turn_ref = state.turn_state.turn;
                Ok(())
            }))
            .await?;

        tracing::info!(turn, cancelled, cleared, "Turn ended");
        Ok(TurnSummary {
            turn,
            cancelled,
            cleared,
        })
    }

    /// Enter a phase; leftover resolution state of its check type is reset
    pub async fn begin_phase(&self, phase: KingdomPhase) -> Result<usize> {
        self.store
            .write_atomic(Box::new(move |state| {
                state.turn_state.phase = phase;
                Ok(())
            }))
            .await?;
        let reset = match phase.check_type() {
            Some(check_type) => self.previews.clear_ongoing_resolutions(check_type).await?,
            None => 0,
        };
        tracing::info!(%phase, reset, "Phase started");
        Ok(reset)
    }
}

/// First requirement the kingdom does not meet, if any
fn unmet_requirement(
    definition: &CheckDefinition,
    instance: &PipelineInstance,
    state: &KingdomState,
) -> Option<String> {
    if !definition.allows_phase(instance.phase) {
        return Some(format!(
            "{} cannot be attempted during the {} phase",
            definition.name, instance.phase
        ));
    }
    if let Some(skill) = &instance.context.skill {
        if !definition.allows_skill(skill) {
            return Some(format!("{} cannot be attempted with {}", definition.name, skill));
        }
    }
    for cost in &definition.cost {
        let available = state.amount(cost.resource);
        if available < cost.amount {
            return Some(format!(
                "needs {} {}, the kingdom has {}",
                cost.amount, cost.resource, available
            ));
        }
    }
    if !definition.repeatable
        && state.turn_state.was_performed(definition.check_type, &definition.id)
    {
        return Some(format!("{} was already performed this turn", definition.name));
    }
    None
}
