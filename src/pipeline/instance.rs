//! Pipeline instance records
//!
//! A `PipelineInstance` is both the in-memory view the coordinator works on
//! and the record mirrored into `TurnState.pipelines`, so a reload sees
//! exactly what the coordinator last persisted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::CheckDefinition;
use crate::core::types::{CheckId, CheckType, InstanceId, KingdomPhase, PreviewId, Turn};

/// Coarse lifecycle status, forward-only apart from cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Rolling,
    AwaitingConfirmation,
    /// Confirmed; sub-steps and commit in progress
    Resolved,
    Applied,
    Cancelled,
}

impl InstanceStatus {
    fn rank(&self) -> u8 {
        match self {
            InstanceStatus::Pending => 0,
            InstanceStatus::Rolling => 1,
            InstanceStatus::AwaitingConfirmation => 2,
            InstanceStatus::Resolved => 3,
            InstanceStatus::Applied => 4,
            InstanceStatus::Cancelled => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Applied | InstanceStatus::Cancelled)
    }

    pub fn can_advance_to(&self, next: InstanceStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == InstanceStatus::Cancelled || next.rank() > self.rank()
    }
}

/// Fine-grained stage along the canonical path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Created,
    Validated,
    Rolled,
    Previewed,
    AwaitingConfirmation,
    Confirmed,
    Interacting,
    Committing,
    CleanedUp,
    Cancelled,
}

impl PipelineStage {
    /// Cancellation is still possible
    pub fn is_pre_commit(&self) -> bool {
        !matches!(
            self,
            PipelineStage::Committing | PipelineStage::CleanedUp | PipelineStage::Cancelled
        )
    }
}

fn enabled_default() -> bool {
    true
}

/// A situational bonus or penalty on the skill roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollModifier {
    pub name: String,
    pub value: i32,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Shown to the player but left out of the total
    #[serde(default)]
    pub ignored: bool,
}

impl RollModifier {
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        Self {
            name: name.into(),
            value,
            enabled: true,
            ignored: false,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.ignored
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyRank {
    #[default]
    Untrained,
    Trained,
    Expert,
    Master,
    Legendary,
}

impl ProficiencyRank {
    pub fn bonus(&self) -> i32 {
        match self {
            ProficiencyRank::Untrained => 0,
            ProficiencyRank::Trained => 2,
            ProficiencyRank::Expert => 4,
            ProficiencyRank::Master => 6,
            ProficiencyRank::Legendary => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyRank::Untrained => "untrained",
            ProficiencyRank::Trained => "trained",
            ProficiencyRank::Expert => "expert",
            ProficiencyRank::Master => "master",
            ProficiencyRank::Legendary => "legendary",
        }
    }
}

/// Who is rolling what, supplied by the caller of `execute_pipeline`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckContext {
    pub check_type: CheckType,
    pub user_id: Option<String>,
    pub actor_name: Option<String>,
    pub skill: Option<String>,
    #[serde(default)]
    pub proficiency: ProficiencyRank,
    #[serde(default)]
    pub modifiers: Vec<RollModifier>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub rerolls_used: u32,
}

impl CheckContext {
    pub fn new(check_type: CheckType) -> Self {
        Self {
            check_type,
            user_id: None,
            actor_name: None,
            skill: None,
            proficiency: ProficiencyRank::default(),
            modifiers: Vec::new(),
            metadata: Map::new(),
            rerolls_used: 0,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_actor(mut self, actor_name: impl Into<String>) -> Self {
        self.actor_name = Some(actor_name.into());
        self
    }

    pub fn with_skill(mut self, skill: impl Into<String>, proficiency: ProficiencyRank) -> Self {
        self.skill = Some(skill.into());
        self.proficiency = proficiency;
        self
    }

    pub fn with_modifier(mut self, modifier: RollModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Proficiency bonus first, then the situational modifiers in order
    pub fn roll_modifiers(&self) -> Vec<RollModifier> {
        let mut modifiers = Vec::with_capacity(self.modifiers.len() + 1);
        if self.proficiency.bonus() > 0 {
            modifiers.push(RollModifier::new(
                format!("proficiency ({})", self.proficiency.as_str()),
                self.proficiency.bonus(),
            ));
        }
        modifiers.extend(self.modifiers.iter().cloned());
        modifiers
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInstance {
    pub instance_id: InstanceId,
    pub check_id: CheckId,
    pub check_type: CheckType,
    pub turn: Turn,
    pub phase: KingdomPhase,
    pub status: InstanceStatus,
    pub stage: PipelineStage,
    /// Captured once; rerolls use exactly these
    pub roll_modifiers: Vec<RollModifier>,
    pub context: CheckContext,
    pub preview_id: Option<PreviewId>,
    pub repeatable: bool,
    /// The preview belongs to an ongoing event and outlives this instance
    #[serde(default)]
    pub reused_preview: bool,
}

impl PipelineInstance {
    pub fn new(
        definition: &CheckDefinition,
        context: CheckContext,
        turn: Turn,
        phase: KingdomPhase,
    ) -> Self {
        Self {
            instance_id: InstanceId::new(),
            check_id: definition.id.clone(),
            check_type: definition.check_type,
            turn,
            phase,
            status: InstanceStatus::Pending,
            stage: PipelineStage::Created,
            roll_modifiers: context.roll_modifiers(),
            context,
            preview_id: None,
            repeatable: definition.repeatable,
            reused_preview: false,
        }
    }

    /// Move the status forward; returns false and leaves the record untouched
    /// for a backward or post-terminal transition
    pub fn advance(&mut self, status: InstanceStatus, stage: PipelineStage) -> bool {
        if status != self.status && !self.status.can_advance_to(status) {
            return false;
        }
        self.status = status;
        self.stage = stage;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_forward_only() {
        use InstanceStatus::*;
        assert!(Pending.can_advance_to(Rolling));
        assert!(AwaitingConfirmation.can_advance_to(Resolved));
        assert!(!Resolved.can_advance_to(AwaitingConfirmation));
        assert!(Resolved.can_advance_to(Cancelled));
        assert!(!Applied.can_advance_to(Cancelled));
        assert!(!Cancelled.can_advance_to(Applied));
    }

    #[test]
    fn test_commit_stages_are_not_cancellable() {
        assert!(PipelineStage::Interacting.is_pre_commit());
        assert!(!PipelineStage::Committing.is_pre_commit());
        assert!(!PipelineStage::CleanedUp.is_pre_commit());
    }

    #[test]
    fn test_roll_modifiers_include_proficiency() {
        let context = CheckContext::new(CheckType::Action)
            .with_skill("diplomacy", ProficiencyRank::Expert)
            .with_modifier(RollModifier::new("circumstance", 1))
            .with_modifier(RollModifier::new("status", -1).disabled());

        let modifiers = context.roll_modifiers();
        assert_eq!(modifiers.len(), 3);
        assert_eq!(modifiers[0].name, "proficiency (expert)");
        assert_eq!(modifiers[0].value, 4);
        assert!(!modifiers[2].is_active());
    }

    #[test]
    fn test_advance_rejects_backward_move() {
        let definition = crate::catalog::StaticCatalog::builtin()
            .unwrap()
            .definition(&"riot".into())
            .unwrap()
            .clone();
        let mut instance = PipelineInstance::new(
            &definition,
            CheckContext::new(CheckType::Incident),
            1,
            KingdomPhase::Unrest,
        );
        assert!(instance.advance(
            InstanceStatus::AwaitingConfirmation,
            PipelineStage::AwaitingConfirmation
        ));
        assert!(!instance.advance(InstanceStatus::Rolling, PipelineStage::Rolled));
        assert_eq!(instance.status, InstanceStatus::AwaitingConfirmation);
    }

    #[test]
    fn test_modifier_defaults_when_deserialized() {
        let modifier: RollModifier =
            serde_json::from_str(r#"{"name":"flanking","value":2}"#).unwrap();
        assert!(modifier.enabled);
        assert!(!modifier.ignored);
    }
}
