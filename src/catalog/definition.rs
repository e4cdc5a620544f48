//! Check definitions: per-degree outcomes, costs, repeatability

use serde::{Deserialize, Serialize};

use crate::command::GameCommand;
use crate::core::types::{CheckId, CheckType, Degree, KingdomPhase, ResourceKind};
use crate::interaction::InteractionStep;

/// Whether an event ends once resolved or keeps coming back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    #[default]
    OneShot,
    Ongoing,
}

/// A modifier amount: fixed, or rolled when the preview is computed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModifierValue {
    Fixed(i32),
    Dice(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierSpec {
    pub resource: ResourceKind,
    pub value: ModifierValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCost {
    pub resource: ResourceKind,
    pub amount: i32,
}

/// What happens at one degree of success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeDefinition {
    pub description: String,
    #[serde(default)]
    pub modifiers: Vec<ModifierSpec>,
    #[serde(default)]
    pub commands: Vec<GameCommand>,
    /// Input the player must supply after confirming, in order
    #[serde(default)]
    pub interactions: Vec<InteractionStep>,
    /// Effects the table applies by hand
    #[serde(default)]
    pub manual_effects: Vec<String>,
    /// For ongoing events: this outcome resolves the event for good
    #[serde(default)]
    pub ends_event: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcomes {
    #[serde(default)]
    pub critical_success: Option<OutcomeDefinition>,
    #[serde(default)]
    pub success: Option<OutcomeDefinition>,
    #[serde(default)]
    pub failure: Option<OutcomeDefinition>,
    #[serde(default)]
    pub critical_failure: Option<OutcomeDefinition>,
}

impl Outcomes {
    pub fn get(&self, degree: Degree) -> Option<&OutcomeDefinition> {
        match degree {
            Degree::CriticalSuccess => self.critical_success.as_ref(),
            Degree::Success => self.success.as_ref(),
            Degree::Failure => self.failure.as_ref(),
            Degree::CriticalFailure => self.critical_failure.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDefinition {
    pub id: CheckId,
    pub name: String,
    pub check_type: CheckType,
    #[serde(default)]
    pub description: String,
    /// Skills that may be rolled; empty = any
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub dc: Option<i32>,
    /// Repeatable checks may run any number of times per turn
    #[serde(default)]
    pub repeatable: bool,
    /// Paid at commit, validated up front
    #[serde(default)]
    pub cost: Vec<ResourceCost>,
    /// Phases the check may start in; empty = any
    #[serde(default)]
    pub phases: Vec<KingdomPhase>,
    #[serde(default)]
    pub persistence: Persistence,
    pub outcomes: Outcomes,
}

impl CheckDefinition {
    pub fn outcome(&self, degree: Degree) -> Option<&OutcomeDefinition> {
        self.outcomes.get(degree)
    }

    pub fn allows_skill(&self, skill: &str) -> bool {
        self.skills.is_empty() || self.skills.iter().any(|s| s.eq_ignore_ascii_case(skill))
    }

    pub fn allows_phase(&self, phase: KingdomPhase) -> bool {
        self.phases.is_empty() || self.phases.contains(&phase)
    }
}
