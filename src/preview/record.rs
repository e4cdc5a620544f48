//! Outcome preview records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::CheckDefinition;
use crate::core::types::{CheckId, CheckType, Degree, PreviewId, ResourceKind, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Pending,
    Resolved,
    Applied,
}

/// A numeric change to a kingdom counter, fully resolved (no dice left)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedModifier {
    pub resource: ResourceKind,
    pub value: i32,
    /// Where it came from: "outcome", "cost", "reroll", ...
    pub source: String,
}

impl ResolvedModifier {
    pub fn new(resource: ResourceKind, value: i32, source: impl Into<String>) -> Self {
        Self {
            resource,
            value,
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceShortfall {
    pub resource: ResourceKind,
    pub missing: i32,
}

/// What the dice decided, and whether it has been committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOutcome {
    pub degree: Degree,
    pub actor_name: Option<String>,
    pub skill: Option<String>,
    pub effect: String,
    pub modifiers: Vec<ResolvedModifier>,
    #[serde(default)]
    pub manual_effects: Vec<String>,
    pub roll_breakdown: String,
    /// false while previewed, true once committed
    pub effects_applied: bool,
}

/// Multi-participant scratch data while an outcome is being resolved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionProgress {
    pub resolving_user: Option<String>,
    #[serde(default)]
    pub choices: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePreview {
    pub preview_id: PreviewId,
    pub check_type: CheckType,
    pub check_id: CheckId,
    /// Catalog entry as it was when the check started
    pub check_data: CheckDefinition,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_turn: Turn,
    pub status: PreviewStatus,
    pub applied_outcome: Option<AppliedOutcome>,
    #[serde(default)]
    pub resolution_progress: Option<ResolutionProgress>,
    /// Event keeps coming back each turn until an outcome ends it
    #[serde(default)]
    pub ongoing: bool,
    #[serde(default)]
    pub shortfall: Vec<ResourceShortfall>,
}

impl OutcomePreview {
    pub fn new(
        check_type: CheckType,
        check_id: CheckId,
        check_data: CheckDefinition,
        metadata: Map<String, Value>,
        created_turn: Turn,
    ) -> Self {
        Self {
            preview_id: PreviewId::new(),
            check_type,
            check_id,
            check_data,
            metadata,
            created_turn,
            status: PreviewStatus::Pending,
            applied_outcome: None,
            resolution_progress: None,
            ongoing: false,
            shortfall: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PreviewStatus::Pending
    }
}
