//! The shared kingdom document
//!
//! Everything participants need to agree on lives here: counters,
//! territory, the preview list and the mirror of in-flight pipelines.
//! Stores hand out clones and accept whole-document replacements.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::types::{CheckId, CheckType, HexId, InstanceId, KingdomPhase, ResourceKind, Turn};
use crate::pipeline::PipelineInstance;
use crate::preview::OutcomePreview;

/// A substructure that is created on first write
///
/// Readers get `None` from an uninitialized section; writers must go
/// through `get_or_init`, so nothing writes into a container that was
/// never set up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section<T> {
    #[default]
    Uninitialized,
    Ready(T),
}

impl<T: Default> Section<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Section::Ready(value) => Some(value),
            Section::Uninitialized => None,
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Section::Ready(value) => Some(value),
            Section::Uninitialized => None,
        }
    }

    pub fn get_or_init(&mut self) -> &mut T {
        if let Section::Uninitialized = self {
            *self = Section::Ready(T::default());
        }
        match self {
            Section::Ready(value) => value,
            Section::Uninitialized => unreachable!("section initialized above"),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Section::Ready(_))
    }
}

/// Stockpiled commodities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceCounters {
    amounts: BTreeMap<ResourceKind, i32>,
}

impl ResourceCounters {
    pub fn get(&self, kind: ResourceKind) -> i32 {
        self.amounts.get(&kind).copied().unwrap_or(0)
    }

    pub fn set(&mut self, kind: ResourceKind, amount: i32) {
        self.amounts.insert(kind, amount);
    }
}

/// Hexes owned by the kingdom
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Territory {
    pub claimed: BTreeSet<HexId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: String,
    pub name: String,
    pub hex: HexId,
    #[serde(default)]
    pub garrison: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Army {
    pub id: String,
    pub name: String,
    pub home_settlement: Option<String>,
    pub location: Option<HexId>,
    #[serde(default)]
    pub route: Vec<HexId>,
}

/// A payment to another ledger (tribute, trade partner, vassal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransfer {
    pub ledger: String,
    pub amount: i32,
    pub turn: Turn,
}

/// Turn-scoped bookkeeping, including the pipeline mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnState {
    pub turn: Turn,
    pub phase: KingdomPhase,
    /// Mirror of every in-flight pipeline past validation
    #[serde(default)]
    pub pipelines: Section<BTreeMap<InstanceId, PipelineInstance>>,
    /// Non-repeatable checks already resolved this turn ("action:claim-hexes")
    #[serde(default)]
    pub performed: BTreeSet<String>,
}

impl Default for TurnState {
    fn default() -> Self {
        Self {
            turn: 1,
            phase: KingdomPhase::default(),
            pipelines: Section::Uninitialized,
            performed: BTreeSet::new(),
        }
    }
}

impl TurnState {
    pub fn performed_key(check_type: CheckType, check_id: &CheckId) -> String {
        format!("{}:{}", check_type, check_id)
    }

    pub fn was_performed(&self, check_type: CheckType, check_id: &CheckId) -> bool {
        self.performed.contains(&Self::performed_key(check_type, check_id))
    }

    pub fn pipeline(&self, id: InstanceId) -> Option<&PipelineInstance> {
        self.pipelines.get().and_then(|map| map.get(&id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KingdomState {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub turn_state: TurnState,
    #[serde(default)]
    pub resources: Section<ResourceCounters>,
    #[serde(default)]
    pub unrest: i32,
    #[serde(default)]
    pub fame: i32,
    #[serde(default)]
    pub territory: Section<Territory>,
    #[serde(default)]
    pub settlements: Vec<Settlement>,
    #[serde(default)]
    pub armies: Vec<Army>,
    #[serde(default)]
    pub transfers: Vec<LedgerTransfer>,
    /// Owned by the outcome preview store
    #[serde(default)]
    pub previews: Vec<OutcomePreview>,
}

impl KingdomState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder for starting counters
    pub fn with_amount(mut self, kind: ResourceKind, amount: i32) -> Self {
        self.set_amount(kind, amount);
        self
    }

    pub fn amount(&self, kind: ResourceKind) -> i32 {
        match kind {
            ResourceKind::Unrest => self.unrest,
            ResourceKind::Fame => self.fame,
            stock => self.resources.get().map(|r| r.get(stock)).unwrap_or(0),
        }
    }

    pub fn set_amount(&mut self, kind: ResourceKind, amount: i32) {
        match kind {
            ResourceKind::Unrest => self.unrest = amount,
            ResourceKind::Fame => self.fame = amount,
            stock => self.resources.get_or_init().set(stock, amount),
        }
    }

    pub fn is_claimed(&self, hex: &HexId) -> bool {
        self.territory.get().map(|t| t.claimed.contains(hex)).unwrap_or(false)
    }

    /// Returns false if the hex was already claimed
    pub fn claim_hex(&mut self, hex: HexId) -> bool {
        self.territory.get_or_init().claimed.insert(hex)
    }

    pub fn claimed_hexes(&self) -> usize {
        self.territory.get().map(|t| t.claimed.len()).unwrap_or(0)
    }

    pub fn settlement(&self, id: &str) -> Option<&Settlement> {
        self.settlements.iter().find(|s| s.id == id)
    }

    pub fn army(&self, id: &str) -> Option<&Army> {
        self.armies.iter().find(|a| a.id == id)
    }

    pub fn army_mut(&mut self, id: &str) -> Option<&mut Army> {
        self.armies.iter_mut().find(|a| a.id == id)
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &PipelineInstance> {
        self.turn_state.pipelines.get().into_iter().flat_map(|map| map.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_initializes_on_write() {
        let mut section: Section<Territory> = Section::Uninitialized;
        assert!(section.get().is_none());
        section.get_or_init().claimed.insert(HexId::from("1.1"));
        assert!(section.is_ready());
        assert_eq!(section.get().unwrap().claimed.len(), 1);
    }

    #[test]
    fn test_amounts_route_to_the_right_field() {
        let mut state = KingdomState::new("Stolen Lands")
            .with_amount(ResourceKind::Gold, 5)
            .with_amount(ResourceKind::Unrest, 2);
        state.set_amount(ResourceKind::Fame, 1);

        assert_eq!(state.amount(ResourceKind::Gold), 5);
        assert_eq!(state.amount(ResourceKind::Food), 0);
        assert_eq!(state.unrest, 2);
        assert_eq!(state.fame, 1);
    }

    #[test]
    fn test_uninitialized_sections_round_trip_through_json() {
        let state = KingdomState::new("Brevoy");
        let json = serde_json::to_string(&state).unwrap();
        let back: KingdomState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
        assert!(!back.territory.is_ready());
    }

    #[test]
    fn test_claim_is_idempotent() {
        let mut state = KingdomState::default();
        assert!(state.claim_hex("4.4".into()));
        assert!(!state.claim_hex("4.4".into()));
        assert_eq!(state.claimed_hexes(), 1);
    }
}
