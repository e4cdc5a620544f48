//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a pipeline instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for an outcome preview record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewId(pub Uuid);

impl PreviewId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PreviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PreviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog key of a check ("deal-with-unrest", "bandit-activity", ...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(pub String);

impl CheckId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CheckId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CheckId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kingdom turn counter
pub type Turn = u32;

/// The three families of checks resolved by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Action,
    Event,
    Incident,
}

impl CheckType {
    pub const ALL: [CheckType; 3] = [CheckType::Action, CheckType::Event, CheckType::Incident];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Action => "action",
            CheckType::Event => "event",
            CheckType::Incident => "incident",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "action" => Ok(CheckType::Action),
            "event" => Ok(CheckType::Event),
            "incident" => Ok(CheckType::Incident),
            other => Err(format!("unknown check type: {}", other)),
        }
    }
}

/// Phases of a kingdom turn, in turn order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KingdomPhase {
    #[default]
    Status,
    Resources,
    Unrest,
    Events,
    Actions,
    Upkeep,
}

impl KingdomPhase {
    pub const ORDER: [KingdomPhase; 6] = [
        KingdomPhase::Status,
        KingdomPhase::Resources,
        KingdomPhase::Unrest,
        KingdomPhase::Events,
        KingdomPhase::Actions,
        KingdomPhase::Upkeep,
    ];

    /// Check type resolved during this phase, if any
    pub fn check_type(&self) -> Option<CheckType> {
        match self {
            KingdomPhase::Unrest => Some(CheckType::Incident),
            KingdomPhase::Events => Some(CheckType::Event),
            KingdomPhase::Actions => Some(CheckType::Action),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<KingdomPhase> {
        let idx = Self::ORDER.iter().position(|p| p == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

impl fmt::Display for KingdomPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KingdomPhase::Status => "status",
            KingdomPhase::Resources => "resources",
            KingdomPhase::Unrest => "unrest",
            KingdomPhase::Events => "events",
            KingdomPhase::Actions => "actions",
            KingdomPhase::Upkeep => "upkeep",
        };
        f.write_str(name)
    }
}

impl FromStr for KingdomPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ORDER
            .iter()
            .copied()
            .find(|phase| phase.to_string() == s.to_lowercase())
            .ok_or_else(|| format!("unknown phase: {}", s))
    }
}

/// Degree of success of a check roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Degree {
    CriticalSuccess,
    Success,
    Failure,
    CriticalFailure,
}

impl Degree {
    pub fn is_success(&self) -> bool {
        matches!(self, Degree::CriticalSuccess | Degree::Success)
    }

    /// One step better, saturating at critical success
    pub fn upgrade(self) -> Self {
        match self {
            Degree::CriticalFailure => Degree::Failure,
            Degree::Failure => Degree::Success,
            Degree::Success | Degree::CriticalSuccess => Degree::CriticalSuccess,
        }
    }

    /// One step worse, saturating at critical failure
    pub fn downgrade(self) -> Self {
        match self {
            Degree::CriticalSuccess => Degree::Success,
            Degree::Success => Degree::Failure,
            Degree::Failure | Degree::CriticalFailure => Degree::CriticalFailure,
        }
    }
}

impl fmt::Display for Degree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Degree::CriticalSuccess => "critical success",
            Degree::Success => "success",
            Degree::Failure => "failure",
            Degree::CriticalFailure => "critical failure",
        };
        f.write_str(name)
    }
}

/// Scalar kingdom counters a check outcome can modify
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Gold,
    Food,
    Lumber,
    Stone,
    Ore,
    Luxuries,
    Unrest,
    Fame,
}

impl ResourceKind {
    /// Stockpiled commodities (everything except unrest and fame)
    pub const STOCK: [ResourceKind; 6] = [
        ResourceKind::Gold,
        ResourceKind::Food,
        ResourceKind::Lumber,
        ResourceKind::Stone,
        ResourceKind::Ore,
        ResourceKind::Luxuries,
    ];

    pub fn is_stock(&self) -> bool {
        !matches!(self, ResourceKind::Unrest | ResourceKind::Fame)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Gold => "gold",
            ResourceKind::Food => "food",
            ResourceKind::Lumber => "lumber",
            ResourceKind::Stone => "stone",
            ResourceKind::Ore => "ore",
            ResourceKind::Luxuries => "luxuries",
            ResourceKind::Unrest => "unrest",
            ResourceKind::Fame => "fame",
        };
        f.write_str(name)
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gold" => Ok(ResourceKind::Gold),
            "food" => Ok(ResourceKind::Food),
            "lumber" => Ok(ResourceKind::Lumber),
            "stone" => Ok(ResourceKind::Stone),
            "ore" => Ok(ResourceKind::Ore),
            "luxuries" => Ok(ResourceKind::Luxuries),
            "unrest" => Ok(ResourceKind::Unrest),
            "fame" => Ok(ResourceKind::Fame),
            other => Err(format!("unknown resource: {}", other)),
        }
    }
}

/// Map hex coordinate label, e.g. "5.12"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexId(pub String);

impl From<&str> for HexId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for HexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_steps_saturate() {
        assert_eq!(Degree::CriticalSuccess.upgrade(), Degree::CriticalSuccess);
        assert_eq!(Degree::CriticalFailure.downgrade(), Degree::CriticalFailure);
        assert_eq!(Degree::Failure.upgrade(), Degree::Success);
        assert_eq!(Degree::Success.downgrade(), Degree::Failure);
    }

    #[test]
    fn test_phase_check_types() {
        assert_eq!(KingdomPhase::Events.check_type(), Some(CheckType::Event));
        assert_eq!(KingdomPhase::Unrest.check_type(), Some(CheckType::Incident));
        assert_eq!(KingdomPhase::Status.check_type(), None);
        assert_eq!(KingdomPhase::Actions.next(), Some(KingdomPhase::Upkeep));
        assert_eq!(KingdomPhase::Upkeep.next(), None);
        assert_eq!("Events".parse::<KingdomPhase>(), Ok(KingdomPhase::Events));
        assert!("harvest".parse::<KingdomPhase>().is_err());
    }

    #[test]
    fn test_instance_id_round_trips_through_string() {
        let id = InstanceId::new();
        let parsed: InstanceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
