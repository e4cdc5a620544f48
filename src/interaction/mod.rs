//! Interactive sub-steps
//!
//! After a preview is confirmed, an outcome may need more input from the
//! player (hexes to claim, a resource to gain, a settlement to recruit in).
//! Each request is its own suspension point; the pipeline awaits the
//! collector and treats `None` as the player backing out.

pub mod collector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::{CheckId, HexId, InstanceId, ResourceKind};
use crate::kingdom::KingdomState;

pub use collector::{ChannelCollector, PendingInput};

/// What kind of input a sub-step asks for, with its constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputKind {
    SelectHexes { count: usize },
    SelectResource { options: Vec<ResourceKind> },
    SelectSettlement,
    SelectArmy,
    DrawPath { max_length: usize },
    ChooseAmount { min: i32, max: i32 },
}

/// A value supplied by the player for a sub-step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InputValue {
    Hexes(Vec<HexId>),
    Resource(ResourceKind),
    Settlement(String),
    Army(String),
    Path(Vec<HexId>),
    Amount(i32),
}

/// One declared sub-step of an outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionStep {
    /// Key under which the value lands in command payloads
    pub id: String,
    pub kind: InputKind,
    #[serde(default)]
    pub prompt: String,
}

/// Request handed to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    pub instance_id: InstanceId,
    pub check_id: CheckId,
    pub step_id: String,
    pub kind: InputKind,
    pub prompt: String,
}

/// Source of player input for interactive sub-steps
#[async_trait]
pub trait InteractionCollector: Send + Sync {
    /// Resolves to `None` when the player cancels the picker
    async fn request_input(&self, request: InputRequest) -> Result<Option<InputValue>>;
}

/// Check a supplied value against the step's constraints and the current kingdom
pub fn validate_input(
    kind: &InputKind,
    value: &InputValue,
    state: &KingdomState,
) -> std::result::Result<(), String> {
    match (kind, value) {
        (InputKind::SelectHexes { count }, InputValue::Hexes(hexes)) => {
            if hexes.is_empty() {
                return Err("missing hex selection".into());
            }
            if hexes.len() > *count {
                return Err(format!("selected {} hexes, at most {} allowed", hexes.len(), count));
            }
            let mut seen = std::collections::BTreeSet::new();
            for hex in hexes {
                if !seen.insert(hex) {
                    return Err(format!("hex {} selected twice", hex));
                }
                if state.is_claimed(hex) {
                    return Err(format!("hex {} is already claimed", hex));
                }
            }
            Ok(())
        }
        (InputKind::SelectResource { options }, InputValue::Resource(resource)) => {
            if options.is_empty() || options.contains(resource) {
                Ok(())
            } else {
                Err(format!("{} is not one of the offered resources", resource))
            }
        }
        (InputKind::SelectSettlement, InputValue::Settlement(id)) => {
            if state.settlement(id).is_some() {
                Ok(())
            } else {
                Err(format!("unknown settlement: {}", id))
            }
        }
        (InputKind::SelectArmy, InputValue::Army(id)) => {
            if state.army(id).is_some() {
                Ok(())
            } else {
                Err(format!("unknown army: {}", id))
            }
        }
        (InputKind::DrawPath { max_length }, InputValue::Path(path)) => {
            if path.is_empty() {
                Err("missing deployment path".into())
            } else if path.len() > *max_length {
                Err(format!("path of {} hexes exceeds {}", path.len(), max_length))
            } else {
                Ok(())
            }
        }
        (InputKind::ChooseAmount { min, max }, InputValue::Amount(amount)) => {
            if (*min..=*max).contains(amount) {
                Ok(())
            } else {
                Err(format!("amount {} outside {}..={}", amount, min, max))
            }
        }
        (kind, value) => Err(format!("{:?} does not answer {:?}", value, kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_selection_rules() {
        let mut state = KingdomState::default();
        state.claim_hex(HexId::from("1.1"));
        let kind = InputKind::SelectHexes { count: 2 };

        let ok = InputValue::Hexes(vec!["2.2".into(), "2.3".into()]);
        assert!(validate_input(&kind, &ok, &state).is_ok());

        let too_many = InputValue::Hexes(vec!["2.2".into(), "2.3".into(), "2.4".into()]);
        assert!(validate_input(&kind, &too_many, &state).is_err());

        let claimed = InputValue::Hexes(vec!["1.1".into()]);
        assert!(validate_input(&kind, &claimed, &state).unwrap_err().contains("already claimed"));

        let empty = InputValue::Hexes(vec![]);
        assert_eq!(validate_input(&kind, &empty, &state).unwrap_err(), "missing hex selection");
    }

    #[test]
    fn test_mismatched_value_rejected() {
        let state = KingdomState::default();
        let result = validate_input(&InputKind::SelectSettlement, &InputValue::Amount(3), &state);
        assert!(result.is_err());
    }

    #[test]
    fn test_resource_options() {
        let state = KingdomState::default();
        let kind = InputKind::SelectResource {
            options: vec![ResourceKind::Lumber, ResourceKind::Stone],
        };
        assert!(validate_input(&kind, &InputValue::Resource(ResourceKind::Stone), &state).is_ok());
        assert!(validate_input(&kind, &InputValue::Resource(ResourceKind::Gold), &state).is_err());
    }
}
