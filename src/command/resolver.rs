//! Command resolution - turns command records into document mutations

use serde::{Deserialize, Serialize};

use crate::command::{CommandResult, GameCommand};
use crate::core::types::{HexId, ResourceKind};
use crate::kingdom::{Army, KingdomState, LedgerTransfer, Settlement};

/// Runs immediate commands against the document being committed
pub struct CommandResolver;

impl CommandResolver {
    pub fn execute(command: &GameCommand, state: &mut KingdomState) -> CommandResult {
        match command.command_type.as_str() {
            "gain_resource" => {
                let Some(resource) = command.param_resource("resource") else {
                    return CommandResult::failed("gain_resource needs a resource param");
                };
                let amount = command.param_i32("amount").unwrap_or(1);
                adjust(state, resource, amount)
            }
            "adjust_unrest" => {
                adjust(state, ResourceKind::Unrest, command.param_i32("amount").unwrap_or(0))
            }
            "adjust_fame" => {
                adjust(state, ResourceKind::Fame, command.param_i32("amount").unwrap_or(0))
            }
            "gain_chosen_resource" => {
                let Some(resource) = command.payload.resource() else {
                    return CommandResult::failed("missing resource selection");
                };
                let amount = command
                    .payload
                    .amount()
                    .or_else(|| command.param_i32("amount"))
                    .unwrap_or(1);
                adjust(state, resource, amount)
            }
            "claim_hexes" => claim_hexes(command, state),
            other => CommandResult::failed(format!("unknown command type: {}", other)),
        }
    }
}

fn adjust(state: &mut KingdomState, resource: ResourceKind, amount: i32) -> CommandResult {
    let current = state.amount(resource);
    let next = (current + amount).max(0);
    state.set_amount(resource, next);
    CommandResult::applied(format!("{} {:+}", resource, next - current))
}

fn claim_hexes(command: &GameCommand, state: &mut KingdomState) -> CommandResult {
    let hexes = match command.payload.hexes() {
        Some(hexes) if !hexes.is_empty() => hexes,
        _ => return CommandResult::failed("missing hex selection"),
    };

    let mut claimed = Vec::new();
    let mut taken = Vec::new();
    for hex in hexes {
        if state.claim_hex(hex.clone()) {
            claimed.push(hex.to_string());
        } else {
            taken.push(hex.to_string());
        }
    }

    if claimed.is_empty() {
        return CommandResult::failed(format!("hexes already claimed: {}", taken.join(", ")));
    }
    CommandResult::applied(format!("claimed {}", claimed.join(", ")))
}

/// A two-phase mutation, validated when prepared and executed at commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreparedCommand {
    RecruitUnit { settlement_id: String, unit_name: String },
    FoundSettlement { hex: HexId, name: String },
    DeployArmy { army_id: String, path: Vec<HexId> },
    TransferGold { ledger: String, amount: i32 },
}

impl PreparedCommand {
    /// Validate a prepare/commit command against the current document
    pub fn prepare(command: &GameCommand, state: &KingdomState) -> Result<Self, String> {
        match command.command_type.as_str() {
            "recruit_unit" => {
                let settlement_id = command
                    .payload
                    .settlement()
                    .ok_or("missing settlement selection")?;
                if state.settlement(settlement_id).is_none() {
                    return Err(format!("unknown settlement: {}", settlement_id));
                }
                Ok(PreparedCommand::RecruitUnit {
                    settlement_id: settlement_id.to_string(),
                    unit_name: command.param_str("name").unwrap_or("Militia").to_string(),
                })
            }
            "found_settlement" => {
                let hex = command
                    .payload
                    .hexes()
                    .and_then(|hexes| hexes.first())
                    .ok_or("missing hex selection")?;
                if state.settlements.iter().any(|s| &s.hex == hex) {
                    return Err(format!("hex {} already has a settlement", hex));
                }
                Ok(PreparedCommand::FoundSettlement {
                    hex: hex.clone(),
                    name: command.param_str("name").unwrap_or("New Village").to_string(),
                })
            }
            "deploy_army" => {
                let army_id = command.payload.army().ok_or("missing army selection")?;
                let path = match command.payload.path() {
                    Some(path) if !path.is_empty() => path,
                    _ => return Err("missing deployment path".to_string()),
                };
                if state.army(army_id).is_none() {
                    return Err(format!("unknown army: {}", army_id));
                }
                Ok(PreparedCommand::DeployArmy {
                    army_id: army_id.to_string(),
                    path: path.to_vec(),
                })
            }
            "transfer_gold" => {
                let amount = command
                    .payload
                    .amount()
                    .or_else(|| command.param_i32("amount"))
                    .unwrap_or(0);
                if amount <= 0 {
                    return Err("transfer amount must be positive".to_string());
                }
                if state.amount(ResourceKind::Gold) < amount {
                    return Err("insufficient gold for transfer".to_string());
                }
                Ok(PreparedCommand::TransferGold {
                    ledger: command.param_str("ledger").unwrap_or("treasury").to_string(),
                    amount,
                })
            }
            other => Err(format!("{} is not a prepare/commit command", other)),
        }
    }

    /// Execute against the document being committed
    ///
    /// The document may have moved since `prepare`, so conditions are
    /// checked again here.
    pub fn commit(&self, state: &mut KingdomState) -> CommandResult {
        match self {
            PreparedCommand::RecruitUnit { settlement_id, unit_name } => {
                let Some(hex) = state.settlement(settlement_id).map(|s| s.hex.clone()) else {
                    return CommandResult::failed(format!("unknown settlement: {}", settlement_id));
                };
                let army_id = next_id("army", state.armies.iter().map(|a| a.id.as_str()));
                state.armies.push(Army {
                    id: army_id.clone(),
                    name: unit_name.clone(),
                    home_settlement: Some(settlement_id.clone()),
                    location: Some(hex),
                    route: Vec::new(),
                });
                let garrison = state.settlements.iter_mut().find(|s| &s.id == settlement_id);
                if let Some(settlement) = garrison {
                    settlement.garrison.push(army_id.clone());
                }
                CommandResult::applied(format!(
                    "recruited {} ({}) in {}",
                    unit_name, army_id, settlement_id
                ))
            }
            PreparedCommand::FoundSettlement { hex, name } => {
                if state.settlements.iter().any(|s| &s.hex == hex) {
                    return CommandResult::failed(format!("hex {} already has a settlement", hex));
                }
                state.claim_hex(hex.clone());
                let id = next_id("settlement", state.settlements.iter().map(|s| s.id.as_str()));
                state.settlements.push(Settlement {
                    id: id.clone(),
                    name: name.clone(),
                    hex: hex.clone(),
                    garrison: Vec::new(),
                });
                CommandResult::applied(format!("founded {} ({}) at {}", name, id, hex))
            }
            PreparedCommand::DeployArmy { army_id, path } => {
                let Some(army) = state.army_mut(army_id) else {
                    return CommandResult::failed(format!("unknown army: {}", army_id));
                };
                army.route = path.clone();
                army.location = path.last().cloned();
                CommandResult::applied(format!("{} deployed over {} hexes", army_id, path.len()))
            }
            PreparedCommand::TransferGold { ledger, amount } => {
                let gold = state.amount(ResourceKind::Gold);
                if gold < *amount {
                    return CommandResult::failed("insufficient gold for transfer");
                }
                state.set_amount(ResourceKind::Gold, gold - amount);
                let turn = state.turn_state.turn;
                state.transfers.push(LedgerTransfer {
                    ledger: ledger.clone(),
                    amount: *amount,
                    turn,
                });
                CommandResult::applied(format!("sent {} gold to {}", amount, ledger))
            }
        }
    }
}

/// First "<prefix>-<n>" not already in use
fn next_id<'a>(prefix: &str, existing: impl Iterator<Item = &'a str>) -> String {
    let used: Vec<&str> = existing.collect();
    let mut n = used.len() + 1;
    loop {
        let candidate = format!("{}-{}", prefix, n);
        if !used.contains(&candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InputValue;

    fn kingdom() -> KingdomState {
        let mut state = KingdomState::new("Test").with_amount(ResourceKind::Gold, 5);
        state.settlements.push(Settlement {
            id: "capital".into(),
            name: "Tatzlford".into(),
            hex: "3.3".into(),
            garrison: Vec::new(),
        });
        state
    }

    #[test]
    fn test_claim_hexes_claims_payload_selection() {
        let mut state = kingdom();
        let command = GameCommand::new("claim_hexes")
            .with_input("hexes", InputValue::Hexes(vec!["4.4".into()]));

        let result = CommandResolver::execute(&command, &mut state);
        assert!(matches!(result, CommandResult::Applied { .. }));
        assert!(state.is_claimed(&"4.4".into()));
    }

    #[test]
    fn test_claim_hexes_without_selection_fails() {
        let mut state = kingdom();
        let result = CommandResolver::execute(&GameCommand::new("claim_hexes"), &mut state);
        assert_eq!(result.error(), Some("missing hex selection"));
        assert_eq!(state.claimed_hexes(), 0);
    }

    #[test]
    fn test_gain_resource_clamps_at_zero() {
        let mut state = kingdom();
        let command = GameCommand::new("gain_resource")
            .with_param("resource", "gold")
            .with_param("amount", -8);
        CommandResolver::execute(&command, &mut state);
        assert_eq!(state.amount(ResourceKind::Gold), 0);
    }

    #[test]
    fn test_recruit_needs_settlement() {
        let state = kingdom();
        let err = PreparedCommand::prepare(&GameCommand::new("recruit_unit"), &state).unwrap_err();
        assert_eq!(err, "missing settlement selection");
    }

    #[test]
    fn test_recruit_commit_adds_army_to_garrison() {
        let mut state = kingdom();
        let command = GameCommand::new("recruit_unit")
            .with_param("name", "Militia")
            .with_input("settlement", InputValue::Settlement("capital".into()));
        let prepared = PreparedCommand::prepare(&command, &state).unwrap();

        let result = prepared.commit(&mut state);
        assert!(!result.is_failed());
        assert_eq!(state.armies.len(), 1);
        assert_eq!(state.armies[0].location, Some(HexId::from("3.3")));
        assert_eq!(state.settlement("capital").unwrap().garrison, vec![state.armies[0].id.clone()]);
    }

    #[test]
    fn test_transfer_rechecks_gold_at_commit() {
        let mut state = kingdom();
        let command = GameCommand::new("transfer_gold")
            .with_param("amount", 4)
            .with_param("ledger", "Brevoy");
        let prepared = PreparedCommand::prepare(&command, &state).unwrap();

        state.set_amount(ResourceKind::Gold, 3);
        assert_eq!(prepared.commit(&mut state).error(), Some("insufficient gold for transfer"));
        assert!(state.transfers.is_empty());

        state.set_amount(ResourceKind::Gold, 6);
        assert!(!prepared.commit(&mut state).is_failed());
        assert_eq!(state.amount(ResourceKind::Gold), 2);
        assert_eq!(state.transfers[0].ledger, "Brevoy");
    }

    #[test]
    fn test_deploy_needs_path() {
        let mut state = kingdom();
        state.armies.push(Army {
            id: "army-1".into(),
            name: "Guard".into(),
            home_settlement: None,
            location: None,
            route: Vec::new(),
        });
        let command =
            GameCommand::new("deploy_army").with_input("army", InputValue::Army("army-1".into()));
        assert_eq!(
            PreparedCommand::prepare(&command, &state).unwrap_err(),
            "missing deployment path"
        );
    }

    #[test]
    fn test_next_id_skips_used() {
        assert_eq!(next_id("army", ["army-2"].into_iter()), "army-3");
        assert_eq!(next_id("army", ["army-1", "army-3"].into_iter()), "army-4");
    }
}
