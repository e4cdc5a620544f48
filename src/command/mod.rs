//! Game commands carried by check outcomes
//!
//! Outcome definitions list commands by type name with static params.
//! Values collected by interactive sub-steps travel on the command itself
//! in `payload`, keyed by step id:
//! GameCommand -> CommandDispatcher -> CommandResolver (immediate)
//!                                  -> PreparedCommand (prepare, then commit)

pub mod executor;
pub mod resolver;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::core::types::{HexId, ResourceKind};
use crate::interaction::InputValue;

pub use executor::CommandDispatcher;
pub use resolver::{CommandResolver, PreparedCommand};

/// A command as declared by an outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameCommand {
    pub command_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "CommandPayload::is_empty")]
    pub payload: CommandPayload,
}

impl GameCommand {
    pub fn new(command_type: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            params: Map::new(),
            payload: CommandPayload::default(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_input(mut self, step_id: impl Into<String>, value: InputValue) -> Self {
        self.payload.insert(step_id, value);
        self
    }

    pub fn param_i32(&self, key: &str) -> Option<i32> {
        self.params
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn param_resource(&self, key: &str) -> Option<ResourceKind> {
        self.param_str(key).and_then(|s| s.parse().ok())
    }
}

/// Player input gathered for a command, keyed by sub-step id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandPayload {
    values: BTreeMap<String, InputValue>,
}

impl CommandPayload {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn insert(&mut self, step_id: impl Into<String>, value: InputValue) {
        self.values.insert(step_id.into(), value);
    }

    pub fn get(&self, step_id: &str) -> Option<&InputValue> {
        self.values.get(step_id)
    }

    pub fn hexes(&self) -> Option<&[HexId]> {
        self.values.values().find_map(|v| match v {
            InputValue::Hexes(hexes) => Some(hexes.as_slice()),
            _ => None,
        })
    }

    pub fn path(&self) -> Option<&[HexId]> {
        self.values.values().find_map(|v| match v {
            InputValue::Path(path) => Some(path.as_slice()),
            _ => None,
        })
    }

    pub fn resource(&self) -> Option<ResourceKind> {
        self.values.values().find_map(|v| match v {
            InputValue::Resource(kind) => Some(*kind),
            _ => None,
        })
    }

    pub fn settlement(&self) -> Option<&str> {
        self.values.values().find_map(|v| match v {
            InputValue::Settlement(id) => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn army(&self) -> Option<&str> {
        self.values.values().find_map(|v| match v {
            InputValue::Army(id) => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn amount(&self) -> Option<i32> {
        self.values.values().find_map(|v| match v {
            InputValue::Amount(n) => Some(*n),
            _ => None,
        })
    }
}

/// How the dispatcher treats a command type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Mutates the document directly while committing
    Immediate,
    /// Prepared before commit, executed by `commit_prepared`
    Prepared,
}

pub fn command_class(command_type: &str) -> Option<CommandClass> {
    match command_type {
        "gain_resource"
        | "adjust_unrest"
        | "adjust_fame"
        | "claim_hexes"
        | "gain_chosen_resource" => Some(CommandClass::Immediate),
        "recruit_unit" | "found_settlement" | "deploy_army" | "transfer_gold" => {
            Some(CommandClass::Prepared)
        }
        _ => None,
    }
}

/// Result of running one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResult {
    Applied { summary: String },
    /// Nothing to do here; the work happens elsewhere
    Skipped { reason: String },
    Failed { error: String },
}

impl CommandResult {
    pub fn applied(summary: impl Into<String>) -> Self {
        CommandResult::Applied { summary: summary.into() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        CommandResult::Failed { error: error.into() }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CommandResult::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            CommandResult::Failed { error } => Some(error),
            _ => None,
        }
    }
}
