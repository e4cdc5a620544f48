//! Command dispatch - immediate execution and the prepared set

use ahash::AHashMap;
use std::sync::Mutex;

use crate::command::resolver::{CommandResolver, PreparedCommand};
use crate::command::{command_class, CommandClass, CommandResult, GameCommand};
use crate::core::types::InstanceId;
use crate::kingdom::KingdomState;

/// Routes commands by type and holds prepared work per pipeline instance
#[derive(Debug, Default)]
pub struct CommandDispatcher {
    prepared: Mutex<AHashMap<InstanceId, Vec<PreparedCommand>>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one command while committing
    ///
    /// Prepare/commit types report `Skipped`: their work is already in the
    /// prepared set and runs from `commit_prepared`.
    pub fn dispatch(&self, command: &GameCommand, state: &mut KingdomState) -> CommandResult {
        match command_class(&command.command_type) {
            Some(CommandClass::Immediate) => CommandResolver::execute(command, state),
            Some(CommandClass::Prepared) => CommandResult::Skipped {
                reason: format!("{} runs from the prepared set", command.command_type),
            },
            None => {
                CommandResult::failed(format!("unknown command type: {}", command.command_type))
            }
        }
    }

    /// Validate a prepare/commit command and queue it for the instance
    pub fn prepare(
        &self,
        instance_id: InstanceId,
        command: &GameCommand,
        state: &KingdomState,
    ) -> Result<(), String> {
        let prepared = PreparedCommand::prepare(command, state)?;
        let mut map = self.prepared.lock().map_err(|_| "prepared set poisoned".to_string())?;
        map.entry(instance_id).or_default().push(prepared);
        Ok(())
    }

    /// Remove and return the instance's prepared work; a second call gets nothing
    fn take_prepared(&self, instance_id: InstanceId) -> Vec<PreparedCommand> {
        match self.prepared.lock() {
            Ok(mut map) => map.remove(&instance_id).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Execute the instance's prepared work against the document
    pub fn commit_prepared(
        &self,
        instance_id: InstanceId,
        state: &mut KingdomState,
    ) -> Vec<CommandResult> {
        self.take_prepared(instance_id)
            .iter()
            .map(|prepared| prepared.commit(state))
            .collect()
    }

    /// Drop prepared work without running it; returns how many were dropped
    pub fn discard_prepared(&self, instance_id: InstanceId) -> usize {
        let dropped = self.take_prepared(instance_id).len();
        if dropped > 0 {
            tracing::debug!(instance_id = %instance_id, dropped, "Discarded prepared commands");
        }
        dropped
    }

    pub fn has_prepared(&self, instance_id: InstanceId) -> bool {
        self.prepared
            .lock()
            .map(|map| map.get(&instance_id).map(|v| !v.is_empty()).unwrap_or(false))
            .unwrap_or(false)
    }
}
