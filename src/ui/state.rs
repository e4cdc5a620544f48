//! Console state for the turn REPL

use std::collections::VecDeque;

use crate::core::types::{InstanceId, Turn};
use crate::interaction::PendingInput;

/// Maximum turn log entries to keep
const MAX_LOG_ENTRIES: usize = 50;

/// REPL-side state: the turn log and the questions waiting for the player
#[derive(Debug, Default)]
pub struct ConsoleUI {
    /// Instance the bare `confirm` / `cancel` / `reroll` commands act on
    pub selected_instance: Option<InstanceId>,
    pub turn_log: VecDeque<LogEntry>,
    /// Sub-step requests in arrival order
    pub pending_inputs: VecDeque<PendingInput>,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub turn: Turn,
    pub message: String,
    pub category: LogCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Roll,
    Commit,
    Cancel,
    System,
}

impl ConsoleUI {
    pub fn new() -> Self {
        Self {
            selected_instance: None,
            turn_log: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            pending_inputs: VecDeque::new(),
        }
    }

    /// Add an entry to the turn log
    pub fn log(&mut self, turn: Turn, message: String, category: LogCategory) {
        if self.turn_log.len() >= MAX_LOG_ENTRIES {
            self.turn_log.pop_front();
        }
        self.turn_log.push_back(LogEntry {
            turn,
            message,
            category,
        });
    }

    pub fn recent(&self, count: usize) -> impl Iterator<Item = &LogEntry> {
        self.turn_log.iter().skip(self.turn_log.len().saturating_sub(count))
    }

    pub fn select(&mut self, instance_id: InstanceId) {
        self.selected_instance = Some(instance_id);
    }

    /// Forget the selection if it points at this instance
    pub fn deselect(&mut self, instance_id: InstanceId) {
        if self.selected_instance == Some(instance_id) {
            self.selected_instance = None;
        }
    }

    pub fn queue_input(&mut self, pending: PendingInput) {
        self.pending_inputs.push_back(pending);
    }

    pub fn next_input(&mut self) -> Option<PendingInput> {
        self.pending_inputs.pop_front()
    }

    /// Drop questions whose pipeline is gone
    pub fn forget_inputs_for(&mut self, instance_id: InstanceId) {
        self.pending_inputs.retain(|p| p.request.instance_id != instance_id);
    }
}
