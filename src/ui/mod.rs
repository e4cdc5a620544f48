//! UI module - console state and prompt parsing for the turn REPL

pub mod input;
pub mod state;

pub use input::{describe_kind, parse_answer};
pub use state::{ConsoleUI, LogCategory, LogEntry};
