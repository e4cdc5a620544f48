//! Dice resolution
//!
//! The pipeline treats rolling as a pure call: formula + modifiers in,
//! total + breakdown out. Which modifiers a character has is decided
//! by the caller and captured on the pipeline instance.

pub mod formula;
pub mod resolver;

use thiserror::Error;

pub use formula::DiceFormula;
pub use resolver::{
    assemble_roll, degree_of_success, DiceResolver, RollResult, ScriptedDice, SeededDice,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiceError {
    #[error("invalid dice formula: {0}")]
    InvalidFormula(String),

    #[error("scripted dice ran out of faces")]
    Exhausted,

    #[error("dice resolver unavailable")]
    Unavailable,
}
