//! Kingdom Checks - check resolution pipeline for kingdom turns
//!
//! A check is rolled, previewed, confirmed by a player and only then
//! committed to the shared kingdom document.

pub mod catalog;
pub mod command;
pub mod core;
pub mod dice;
pub mod interaction;
pub mod kingdom;
pub mod pipeline;
pub mod preview;
pub mod store;
pub mod ui;
