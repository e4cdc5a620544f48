//! Dice resolvers and degree-of-success evaluation

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core::types::Degree;
use crate::dice::{DiceError, DiceFormula};
use crate::pipeline::RollModifier;

/// Result of rolling a formula with a modifier set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollResult {
    pub formula: String,
    /// Individual die faces, in roll order
    pub dice: Vec<i32>,
    /// Sum of the active modifiers (formula bonus excluded)
    pub modifier_total: i32,
    pub total: i32,
    /// Human-readable breakdown, e.g. "1d20 (14) + proficiency (trained) +2 = 16"
    pub breakdown: String,
}

impl RollResult {
    /// The first die face, used for natural 1 / natural 20 adjustments
    pub fn natural(&self) -> Option<i32> {
        self.dice.first().copied()
    }
}

/// Rolls dice formulas. Pure from the pipeline's point of view.
pub trait DiceResolver: Send + Sync {
    fn roll(&self, formula: &str, modifiers: &[RollModifier]) -> Result<RollResult, DiceError>;
}

/// Builds the result from already-rolled faces so every resolver shares
/// the same totals and breakdown text.
pub fn assemble_roll(
    formula: &DiceFormula,
    dice: Vec<i32>,
    modifiers: &[RollModifier],
) -> RollResult {
    let dice_sum = dice.iter().fold(0i32, |acc, d| acc.saturating_add(*d));
    let active: Vec<&RollModifier> = modifiers.iter().filter(|m| m.is_active()).collect();
    let modifier_total = active.iter().fold(0i32, |acc, m| acc.saturating_add(m.value));
    let total = dice_sum.saturating_add(formula.bonus).saturating_add(modifier_total);

    let mut breakdown = if formula.count == 0 {
        format!("{}", formula.bonus)
    } else {
        let faces: Vec<String> = dice.iter().map(|d| d.to_string()).collect();
        let mut text = format!("{}d{} ({})", formula.count, formula.sides, faces.join(", "));
        if formula.bonus != 0 {
            text.push_str(&format!(" {:+}", formula.bonus));
        }
        text
    };
    for modifier in &active {
        breakdown.push_str(&format!(" + {} {:+}", modifier.name, modifier.value));
    }
    breakdown.push_str(&format!(" = {}", total));

    RollResult {
        formula: formula.to_string(),
        dice,
        modifier_total,
        total,
        breakdown,
    }
}

/// Deterministic resolver backed by a seeded ChaCha stream
pub struct SeededDice {
    rng: Mutex<ChaCha8Rng>,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl DiceResolver for SeededDice {
    fn roll(&self, formula: &str, modifiers: &[RollModifier]) -> Result<RollResult, DiceError> {
        let parsed = DiceFormula::parse(formula)?;
        let mut rng = self.rng.lock().map_err(|_| DiceError::Unavailable)?;
        let dice = (0..parsed.count)
            .map(|_| rng.gen_range(1..=parsed.sides as i32))
            .collect();
        Ok(assemble_roll(&parsed, dice, modifiers))
    }
}

/// Replays a fixed sequence of die faces (tests, replays of logged turns)
pub struct ScriptedDice {
    faces: Mutex<VecDeque<i32>>,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = i32>) -> Self {
        Self {
            faces: Mutex::new(faces.into_iter().collect()),
        }
    }

    /// Queue more faces at the end of the script
    pub fn push(&self, faces: impl IntoIterator<Item = i32>) {
        if let Ok(mut queue) = self.faces.lock() {
            queue.extend(faces);
        }
    }
}

impl DiceResolver for ScriptedDice {
    fn roll(&self, formula: &str, modifiers: &[RollModifier]) -> Result<RollResult, DiceError> {
        let parsed = DiceFormula::parse(formula)?;
        let mut queue = self.faces.lock().map_err(|_| DiceError::Unavailable)?;
        let mut dice = Vec::with_capacity(parsed.count as usize);
        for _ in 0..parsed.count {
            let face = queue.pop_front().ok_or(DiceError::Exhausted)?;
            dice.push(face.clamp(1, parsed.sides as i32));
        }
        Ok(assemble_roll(&parsed, dice, modifiers))
    }
}

/// Degree of success against a DC, with natural 20 / natural 1 shifting one step
pub fn degree_of_success(
    total: i32,
    natural: Option<i32>,
    dc: i32,
    critical_margin: i32,
) -> Degree {
    let base = if total >= dc + critical_margin {
        Degree::CriticalSuccess
    } else if total >= dc {
        Degree::Success
    } else if total <= dc - critical_margin {
        Degree::CriticalFailure
    } else {
        Degree::Failure
    };

    match natural {
        Some(20) => base.upgrade(),
        Some(1) => base.downgrade(),
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modifier(name: &str, value: i32) -> RollModifier {
        RollModifier::new(name, value)
    }

    #[test]
    fn test_seeded_dice_are_deterministic() {
        let a = SeededDice::new(7);
        let b = SeededDice::new(7);
        for _ in 0..20 {
            let ra = a.roll("1d20", &[]).unwrap();
            let rb = b.roll("1d20", &[]).unwrap();
            assert_eq!(ra.dice, rb.dice);
            assert!((1..=20).contains(&ra.total));
        }
    }

    #[test]
    fn test_inactive_modifiers_are_skipped() {
        let dice = ScriptedDice::new([10]);
        let mut ignored = modifier("flanking", 5);
        ignored.ignored = true;
        let mut disabled = modifier("weather", -2);
        disabled.enabled = false;

        let result = dice
            .roll("1d20", &[modifier("proficiency", 2), ignored, disabled])
            .unwrap();

        assert_eq!(result.total, 12);
        assert_eq!(result.modifier_total, 2);
        assert!(result.breakdown.contains("proficiency +2"));
        assert!(!result.breakdown.contains("flanking"));
    }

    #[test]
    fn test_oversized_die_is_refused_without_poisoning() {
        let dice = SeededDice::new(1);
        assert!(matches!(
            dice.roll("1d3000000000", &[]),
            Err(DiceError::InvalidFormula(_))
        ));
        assert!(matches!(dice.roll("1d1001", &[]), Err(DiceError::InvalidFormula(_))));

        let scripted = ScriptedDice::new([7]);
        assert!(scripted.roll("1d3000000000", &[]).is_err());

        // The generator is still usable afterwards
        let result = dice.roll("1d20", &[]).unwrap();
        assert!((1..=20).contains(&result.total));
        assert_eq!(scripted.roll("1d20", &[]).unwrap().total, 7);
    }

    #[test]
    fn test_scripted_dice_exhaustion_is_an_error() {
        let dice = ScriptedDice::new([4]);
        assert!(dice.roll("1d6", &[]).is_ok());
        assert!(matches!(dice.roll("1d6", &[]), Err(DiceError::Exhausted)));
    }

    #[test]
    fn test_degrees_against_dc() {
        assert_eq!(degree_of_success(25, Some(15), 15, 10), Degree::CriticalSuccess);
        assert_eq!(degree_of_success(15, Some(15), 15, 10), Degree::Success);
        assert_eq!(degree_of_success(10, Some(10), 15, 10), Degree::Failure);
        assert_eq!(degree_of_success(5, Some(5), 15, 10), Degree::CriticalFailure);
    }

    #[test]
    fn test_natural_twenty_and_one_shift() {
        assert_eq!(degree_of_success(20, Some(20), 15, 10), Degree::CriticalSuccess);
        assert_eq!(degree_of_success(12, Some(20), 15, 10), Degree::Success);
        assert_eq!(degree_of_success(16, Some(1), 15, 10), Degree::Failure);
    }
}
