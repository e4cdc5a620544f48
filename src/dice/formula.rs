//! Dice formula parsing ("1d20", "2d4+1", "d6-1", "3")

use std::fmt;

use crate::dice::DiceError;

/// A parsed `NdS+B` formula
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceFormula {
    pub count: u32,
    pub sides: u32,
    pub bonus: i32,
}

/// Upper bound on dice per formula; anything larger is a data error
const MAX_DICE: u32 = 100;

/// Largest die size accepted; keeps every face and sum inside `i32`
const MAX_SIDES: u32 = 1000;

impl DiceFormula {
    /// A constant formula with no dice
    pub fn flat(bonus: i32) -> Self {
        Self { count: 0, sides: 0, bonus }
    }

    pub fn parse(input: &str) -> Result<Self, DiceError> {
        let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(DiceError::InvalidFormula(input.to_string()));
        }

        let lower = compact.to_lowercase();
        let Some(d_pos) = lower.find('d') else {
            let bonus = lower
                .parse::<i32>()
                .map_err(|_| DiceError::InvalidFormula(input.to_string()))?;
            return Ok(Self::flat(bonus));
        };

        let count = match &lower[..d_pos] {
            "" => 1,
            digits => digits
                .parse::<u32>()
                .map_err(|_| DiceError::InvalidFormula(input.to_string()))?,
        };

        let rest = &lower[d_pos + 1..];
        let (sides_part, bonus) = match rest.find(|c| c == '+' || c == '-') {
            Some(sign_pos) => {
                let bonus = rest[sign_pos..]
                    .parse::<i32>()
                    .map_err(|_| DiceError::InvalidFormula(input.to_string()))?;
                (&rest[..sign_pos], bonus)
            }
            None => (rest, 0),
        };

        let sides = sides_part
            .parse::<u32>()
            .map_err(|_| DiceError::InvalidFormula(input.to_string()))?;

        if sides == 0 || sides > MAX_SIDES || count == 0 || count > MAX_DICE {
            return Err(DiceError::InvalidFormula(input.to_string()));
        }

        Ok(Self { count, sides, bonus })
    }

    pub fn min(&self) -> i32 {
        (self.count as i32).saturating_add(self.bonus)
    }

    pub fn max(&self) -> i32 {
        let dice = self.count.saturating_mul(self.sides);
        i32::try_from(dice)
            .unwrap_or(i32::MAX)
            .saturating_add(self.bonus)
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "{}", self.bonus);
        }
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.bonus {
            0 => Ok(()),
            b if b > 0 => write!(f, "+{}", b),
            b => write!(f, "{}", b),
        }
    }
}
