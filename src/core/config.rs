//! Pipeline configuration with documented constants
//!
//! The coordinator receives its config by value at construction time;
//! there is no process-wide config.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::error::{PipelineError, Result};

/// Configuration for check resolution
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dice formula rolled for every skill check
    ///
    /// Situational modifiers and proficiency are added on top.
    pub check_formula: String,

    /// DC used when a catalog entry does not specify one
    pub default_dc: i32,

    /// Margin above/below the DC that upgrades to a critical result
    ///
    /// At 10, beating the DC by 10 is a critical success and missing it
    /// by 10 is a critical failure.
    pub critical_margin: i32,

    /// Fame spent per reroll
    ///
    /// The spend is recorded in the preview and deducted at commit,
    /// so a cancelled reroll costs nothing.
    pub reroll_fame_cost: i32,

    /// Unrest gained for each resource that cannot cover a negative modifier
    pub unrest_per_shortfall: i32,

    /// Seed for the default dice resolver
    pub dice_seed: u64,

    /// Where the JSON kingdom document lives (None = in-memory only)
    pub store_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            check_formula: "1d20".to_string(),
            default_dc: 15,
            critical_margin: 10,
            reroll_fame_cost: 1,
            unrest_per_shortfall: 1,
            dice_seed: 12345,
            store_path: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a TOML file, filling missing fields with defaults
    pub fn load_from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        config.validate().map_err(PipelineError::ConfigError)?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.critical_margin <= 0 {
            return Err(format!(
                "critical_margin ({}) must be positive",
                self.critical_margin
            ));
        }

        if self.reroll_fame_cost < 0 || self.unrest_per_shortfall < 0 {
            return Err("Costs and penalties must not be negative".into());
        }

        crate::dice::DiceFormula::parse(&self.check_formula)
            .map_err(|e| format!("check_formula: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::parse_toml("default_dc = 18\nreroll_fame_cost = 2\n").unwrap();
        assert_eq!(config.default_dc, 18);
        assert_eq!(config.reroll_fame_cost, 2);
        assert_eq!(config.check_formula, "1d20");
    }

    #[test]
    fn test_bad_formula_rejected() {
        let result = PipelineConfig::parse_toml("check_formula = \"twenty\"\n");
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }
}
