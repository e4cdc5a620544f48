//! Catalog loading from TOML

use ahash::AHashMap;
use serde::Deserialize;

use crate::catalog::{CheckCatalog, CheckDefinition};
use crate::core::types::{CheckId, CheckType};

const BUILTIN_CATALOG: &str = include_str!("builtin.toml");

/// Error type for catalog loading
#[derive(Debug, Clone)]
pub enum CatalogLoadError {
    IoError(String),
    ParseError(String),
    DuplicateCheck(String),
    EmptyId,
}

impl std::fmt::Display for CatalogLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogLoadError::IoError(e) => write!(f, "IO error: {}", e),
            CatalogLoadError::ParseError(e) => write!(f, "Parse error: {}", e),
            CatalogLoadError::DuplicateCheck(id) => write!(f, "Duplicate check id: {}", id),
            CatalogLoadError::EmptyId => write!(f, "Check with empty id"),
        }
    }
}

impl std::error::Error for CatalogLoadError {}

/// TOML representation of a catalog file
#[derive(Debug, Deserialize)]
struct TomlCatalog {
    #[serde(default)]
    checks: Vec<CheckDefinition>,
}

/// Catalog held in memory, keyed by check id
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    checks: AHashMap<CheckId, CheckDefinition>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The checks shipped with the crate
    pub fn builtin() -> Result<Self, CatalogLoadError> {
        Self::parse_toml(BUILTIN_CATALOG)
    }

    /// Load checks from a TOML file
    pub fn load_from_toml(path: &std::path::Path) -> Result<Self, CatalogLoadError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CatalogLoadError::IoError(e.to_string()))?;
        Self::parse_toml(&content)
    }

    /// Parse checks from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, CatalogLoadError> {
        let toml_data: TomlCatalog = toml::from_str(content)
            .map_err(|e| CatalogLoadError::ParseError(e.to_string()))?;

        let mut catalog = Self::new();
        for check in toml_data.checks {
            catalog.add(check)?;
        }
        Ok(catalog)
    }

    /// Add a definition; ids must be unique
    pub fn add(&mut self, check: CheckDefinition) -> Result<(), CatalogLoadError> {
        if check.id.as_str().is_empty() {
            return Err(CatalogLoadError::EmptyId);
        }
        if self.checks.contains_key(&check.id) {
            return Err(CatalogLoadError::DuplicateCheck(check.id.to_string()));
        }
        self.checks.insert(check.id.clone(), check);
        Ok(())
    }

    /// Merge another catalog in, replacing same-id entries
    pub fn extend(&mut self, other: StaticCatalog) {
        self.checks.extend(other.checks);
    }

    pub fn definition(&self, id: &CheckId) -> Option<&CheckDefinition> {
        self.checks.get(id)
    }

    /// All checks of one type, sorted by id
    pub fn of_type(&self, check_type: CheckType) -> Vec<&CheckDefinition> {
        let mut checks: Vec<_> = self
            .checks
            .values()
            .filter(|c| c.check_type == check_type)
            .collect();
        checks.sort_by(|a, b| a.id.cmp(&b.id));
        checks
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl CheckCatalog for StaticCatalog {
    fn get_check_definition(&self, id: &CheckId) -> Option<CheckDefinition> {
        self.checks.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModifierValue, Persistence};
    use crate::core::types::{Degree, ResourceKind};
    use crate::interaction::InputKind;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = StaticCatalog::builtin().unwrap();
        assert!(catalog.len() >= 8);

        let unrest = catalog.definition(&"deal-with-unrest".into()).unwrap();
        assert_eq!(unrest.check_type, CheckType::Action);
        assert!(!unrest.repeatable);
        let success = unrest.outcome(Degree::Success).unwrap();
        assert_eq!(success.modifiers[0].resource, ResourceKind::Unrest);
        assert_eq!(success.modifiers[0].value, ModifierValue::Fixed(-2));
    }

    #[test]
    fn test_builtin_interactions_and_commands() {
        let catalog = StaticCatalog::builtin().unwrap();
        let claim = catalog.definition(&"claim-hexes".into()).unwrap();
        let success = claim.outcome(Degree::Success).unwrap();
        assert_eq!(success.interactions.len(), 1);
        assert_eq!(success.interactions[0].kind, InputKind::SelectHexes { count: 1 });
        assert_eq!(success.interactions[0].id, "hexes");
        assert_eq!(success.commands[0].command_type, "claim_hexes");
        assert!(success.commands[0].payload.is_empty());
    }

    #[test]
    fn test_builtin_ongoing_event() {
        let catalog = StaticCatalog::builtin().unwrap();
        let bandits = catalog.definition(&"bandit-activity".into()).unwrap();
        assert_eq!(bandits.persistence, Persistence::Ongoing);
        assert!(bandits.outcome(Degree::Success).unwrap().ends_event);
        assert!(!bandits.outcome(Degree::Failure).unwrap().ends_event);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let toml = r#"
            [[checks]]
            id = "twice"
            name = "Twice"
            check_type = "action"
            [checks.outcomes.success]
            description = "ok"

            [[checks]]
            id = "twice"
            name = "Twice again"
            check_type = "action"
            [checks.outcomes.success]
            description = "ok"
        "#;
        assert!(matches!(
            StaticCatalog::parse_toml(toml),
            Err(CatalogLoadError::DuplicateCheck(_))
        ));
    }

    #[test]
    fn test_dice_modifier_values() {
        let toml = r#"
            [[checks]]
            id = "tax"
            name = "Collect Taxes"
            check_type = "action"
            repeatable = true
            [checks.outcomes.success]
            description = "Coins flow in"
            modifiers = [{ resource = "gold", value = "1d4" }, { resource = "unrest", value = 1 }]
        "#;
        let catalog = StaticCatalog::parse_toml(toml).unwrap();
        let tax = catalog.get_check_definition(&"tax".into()).unwrap();
        let mods = &tax.outcome(Degree::Success).unwrap().modifiers;
        assert_eq!(mods[0].value, ModifierValue::Dice("1d4".into()));
        assert_eq!(mods[1].value, ModifierValue::Fixed(1));
        assert!(tax.outcome(Degree::Failure).is_none());
    }
}
