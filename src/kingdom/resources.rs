//! Resource modifier application
//!
//! Modifiers are applied as deltas against whatever the counters hold at
//! commit time, never as absolute targets: another pipeline may have
//! changed them since the preview was computed. Results are clamped
//! instead of asserting preconditions.

use serde::{Deserialize, Serialize};

use crate::core::types::ResourceKind;
use crate::kingdom::KingdomState;
use crate::preview::{ResolvedModifier, ResourceShortfall};

/// What one modifier actually did to the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDelta {
    pub resource: ResourceKind,
    pub requested: i32,
    pub applied: i32,
    /// Part of a negative delta the counter could not cover
    pub shortfall: i32,
}

/// Negative modifiers the current counters cannot cover
pub fn compute_shortfalls(
    state: &KingdomState,
    modifiers: &[ResolvedModifier],
) -> Vec<ResourceShortfall> {
    let mut shortfalls = Vec::new();
    for kind in ResourceKind::STOCK {
        let net: i32 = modifiers
            .iter()
            .filter(|m| m.resource == kind)
            .map(|m| m.value)
            .sum();
        let available = state.amount(kind);
        if net < 0 && available + net < 0 {
            shortfalls.push(ResourceShortfall {
                resource: kind,
                missing: -(available + net),
            });
        }
    }
    shortfalls
}

/// Apply modifiers in order, clamping every counter at zero
///
/// Each stock resource that ends up short adds `unrest_per_shortfall`
/// unrest once, after all modifiers ran.
pub fn apply_modifiers(
    state: &mut KingdomState,
    modifiers: &[ResolvedModifier],
    unrest_per_shortfall: i32,
) -> Vec<AppliedDelta> {
    let mut deltas = Vec::with_capacity(modifiers.len());
    let mut short_resources: Vec<ResourceKind> = Vec::new();

    for modifier in modifiers {
        let current = state.amount(modifier.resource);
        let target = current + modifier.value;
        let clamped = target.max(0);
        state.set_amount(modifier.resource, clamped);

        let shortfall = if target < 0 { -target } else { 0 };
        if shortfall > 0
            && modifier.resource.is_stock()
            && !short_resources.contains(&modifier.resource)
        {
            short_resources.push(modifier.resource);
        }

        deltas.push(AppliedDelta {
            resource: modifier.resource,
            requested: modifier.value,
            applied: clamped - current,
            shortfall,
        });
    }

    if !short_resources.is_empty() && unrest_per_shortfall > 0 {
        let penalty = short_resources.len() as i32 * unrest_per_shortfall;
        state.unrest += penalty;
        tracing::debug!(
            penalty,
            resources = ?short_resources,
            "Resource shortfall raised unrest"
        );
    }

    deltas
}
