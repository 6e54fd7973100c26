//! Per-machine upgrades: leveled modifiers bought with a resource currency.
//!
//! An [`UpgradeDef`] is static and shared by every instance of a machine
//! type. The only runtime state is the purchased level, an [`UpgradeLevel`]
//! stored on the instance. Costs, currencies and effects are pure functions
//! of that level, so they are evaluated fresh on every query.
//!
//! Purchasing goes through [`purchase`], which validates every precondition
//! before touching the player's holding slot or the level, so a failed
//! purchase never has side effects.

use crate::formula::{Effect, LevelFormula, Predicate};
use crate::machine::{MachineDefinition, MachineInstance, MachineView};
use crate::resource::{EPSILON, ResourceType, Stack};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// A purchasable upgrade. Registered with its machine definition; immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct UpgradeDef {
    /// Key under which the level is stored on instances.
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Price of the next level, given the current level.
    pub cost: LevelFormula<f64>,
    /// Resource spent on the next level, given the current level.
    pub currency: LevelFormula<ResourceType>,
    /// Level cap (inclusive).
    pub max: u32,
    pub effect: fn(u32) -> Effect,
    pub format_effect: Option<fn(Effect) -> String>,
    pub is_unlocked: Option<Predicate>,
}

impl UpgradeDef {
    pub fn cost_at(&self, level: u32) -> f64 {
        self.cost.at(level)
    }

    pub fn currency_at(&self, level: u32) -> ResourceType {
        self.currency.at(level)
    }

    pub fn effect_at(&self, level: u32) -> Effect {
        (self.effect)(level)
    }

    pub fn is_maxed(&self, level: u32) -> bool {
        level >= self.max
    }

    pub fn is_unlocked(&self, view: &MachineView<'_>) -> bool {
        self.is_unlocked.is_none_or(|p| p(view))
    }

    /// Human-readable effect at `level`.
    pub fn describe_effect(&self, level: u32) -> String {
        let effect = self.effect_at(level);
        match self.format_effect {
            Some(format) => format(effect),
            None => match effect {
                Effect::Flag(b) => if b { "Active" } else { "Inactive" }.to_string(),
                Effect::Scalar(v) => format!("x{v:.2}"),
                Effect::Pair(a, b) => format!("x{a:.2} / x{b:.2}"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime state
// ---------------------------------------------------------------------------

/// Purchased level of one upgrade on one machine instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeLevel {
    pub count: u32,
}

/// Levels keyed by upgrade name.
pub type UpgradeLevels = BTreeMap<String, UpgradeLevel>;

// ---------------------------------------------------------------------------
// Purchase
// ---------------------------------------------------------------------------

/// Why a purchase was refused. No state changes accompany any of these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PurchaseError {
    #[error("machine has no upgrade named {0}")]
    UnknownUpgrade(String),
    #[error("upgrade {name} is already at its maximum level {max}")]
    AtMax { name: String, max: u32 },
    #[error("upgrade {0} is locked")]
    Locked(String),
    #[error("upgrade {name} costs {expected}, holding {held:?}")]
    WrongCurrency {
        name: String,
        expected: ResourceType,
        held: Option<ResourceType>,
    },
    #[error("upgrade {name} costs {needed}, only {held} held")]
    InsufficientFunds { name: String, needed: f64, held: f64 },
    #[error("no machine of a registered type in slot {slot} of town {town}")]
    UnknownMachine { town: String, slot: u32 },
}

/// What a successful purchase spent and reached.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    pub upgrade: &'static str,
    pub currency: ResourceType,
    pub cost: f64,
    pub new_level: u32,
}

/// Buy the next level of `key` on `machine`, paying from `holding`.
///
/// Succeeds only if the upgrade is below its cap, unlocked, and the holding
/// slot contains at least `cost(level)` of `currency(level)`. On success the
/// cost is deducted and the level rises by exactly one.
pub fn purchase(
    definition: &MachineDefinition,
    machine: &mut MachineInstance,
    key: &str,
    holding: &mut Stack,
    unlocked: &BTreeMap<ResourceType, bool>,
) -> Result<PurchaseReceipt, PurchaseError> {
    let upgrade = definition
        .upgrade(key)
        .ok_or_else(|| PurchaseError::UnknownUpgrade(key.to_string()))?;
    let level = machine.upgrade_count(key);

    if upgrade.is_maxed(level) {
        return Err(PurchaseError::AtMax {
            name: key.to_string(),
            max: upgrade.max,
        });
    }

    let view = MachineView::new(definition, machine, unlocked);
    if !upgrade.is_unlocked(&view) {
        return Err(PurchaseError::Locked(key.to_string()));
    }

    let cost = upgrade.cost_at(level);
    let currency = upgrade.currency_at(level);
    if holding.resource != Some(currency) && cost > 0.0 {
        return Err(PurchaseError::WrongCurrency {
            name: key.to_string(),
            expected: currency,
            held: holding.resource,
        });
    }
    let held = holding.amount_of(Some(currency));
    if held + EPSILON < cost {
        return Err(PurchaseError::InsufficientFunds {
            name: key.to_string(),
            needed: cost,
            held,
        });
    }

    // All checks passed; commit.
    holding.remove(cost);
    let new_level = level + 1;
    machine
        .upgrades
        .insert(upgrade.name.to_string(), UpgradeLevel { count: new_level });

    Ok(PurchaseReceipt {
        upgrade: upgrade.name,
        currency,
        cost,
        new_level,
    })
}

// ---------------------------------------------------------------------------
// Cost curves
// ---------------------------------------------------------------------------

/// `base * multiplier^level`, the usual idle-game cost curve.
pub fn exponential_cost(base: f64, multiplier: f64, level: u32) -> f64 {
    base * multiplier.powi(level as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    // -----------------------------------------------------------------------
    // Test 1: purchase deducts and increments
    // -----------------------------------------------------------------------
    #[test]
    fn purchase_deducts_and_increments() {
        let reg = registry();
        let def = reg.get("arcFurnace").unwrap().definition();
        let mut machine = def.instantiate(false);
        let mut holding = Stack::of(ResourceType::Lava, 30.0);

        let receipt = purchase(def, &mut machine, "cat", &mut holding, &no_unlocks()).unwrap();
        assert_eq!(receipt.new_level, 1);
        assert_eq!(receipt.currency, ResourceType::Lava);
        assert_eq!(machine.upgrade_count("cat"), 1);
        assert_close(holding.amount, 5.0);
    }

    // -----------------------------------------------------------------------
    // Test 2: at max fails without side effects
    // -----------------------------------------------------------------------
    #[test]
    fn purchase_at_max_is_noop() {
        let reg = registry();
        let def = reg.get("arcFurnace").unwrap().definition();
        let mut machine = def.instantiate(false);
        machine
            .upgrades
            .insert("cat".to_string(), UpgradeLevel { count: 1 });
        let mut holding = Stack::of(ResourceType::Lava, 100.0);

        let err = purchase(def, &mut machine, "cat", &mut holding, &no_unlocks()).unwrap_err();
        assert!(matches!(err, PurchaseError::AtMax { max: 1, .. }));
        assert_eq!(machine.upgrade_count("cat"), 1);
        assert_eq!(holding.amount, 100.0);
    }

    // -----------------------------------------------------------------------
    // Test 3: insufficient funds leaves holding intact
    // -----------------------------------------------------------------------
    #[test]
    fn purchase_insufficient_funds() {
        let reg = registry();
        let def = reg.get("arcFurnace").unwrap().definition();
        let mut machine = def.instantiate(false);
        let mut holding = Stack::of(ResourceType::Lava, 24.0);

        let err = purchase(def, &mut machine, "cat", &mut holding, &no_unlocks()).unwrap_err();
        assert!(matches!(err, PurchaseError::InsufficientFunds { .. }));
        assert_eq!(holding.amount, 24.0);
        assert_eq!(machine.upgrade_count("cat"), 0);
    }

    // -----------------------------------------------------------------------
    // Test 4: currency varies per level
    // -----------------------------------------------------------------------
    #[test]
    fn currency_follows_level() {
        let reg = registry();
        let def = reg.get("arcFurnace").unwrap().definition();
        let velocity = def.upgrade("velocity").unwrap();
        assert_eq!(velocity.currency_at(0), ResourceType::Iron);
        assert_eq!(velocity.currency_at(2), ResourceType::Copper);

        let mut machine = def.instantiate(false);
        let mut holding = Stack::of(ResourceType::Iron, 4.0);
        purchase(def, &mut machine, "velocity", &mut holding, &no_unlocks()).unwrap();
        assert!(holding.is_empty());

        // Level 1 wants lead; iron is refused.
        let mut holding = Stack::of(ResourceType::Iron, 10.0);
        let err =
            purchase(def, &mut machine, "velocity", &mut holding, &no_unlocks()).unwrap_err();
        assert_eq!(
            err,
            PurchaseError::WrongCurrency {
                name: "velocity".to_string(),
                expected: ResourceType::Lead,
                held: Some(ResourceType::Iron),
            }
        );
        assert_eq!(holding.amount, 10.0);
    }

    // -----------------------------------------------------------------------
    // Test 5: locked upgrade refused
    // -----------------------------------------------------------------------
    #[test]
    fn locked_upgrade_refused() {
        let reg = registry();
        let def = reg.get("essencePurifier").unwrap().definition();
        let mut machine = def.instantiate(false);
        let mut holding = Stack::of(ResourceType::Lava, 1000.0);

        let err =
            purchase(def, &mut machine, "velocity", &mut holding, &no_unlocks()).unwrap_err();
        assert_eq!(err, PurchaseError::Locked("velocity".to_string()));
        assert_eq!(holding.amount, 1000.0);
    }

    // -----------------------------------------------------------------------
    // Test 6: unknown upgrade
    // -----------------------------------------------------------------------
    #[test]
    fn unknown_upgrade_refused() {
        let reg = registry();
        let def = reg.get("arcFurnace").unwrap().definition();
        let mut machine = def.instantiate(false);
        let mut holding = Stack::empty();
        let err = purchase(def, &mut machine, "warp", &mut holding, &no_unlocks()).unwrap_err();
        assert_eq!(err, PurchaseError::UnknownUpgrade("warp".to_string()));
    }

    // -----------------------------------------------------------------------
    // Test 7: every registered upgrade refuses purchase at max
    // -----------------------------------------------------------------------
    #[test]
    fn every_upgrade_refuses_at_max() {
        let reg = registry();
        for kind in reg.iter() {
            let def = kind.definition();
            for upgrade in &def.upgrades {
                let mut machine = def.instantiate(false);
                for u in &def.upgrades {
                    machine
                        .upgrades
                        .insert(u.name.to_string(), UpgradeLevel { count: u.max });
                }
                let before = machine.clone();
                let currency = upgrade.currency_at(upgrade.max);
                let mut holding = Stack::of(currency, 1e12);
                let result = purchase(def, &mut machine, upgrade.name, &mut holding, &no_unlocks());
                assert!(
                    matches!(result, Err(PurchaseError::AtMax { .. })),
                    "{}.{} should refuse at max",
                    def.name,
                    upgrade.name
                );
                assert_eq!(machine, before);
                assert_eq!(holding.amount, 1e12);
            }
        }
    }

    #[test]
    fn exponential_cost_curve() {
        assert_eq!(exponential_cost(30.0, 2.5, 0), 30.0);
        assert_close(exponential_cost(30.0, 2.5, 2), 187.5);
    }

    #[test]
    fn describe_effect_defaults() {
        let reg = registry();
        let def = reg.get("arcFurnace").unwrap().definition();
        assert_eq!(def.upgrade("velocity").unwrap().describe_effect(2), "x1.69");
        assert_eq!(def.upgrade("cat").unwrap().describe_effect(1), "");
    }
}
