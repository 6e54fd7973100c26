//! The persisted player: towns, carried resources, discovery flags, options.

use crate::engine::Engine;
use crate::machine::CurrencyUnlocks;
use crate::port::PortError;
use crate::resource::{ResourceAmount, ResourceType, Stack};
use crate::town::{HOME, SlotId, Town};
use crate::upgrade::{PurchaseError, PurchaseReceipt, purchase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every valid save carries this exact marker.
pub const VITAL_MARKER: &str = "the-third-zuluhistorian";

/// Player preferences. Persisted with the save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    pub autosave: bool,
    pub export_count: u32,
    pub show_gridlines: bool,
    pub snap_to_grid: bool,
    pub minimap: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            autosave: true,
            export_count: 0,
            show_gridlines: true,
            snap_to_grid: true,
            minimap: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub money: f64,
    pub towns: BTreeMap<String, Town>,
    pub currently_in: String,
    /// The single resource stack the player is carrying.
    pub holding: Stack,
    pub unlocked_currencies: CurrencyUnlocks,
    /// Offline seconds still to be simulated.
    pub fast_time: f64,
    /// Wall-clock milliseconds at the last update.
    pub last_update_time: u64,
    /// Number of migrations already applied.
    pub migrations: u32,
    pub produced_elixir: f64,
    pub finished_end_cutscene: bool,
    pub vital_marker: String,
    pub options: Options,
}

impl PlayerState {
    /// A new game. `migrations` is the number of migrations the save layer
    /// knows about, so a fresh save never replays them.
    pub fn default_start(engine: &Engine, now_ms: u64, migrations: u32) -> Self {
        let towns = engine
            .towns()
            .iter()
            .map(|def| (def.id.to_string(), Town::new_default(def, engine.registry())))
            .collect();
        Self {
            money: 0.0,
            towns,
            currently_in: HOME.to_string(),
            holding: Stack::empty(),
            unlocked_currencies: ResourceType::ALL.iter().map(|&r| (r, false)).collect(),
            fast_time: 0.0,
            last_update_time: now_ms,
            migrations,
            produced_elixir: 0.0,
            finished_end_cutscene: false,
            vital_marker: VITAL_MARKER.to_string(),
            options: Options::default(),
        }
    }

    pub fn has_valid_marker(&self) -> bool {
        self.vital_marker == VITAL_MARKER
    }

    pub fn is_unlocked(&self, resource: ResourceType) -> bool {
        self.unlocked_currencies.get(&resource).copied().unwrap_or(false)
    }

    /// Pick up as much of output `output` as the holding slot can take.
    /// The holding slot has no capacity limit but holds a single resource.
    pub fn take_into_holding(
        &mut self,
        town: &str,
        slot: SlotId,
        output: usize,
    ) -> Result<ResourceAmount, PortError> {
        let machine = self
            .towns
            .get_mut(town)
            .ok_or_else(|| PortError::UnknownTown(town.to_string()))?
            .machines
            .get_mut(&slot)
            .ok_or(PortError::UnknownMachine(slot))?;
        let buffer = machine
            .outputs
            .get(output)
            .ok_or(PortError::NoSuchOutput(output))?;
        let Some(resource) = buffer.resource.filter(|_| !buffer.is_empty()) else {
            return Err(PortError::Empty);
        };
        if let Some(held) = self.holding.resource.filter(|_| self.holding.holds_other(resource)) {
            return Err(PortError::Occupied(held));
        }
        let taken = machine.take_output(output, f64::INFINITY)?;
        self.holding.add(taken.resource, taken.amount, f64::INFINITY);
        Ok(taken)
    }

    /// Put as much of the holding slot into input `input` as it admits.
    pub fn deposit_from_holding(
        &mut self,
        engine: &Engine,
        town: &str,
        slot: SlotId,
        input: usize,
    ) -> Result<f64, PortError> {
        let Some(resource) = self.holding.resource.filter(|_| !self.holding.is_empty()) else {
            return Err(PortError::Empty);
        };
        let machine = self
            .towns
            .get_mut(town)
            .ok_or_else(|| PortError::UnknownTown(town.to_string()))?
            .machines
            .get_mut(&slot)
            .ok_or(PortError::UnknownMachine(slot))?;
        let kind = engine
            .registry()
            .get(&machine.machine_type)
            .ok_or_else(|| PortError::UnknownType(machine.machine_type.clone()))?;
        let added = machine.insert_input(
            kind.definition(),
            &self.unlocked_currencies,
            input,
            resource,
            self.holding.amount,
        )?;
        self.holding.remove(added);
        Ok(added)
    }

    /// Buy the next level of `key` on the machine in `slot`, paying from the
    /// holding slot.
    pub fn purchase_upgrade(
        &mut self,
        engine: &Engine,
        town: &str,
        slot: SlotId,
        key: &str,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let unknown = || PurchaseError::UnknownMachine {
            town: town.to_string(),
            slot,
        };
        let machine = self
            .towns
            .get_mut(town)
            .and_then(|t| t.machines.get_mut(&slot))
            .ok_or_else(unknown)?;
        let kind = engine.registry().get(&machine.machine_type).ok_or_else(unknown)?;
        purchase(
            kind.definition(),
            machine,
            key,
            &mut self.holding,
            &self.unlocked_currencies,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Placement;
    use crate::test_utils::*;

    // -----------------------------------------------------------------------
    // Test 1: default start shape
    // -----------------------------------------------------------------------
    #[test]
    fn default_start_shape() {
        let engine = engine();
        let p = PlayerState::default_start(&engine, 1_000, 3);
        assert_eq!(p.currently_in, "home");
        assert_eq!(p.migrations, 3);
        assert_eq!(p.last_update_time, 1_000);
        assert!(p.has_valid_marker());
        assert!(p.holding.is_empty());
        assert_eq!(p.unlocked_currencies.len(), ResourceType::ALL.len());
        assert!(p.unlocked_currencies.values().all(|u| !u));
        assert!(p.options.autosave);
        assert_eq!(p.towns[HOME].machines.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Test 2: take then deposit through the holding slot
    // -----------------------------------------------------------------------
    #[test]
    fn take_and_deposit() {
        let engine = engine();
        let mut p = player(&engine);
        let town = p.towns.get_mut(HOME).unwrap();
        let furnace = town
            .place_machine(engine.registry(), "arcFurnace", Placement::default())
            .unwrap();
        town.machines.get_mut(&1).unwrap().outputs[0] = Stack::of(ResourceType::Stone, 6.0);

        let taken = p.take_into_holding(HOME, 1, 0).unwrap();
        assert_eq!(taken.amount, 6.0);
        assert_eq!(p.holding, Stack::of(ResourceType::Stone, 6.0));

        let added = p.deposit_from_holding(&engine, HOME, furnace, 0).unwrap();
        assert_eq!(added, 6.0);
        assert!(p.holding.is_empty());
        assert_eq!(
            p.towns[HOME].machines[&furnace].inputs[0],
            Stack::of(ResourceType::Stone, 6.0)
        );
    }

    // -----------------------------------------------------------------------
    // Test 3: holding another resource blocks pickup
    // -----------------------------------------------------------------------
    #[test]
    fn pickup_blocked_by_other_resource() {
        let engine = engine();
        let mut p = player(&engine);
        p.holding = Stack::of(ResourceType::Lava, 1.0);
        p.towns.get_mut(HOME).unwrap().machines.get_mut(&0).unwrap().outputs[0] =
            Stack::of(ResourceType::Water, 2.0);

        let err = p.take_into_holding(HOME, 0, 0).unwrap_err();
        assert_eq!(err, PortError::Occupied(ResourceType::Lava));
        assert_eq!(p.towns[HOME].machines[&0].outputs[0].amount, 2.0);
    }

    // -----------------------------------------------------------------------
    // Test 4: purchase through the player pays from holding
    // -----------------------------------------------------------------------
    #[test]
    fn purchase_through_player() {
        let engine = engine();
        let mut p = player(&engine);
        let velocity = engine
            .registry()
            .get("well")
            .unwrap()
            .definition()
            .upgrade("velocity")
            .unwrap()
            .clone();
        p.holding = Stack::of(velocity.currency_at(0), 100.0);

        let receipt = p.purchase_upgrade(&engine, HOME, 0, "velocity").unwrap();
        assert_eq!(receipt.new_level, 1);
        assert_close(p.holding.amount, 100.0 - velocity.cost_at(0));
        assert_eq!(p.towns[HOME].machines[&0].upgrade_count("velocity"), 1);

        let err = p.purchase_upgrade(&engine, HOME, 42, "velocity").unwrap_err();
        assert_eq!(
            err,
            PurchaseError::UnknownMachine {
                town: HOME.to_string(),
                slot: 42
            }
        );
    }

    #[test]
    fn deposit_with_empty_hands_fails() {
        let engine = engine();
        let mut p = player(&engine);
        assert_eq!(
            p.deposit_from_holding(&engine, HOME, 0, 0).unwrap_err(),
            PortError::Empty
        );
        assert_eq!(
            p.take_into_holding("elsewhere", 0, 0).unwrap_err(),
            PortError::UnknownTown("elsewhere".to_string())
        );
    }
}
