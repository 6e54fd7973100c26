//! Towns: independent machine networks, each with its own slot table.

use crate::machine::{MachineInstance, Pipe, Placement};
use crate::registry::MachineRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of a machine within its town. Slots are stable: removing a machine
/// never renumbers the others.
pub type SlotId = u32;

/// The starting town.
pub const HOME: &str = "home";

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Static description of a town.
#[derive(Debug, Clone)]
pub struct TownDefinition {
    pub id: &'static str,
    /// Machine types every save of this town must contain, in slot order.
    pub default_machines: Vec<&'static str>,
    pub machines_prepay: Vec<f64>,
    pub upgrades_prepay: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct TownRegistry {
    towns: BTreeMap<&'static str, TownDefinition>,
}

impl TownRegistry {
    pub fn new(towns: impl IntoIterator<Item = TownDefinition>) -> Self {
        Self {
            towns: towns.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    pub fn standard() -> Self {
        Self::new([TownDefinition {
            id: HOME,
            default_machines: vec!["well", "quarry"],
            machines_prepay: vec![0.0, 0.0],
            upgrades_prepay: vec![0.0],
        }])
    }

    pub fn get(&self, id: &str) -> Option<&TownDefinition> {
        self.towns.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TownDefinition> {
        self.towns.values()
    }
}

// ---------------------------------------------------------------------------
// Runtime state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

/// Camera state for the town view. Persisted but not simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TownDisplay {
    pub offset: Offset,
    pub zoom: f64,
}

impl Default for TownDisplay {
    fn default() -> Self {
        Self {
            offset: Offset::default(),
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Town {
    pub machines: BTreeMap<SlotId, MachineInstance>,
    pub upgrades: u32,
    pub machines_prepay: Vec<f64>,
    pub upgrades_prepay: Vec<f64>,
    pub display: TownDisplay,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlacementError {
    #[error("machine type {0} is not registered")]
    UnknownType(String),
    #[error("slot {0} is empty")]
    EmptySlot(SlotId),
    #[error("machine in slot {0} is a town default and cannot be removed")]
    DefaultMachine(SlotId),
    #[error("cannot pipe slot {0} into itself")]
    SelfPipe(SlotId),
    #[error("machine in slot {slot} has no output {output}")]
    NoSuchOutput { slot: SlotId, output: usize },
    #[error("machine in slot {slot} has no input {input}")]
    NoSuchInput { slot: SlotId, input: usize },
    #[error("pipe already exists")]
    AlreadyConnected,
}

impl Town {
    /// A fresh town holding one instance of each default machine.
    pub fn new_default(definition: &TownDefinition, registry: &MachineRegistry) -> Self {
        let mut town = Town {
            machines_prepay: definition.machines_prepay.clone(),
            upgrades_prepay: definition.upgrades_prepay.clone(),
            ..Default::default()
        };
        town.ensure_default_machines(definition, registry);
        town
    }

    /// Lowest slot id with no machine.
    pub fn first_free_slot(&self) -> SlotId {
        let mut slot = 0;
        for &taken in self.machines.keys() {
            if taken != slot {
                break;
            }
            slot += 1;
        }
        slot
    }

    /// Place a new machine of `machine_type` in the lowest free slot.
    pub fn place_machine(
        &mut self,
        registry: &MachineRegistry,
        machine_type: &str,
        position: Placement,
    ) -> Result<SlotId, PlacementError> {
        let kind = registry
            .get(machine_type)
            .ok_or_else(|| PlacementError::UnknownType(machine_type.to_string()))?;
        let mut machine = kind.definition().instantiate(false);
        machine.position = position;
        let slot = self.first_free_slot();
        self.machines.insert(slot, machine);
        Ok(slot)
    }

    /// Remove a player-placed machine along with every pipe into it.
    pub fn remove_machine(&mut self, slot: SlotId) -> Result<MachineInstance, PlacementError> {
        match self.machines.get(&slot) {
            None => return Err(PlacementError::EmptySlot(slot)),
            Some(m) if m.is_default => return Err(PlacementError::DefaultMachine(slot)),
            Some(_) => {}
        }
        for machine in self.machines.values_mut() {
            for pipes in &mut machine.pipes {
                pipes.retain(|p| p.slot != slot);
            }
        }
        self.machines
            .remove(&slot)
            .ok_or(PlacementError::EmptySlot(slot))
    }

    /// Pipe output `output` of `from` into input `input` of `to`.
    pub fn connect(
        &mut self,
        registry: &MachineRegistry,
        from: SlotId,
        output: usize,
        to: SlotId,
        input: usize,
    ) -> Result<(), PlacementError> {
        if from == to {
            return Err(PlacementError::SelfPipe(from));
        }
        let target = self.machines.get(&to).ok_or(PlacementError::EmptySlot(to))?;
        let target_inputs = registry
            .get(&target.machine_type)
            .ok_or_else(|| PlacementError::UnknownType(target.machine_type.clone()))?
            .definition()
            .inputs
            .len();
        if input >= target_inputs {
            return Err(PlacementError::NoSuchInput { slot: to, input });
        }

        let source = self
            .machines
            .get_mut(&from)
            .ok_or(PlacementError::EmptySlot(from))?;
        let pipes = source
            .pipes
            .get_mut(output)
            .ok_or(PlacementError::NoSuchOutput { slot: from, output })?;
        let pipe = Pipe { slot: to, input };
        if pipes.contains(&pipe) {
            return Err(PlacementError::AlreadyConnected);
        }
        pipes.push(pipe);
        Ok(())
    }

    /// Remove a pipe. Returns whether one was removed.
    pub fn disconnect(&mut self, from: SlotId, output: usize, to: SlotId, input: usize) -> bool {
        let Some(pipes) = self
            .machines
            .get_mut(&from)
            .and_then(|m| m.pipes.get_mut(output))
        else {
            return false;
        };
        let before = pipes.len();
        pipes.retain(|p| *p != Pipe { slot: to, input });
        pipes.len() != before
    }

    /// Make sure each default machine of `definition` exists exactly once,
    /// matched by type among default instances. Missing ones go into the
    /// lowest free slot. Returns the slots filled.
    pub fn ensure_default_machines(
        &mut self,
        definition: &TownDefinition,
        registry: &MachineRegistry,
    ) -> Vec<SlotId> {
        let mut inserted = Vec::new();
        for &machine_type in &definition.default_machines {
            let present = self
                .machines
                .values()
                .any(|m| m.is_default && m.machine_type == machine_type);
            if present {
                continue;
            }
            let Some(kind) = registry.get(machine_type) else {
                tracing::warn!(
                    town = definition.id,
                    machine_type,
                    "default machine type is not registered"
                );
                continue;
            };
            let slot = self.first_free_slot();
            self.machines.insert(slot, kind.definition().instantiate(true));
            tracing::debug!(
                town = definition.id,
                machine_type,
                slot,
                "inserted missing default machine"
            );
            inserted.push(slot);
        }
        inserted
    }
}
