//! Machine types, machine instances, and the read-only view formulas see.
//!
//! A [`MachineDefinition`] is the static description shared by every
//! instance of a type: its ports, upgrades, recipes, and the factory for its
//! per-instance [`MachineMeta`]. A [`MachineInstance`] is the persisted,
//! mutable part: buffers, upgrade levels, latched meta state.
//!
//! Every machine type implements [`MachineKind`]. The default
//! [`MachineKind::tick`] runs the type's pre-tick hook and then the generic
//! resolver exactly once; types only override [`MachineKind::update_meta`].

use crate::engine::{TickOutcome, resolve_tick};
use crate::formula::Effect;
use crate::port::{InputPortDef, OutputPortDef, PortError};
use crate::recipe::{Recipe, RecipeBook};
use crate::resource::{ResourceAmount, ResourceType, Stack, maybe_resource};
use crate::upgrade::{UpgradeDef, UpgradeLevel, UpgradeLevels};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::mem::discriminant;

/// Which currencies the player has discovered, consulted by unlock gates.
pub type CurrencyUnlocks = BTreeMap<ResourceType, bool>;

// ---------------------------------------------------------------------------
// Per-type instance state
// ---------------------------------------------------------------------------

/// Extra state latched by a machine type's pre-tick hook. One variant per
/// family of machine types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MachineMeta {
    #[default]
    None,
    Furnace(FurnaceMeta),
    Purifier(PurifierMeta),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FurnaceMeta {
    #[serde(with = "maybe_resource")]
    pub input_resource: Option<ResourceType>,
    pub catalyst_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurifierMeta {
    #[serde(with = "maybe_resource")]
    pub input_resource: Option<ResourceType>,
}

impl MachineMeta {
    /// The latched input resource, if this kind of meta tracks one.
    pub fn input_resource(&self) -> Option<ResourceType> {
        match self {
            MachineMeta::None => None,
            MachineMeta::Furnace(m) => m.input_resource,
            MachineMeta::Purifier(m) => m.input_resource,
        }
    }

    pub fn same_kind(&self, other: &MachineMeta) -> bool {
        discriminant(self) == discriminant(other)
    }
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// Static description of a machine type.
#[derive(Debug, Clone)]
pub struct MachineDefinition {
    /// Registry key, persisted as the instance's `type`.
    pub name: &'static str,
    pub description: &'static str,
    /// Factory for a fresh instance's meta.
    pub meta: fn() -> MachineMeta,
    pub recipes: Option<RecipeBook>,
    pub inputs: Vec<InputPortDef>,
    pub outputs: Vec<OutputPortDef>,
    /// Upgrades in display order.
    pub upgrades: Vec<UpgradeDef>,
}

impl MachineDefinition {
    pub fn upgrade(&self, key: &str) -> Option<&UpgradeDef> {
        self.upgrades.iter().find(|u| u.name == key)
    }

    pub fn output_index(&self, id: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.id == id)
    }

    /// A fresh instance with empty buffers and every upgrade at level 0.
    pub fn instantiate(&self, is_default: bool) -> MachineInstance {
        MachineInstance {
            machine_type: self.name.to_string(),
            is_default,
            meta: (self.meta)(),
            upgrades: self
                .upgrades
                .iter()
                .map(|u| (u.name.to_string(), UpgradeLevel::default()))
                .collect(),
            inputs: vec![Stack::empty(); self.inputs.len()],
            outputs: vec![Stack::empty(); self.outputs.len()],
            output_diffs: BTreeMap::new(),
            pipes: vec![Vec::new(); self.outputs.len()],
            position: Placement::default(),
        }
    }
}

/// Behaviour of one machine type. Implementations are registered in a
/// [`crate::registry::MachineRegistry`] and looked up by type name.
pub trait MachineKind: std::fmt::Debug + Send + Sync {
    fn definition(&self) -> &MachineDefinition;

    /// Pre-tick hook: latch derived state into `machine.meta`.
    fn update_meta(&self, _machine: &mut MachineInstance) {}

    /// Advance one machine by `diff` seconds.
    fn tick(
        &self,
        machine: &mut MachineInstance,
        unlocked: &CurrencyUnlocks,
        diff: f64,
    ) -> TickOutcome {
        if machine.fits(self.definition()) {
            self.update_meta(machine);
        }
        resolve_tick(self.definition(), machine, unlocked, diff)
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// Where the UI placed the machine. Not interpreted by the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
}

/// A link from one of this machine's outputs to another machine's input in
/// the same town.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipe {
    pub slot: u32,
    pub input: usize,
}

/// A placed machine. Owned by a town, keyed by slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInstance {
    #[serde(rename = "type")]
    pub machine_type: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub meta: MachineMeta,
    #[serde(default)]
    pub upgrades: UpgradeLevels,
    #[serde(default)]
    pub inputs: Vec<Stack>,
    #[serde(default)]
    pub outputs: Vec<Stack>,
    /// Last tick's throughput factor per output id, in `[0, 1]`.
    #[serde(default)]
    pub output_diffs: BTreeMap<String, f64>,
    /// Outgoing pipes, one list per output port.
    #[serde(default)]
    pub pipes: Vec<Vec<Pipe>>,
    #[serde(default)]
    pub position: Placement,
}

impl MachineInstance {
    pub fn upgrade_count(&self, key: &str) -> u32 {
        self.upgrades.get(key).map_or(0, |u| u.count)
    }

    /// Whether the stored shape matches `definition`: same meta variant and
    /// port counts. Machines that don't fit are not simulated.
    pub fn fits(&self, definition: &MachineDefinition) -> bool {
        self.meta.same_kind(&(definition.meta)())
            && self.inputs.len() == definition.inputs.len()
            && self.outputs.len() == definition.outputs.len()
    }

    /// The contents of input `index`, if it holds anything.
    pub fn input_item(&self, index: usize) -> Option<&Stack> {
        self.inputs.get(index).filter(|s| !s.is_empty())
    }

    /// Admit up to `amount` of `resource` into input `index`.
    ///
    /// This is the only way resources enter a machine, so acceptance rules
    /// are enforced here rather than at tick time. Returns the amount
    /// admitted, which is limited by the port's free capacity.
    pub fn insert_input(
        &mut self,
        definition: &MachineDefinition,
        unlocked: &CurrencyUnlocks,
        index: usize,
        resource: ResourceType,
        amount: f64,
    ) -> Result<f64, PortError> {
        let port = definition
            .inputs
            .get(index)
            .ok_or(PortError::NoSuchInput(index))?;
        if !(amount > 0.0) {
            return Err(PortError::Empty);
        }
        let (is_unlocked, admits, capacity) = {
            let view = MachineView::new(definition, self, unlocked);
            (
                port.is_unlocked(&view),
                port.admits(&view, resource),
                port.capacity(&view),
            )
        };
        if !is_unlocked {
            return Err(PortError::Locked(index));
        }
        if !admits {
            return Err(PortError::NotAccepted(resource));
        }
        let buffer = self
            .inputs
            .get_mut(index)
            .ok_or(PortError::NoSuchInput(index))?;
        if let Some(held) = buffer.resource.filter(|_| buffer.holds_other(resource)) {
            return Err(PortError::Occupied(held));
        }
        let added = buffer.add(resource, amount, capacity);
        if added <= 0.0 {
            return Err(PortError::Full);
        }
        Ok(added)
    }

    /// Remove up to `max` from output `index`.
    pub fn take_output(&mut self, index: usize, max: f64) -> Result<ResourceAmount, PortError> {
        let buffer = self
            .outputs
            .get_mut(index)
            .ok_or(PortError::NoSuchOutput(index))?;
        let Some(resource) = buffer.resource.filter(|_| !buffer.is_empty()) else {
            return Err(PortError::Empty);
        };
        let amount = buffer.remove(max);
        if amount <= 0.0 {
            return Err(PortError::Empty);
        }
        Ok(ResourceAmount { resource, amount })
    }

    /// Bring a persisted instance in line with its current definition
    /// without disturbing valid data: missing upgrades start at level 0,
    /// levels are capped, port lists match the definition, stale meta is
    /// replaced, inputs holding something their port never accepts are
    /// emptied, and buffers are clamped to `[0, capacity]`.
    pub fn repair(&mut self, definition: &MachineDefinition, unlocked: &CurrencyUnlocks) {
        let fresh_meta = (definition.meta)();
        if !self.meta.same_kind(&fresh_meta) {
            self.meta = fresh_meta;
        }

        let mut upgrades = UpgradeLevels::new();
        for upgrade in &definition.upgrades {
            let count = self.upgrade_count(upgrade.name).min(upgrade.max);
            upgrades.insert(upgrade.name.to_string(), UpgradeLevel { count });
        }
        self.upgrades = upgrades;

        self.inputs.resize(definition.inputs.len(), Stack::empty());
        self.outputs.resize(definition.outputs.len(), Stack::empty());
        self.pipes.resize(definition.outputs.len(), Vec::new());
        self.output_diffs
            .retain(|id, factor| definition.output_index(id).is_some() && factor.is_finite());

        // Raw capacities and accept lists: a locked port keeps whatever it
        // held when it was last unlocked.
        let (input_caps, input_accepts, output_caps) = {
            let view = MachineView::new(definition, self, unlocked);
            let input_caps: Vec<f64> = definition
                .inputs
                .iter()
                .map(|p| p.capacity.eval(&view))
                .collect();
            let input_accepts: Vec<Vec<ResourceType>> = definition
                .inputs
                .iter()
                .map(|p| p.accepts.eval(&view))
                .collect();
            let output_caps: Vec<f64> = definition
                .outputs
                .iter()
                .map(|p| p.capacity.eval(&view))
                .collect();
            (input_caps, input_accepts, output_caps)
        };
        let inputs = self.inputs.iter_mut().zip(input_caps).zip(input_accepts);
        for ((buffer, cap), accepts) in inputs {
            if buffer.resource.is_some_and(|r| !accepts.contains(&r)) {
                *buffer = Stack::empty();
            }
            clamp_buffer(buffer, cap);
        }
        for (buffer, cap) in self.outputs.iter_mut().zip(output_caps) {
            clamp_buffer(buffer, cap);
        }
    }
}

fn clamp_buffer(buffer: &mut Stack, capacity: f64) {
    buffer.normalize();
    if capacity.is_finite() && buffer.amount > capacity {
        buffer.amount = capacity.max(0.0);
        buffer.normalize();
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Read-only view of one machine handed to every definition formula.
#[derive(Debug, Clone, Copy)]
pub struct MachineView<'a> {
    pub definition: &'a MachineDefinition,
    pub instance: &'a MachineInstance,
    pub unlocked: &'a CurrencyUnlocks,
}

impl<'a> MachineView<'a> {
    pub fn new(
        definition: &'a MachineDefinition,
        instance: &'a MachineInstance,
        unlocked: &'a CurrencyUnlocks,
    ) -> Self {
        Self {
            definition,
            instance,
            unlocked,
        }
    }

    /// Purchased level of `key`.
    pub fn count(&self, key: &str) -> u32 {
        self.instance.upgrade_count(key)
    }

    /// Effect of `key` at its current level. Unknown keys read as zero.
    pub fn effect(&self, key: &str) -> Effect {
        self.definition
            .upgrade(key)
            .map_or(Effect::Scalar(0.0), |u| u.effect_at(self.count(key)))
    }

    pub fn effect_f64(&self, key: &str) -> f64 {
        self.effect(key).as_f64()
    }

    pub fn effect_flag(&self, key: &str) -> bool {
        self.effect(key).as_bool()
    }

    pub fn meta(&self) -> &'a MachineMeta {
        &self.instance.meta
    }

    pub fn recipes(&self) -> Option<&'a RecipeBook> {
        self.definition.recipes.as_ref()
    }

    /// The recipe selected by the latched input resource, falling back to
    /// the idle recipe. `None` for types without recipes.
    pub fn active_recipe(&self) -> Option<&'a Recipe> {
        self.definition
            .recipes
            .as_ref()
            .map(|book| book.get(self.instance.meta.input_resource()))
    }

    /// This tick's throughput factor for output `id`. Reads as 1 before the
    /// machine has ever ticked.
    pub fn output_diff(&self, id: &str) -> f64 {
        self.instance.output_diffs.get(id).copied().unwrap_or(1.0)
    }

    pub fn input(&self, index: usize) -> Option<&'a Stack> {
        self.instance.inputs.get(index)
    }

    /// Usable amount of `resource` in input `index`: zero if the port is
    /// missing, locked, or holds something else.
    pub fn available(&self, index: usize, resource: Option<ResourceType>) -> f64 {
        let Some(port) = self.definition.inputs.get(index) else {
            return 0.0;
        };
        if !port.is_unlocked(self) {
            return 0.0;
        }
        self.input(index).map_or(0.0, |s| s.amount_of(resource))
    }

    pub fn currency_unlocked(&self, resource: ResourceType) -> bool {
        self.unlocked.get(&resource).copied().unwrap_or(false)
    }
}
