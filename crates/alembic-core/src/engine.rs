//! The tick resolver and the engine that drives it across every town.
//!
//! # Per-machine resolution
//!
//! [`resolve_tick`] advances one machine by `diff` seconds:
//!
//! 1. **Plan** -- sum every producing output's requirements per input, then
//!    for each output compute a throughput factor in `[0, 1]`: the tightest
//!    of every requirement's `available / (total_demand * diff)` and the
//!    output's headroom over its nominal production. Outputs sharing an
//!    input split it. The factor is written to `output_diffs`.
//! 2. **Draw** -- each unlocked input's consumption is evaluated (formulas
//!    see the fresh factors through `output_diff`) and clamped to what the
//!    snapshot holds.
//! 3. **Commit** -- inputs are drained and outputs filled together.
//!
//! # Engine step
//!
//! [`Engine::step`] ticks every machine of every town in slot order, then
//! runs the pipe phase, then records which currencies were produced.

use crate::machine::{CurrencyUnlocks, MachineDefinition, MachineInstance, MachineView};
use crate::player::PlayerState;
use crate::port::OutputPortDef;
use crate::registry::{MachineRegistry, RegistryError};
use crate::resource::{ResourceAmount, ResourceType, Stack};
use crate::sim::{AdvanceResult, SimConfig, SimConfigError};
use crate::town::{SlotId, Town, TownRegistry};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Per-machine resolution
// ---------------------------------------------------------------------------

/// What one machine did during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub consumed: Vec<ResourceAmount>,
    pub produced: Vec<ResourceAmount>,
    /// The machine's state did not fit its definition, so it was left alone.
    pub skipped: bool,
}

impl TickOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Per-second draw on each `(input, resource)` pair, summed over every
/// output that will produce this tick.
type Demand = BTreeMap<(usize, Option<ResourceType>), f64>;

fn total_demand(view: &MachineView<'_>, ports: &[OutputPortDef]) -> Demand {
    let mut demand = Demand::new();
    for port in ports {
        let production = port.production(view);
        let producing = production.resource.is_some()
            && production.amount > 0.0
            && production.amount.is_finite();
        if !producing {
            continue;
        }
        for requirement in port.requirements(view) {
            if requirement.amount > 0.0 {
                *demand
                    .entry((requirement.input_id, requirement.resource))
                    .or_default() += requirement.amount;
            }
        }
    }
    demand
}

/// One output's share of the tick.
#[derive(Debug, Clone, Copy)]
struct OutputPlan {
    resource: Option<ResourceType>,
    rate: f64,
    capacity: f64,
    factor: f64,
}

impl OutputPlan {
    fn new(
        view: &MachineView<'_>,
        port: &OutputPortDef,
        buffer: &Stack,
        demand: &Demand,
        diff: f64,
    ) -> Self {
        let production = port.production(view);
        let capacity = port.capacity(view);
        let nominal = production.amount * diff;

        let factor = match production.resource {
            Some(resource) if nominal > 0.0 && nominal.is_finite() => {
                let mut factor = 1.0f64;
                for requirement in port.requirements(view) {
                    if requirement.amount > 0.0 {
                        let available = view.available(requirement.input_id, requirement.resource);
                        let total = demand
                            .get(&(requirement.input_id, requirement.resource))
                            .map_or(requirement.amount, |&d| d.max(requirement.amount));
                        factor = factor.min(available / (total * diff));
                    }
                }
                if buffer.holds_other(resource) {
                    factor = 0.0;
                } else {
                    let headroom = (capacity - buffer.amount_of(Some(resource))).max(0.0);
                    factor = factor.min(headroom / nominal);
                }
                if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) }
            }
            _ => 0.0,
        };

        Self {
            resource: production.resource,
            rate: production.amount,
            capacity,
            factor,
        }
    }
}

/// Advance one machine by `diff` seconds. See the module docs for phases.
///
/// A machine whose stored state does not match its definition (wrong meta
/// variant, wrong number of ports) is skipped for the tick.
pub fn resolve_tick(
    definition: &MachineDefinition,
    machine: &mut MachineInstance,
    unlocked: &CurrencyUnlocks,
    diff: f64,
) -> TickOutcome {
    if !(diff > 0.0 && diff.is_finite()) {
        return TickOutcome::default();
    }
    if !machine.fits(definition) {
        tracing::trace!(
            machine_type = definition.name,
            "machine state does not fit definition, skipping"
        );
        return TickOutcome::skipped();
    }

    // Phase 1: plan outputs against the snapshot.
    let plans: Vec<OutputPlan> = {
        let view = MachineView::new(definition, machine, unlocked);
        let demand = total_demand(&view, &definition.outputs);
        definition
            .outputs
            .iter()
            .zip(&machine.outputs)
            .map(|(port, buffer)| OutputPlan::new(&view, port, buffer, &demand, diff))
            .collect()
    };
    for (port, plan) in definition.outputs.iter().zip(&plans) {
        machine.output_diffs.insert(port.id.to_string(), plan.factor);
    }

    // Phase 2: input draws, clamped to the snapshot contents.
    let draws: Vec<f64> = {
        let view = MachineView::new(definition, machine, unlocked);
        definition
            .inputs
            .iter()
            .zip(&machine.inputs)
            .map(|(port, buffer)| {
                if buffer.is_empty() {
                    0.0
                } else {
                    (port.consumption(&view).rate() * diff).min(buffer.amount)
                }
            })
            .collect()
    };

    // Phase 3: commit.
    let mut outcome = TickOutcome::default();
    for (buffer, draw) in machine.inputs.iter_mut().zip(draws) {
        let Some(resource) = buffer.resource else {
            continue;
        };
        let amount = buffer.remove(draw);
        if amount > 0.0 {
            outcome.consumed.push(ResourceAmount { resource, amount });
        }
    }
    for (buffer, plan) in machine.outputs.iter_mut().zip(&plans) {
        let Some(resource) = plan.resource else {
            continue;
        };
        let amount = buffer.add(resource, plan.rate * plan.factor * diff, plan.capacity);
        if amount > 0.0 {
            outcome.produced.push(ResourceAmount { resource, amount });
        }
    }
    outcome
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Config(#[from] SimConfigError),
}

/// Totals for one engine step across every town.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub consumed: BTreeMap<ResourceType, f64>,
    pub produced: BTreeMap<ResourceType, f64>,
    /// Amount moved along pipes.
    pub piped: f64,
    /// Machines left alone because their type or state was not recognised.
    pub skipped: usize,
}

/// Immutable simulation context: machine kinds, town definitions, timing.
/// Player state is passed in by mutable reference on every call.
#[derive(Debug)]
pub struct Engine {
    registry: MachineRegistry,
    towns: TownRegistry,
    config: SimConfig,
}

impl Engine {
    pub fn new(
        registry: MachineRegistry,
        towns: TownRegistry,
        config: SimConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            registry,
            towns,
            config,
        })
    }

    /// Engine over the built-in machines and towns.
    pub fn standard(config: SimConfig) -> Result<Self, EngineError> {
        Self::new(MachineRegistry::standard()?, TownRegistry::standard(), config)
    }

    pub fn registry(&self) -> &MachineRegistry {
        &self.registry
    }

    pub fn towns(&self) -> &TownRegistry {
        &self.towns
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Advance by `real_dt` seconds of wall time, draining a bounded slice of
    /// the player's fast time on top.
    pub fn advance(&self, player: &mut PlayerState, real_dt: f64) -> AdvanceResult {
        let plan = self.config.plan(real_dt, player.fast_time);
        player.fast_time = plan.remaining_fast_time;
        for _ in 0..plan.steps {
            self.step(player, plan.step_secs);
        }
        AdvanceResult {
            steps_run: plan.steps,
            simulated_secs: plan.simulated_secs(),
            remaining_fast_time: player.fast_time,
        }
    }

    /// Run one step of `diff` seconds over every town.
    pub fn step(&self, player: &mut PlayerState, diff: f64) -> StepReport {
        let mut report = StepReport::default();
        let PlayerState {
            towns,
            unlocked_currencies,
            ..
        } = player;

        for (town_id, town) in towns.iter_mut() {
            self.tick_machines(town_id, town, unlocked_currencies, diff, &mut report);
            report.piped += self.run_pipes(town, unlocked_currencies, diff);
        }

        for (&resource, &amount) in &report.produced {
            if amount > 0.0 {
                player.unlocked_currencies.insert(resource, true);
            }
        }
        if let Some(elixir) = report.produced.get(&ResourceType::Elixir) {
            player.produced_elixir += elixir;
        }
        report
    }

    fn tick_machines(
        &self,
        town_id: &str,
        town: &mut Town,
        unlocked: &CurrencyUnlocks,
        diff: f64,
        report: &mut StepReport,
    ) {
        for (slot, machine) in town.machines.iter_mut() {
            let Some(kind) = self.registry.get(&machine.machine_type) else {
                tracing::trace!(
                    town = town_id,
                    slot,
                    machine_type = %machine.machine_type,
                    "unregistered machine type, skipping"
                );
                report.skipped += 1;
                continue;
            };
            let outcome = kind.tick(machine, unlocked, diff);
            if outcome.skipped {
                report.skipped += 1;
            }
            for c in outcome.consumed {
                *report.consumed.entry(c.resource).or_default() += c.amount;
            }
            for p in outcome.produced {
                *report.produced.entry(p.resource).or_default() += p.amount;
            }
        }
    }

    /// Move up to `pipe_rate * diff` along every pipe, source slots in
    /// order. Targets apply their normal admission rules.
    fn run_pipes(&self, town: &mut Town, unlocked: &CurrencyUnlocks, diff: f64) -> f64 {
        let budget = self.config.pipe_rate * diff;
        if !(budget > 0.0) {
            return 0.0;
        }
        let mut moved = 0.0;
        let slots: Vec<SlotId> = town.machines.keys().copied().collect();
        for from in slots {
            let pipes: Vec<(usize, Vec<_>)> = match town.machines.get(&from) {
                Some(m) => m.pipes.iter().cloned().enumerate().collect(),
                None => continue,
            };
            for (output, targets) in pipes {
                for pipe in targets {
                    let Some((resource, available)) = town
                        .machines
                        .get(&from)
                        .and_then(|m| m.outputs.get(output))
                        .and_then(|s| s.resource.filter(|_| !s.is_empty()).map(|r| (r, s.amount)))
                    else {
                        break;
                    };
                    let Some(target) = town.machines.get_mut(&pipe.slot) else {
                        continue;
                    };
                    let Some(kind) = self.registry.get(&target.machine_type) else {
                        continue;
                    };
                    let wanted = budget.min(available);
                    let added = match target.insert_input(
                        kind.definition(),
                        unlocked,
                        pipe.input,
                        resource,
                        wanted,
                    ) {
                        Ok(added) => added,
                        Err(_) => continue,
                    };
                    if let Some(source) = town
                        .machines
                        .get_mut(&from)
                        .and_then(|m| m.outputs.get_mut(output))
                    {
                        moved += source.remove(added);
                    }
                }
            }
        }
        moved
    }
}
