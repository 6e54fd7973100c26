//! Ordered, one-shot migrations over loaded player state.
//!
//! `PlayerState::migrations` counts how many entries of the list a save has
//! already been through. Loading runs the remainder in order and bumps the
//! counter after each, so every migration runs exactly once per save. New
//! migrations are only ever appended.

use alembic_core::player::PlayerState;

/// Mutates a freshly merged state in place.
pub type MigrationFn = fn(&mut PlayerState);

/// A named step, so logs say which migration ran.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub run: MigrationFn,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationList {
    steps: Vec<Migration>,
}

impl MigrationList {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Every migration the game has shipped, oldest first.
    pub fn standard() -> Self {
        let mut list = Self::new();
        list.push("clamp-negative-totals", clamp_negative_totals)
            .push("backfill-unlocked-currencies", backfill_unlocked_currencies)
            .push("normalize-zoom", normalize_zoom);
        list
    }

    pub fn push(&mut self, name: &'static str, run: MigrationFn) -> &mut Self {
        self.steps.push(Migration { name, run });
        self
    }

    /// Number of migrations; a fresh save starts with its counter here.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Count stored in a fresh save.
    pub fn version(&self) -> u32 {
        u32::try_from(self.steps.len()).unwrap_or(u32::MAX)
    }

    /// Run every migration past `player.migrations`. Returns how many ran.
    pub fn apply(&self, player: &mut PlayerState) -> usize {
        let start = player.migrations as usize;
        if start > self.steps.len() {
            tracing::warn!(
                counter = player.migrations,
                known = self.steps.len(),
                "save is from a newer version, skipping migrations"
            );
            return 0;
        }
        for step in &self.steps[start..] {
            (step.run)(player);
            player.migrations += 1;
            tracing::debug!(
                migration = step.name,
                counter = player.migrations,
                "applied save migration"
            );
        }
        self.steps.len() - start
    }
}

// ===========================================================================
// Shipped migrations
// ===========================================================================

fn non_negative(value: &mut f64) {
    if !value.is_finite() || *value < 0.0 {
        *value = 0.0;
    }
}

/// Counters that could go negative before purchases were made atomic.
fn clamp_negative_totals(player: &mut PlayerState) {
    non_negative(&mut player.money);
    non_negative(&mut player.fast_time);
    non_negative(&mut player.produced_elixir);
}

/// Saves from before discovery tracking: anything already held counts as
/// discovered.
fn backfill_unlocked_currencies(player: &mut PlayerState) {
    let held = player
        .towns
        .values()
        .flat_map(|town| town.machines.values())
        .flat_map(|machine| machine.inputs.iter().chain(&machine.outputs))
        .chain(std::iter::once(&player.holding))
        .filter(|stack| !stack.is_empty())
        .filter_map(|stack| stack.resource)
        .collect::<Vec<_>>();
    for resource in held {
        player.unlocked_currencies.insert(resource, true);
    }
}

/// Zoom 0 used to mean "unset".
fn normalize_zoom(player: &mut PlayerState) {
    for town in player.towns.values_mut() {
        let zoom = town.display.zoom;
        if !zoom.is_finite() || zoom <= 0.0 {
            town.display.zoom = 1.0;
        }
    }
}
