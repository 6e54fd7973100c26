//! Alembic Core -- the machine simulation engine for resource idle games.
//!
//! This crate provides the resource vocabulary, machine definitions with
//! their ports, recipes and upgrades, the per-tick resolver, and the
//! persisted player state those machines live in.
//!
//! # Tick Pipeline
//!
//! Each call to [`engine::Engine::step`] advances every town by `diff`
//! seconds:
//!
//! 1. **Machines** -- in slot order, each machine runs its pre-tick hook and
//!    then [`engine::resolve_tick`], which plans a throughput factor per
//!    output, draws inputs, and commits atomically.
//! 2. **Pipes** -- resources move along pipes between machines of the same
//!    town, subject to the target's admission rules.
//! 3. **Discovery** -- every produced resource marks its currency unlocked.
//!
//! [`engine::Engine::advance`] splits wall time plus a slice of offline
//! fast time into bounded sub-steps (see [`sim::SimConfig`]).
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Immutable simulation context.
//! - [`machine::MachineKind`] -- Contract every machine type implements.
//! - [`machine::MachineInstance`] -- Persisted state of one placed machine.
//! - [`registry::MachineRegistry`] -- Machine kinds keyed by type name,
//!   frozen at startup.
//! - [`player::PlayerState`] -- Everything that goes into a save.
//! - [`upgrade::purchase`] -- Atomic upgrade purchase.

pub mod engine;
pub mod formula;
pub mod machine;
pub mod machines;
pub mod player;
pub mod port;
pub mod recipe;
pub mod registry;
pub mod resource;
pub mod sim;
pub mod town;
pub mod upgrade;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
