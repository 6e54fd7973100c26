//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::engine::Engine;
use crate::machine::{CurrencyUnlocks, MachineInstance};
use crate::player::PlayerState;
use crate::registry::MachineRegistry;
use crate::resource::ResourceType;
use crate::sim::SimConfig;
use crate::upgrade::UpgradeLevel;

/// Tolerance used by [`assert_close`].
pub const TOLERANCE: f64 = 1e-9;

// ===========================================================================
// Construction
// ===========================================================================

pub fn registry() -> MachineRegistry {
    MachineRegistry::standard().expect("built-in machines are valid")
}

pub fn engine() -> Engine {
    Engine::standard(SimConfig::default()).expect("default config is valid")
}

/// A fresh player at time zero with no migrations pending.
pub fn player(engine: &Engine) -> PlayerState {
    PlayerState::default_start(engine, 0, 0)
}

/// Nothing discovered yet.
pub fn no_unlocks() -> CurrencyUnlocks {
    ResourceType::ALL.iter().map(|&r| (r, false)).collect()
}

// ===========================================================================
// Mutation shortcuts
// ===========================================================================

pub fn set_level(machine: &mut MachineInstance, key: &str, count: u32) {
    machine
        .upgrades
        .insert(key.to_string(), UpgradeLevel { count });
}

// ===========================================================================
// Assertions
// ===========================================================================

#[track_caller]
pub fn assert_close(actual: f64, expected: f64) {
    let scale = expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= TOLERANCE * scale,
        "expected {expected}, got {actual}"
    );
}
