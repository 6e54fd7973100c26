//! Constant-or-computed values used throughout machine definitions.
//!
//! Definitions describe capacities, acceptance lists, costs and currencies
//! either as a fixed value or as a function of the machine (or of an upgrade
//! level). Both shapes evaluate through the same call so callers never care
//! which one they hold.

use crate::machine::MachineView;

/// A predicate over a machine, used for unlock gates.
pub type Predicate = fn(&MachineView<'_>) -> bool;

/// A value that is either fixed or derived from the machine's current state.
#[derive(Debug, Clone)]
pub enum Formula<T> {
    Const(T),
    Computed(fn(&MachineView<'_>) -> T),
}

impl<T: Clone> Formula<T> {
    pub fn eval(&self, view: &MachineView<'_>) -> T {
        match self {
            Formula::Const(v) => v.clone(),
            Formula::Computed(f) => f(view),
        }
    }
}

/// A value that is either fixed or derived from an upgrade level.
#[derive(Debug, Clone)]
pub enum LevelFormula<T> {
    Const(T),
    PerLevel(fn(u32) -> T),
}

impl<T: Clone> LevelFormula<T> {
    pub fn at(&self, level: u32) -> T {
        match self {
            LevelFormula::Const(v) => v.clone(),
            LevelFormula::PerLevel(f) => f(level),
        }
    }
}

// ---------------------------------------------------------------------------
// Upgrade effects
// ---------------------------------------------------------------------------

/// What an upgrade's effect function yields at a given level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    Flag(bool),
    Scalar(f64),
    /// Two multipliers delivered together (e.g. speed and energy).
    Pair(f64, f64),
}

impl Effect {
    /// Scalar view. Flags read as 0/1, pairs as their first component.
    pub fn as_f64(self) -> f64 {
        match self {
            Effect::Flag(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Effect::Scalar(v) => v,
            Effect::Pair(a, _) => a,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Effect::Flag(b) => b,
            Effect::Scalar(v) => v != 0.0,
            Effect::Pair(a, b) => a != 0.0 || b != 0.0,
        }
    }

    /// Pair view. Scalars are duplicated into both components.
    pub fn pair(self) -> (f64, f64) {
        match self {
            Effect::Pair(a, b) => (a, b),
            other => {
                let v = other.as_f64();
                (v, v)
            }
        }
    }
}
