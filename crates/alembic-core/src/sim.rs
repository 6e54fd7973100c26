//! Time-stepping configuration and the fast-time drain plan.
//!
//! The host calls [`crate::engine::Engine::advance`] with elapsed wall time.
//! Offline time accumulated at load (`fast_time`) is drained a bounded slice
//! per call on top of it, and the total is split into equal sub-steps no
//! longer than `max_step_secs`. Work per call is bounded by
//! `max_steps_per_advance`; anything beyond that goes back into fast time.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for how simulated time advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Longest single sub-step, in seconds.
    pub max_step_secs: f64,
    /// Upper bound on sub-steps per `advance` call.
    pub max_steps_per_advance: u32,
    /// Fast time drained per `advance` call, in seconds.
    pub max_fast_drain_secs: f64,
    /// Amount moved along each pipe per second.
    pub pipe_rate: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_step_secs: 0.1,
            max_steps_per_advance: 100,
            max_fast_drain_secs: 5.0,
            pipe_rate: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimConfigError {
    #[error("max_step_secs must be positive and finite, got {0}")]
    StepLength(f64),
    #[error("max_steps_per_advance must be at least 1")]
    StepCount,
    #[error("max_fast_drain_secs must be non-negative and finite, got {0}")]
    DrainLength(f64),
    #[error("pipe_rate must be non-negative and finite, got {0}")]
    PipeRate(f64),
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimConfigError> {
        if !(self.max_step_secs.is_finite() && self.max_step_secs > 0.0) {
            return Err(SimConfigError::StepLength(self.max_step_secs));
        }
        if self.max_steps_per_advance == 0 {
            return Err(SimConfigError::StepCount);
        }
        if !(self.max_fast_drain_secs.is_finite() && self.max_fast_drain_secs >= 0.0) {
            return Err(SimConfigError::DrainLength(self.max_fast_drain_secs));
        }
        if !(self.pipe_rate.is_finite() && self.pipe_rate >= 0.0) {
            return Err(SimConfigError::PipeRate(self.pipe_rate));
        }
        Ok(())
    }

    /// Split `real_dt` plus a slice of `fast_time` into sub-steps.
    pub fn plan(&self, real_dt: f64, fast_time: f64) -> StepPlan {
        let real_dt = non_negative(real_dt);
        let fast_time = non_negative(fast_time);
        let drained = fast_time.min(self.max_fast_drain_secs);
        let total = real_dt + drained;
        if total <= 0.0 {
            return StepPlan {
                steps: 0,
                step_secs: 0.0,
                drained: 0.0,
                remaining_fast_time: fast_time,
            };
        }

        let needed = (total / self.max_step_secs).ceil().max(1.0);
        let (steps, step_secs) = if needed > self.max_steps_per_advance as f64 {
            (self.max_steps_per_advance, self.max_step_secs)
        } else {
            (needed as u32, total / needed)
        };
        let simulated = steps as f64 * step_secs;
        let excess = (total - simulated).max(0.0);

        StepPlan {
            steps,
            step_secs,
            drained,
            remaining_fast_time: fast_time - drained + excess,
        }
    }
}

fn non_negative(secs: f64) -> f64 {
    if secs.is_finite() { secs.max(0.0) } else { 0.0 }
}

// ---------------------------------------------------------------------------
// Plans and results
// ---------------------------------------------------------------------------

/// How one `advance` call will spend its time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPlan {
    pub steps: u32,
    pub step_secs: f64,
    /// Fast time consumed by this call.
    pub drained: f64,
    /// Fast time left afterwards, including any real time that did not fit.
    pub remaining_fast_time: f64,
}

impl StepPlan {
    pub fn simulated_secs(&self) -> f64 {
        self.steps as f64 * self.step_secs
    }
}

/// Result of an `Engine::advance()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdvanceResult {
    pub steps_run: u32,
    pub simulated_secs: f64,
    pub remaining_fast_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_close;

    // -----------------------------------------------------------------------
    // Test 1: short frame runs equal sub-steps
    // -----------------------------------------------------------------------
    #[test]
    fn short_frame_splits_evenly() {
        let plan = SimConfig::default().plan(0.25, 0.0);
        assert_eq!(plan.steps, 3);
        assert_close(plan.step_secs * 3.0, 0.25);
        assert!(plan.step_secs <= 0.1);
        assert_eq!(plan.remaining_fast_time, 0.0);
    }

    // -----------------------------------------------------------------------
    // Test 2: fast time drains a bounded slice per call
    // -----------------------------------------------------------------------
    #[test]
    fn fast_time_drains_in_slices() {
        let config = SimConfig::default();
        let plan = config.plan(0.0, 12.0);
        assert_eq!(plan.steps, 50);
        assert_close(plan.drained, 5.0);
        assert_close(plan.remaining_fast_time, 7.0);
    }

    // -----------------------------------------------------------------------
    // Test 3: work is capped and excess returns to fast time
    // -----------------------------------------------------------------------
    #[test]
    fn excess_pushed_back() {
        let config = SimConfig {
            max_steps_per_advance: 10,
            ..Default::default()
        };
        let plan = config.plan(3.0, 0.0);
        assert_eq!(plan.steps, 10);
        assert_close(plan.simulated_secs(), 1.0);
        assert_close(plan.remaining_fast_time, 2.0);
    }

    // -----------------------------------------------------------------------
    // Test 4: large gaps drain in finitely many calls
    // -----------------------------------------------------------------------
    #[test]
    fn large_gap_terminates() {
        let config = SimConfig::default();
        let mut fast = 3600.0;
        let mut calls = 0;
        let mut simulated = 0.0;
        while fast > 0.0 {
            let plan = config.plan(0.0, fast);
            simulated += plan.simulated_secs();
            fast = plan.remaining_fast_time;
            calls += 1;
            assert!(calls < 10_000);
        }
        assert_close(simulated, 3600.0);
    }

    #[test]
    fn garbage_dt_is_ignored() {
        let plan = SimConfig::default().plan(f64::NAN, -4.0);
        assert_eq!(plan.steps, 0);
        assert_eq!(plan.remaining_fast_time, 0.0);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = SimConfig {
            max_step_secs: 0.0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(SimConfigError::StepLength(0.0)));
        let bad = SimConfig {
            max_steps_per_advance: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(SimConfigError::StepCount));
        assert!(SimConfig::default().validate().is_ok());
    }
}
