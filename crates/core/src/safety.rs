//! Per-step safety guards: finite-state checks, angle/velocity/energy/
//! control bounds. A violation stops the rollout and is recorded as the
//! trajectory's exit reason.

use serde::{Deserialize, Serialize};

use crate::plant::State6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SafetyConfig {
    pub max_angle: f64,
    pub max_omega: f64,
    pub max_control: f64,
    pub max_energy_delta: f64,
    pub timeout_steps: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_angle: 10.0,
            max_omega: 50.0,
            max_control: 100.0,
            max_energy_delta: 1.0e3,
            timeout_steps: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardViolation {
    NonFinite,
    AngleExceeded,
    AngularVelocityExceeded,
    EnergyExceeded,
    ControlExceeded,
    Timeout,
}

/// Checks the guards in `spec.md` §4.3 order (a)-(e), plus the step-count
/// timeout. `energy_reference` is the energy observed at rollout start; the
/// guard trips when the instantaneous energy drifts by more than
/// `max_energy_delta` from it.
pub fn check_step(
    cfg: &SafetyConfig,
    x: &State6,
    u: f64,
    energy: f64,
    energy_reference: f64,
    step_index: u64,
) -> Option<GuardViolation> {
    if !x.iter().all(|v| v.is_finite()) || !u.is_finite() {
        return Some(GuardViolation::NonFinite);
    }
    if x[1].abs() > cfg.max_angle || x[2].abs() > cfg.max_angle {
        return Some(GuardViolation::AngleExceeded);
    }
    if x[4].abs() > cfg.max_omega || x[5].abs() > cfg.max_omega {
        return Some(GuardViolation::AngularVelocityExceeded);
    }
    if (energy - energy_reference).abs() > cfg.max_energy_delta {
        return Some(GuardViolation::EnergyExceeded);
    }
    if u.abs() > cfg.max_control {
        return Some(GuardViolation::ControlExceeded);
    }
    if step_index >= cfg.timeout_steps {
        return Some(GuardViolation::Timeout);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_state_passes_all_guards() {
        let cfg = SafetyConfig::default();
        assert_eq!(check_step(&cfg, &[0.0; 6], 0.0, 0.0, 0.0, 0), None);
    }

    #[test]
    fn non_finite_state_is_caught_first() {
        let cfg = SafetyConfig::default();
        let mut x = [0.0; 6];
        x[1] = f64::NAN;
        assert_eq!(
            check_step(&cfg, &x, 0.0, 0.0, 0.0, 0),
            Some(GuardViolation::NonFinite)
        );
    }

    #[test]
    fn angle_guard_trips_before_control_guard() {
        let cfg = SafetyConfig::default();
        let mut x = [0.0; 6];
        x[1] = cfg.max_angle + 1.0;
        assert_eq!(
            check_step(&cfg, &x, cfg.max_control + 1.0, 0.0, 0.0, 0),
            Some(GuardViolation::AngleExceeded)
        );
    }

    #[test]
    fn timeout_trips_on_step_count() {
        let cfg = SafetyConfig {
            timeout_steps: 3,
            ..SafetyConfig::default()
        };
        assert_eq!(
            check_step(&cfg, &[0.0; 6], 0.0, 0.0, 0.0, 3),
            Some(GuardViolation::Timeout)
        );
    }
}
