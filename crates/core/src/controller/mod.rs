//! The four SMC controller variants, represented as a tagged sum type rather
//! than trait objects: `compute` stays monomorphic per match arm, which
//! keeps the hot rollout loop friendly to inlining and vectorization (see
//! the equivalent-control / plant-borrow notes below).

mod adaptive;
mod classical;
mod hybrid;
mod super_twisting;

pub use adaptive::{AdaptiveController, AdaptiveGains, AdaptiveState};
pub use classical::{ClassicalController, ClassicalGains, ClassicalState};
pub use hybrid::{HybridController, HybridGains, HybridMode, HybridState};
pub use super_twisting::{SuperTwistingController, SuperTwistingGains, SuperTwistingState};

use crate::config::{ControllerConfig, ControllerVariant, SwitchMethod};
use crate::error::EngineError;
use crate::plant::{Plant, State6};

/// `sat(s, eps, method)`: smooth replacement for `sign(s)` used wherever a
/// discontinuous switching term would otherwise induce chattering.
pub fn sat(s: f64, eps: f64, method: SwitchMethod) -> f64 {
    let eps = eps.max(1e-12);
    match method {
        SwitchMethod::Linear => (s / eps).clamp(-1.0, 1.0),
        SwitchMethod::Tanh => (s / eps).tanh(),
    }
}

/// Diagnostics exposed alongside every `compute` call, per §6's controller
/// API (`(u, controller_state, diagnostics)`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Diagnostics {
    pub s: f64,
    pub u_eq: f64,
    pub u_sw: f64,
    pub u_d: f64,
    pub saturation_active: bool,
    pub mode: Option<HybridMode>,
    /// Set when equivalent control fell back to `0.0` because the plant's
    /// mass matrix was singular or near-singular at this state, per §7's
    /// `IllConditioned` row. Never set merely because no plant was supplied.
    pub ill_conditioned: bool,
}

/// Equivalent-control contribution for a linear surface
/// `s = k1*(th1dot + lambda1*th1) + k2*(th2dot + lambda2*th2)`, solving
/// `sdot = 0` for `u` using the plant's `M^{-1}` rows. Returns `(0.0, false)`
/// (never silently using a stale value) when the plant is absent, and
/// `(0.0, true)` when the plant is present but ill-conditioned, so callers
/// can distinguish "no plant supplied" from "plant singular" per §9's
/// ill-conditioning fallback.
fn equivalent_control(
    plant: Option<&Plant>,
    x: &State6,
    k1: f64,
    lambda1: f64,
    k2: f64,
    lambda2: f64,
) -> (f64, bool) {
    let Some(plant) = plant else {
        return (0.0, false);
    };
    let (Some(minv_b), Some(minv_rest)) = (plant.minv_b(x), plant.minv_rest(x)) else {
        return (0.0, true);
    };
    let denom = k1 * minv_b[1] + k2 * minv_b[2];
    if denom.abs() < 1e-9 {
        return (0.0, true);
    }
    let numer = k1 * minv_rest[1] + k2 * minv_rest[2] + k1 * lambda1 * x[4] + k2 * lambda2 * x[5];
    (-numer / denom, false)
}

#[derive(Debug, Clone)]
pub enum Controller {
    Classical(ClassicalController),
    SuperTwisting(SuperTwistingController),
    Adaptive(AdaptiveController),
    Hybrid(HybridController),
}

impl Controller {
    pub fn new(cfg: &ControllerConfig) -> Result<Self, EngineError> {
        cfg.validate()?;
        match cfg.variant {
            ControllerVariant::Classical => {
                Ok(Controller::Classical(ClassicalController::new(cfg)?))
            }
            ControllerVariant::SuperTwisting => {
                Ok(Controller::SuperTwisting(SuperTwistingController::new(cfg)?))
            }
            ControllerVariant::Adaptive => Ok(Controller::Adaptive(AdaptiveController::new(cfg)?)),
            ControllerVariant::Hybrid => Ok(Controller::Hybrid(HybridController::new(cfg)?)),
        }
    }

    pub fn n_gains(&self) -> usize {
        match self {
            Controller::Classical(_) => 6,
            Controller::SuperTwisting(_) => 6,
            Controller::Adaptive(_) => 5,
            Controller::Hybrid(_) => 4,
        }
    }

    pub fn reset(&mut self) {
        match self {
            Controller::Classical(c) => c.reset(),
            Controller::SuperTwisting(c) => c.reset(),
            Controller::Adaptive(c) => c.reset(),
            Controller::Hybrid(c) => c.reset(),
        }
    }

    /// `compute(state, plant) -> (u, diagnostics)`, clipped to `[-u_max,
    /// u_max]` by each variant before returning.
    pub fn compute(&mut self, x: &State6, dt: f64, plant: Option<&Plant>) -> (f64, Diagnostics) {
        match self {
            Controller::Classical(c) => c.compute(x, plant),
            Controller::SuperTwisting(c) => c.compute(x, dt, plant),
            Controller::Adaptive(c) => c.compute(x, dt),
            Controller::Hybrid(c) => c.compute(x, dt),
        }
    }
}

pub fn validate_gains(variant: ControllerVariant, gains: &[f64]) -> Result<(), EngineError> {
    match variant {
        ControllerVariant::Classical => classical::validate(gains),
        ControllerVariant::SuperTwisting => super_twisting::validate(gains),
        ControllerVariant::Adaptive => adaptive::validate(gains),
        ControllerVariant::Hybrid => hybrid::validate(gains),
    }
}
