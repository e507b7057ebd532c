use crate::config::ControllerConfig;
use crate::error::EngineError;
use crate::plant::{Plant, State6};

use super::{equivalent_control, sat, Diagnostics};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperTwistingGains {
    pub k1_big: f64,
    pub k2_big: f64,
    pub k1: f64,
    pub k2: f64,
    pub lambda1: f64,
    pub lambda2: f64,
}

impl SuperTwistingGains {
    pub fn from_slice(g: &[f64]) -> Result<Self, EngineError> {
        validate(g)?;
        Ok(Self {
            k1_big: g[0],
            k2_big: g[1],
            k1: g[2],
            k2: g[3],
            lambda1: g[4],
            lambda2: g[5],
        })
    }
}

pub(super) fn validate(g: &[f64]) -> Result<(), EngineError> {
    if g.len() != 6 {
        return Err(EngineError::ConfigError(format!(
            "super-twisting controller expects 6 gains, got {}",
            g.len()
        )));
    }
    if !(g[0] > g[1] && g[1] > 0.0) {
        return Err(EngineError::ConfigError(format!(
            "super-twisting requires K1 > K2 > 0, got K1={}, K2={}",
            g[0], g[1]
        )));
    }
    for (i, &v) in g.iter().enumerate().skip(2) {
        if !(v > 0.0) {
            return Err(EngineError::ConfigError(format!(
                "super-twisting gain[{i}] must be > 0, got {v}"
            )));
        }
    }
    Ok(())
}

/// `z`, the Super-Twisting integral term, is clamped to `|z| <= z_max`. We
/// bound it by the actuator's own authority: a contribution from `z` beyond
/// `u_max` could never be realized anyway.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SuperTwistingState {
    pub z: f64,
}

#[derive(Debug, Clone)]
pub struct SuperTwistingController {
    gains: SuperTwistingGains,
    cfg: ControllerConfig,
    state: SuperTwistingState,
}

impl SuperTwistingController {
    pub fn new(cfg: &ControllerConfig) -> Result<Self, EngineError> {
        Ok(Self {
            gains: SuperTwistingGains::from_slice(&cfg.gains)?,
            cfg: cfg.clone(),
            state: SuperTwistingState::default(),
        })
    }

    pub fn reset(&mut self) {
        self.state = SuperTwistingState::default();
    }

    fn z_max(&self) -> f64 {
        self.cfg.max_force
    }

    pub fn compute(&mut self, x: &State6, dt: f64, plant: Option<&Plant>) -> (f64, Diagnostics) {
        let g = self.gains;
        let s = g.k1 * (x[4] + g.lambda1 * x[1]) + g.k2 * (x[5] + g.lambda2 * x[2]);
        let switch = sat(s, self.cfg.boundary_layer, self.cfg.switch_method);

        let u1 = -g.k1_big * s.abs().sqrt() * switch;
        let zdot = -g.k2_big * switch;

        let z_max = self.z_max();
        let z_candidate = (self.state.z + dt * zdot).clamp(-z_max, z_max);
        let would_saturate = (u1 + z_candidate).abs() > self.cfg.max_force;
        let pushes_deeper = z_candidate.abs() > self.state.z.abs();
        if !(would_saturate && pushes_deeper) {
            self.state.z = z_candidate;
        }

        let (u_eq, ill_conditioned) = if self.cfg.enable_equivalent {
            equivalent_control(plant, x, g.k1, g.lambda1, g.k2, g.lambda2)
        } else {
            (0.0, false)
        };

        let u_raw = u_eq + u1 + self.state.z;
        let u = u_raw.clamp(-self.cfg.max_force, self.cfg.max_force);

        (
            u,
            Diagnostics {
                s,
                u_eq,
                u_sw: u1,
                u_d: self.state.z,
                saturation_active: u_raw.abs() > self.cfg.max_force,
                mode: None,
                ill_conditioned,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerVariant, SwitchMethod};

    fn cfg() -> ControllerConfig {
        ControllerConfig {
            variant: ControllerVariant::SuperTwisting,
            gains: vec![25.0, 10.0, 15.0, 12.0, 20.0, 15.0],
            max_force: 100.0,
            boundary_layer: 0.05,
            switch_method: SwitchMethod::Tanh,
            dead_zone: 0.0,
            k_init: 10.0,
            k_min: 1.0,
            k_max: 100.0,
            leak: 0.1,
            rate_limit: 50.0,
            recenter_low: 0.2,
            recenter_high: 0.8,
            k_x: 0.0,
            k_v: 0.0,
            enable_equivalent: false,
        }
    }

    #[test]
    fn integral_stays_within_z_max_over_many_steps() {
        let mut ctrl = SuperTwistingController::new(&cfg()).unwrap();
        let x = [0.0, 2.0, 2.0, 1.0, 1.0, 1.0];
        for _ in 0..2000 {
            ctrl.compute(&x, 0.001, None);
            assert!(ctrl.state.z.abs() <= ctrl.z_max() + 1e-9);
        }
    }

    #[test]
    fn rejects_k1_not_greater_than_k2() {
        assert!(SuperTwistingGains::from_slice(&[5.0, 10.0, 15.0, 12.0, 20.0, 15.0]).is_err());
    }

    #[test]
    fn control_never_exceeds_max_force() {
        let mut ctrl = SuperTwistingController::new(&cfg()).unwrap();
        let x = [0.0, 3.0, 3.0, 3.0, 3.0, 3.0];
        let (u, _) = ctrl.compute(&x, 0.01, None);
        assert!(u.abs() <= 100.0 + 1e-9);
    }
}
