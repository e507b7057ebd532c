use crate::config::ControllerConfig;
use crate::error::EngineError;
use crate::plant::{Plant, State6};

use super::{equivalent_control, sat, Diagnostics};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassicalGains {
    pub k1: f64,
    pub k2: f64,
    pub lambda1: f64,
    pub lambda2: f64,
    pub k: f64,
    pub k_d: f64,
}

impl ClassicalGains {
    pub fn from_slice(g: &[f64]) -> Result<Self, EngineError> {
        validate(g)?;
        Ok(Self {
            k1: g[0],
            k2: g[1],
            lambda1: g[2],
            lambda2: g[3],
            k: g[4],
            k_d: g[5],
        })
    }
}

pub(super) fn validate(g: &[f64]) -> Result<(), EngineError> {
    if g.len() != 6 {
        return Err(EngineError::ConfigError(format!(
            "classical controller expects 6 gains, got {}",
            g.len()
        )));
    }
    for (i, &v) in g.iter().take(5).enumerate() {
        if !(v > 0.0) {
            return Err(EngineError::ConfigError(format!(
                "classical gain[{i}] must be > 0, got {v}"
            )));
        }
    }
    if g[5] < 0.0 {
        return Err(EngineError::ConfigError(format!(
            "classical k_d must be >= 0, got {}",
            g[5]
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassicalState {
    pub last_u: f64,
}

#[derive(Debug, Clone)]
pub struct ClassicalController {
    gains: ClassicalGains,
    cfg: ControllerConfig,
    state: ClassicalState,
}

impl ClassicalController {
    pub fn new(cfg: &ControllerConfig) -> Result<Self, EngineError> {
        Ok(Self {
            gains: ClassicalGains::from_slice(&cfg.gains)?,
            cfg: cfg.clone(),
            state: ClassicalState::default(),
        })
    }

    pub fn reset(&mut self) {
        self.state = ClassicalState::default();
    }

    pub fn compute(&mut self, x: &State6, plant: Option<&Plant>) -> (f64, Diagnostics) {
        let g = self.gains;
        let s = g.k1 * (x[4] + g.lambda1 * x[1]) + g.k2 * (x[5] + g.lambda2 * x[2]);

        let (u_eq, ill_conditioned) = if self.cfg.enable_equivalent {
            equivalent_control(plant, x, g.k1, g.lambda1, g.k2, g.lambda2)
        } else {
            (0.0, false)
        };

        let u_sw = -g.k * sat(s, self.cfg.boundary_layer, self.cfg.switch_method);

        // First-order surrogate for sdot (ignores angular acceleration),
        // cheap enough to recompute every step without extra state.
        let sdot_est = g.k1 * g.lambda1 * x[4] + g.k2 * g.lambda2 * x[5];
        let u_d = -g.k_d * sdot_est;

        let u_raw = u_eq + u_sw + u_d;
        let u = u_raw.clamp(-self.cfg.max_force, self.cfg.max_force);
        self.state.last_u = u;

        (
            u,
            Diagnostics {
                s,
                u_eq,
                u_sw,
                u_d,
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
            variant: ControllerVariant::Classical,
            gains: vec![10.0, 8.0, 15.0, 12.0, 50.0, 5.0],
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
    fn zero_state_yields_zero_surface_and_control() {
        let mut ctrl = ClassicalController::new(&cfg()).unwrap();
        let (u, diag) = ctrl.compute(&[0.0; 6], None);
        assert_eq!(diag.s, 0.0);
        assert!(u.abs() < 1e-9);
    }

    #[test]
    fn control_never_exceeds_max_force() {
        let mut ctrl = ClassicalController::new(&cfg()).unwrap();
        let x = [0.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        let (u, _) = ctrl.compute(&x, None);
        assert!(u.abs() <= 100.0 + 1e-9);
    }

    #[test]
    fn rejects_non_positive_gain() {
        assert!(ClassicalGains::from_slice(&[0.0, 8.0, 15.0, 12.0, 50.0, 5.0]).is_err());
    }

    #[test]
    fn accepts_boundary_valid_gains() {
        assert!(ClassicalGains::from_slice(&[10.0, 8.0, 15.0, 12.0, 50.0, 0.0]).is_ok());
    }

    #[test]
    fn reset_then_compute_matches_fresh_construction() {
        let mut ctrl = ClassicalController::new(&cfg()).unwrap();
        let x = [0.0, 0.2, 0.1, 0.0, 0.0, 0.0];
        let (u1, _) = ctrl.compute(&x, None);
        ctrl.reset();
        let (u2, _) = ctrl.compute(&x, None);
        assert_eq!(u1, u2);
    }
}
