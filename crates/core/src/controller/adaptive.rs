use crate::config::ControllerConfig;
use crate::error::EngineError;
use crate::plant::State6;

use super::{sat, Diagnostics};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveGains {
    pub k1: f64,
    pub k2: f64,
    pub lambda1: f64,
    pub lambda2: f64,
    pub gamma: f64,
}

impl AdaptiveGains {
    pub fn from_slice(g: &[f64]) -> Result<Self, EngineError> {
        validate(g)?;
        Ok(Self {
            k1: g[0],
            k2: g[1],
            lambda1: g[2],
            lambda2: g[3],
            gamma: g[4],
        })
    }
}

pub(super) fn validate(g: &[f64]) -> Result<(), EngineError> {
    if g.len() != 5 {
        return Err(EngineError::ConfigError(format!(
            "adaptive controller expects 5 gains, got {}",
            g.len()
        )));
    }
    for (i, &v) in g.iter().enumerate() {
        if !(v > 0.0) {
            return Err(EngineError::ConfigError(format!(
                "adaptive gain[{i}] must be > 0, got {v}"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveState {
    pub k: f64,
    pub d_k: f64,
    pub time_in_sliding: f64,
}

#[derive(Debug, Clone)]
pub struct AdaptiveController {
    gains: AdaptiveGains,
    cfg: ControllerConfig,
    state: AdaptiveState,
}

impl AdaptiveController {
    pub fn new(cfg: &ControllerConfig) -> Result<Self, EngineError> {
        Ok(Self {
            gains: AdaptiveGains::from_slice(&cfg.gains)?,
            cfg: cfg.clone(),
            state: AdaptiveState {
                k: cfg.k_init,
                d_k: 0.0,
                time_in_sliding: 0.0,
            },
        })
    }

    pub fn reset(&mut self) {
        self.state = AdaptiveState {
            k: self.cfg.k_init,
            d_k: 0.0,
            time_in_sliding: 0.0,
        };
    }

    pub fn state(&self) -> AdaptiveState {
        self.state
    }

    pub fn compute(&mut self, x: &State6, dt: f64) -> (f64, Diagnostics) {
        let g = self.gains;
        let s = g.k1 * (x[4] + g.lambda1 * x[1]) + g.k2 * (x[5] + g.lambda2 * x[2]);

        let d_k = if s.abs() <= self.cfg.dead_zone {
            0.0
        } else {
            (g.gamma * s.abs() - self.cfg.leak * (self.state.k - self.cfg.k_init))
                .clamp(-self.cfg.rate_limit, self.cfg.rate_limit)
        };
        self.state.d_k = d_k;
        self.state.k = (self.state.k + d_k * dt).clamp(self.cfg.k_min, self.cfg.k_max);

        if s.abs() <= self.cfg.boundary_layer {
            self.state.time_in_sliding += dt;
        } else {
            self.state.time_in_sliding = 0.0;
        }

        // The source's "- alpha*s" linear damping term has no dedicated
        // config field (spec.md's interface table omits alpha for this
        // variant); reuse `leak` as alpha rather than inventing a new knob.
        let alpha = self.cfg.leak;
        let switch = sat(s, self.cfg.boundary_layer, self.cfg.switch_method);
        let u_sw = -self.state.k * switch;
        let u_raw = u_sw - alpha * s;
        let u = u_raw.clamp(-self.cfg.max_force, self.cfg.max_force);

        (
            u,
            Diagnostics {
                s,
                u_eq: 0.0,
                u_sw,
                u_d: -alpha * s,
                saturation_active: u_raw.abs() > self.cfg.max_force,
                mode: None,
                ill_conditioned: false,
            },
        )
    }
}
