use crate::config::ControllerConfig;
use crate::error::EngineError;
use crate::plant::State6;

use super::{sat, Diagnostics};

/// State-norm threshold for the emergency trigger. Not part of the
/// configuration table in spec.md §6 (which only names the recentering and
/// adaptive-law knobs for this variant) — kept as an internal engineering
/// constant, deliberately more conservative than the safety guard's own
/// angle bound so emergency mode engages before a rollout-ending violation.
const X_EMERG: f64 = 20.0;

/// Tapering softness for the per-gain adaptation law.
const TAU_EPS: f64 = 0.05;

/// Step count past which adaptation gets an extra taper, matching "additional
/// tapering after step_count > 1000".
const EXTRA_TAPER_STEP: u64 = 1000;
const EXTRA_TAPER_FACTOR: f64 = 0.5;

/// Leak multiplier applied once a surface gain nears its ceiling.
const NEAR_CEILING_FRACTION: f64 = 0.8;
const NEAR_CEILING_LEAK_MULTIPLIER: f64 = 3.0;

const EMERGENCY_GAIN_FRACTION: f64 = 0.9;
const EMERGENCY_CONTROL_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridGains {
    pub c1: f64,
    pub lambda1: f64,
    pub c2: f64,
    pub lambda2: f64,
}

impl HybridGains {
    pub fn from_slice(g: &[f64]) -> Result<Self, EngineError> {
        validate(g)?;
        Ok(Self {
            c1: g[0],
            lambda1: g[1],
            c2: g[2],
            lambda2: g[3],
        })
    }
}

pub(super) fn validate(g: &[f64]) -> Result<(), EngineError> {
    if g.len() != 4 {
        return Err(EngineError::ConfigError(format!(
            "hybrid controller expects 4 gains, got {}",
            g.len()
        )));
    }
    for (i, &v) in g.iter().enumerate() {
        if !(v > 0.0) {
            return Err(EngineError::ConfigError(format!(
                "hybrid gain[{i}] must be > 0, got {v}"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridMode {
    Normal,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridState {
    pub k1: f64,
    pub k2: f64,
    pub u_int: f64,
    pub mode: HybridMode,
    pub recenter_factor: f64,
    pub step_count: u64,
}

#[derive(Debug, Clone)]
pub struct HybridController {
    gains: HybridGains,
    cfg: ControllerConfig,
    state: HybridState,
}

fn recenter_factor(xc: f64, low: f64, high: f64) -> f64 {
    let a = xc.abs();
    if a <= low {
        0.0
    } else if a >= high {
        1.0
    } else {
        (a - low) / (high - low)
    }
}

impl HybridController {
    pub fn new(cfg: &ControllerConfig) -> Result<Self, EngineError> {
        let gains = HybridGains::from_slice(&cfg.gains)?;
        Ok(Self {
            gains,
            cfg: cfg.clone(),
            state: HybridState {
                k1: gains.c1,
                k2: gains.c2,
                u_int: 0.0,
                mode: HybridMode::Normal,
                recenter_factor: 0.0,
                step_count: 0,
            },
        })
    }

    pub fn reset(&mut self) {
        self.state = HybridState {
            k1: self.gains.c1,
            k2: self.gains.c2,
            u_int: 0.0,
            mode: HybridMode::Normal,
            recenter_factor: 0.0,
            step_count: 0,
        };
    }

    pub fn state(&self) -> HybridState {
        self.state
    }

    fn enter_emergency(&mut self) {
        self.state.mode = HybridMode::Emergency;
        self.state.k1 = self.cfg.k_min;
        self.state.k2 = self.cfg.k_min;
        self.state.u_int = 0.0;
    }

    fn u_int_max(&self) -> f64 {
        self.cfg.max_force
    }

    pub fn compute(&mut self, x: &State6, dt: f64) -> (f64, Diagnostics) {
        let x_finite = x.iter().all(|v| v.is_finite());
        let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();

        if !x_finite || norm > X_EMERG {
            self.enter_emergency();
            return (
                0.0,
                Diagnostics {
                    mode: Some(HybridMode::Emergency),
                    ..Default::default()
                },
            );
        }

        if self.state.mode == HybridMode::Emergency {
            self.state.mode = HybridMode::Normal;
        }
        self.state.step_count += 1;

        let g = self.gains;
        let rc = recenter_factor(x[0], self.cfg.recenter_low, self.cfg.recenter_high);
        self.state.recenter_factor = rc;
        let recenter_term = rc * (self.cfg.k_x * x[0] + self.cfg.k_v * x[3]);
        let s = self.state.k1 * (x[4] + g.lambda1 * x[1])
            + self.state.k2 * (x[5] + g.lambda2 * x[2])
            + recenter_term;

        let in_dead_zone = s.abs() <= self.cfg.dead_zone;
        if !in_dead_zone {
            let taper = s.abs() / (s.abs() + TAU_EPS);
            let extra_taper = if self.state.step_count > EXTRA_TAPER_STEP {
                EXTRA_TAPER_FACTOR
            } else {
                1.0
            };
            for (k, c_init) in [(&mut self.state.k1, g.c1), (&mut self.state.k2, g.c2)] {
                let leak_mult = if *k >= NEAR_CEILING_FRACTION * self.cfg.k_max {
                    NEAR_CEILING_LEAK_MULTIPLIER
                } else {
                    1.0
                };
                let dk = (s.abs() * taper * extra_taper - self.cfg.leak * leak_mult * (*k - c_init))
                    .clamp(-self.cfg.rate_limit, self.cfg.rate_limit);
                *k = (*k + dk * dt).clamp(self.cfg.k_min, self.cfg.k_max);
            }
        }

        let switch = sat(s, self.cfg.boundary_layer, self.cfg.switch_method);
        let u_switch = -self.state.k1 * s.abs().sqrt() * switch;

        let u_int_max = self.u_int_max();
        if !in_dead_zone {
            let candidate = (self.state.u_int + dt * (-self.state.k2 * switch))
                .clamp(-u_int_max, u_int_max);
            let would_saturate = (u_switch + candidate).abs() > self.cfg.max_force;
            let pushes_deeper = candidate.abs() > self.state.u_int.abs();
            if !(would_saturate && pushes_deeper) {
                self.state.u_int = candidate;
            }
        }

        let u_raw = u_switch + self.state.u_int;

        let gain_trigger = self.state.k1 >= EMERGENCY_GAIN_FRACTION * self.cfg.k_max
            || self.state.k2 >= EMERGENCY_GAIN_FRACTION * self.cfg.k_max;
        let control_trigger = u_raw.abs() >= EMERGENCY_CONTROL_MULTIPLIER * self.cfg.max_force;
        if gain_trigger || control_trigger {
            self.enter_emergency();
            return (
                0.0,
                Diagnostics {
                    mode: Some(HybridMode::Emergency),
                    ..Default::default()
                },
            );
        }

        let u = u_raw.clamp(-self.cfg.max_force, self.cfg.max_force);

        (
            u,
            Diagnostics {
                s,
                u_eq: 0.0,
                u_sw: u_switch,
                u_d: self.state.u_int,
                saturation_active: u_raw.abs() > self.cfg.max_force,
                mode: Some(HybridMode::Normal),
                ill_conditioned: false,
            },
        )
    }
}
