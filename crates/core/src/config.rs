//! In-memory configuration mirror of the engine's external interface. The
//! core crate never parses files — a value is constructed by an embedder
//! (or the CLI) and validated once via [`EngineConfig::validate`].

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::integrators::{IntegratorKind, Rk45Tolerances};
use crate::plant::{PlantModel, PlantParams};
use crate::safety::SafetyConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SwitchMethod {
    Linear,
    #[default]
    Tanh,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ControllerVariant {
    #[default]
    Classical,
    SuperTwisting,
    Adaptive,
    Hybrid,
}

fn default_boundary_layer() -> f64 {
    0.05
}
fn default_k_init() -> f64 {
    10.0
}
fn default_k_min() -> f64 {
    1.0
}
fn default_k_max() -> f64 {
    100.0
}
fn default_leak() -> f64 {
    0.1
}
fn default_rate_limit() -> f64 {
    50.0
}
fn default_recenter_low() -> f64 {
    0.2
}
fn default_recenter_high() -> f64 {
    0.8
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    pub variant: ControllerVariant,
    pub gains: Vec<f64>,
    pub max_force: f64,
    #[serde(default = "default_boundary_layer")]
    pub boundary_layer: f64,
    #[serde(default)]
    pub switch_method: SwitchMethod,
    #[serde(default)]
    pub dead_zone: f64,
    #[serde(default = "default_k_init")]
    pub k_init: f64,
    #[serde(default = "default_k_min")]
    pub k_min: f64,
    #[serde(default = "default_k_max")]
    pub k_max: f64,
    #[serde(default = "default_leak")]
    pub leak: f64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default = "default_recenter_low")]
    pub recenter_low: f64,
    #[serde(default = "default_recenter_high")]
    pub recenter_high: f64,
    #[serde(default)]
    pub k_x: f64,
    #[serde(default)]
    pub k_v: f64,
    /// Single equivalent-control enable flag (see open-question resolution
    /// in DESIGN.md: supersedes the source's separate `use_equivalent`).
    #[serde(default)]
    pub enable_equivalent: bool,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.max_force > 0.0) {
            return Err(EngineError::ConfigError(
                "controller.max_force must be > 0".to_string(),
            ));
        }
        if !(self.boundary_layer > 0.0) {
            return Err(EngineError::ConfigError(
                "controller.boundary_layer must be > 0".to_string(),
            ));
        }
        if self.dead_zone < 0.0 {
            return Err(EngineError::ConfigError(
                "controller.dead_zone must be >= 0".to_string(),
            ));
        }
        if self.dead_zone > self.boundary_layer {
            return Err(EngineError::ConfigError(
                "controller.dead_zone must not exceed boundary_layer".to_string(),
            ));
        }
        if !(self.k_min <= self.k_init && self.k_init <= self.k_max) {
            return Err(EngineError::ConfigError(format!(
                "controller gains must satisfy k_min <= k_init <= k_max, got {} <= {} <= {}",
                self.k_min, self.k_init, self.k_max
            )));
        }
        if self.recenter_low > self.recenter_high {
            return Err(EngineError::ConfigError(
                "controller.recenter_low must be <= recenter_high".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlantConfig {
    #[serde(default)]
    pub model: PlantModel,
    #[serde(default)]
    pub params: PlantParams,
}

impl PlantConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.params.validate()
    }
}

fn default_dt() -> f64 {
    0.01
}
fn default_t_final() -> f64 {
    5.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default = "default_t_final")]
    pub t_final: f64,
    #[serde(default)]
    pub integrator: IntegratorKind,
    #[serde(default)]
    pub rk45: Rk45Tolerances,
    #[serde(default)]
    pub safety: SafetyConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            t_final: default_t_final(),
            integrator: IntegratorKind::default(),
            rk45: Rk45Tolerances::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.dt > 0.0) {
            return Err(EngineError::ConfigError(
                "simulation.dt must be > 0".to_string(),
            ));
        }
        if !(self.t_final > 0.0) {
            return Err(EngineError::ConfigError(
                "simulation.t_final must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn step_count(&self) -> u64 {
        (self.t_final / self.dt).ceil() as u64
    }
}

fn default_w() -> (f64, f64) {
    (0.9, 0.4)
}
fn default_c1() -> (f64, f64) {
    (2.5, 0.5)
}
fn default_c2() -> (f64, f64) {
    (1.5, 2.5)
}
fn default_velocity_clamp_fraction() -> f64 {
    0.2
}
fn default_tol() -> f64 {
    1e-6
}

pub(crate) fn const_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PsoConfig {
    pub n_particles: usize,
    pub iters: usize,
    pub bounds: Vec<(f64, f64)>,
    pub seed: u64,
    #[serde(default = "default_w")]
    pub w: (f64, f64),
    #[serde(default = "default_c1")]
    pub c1: (f64, f64),
    #[serde(default = "default_c2")]
    pub c2: (f64, f64),
    #[serde(default = "default_velocity_clamp_fraction")]
    pub velocity_clamp_fraction: f64,
    #[serde(default = "const_true")]
    pub adaptive: bool,
    #[serde(default = "const_true")]
    pub clamp: bool,
    #[serde(default = "default_tol")]
    pub tol: f64,
}

impl PsoConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.n_particles == 0 {
            return Err(EngineError::ConfigError(
                "pso.n_particles must be > 0".to_string(),
            ));
        }
        if self.iters == 0 {
            return Err(EngineError::ConfigError("pso.iters must be > 0".to_string()));
        }
        if self.bounds.is_empty() {
            return Err(EngineError::ConfigError("pso.bounds must not be empty".to_string()));
        }
        for (i, (lo, hi)) in self.bounds.iter().enumerate() {
            if !(lo < hi) {
                return Err(EngineError::ConfigError(format!(
                    "pso.bounds[{i}] must have lower < upper, got ({lo}, {hi})"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CostWeights {
    pub w_e: f64,
    pub w_u: f64,
    pub w_du: f64,
    pub w_s: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            w_e: 1.0,
            w_u: 0.1,
            w_du: 0.05,
            w_s: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CostNormalization {
    #[serde(default)]
    pub ise: Option<f64>,
    #[serde(default)]
    pub u: Option<f64>,
    #[serde(default)]
    pub du: Option<f64>,
    #[serde(default)]
    pub s: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CostConfig {
    #[serde(default)]
    pub weights: CostWeights,
    #[serde(default)]
    pub normalization: CostNormalization,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub controller: ControllerConfig,
    #[serde(default)]
    pub plant: PlantConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub pso: Option<PsoConfig>,
    #[serde(default)]
    pub cost: CostConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.controller.validate()?;
        self.plant.validate()?;
        self.simulation.validate()?;
        if let Some(pso) = &self.pso {
            pso.validate()?;
        }
        Ok(())
    }
}
