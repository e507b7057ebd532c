//! Closed-loop stepping between controller, plant, and integrator: the
//! orchestration layer consumed directly by the cost evaluator and, through
//! it, the PSO tuner.

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::controller::Controller;
use crate::integrators;
use crate::plant::{Plant, State6};
use crate::safety::{self, GuardViolation};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    SafetyViolation,
    Timeout,
    IntegratorFailure,
}

impl From<GuardViolation> for ExitReason {
    fn from(v: GuardViolation) -> Self {
        match v {
            GuardViolation::Timeout => ExitReason::Timeout,
            _ => ExitReason::SafetyViolation,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<State6>,
    pub controls: Vec<f64>,
    pub surfaces: Vec<f64>,
}

impl Trajectory {
    fn push(&mut self, t: f64, x: State6, u: f64, s: f64) {
        self.times.push(t);
        self.states.push(x);
        self.controls.push(u);
        self.surfaces.push(s);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutResult {
    pub trajectory: Trajectory,
    pub exit_reason: ExitReason,
}

pub struct Simulation;

impl Simulation {
    /// Runs a single rollout to `t_final` (or until a guard trips), per the
    /// five-step loop in spec.md §4.5.
    #[tracing::instrument(skip(controller, plant, cfg))]
    pub fn run(
        controller: &mut Controller,
        plant: &Plant,
        cfg: &SimulationConfig,
        x0: State6,
    ) -> RolloutResult {
        controller.reset();
        let mut trajectory = Trajectory::default();
        let mut x = x0;
        let mut t = 0.0;
        let energy_reference = plant.energy(&x);
        let step_count = cfg.step_count();

        for step_index in 0..step_count {
            if let Some(violation) =
                safety::check_step(&cfg.safety, &x, 0.0, plant.energy(&x), energy_reference, step_index)
            {
                return RolloutResult {
                    trajectory,
                    exit_reason: violation.into(),
                };
            }

            let (u, diag) = controller.compute(&x, cfg.dt, Some(plant));

            if let Some(violation) = safety::check_step(
                &cfg.safety,
                &x,
                u,
                plant.energy(&x),
                energy_reference,
                step_index,
            ) {
                trajectory.push(t, x, u, diag.s);
                return RolloutResult {
                    trajectory,
                    exit_reason: violation.into(),
                };
            }

            trajectory.push(t, x, u, diag.s);

            let next = integrators::step(cfg.integrator, &x, u, cfg.dt, &cfg.rk45, |state, control| {
                plant.dynamics(state, control)
            });

            let Some(next_x) = next else {
                return RolloutResult {
                    trajectory,
                    exit_reason: ExitReason::IntegratorFailure,
                };
            };

            x = next_x;
            t += cfg.dt;
        }

        RolloutResult {
            trajectory,
            exit_reason: ExitReason::Completed,
        }
    }

    /// Runs `initial_conditions.len()` independent rollouts in index order,
    /// each through a freshly constructed controller from `controller_factory`.
    /// Iterating in order with an identical per-sample code path is what
    /// guarantees exact parity with `run` for fixed-step integrators
    /// (invariant 7).
    #[tracing::instrument(skip(controller_factory, plant, cfg, initial_conditions))]
    pub fn run_batch<F>(
        controller_factory: F,
        plant: &Plant,
        cfg: &SimulationConfig,
        initial_conditions: &[State6],
    ) -> Vec<RolloutResult>
    where
        F: Fn() -> Controller,
    {
        initial_conditions
            .iter()
            .map(|x0| {
                let mut controller = controller_factory();
                Simulation::run(&mut controller, plant, cfg, *x0)
            })
            .collect()
    }
}
