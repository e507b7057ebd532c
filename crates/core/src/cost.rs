//! Composite cost `J(g) = w_e*ISE_n + w_u*U_n + w_du*dU_n + w_s*S_n +
//! P_inst`, the scalar fitness the PSO tuner minimizes.

use crate::config::CostConfig;
use crate::simulation::{ExitReason, RolloutResult};

const NON_FINITE_PENALTY: f64 = 1.0e6;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RawComponents {
    ise: f64,
    u: f64,
    du: f64,
    s: f64,
}

fn raw_components(result: &RolloutResult, dt: f64) -> RawComponents {
    let traj = &result.trajectory;
    let ise: f64 = traj
        .states
        .iter()
        .map(|x| x.iter().map(|v| v * v).sum::<f64>())
        .sum::<f64>()
        * dt;
    let u: f64 = traj.controls.iter().map(|u| u * u).sum::<f64>() * dt;
    let du: f64 = traj
        .controls
        .windows(2)
        .map(|w| {
            let d = (w[1] - w[0]) / dt;
            d * d
        })
        .sum::<f64>()
        * dt;
    let s: f64 = traj.surfaces.iter().map(|s| s * s).sum::<f64>() * dt;
    RawComponents { ise, u, du, s }
}

fn safe_div(value: f64, baseline: f64) -> f64 {
    if baseline.abs() < 1e-12 {
        1.0
    } else {
        value / baseline
    }
}

fn has_non_finite(result: &RolloutResult) -> bool {
    result
        .trajectory
        .states
        .iter()
        .flatten()
        .any(|v| !v.is_finite())
        || result.trajectory.controls.iter().any(|u| !u.is_finite())
}

fn instability_penalty(result: &RolloutResult, t_final: f64, dt: f64) -> f64 {
    if has_non_finite(result) {
        return NON_FINITE_PENALTY;
    }
    match result.exit_reason {
        ExitReason::SafetyViolation | ExitReason::IntegratorFailure => {
            let elapsed = result.trajectory.times.last().copied().unwrap_or(0.0);
            let remaining_steps = ((t_final - elapsed).max(0.0)) / dt.max(1e-12);
            remaining_steps
        }
        ExitReason::Timeout | ExitReason::Completed => 0.0,
    }
}

/// Evaluates the composite cost for a rollout, normalizing each raw
/// component against a baseline: a configured constant if present, or the
/// corresponding raw component of a one-time baseline rollout otherwise.
#[derive(Debug, Clone)]
pub struct CostEvaluator {
    cfg: CostConfig,
    baseline: RawComponents,
}

impl CostEvaluator {
    pub fn new(cfg: CostConfig, baseline_rollout: &RolloutResult, dt: f64) -> Self {
        let auto = raw_components(baseline_rollout, dt);
        let baseline = RawComponents {
            ise: cfg.normalization.ise.unwrap_or(auto.ise),
            u: cfg.normalization.u.unwrap_or(auto.u),
            du: cfg.normalization.du.unwrap_or(auto.du),
            s: cfg.normalization.s.unwrap_or(auto.s),
        };
        Self { cfg, baseline }
    }

    pub fn evaluate(&self, result: &RolloutResult, dt: f64, t_final: f64) -> f64 {
        let raw = raw_components(result, dt);
        let w = self.cfg.weights;
        let ise_n = safe_div(raw.ise, self.baseline.ise);
        let u_n = safe_div(raw.u, self.baseline.u);
        let du_n = safe_div(raw.du, self.baseline.du);
        let s_n = safe_div(raw.s, self.baseline.s);
        let penalty = instability_penalty(result, t_final, dt);
        w.w_e * ise_n + w.w_u * u_n + w.w_du * du_n + w.w_s * s_n + penalty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostWeights;
    use crate::simulation::Trajectory;

    fn finite_result(exit_reason: ExitReason) -> RolloutResult {
        RolloutResult {
            trajectory: Trajectory {
                times: vec![0.0, 0.01, 0.02],
                states: vec![[0.0; 6], [0.01; 6], [0.0; 6]],
                controls: vec![1.0, 0.5, 0.0],
                surfaces: vec![0.1, 0.05, 0.0],
            },
            exit_reason,
        }
    }

    #[test]
    fn non_finite_state_dominates_cost() {
        let cfg = CostConfig {
            weights: CostWeights::default(),
            normalization: Default::default(),
        };
        let baseline = finite_result(ExitReason::Completed);
        let evaluator = CostEvaluator::new(cfg, &baseline, 0.01);

        let mut unstable = finite_result(ExitReason::SafetyViolation);
        unstable.trajectory.states[1][1] = f64::NAN;

        let finite_cost = evaluator.evaluate(&baseline, 0.01, 0.02);
        let unstable_cost = evaluator.evaluate(&unstable, 0.01, 0.02);
        assert!(unstable_cost > finite_cost);
    }

    #[test]
    fn zero_baseline_falls_back_to_neutral_normalization() {
        let cfg = CostConfig {
            weights: CostWeights::default(),
            normalization: Default::default(),
        };
        let zero_baseline = RolloutResult {
            trajectory: Trajectory {
                times: vec![0.0],
                states: vec![[0.0; 6]],
                controls: vec![0.0],
                surfaces: vec![0.0],
            },
            exit_reason: ExitReason::Completed,
        };
        let evaluator = CostEvaluator::new(cfg, &zero_baseline, 0.01);
        let cost = evaluator.evaluate(&zero_baseline, 0.01, 0.01);
        // Every component normalizes to the neutral value 1.0, so the total
        // collapses to the sum of the configured weights, not zero.
        let w = CostWeights::default();
        let expected = w.w_e + w.w_u + w.w_du + w.w_s;
        assert!((cost - expected).abs() < 1e-12, "cost={cost}, expected={expected}");
    }

    #[test]
    fn safety_violation_penalty_scales_with_remaining_horizon() {
        let cfg = CostConfig {
            weights: CostWeights::default(),
            normalization: Default::default(),
        };
        let baseline = finite_result(ExitReason::Completed);
        let evaluator = CostEvaluator::new(cfg, &baseline, 0.01);

        let early_violation = finite_result(ExitReason::SafetyViolation);
        let cost_short_horizon = evaluator.evaluate(&early_violation, 0.01, 0.02);
        let cost_long_horizon = evaluator.evaluate(&early_violation, 0.01, 5.0);
        assert!(cost_long_horizon > cost_short_horizon);
    }
}
