//! Fixed and adaptive integrators advancing `x_{k+1} = Phi(x_k, u_k, dt, f)`.
//! `f` is supplied as a closure so the integrator stays decoupled from the
//! plant representation; it returns `None` when the plant's right-hand side
//! could not be evaluated (ill-conditioned mass matrix), which the caller
//! folds into a non-finite-state outcome.

use serde::{Deserialize, Serialize};

use crate::plant::State6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum IntegratorKind {
    Euler,
    #[default]
    Rk4,
    Rk45,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rk45Tolerances {
    pub rtol: f64,
    pub atol: f64,
    pub min_step: f64,
}

impl Default for Rk45Tolerances {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-8,
            min_step: 1e-6,
        }
    }
}

fn add_scaled(a: State6, b: State6, scale: f64) -> State6 {
    let mut out = a;
    for i in 0..6 {
        out[i] += scale * b[i];
    }
    out
}

fn state_is_finite(x: &State6) -> bool {
    x.iter().all(|v| v.is_finite())
}

pub fn euler_step<F>(x: &State6, u: f64, dt: f64, f: F) -> Option<State6>
where
    F: Fn(&State6, f64) -> Option<State6>,
{
    let xdot = f(x, u)?;
    let next = add_scaled(*x, xdot, dt);
    state_is_finite(&next).then_some(next)
}

pub fn rk4_step<F>(x: &State6, u: f64, dt: f64, f: F) -> Option<State6>
where
    F: Fn(&State6, f64) -> Option<State6>,
{
    let k1 = f(x, u)?;
    let k2 = f(&add_scaled(*x, k1, dt / 2.0), u)?;
    let k3 = f(&add_scaled(*x, k2, dt / 2.0), u)?;
    let k4 = f(&add_scaled(*x, k3, dt), u)?;
    let mut next = *x;
    for i in 0..6 {
        next[i] += (dt / 6.0) * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
    state_is_finite(&next).then_some(next)
}

/// Dormand-Prince 5(4) coefficients.
const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const A: [[f64; 6]; 6] = [
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];
const B5: [f64; 7] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
    0.0,
];
const B4: [f64; 7] = [
    5179.0 / 57600.0,
    0.0,
    7571.0 / 16695.0,
    393.0 / 640.0,
    -92097.0 / 339200.0,
    187.0 / 2100.0,
    1.0 / 40.0,
];

/// One Dormand-Prince 5(4) trial step. Returns `(order-5 estimate,
/// error-norm)`. Error norm uses a mixed relative/absolute tolerance per
/// component, RMS-combined, following the standard embedded-RK step
/// controller.
fn dopri_trial<F>(x: &State6, u: f64, dt: f64, tol: &Rk45Tolerances, f: &F) -> Option<(State6, f64)>
where
    F: Fn(&State6, f64) -> Option<State6>,
{
    let mut k: [State6; 7] = [[0.0; 6]; 7];
    k[0] = f(x, u)?;
    for stage in 1..7 {
        let mut xi = *x;
        for (j, kj) in k.iter().take(stage).enumerate() {
            for i in 0..6 {
                xi[i] += dt * A[stage - 1][j] * kj[i];
            }
        }
        k[stage] = f(&xi, u)?;
    }
    let mut x5 = *x;
    let mut x4 = *x;
    for i in 0..6 {
        let mut s5 = 0.0;
        let mut s4 = 0.0;
        for stage in 0..7 {
            s5 += B5[stage] * k[stage][i];
            s4 += B4[stage] * k[stage][i];
        }
        x5[i] += dt * s5;
        x4[i] += dt * s4;
    }
    if !state_is_finite(&x5) {
        return None;
    }
    let mut err_sq_sum = 0.0;
    for i in 0..6 {
        let scale = tol.atol + tol.rtol * x5[i].abs().max(x[i].abs());
        let e = (x5[i] - x4[i]) / scale.max(1e-300);
        err_sq_sum += e * e;
    }
    let err_norm = (err_sq_sum / 6.0).sqrt();
    let _ = C; // retained for readers matching stages against the Butcher tableau
    Some((x5, err_norm))
}

/// Adaptive Dormand-Prince step with PI step-size control. Advances exactly
/// `dt_outer` in (possibly many) adaptively-sized substeps, rejecting any
/// trial whose error exceeds tolerance, and failing with `None` if the step
/// would have to shrink below `tol.min_step` (integrator failure / livelock
/// guard).
pub fn rk45_step<F>(x: &State6, u: f64, dt_outer: f64, tol: &Rk45Tolerances, f: F) -> Option<State6>
where
    F: Fn(&State6, f64) -> Option<State6>,
{
    let mut current = *x;
    let mut remaining = dt_outer;
    let mut h = dt_outer;
    let mut prev_err: Option<f64> = None;

    while remaining > 1e-14 {
        h = h.min(remaining).max(tol.min_step);
        let (trial, err) = dopri_trial(&current, u, h, tol, &f)?;

        if err <= 1.0 {
            current = trial;
            remaining -= h;
            // PI controller: blend proportional (current error) and
            // integral (previous error) terms for smoother step growth.
            let err_safe = err.max(1e-12);
            let kp = 0.7 / 5.0;
            let ki = 0.4 / 5.0;
            let prev = prev_err.unwrap_or(err_safe);
            let factor = err_safe.powf(-kp) * prev.powf(ki);
            h = (h * factor.clamp(0.2, 5.0)).min(remaining.max(tol.min_step));
            prev_err = Some(err_safe);
        } else {
            let factor = (1.0 / err).powf(0.2).clamp(0.1, 0.9);
            let next_h = h * factor;
            if next_h < tol.min_step {
                return None; // integrator_failure: min-step breach
            }
            h = next_h;
        }
    }
    state_is_finite(&current).then_some(current)
}

pub fn step<F>(kind: IntegratorKind, x: &State6, u: f64, dt: f64, tol: &Rk45Tolerances, f: F) -> Option<State6>
where
    F: Fn(&State6, f64) -> Option<State6>,
{
    match kind {
        IntegratorKind::Euler => euler_step(x, u, dt, f),
        IntegratorKind::Rk4 => rk4_step(x, u, dt, f),
        IntegratorKind::Rk45 => rk45_step(x, u, dt, tol, f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_decay(x: &State6, _u: f64) -> Option<State6> {
        Some([-x[0], -x[1], -x[2], -x[3], -x[4], -x[5]])
    }

    #[test]
    fn rk4_is_deterministic() {
        let x0 = [0.0, 0.1, 0.05, 0.0, 0.0, 0.0];
        let a = rk4_step(&x0, 0.0, 0.01, linear_decay).unwrap();
        let b = rk4_step(&x0, 0.0, 0.01, linear_decay).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rk4_more_accurate_than_euler_for_decay() {
        let x0 = [0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let dt = 0.1;
        let exact = (-dt as f64).exp();
        let euler = euler_step(&x0, 0.0, dt, linear_decay).unwrap()[1];
        let rk4 = rk4_step(&x0, 0.0, dt, linear_decay).unwrap()[1];
        assert!((rk4 - exact).abs() < (euler - exact).abs());
    }

    #[test]
    fn rk45_respects_requested_horizon() {
        let x0 = [0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let tol = Rk45Tolerances::default();
        let next = rk45_step(&x0, 0.0, 0.1, &tol, linear_decay).unwrap();
        let exact = (-0.1f64).exp();
        assert!((next[1] - exact).abs() < 1e-4);
    }

    #[test]
    fn rk45_fails_on_non_finite_rhs() {
        let tol = Rk45Tolerances::default();
        let bad = |_: &State6, _: f64| -> Option<State6> { None };
        assert!(rk45_step(&[0.0; 6], 0.0, 0.1, &tol, bad).is_none());
    }
}
