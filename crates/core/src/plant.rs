//! Double-inverted-pendulum-on-cart dynamics. Two pendulums are pivoted at
//! the same point on the cart (not chained to one another), each
//! characterized by its own mass, pivot-to-center-of-mass distance, and
//! moment of inertia about that center of mass.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub type State6 = [f64; 6];

const TAU_COND: f64 = 1.0e4;
const ALPHA_MIN: f64 = 1.0e-6;
const ALPHA_MAX: f64 = 1.0e-1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlantParams {
    pub cart_mass: f64,
    pub pendulum1_mass: f64,
    pub pendulum2_mass: f64,
    pub pendulum1_length: f64,
    pub pendulum2_length: f64,
    pub pendulum1_inertia: f64,
    pub pendulum2_inertia: f64,
    pub cart_friction: f64,
    pub pendulum1_friction: f64,
    pub pendulum2_friction: f64,
    pub gravity: f64,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            cart_mass: 1.5,
            pendulum1_mass: 0.2,
            pendulum2_mass: 0.15,
            pendulum1_length: 0.3,
            pendulum2_length: 0.25,
            pendulum1_inertia: 0.0045,
            pendulum2_inertia: 0.0032,
            cart_friction: 0.2,
            pendulum1_friction: 0.01,
            pendulum2_friction: 0.008,
            gravity: 9.81,
        }
    }
}

impl PlantParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = [
            ("cart_mass", self.cart_mass),
            ("pendulum1_mass", self.pendulum1_mass),
            ("pendulum2_mass", self.pendulum2_mass),
            ("pendulum1_length", self.pendulum1_length),
            ("pendulum2_length", self.pendulum2_length),
            ("pendulum1_inertia", self.pendulum1_inertia),
            ("pendulum2_inertia", self.pendulum2_inertia),
        ];
        for (name, v) in positive {
            if !(v > 0.0) {
                return Err(EngineError::ConfigError(format!(
                    "plant.params.{name} must be > 0, got {v}"
                )));
            }
        }
        if self.gravity <= 0.0 {
            return Err(EngineError::ConfigError(
                "plant.params.gravity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlantModel {
    #[default]
    Full,
    Simplified,
    LowRank,
}

/// Symmetric 3x3 matrix, row-major.
type Mat3 = [[f64; 3]; 3];

fn mat3_vec3(m: &Mat3, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn mat3_add_scaled_identity(m: Mat3, alpha: f64) -> Mat3 {
    let trace = m[0][0] + m[1][1] + m[2][2];
    let shift = alpha * trace / 3.0;
    let mut out = m;
    out[0][0] += shift;
    out[1][1] += shift;
    out[2][2] += shift;
    out
}

/// Cholesky factorization of a symmetric positive definite 3x3 matrix.
/// Returns `None` if a pivot is non-positive (not SPD to machine precision).
fn cholesky3(m: &Mat3) -> Option<Mat3> {
    let mut l = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..=i {
            let mut sum = m[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 1e-12 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

fn cholesky_solve(l: &Mat3, b: [f64; 3]) -> [f64; 3] {
    // Forward substitution L y = b
    let mut y = [0.0; 3];
    for i in 0..3 {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i][k] * y[k];
        }
        y[i] = sum / l[i][i];
    }
    // Backward substitution L^T x = y
    let mut x = [0.0; 3];
    for i in (0..3).rev() {
        let mut sum = y[i];
        for k in (i + 1)..3 {
            sum -= l[k][i] * x[k];
        }
        x[i] = sum / l[i][i];
    }
    x
}

/// Condition-number proxy from the ratio of the largest to smallest
/// Cholesky pivot, squared (pivots are the square roots of an eigenvalue
/// bound for SPD matrices).
fn cholesky_condition_estimate(l: &Mat3) -> f64 {
    let pivots = [l[0][0], l[1][1], l[2][2]];
    let max = pivots.iter().cloned().fold(f64::MIN, f64::max);
    let min = pivots.iter().cloned().fold(f64::MAX, f64::min);
    if min <= 0.0 {
        f64::INFINITY
    } else {
        (max / min).powi(2)
    }
}

/// Solves `M x = b`, regularizing with an adaptive Tikhonov shift when `M`
/// is ill-conditioned, and returning `None` (never silently proceeding with
/// a stale solve) if even the regularized system cannot be factored.
fn solve_regularized(m: Mat3, b: [f64; 3]) -> Option<[f64; 3]> {
    if let Some(l) = cholesky3(&m) {
        let cond = cholesky_condition_estimate(&l);
        if cond <= TAU_COND {
            return Some(cholesky_solve(&l, b));
        }
        let severity = ((cond - TAU_COND) / TAU_COND).clamp(0.0, 1.0);
        let alpha = ALPHA_MIN + (ALPHA_MAX - ALPHA_MIN) * severity;
        let regularized = mat3_add_scaled_identity(m, alpha);
        let l_reg = cholesky3(&regularized)?;
        return Some(cholesky_solve(&l_reg, b));
    }
    // Not SPD at all within tolerance: regularize at the ceiling and retry once.
    let regularized = mat3_add_scaled_identity(m, ALPHA_MAX);
    let l_reg = cholesky3(&regularized)?;
    Some(cholesky_solve(&l_reg, b))
}

/// `M(q)` for the full nonlinear model.
fn mass_matrix_full(p: &PlantParams, th1: f64, th2: f64) -> Mat3 {
    let (m0, m1, m2) = (p.cart_mass, p.pendulum1_mass, p.pendulum2_mass);
    let (l1, l2) = (p.pendulum1_length, p.pendulum2_length);
    let m01 = m1 * l1 * th1.cos();
    let m02 = m2 * l2 * th2.cos();
    [
        [m0 + m1 + m2, m01, m02],
        [m01, p.pendulum1_inertia + m1 * l1 * l1, 0.0],
        [m02, 0.0, p.pendulum2_inertia + m2 * l2 * l2],
    ]
}

/// `M` evaluated at the upright equilibrium (`theta = 0`); constant.
fn mass_matrix_linear(p: &PlantParams) -> Mat3 {
    mass_matrix_full(p, 0.0, 0.0)
}

/// Rank-reduced approximation: drops cart/pendulum inertial coupling.
fn mass_matrix_lowrank(p: &PlantParams) -> Mat3 {
    let (m0, m1, m2) = (p.cart_mass, p.pendulum1_mass, p.pendulum2_mass);
    let (l1, l2) = (p.pendulum1_length, p.pendulum2_length);
    [
        [m0 + m1 + m2, 0.0, 0.0],
        [0.0, p.pendulum1_inertia + m1 * l1 * l1, 0.0],
        [0.0, 0.0, p.pendulum2_inertia + m2 * l2 * l2],
    ]
}

/// `C(q, qdot) qdot + G(q) + friction(qdot)`, the non-inertial right-hand
/// side shared by all three model variants (the full nonlinear terms reduce
/// to their linearization automatically when `theta` is small).
fn rhs_nonlinear(p: &PlantParams, q: [f64; 3], qdot: [f64; 3]) -> [f64; 3] {
    let (th1, th2) = (q[1], q[2]);
    let (xdot, th1dot, th2dot) = (qdot[0], qdot[1], qdot[2]);
    let (m1, m2) = (p.pendulum1_mass, p.pendulum2_mass);
    let (l1, l2) = (p.pendulum1_length, p.pendulum2_length);
    let centrifugal0 = -m1 * l1 * th1.sin() * th1dot * th1dot - m2 * l2 * th2.sin() * th2dot * th2dot;
    let gravity1 = -m1 * p.gravity * l1 * th1.sin();
    let gravity2 = -m2 * p.gravity * l2 * th2.sin();
    [
        centrifugal0 + p.cart_friction * xdot,
        gravity1 + p.pendulum1_friction * th1dot,
        gravity2 + p.pendulum2_friction * th2dot,
    ]
}

fn rhs_linear(p: &PlantParams, q: [f64; 3], qdot: [f64; 3]) -> [f64; 3] {
    let (th1, th2) = (q[1], q[2]);
    let (xdot, th1dot, th2dot) = (qdot[0], qdot[1], qdot[2]);
    let (m1, m2) = (p.pendulum1_mass, p.pendulum2_mass);
    let (l1, l2) = (p.pendulum1_length, p.pendulum2_length);
    [
        p.cart_friction * xdot,
        -m1 * p.gravity * l1 * th1 + p.pendulum1_friction * th1dot,
        -m2 * p.gravity * l2 * th2 + p.pendulum2_friction * th2dot,
    ]
}

/// Evaluates `f(x, u) = xdot` for a double inverted pendulum on a cart.
#[derive(Debug, Clone)]
pub struct Plant {
    pub model: PlantModel,
    pub params: PlantParams,
    linear_mass: Mat3,
}

impl Plant {
    pub fn new(model: PlantModel, params: PlantParams) -> Result<Self, EngineError> {
        params.validate()?;
        let linear_mass = mass_matrix_linear(&params);
        Ok(Self {
            model,
            params,
            linear_mass,
        })
    }

    fn mass_matrix(&self, q: [f64; 3]) -> Mat3 {
        match self.model {
            PlantModel::Full => mass_matrix_full(&self.params, q[1], q[2]),
            PlantModel::Simplified => self.linear_mass,
            PlantModel::LowRank => mass_matrix_lowrank(&self.params),
        }
    }

    fn rhs(&self, q: [f64; 3], qdot: [f64; 3]) -> [f64; 3] {
        match self.model {
            PlantModel::Full | PlantModel::LowRank => rhs_nonlinear(&self.params, q, qdot),
            PlantModel::Simplified => rhs_linear(&self.params, q, qdot),
        }
    }

    /// `f(x, u) -> xdot`. Returns `None` if `M` cannot be solved even after
    /// Tikhonov regularization (ill-conditioned, caller should treat as a
    /// rollout-terminating non-finite event upstream).
    pub fn dynamics(&self, x: &State6, u: f64) -> Option<State6> {
        let q = [x[0], x[1], x[2]];
        let qdot = [x[3], x[4], x[5]];
        let m = self.mass_matrix(q);
        let rest = self.rhs(q, qdot);
        let b_u = [u, 0.0, 0.0];
        let load = [b_u[0] - rest[0], b_u[1] - rest[1], b_u[2] - rest[2]];
        let qddot = solve_regularized(m, load)?;
        Some([qdot[0], qdot[1], qdot[2], qddot[0], qddot[1], qddot[2]])
    }

    /// `M^{-1} B`, the control-input sensitivity of the angular accelerations,
    /// used to build the equivalent-control solve in the SMC controllers.
    pub fn minv_b(&self, x: &State6) -> Option<[f64; 3]> {
        let q = [x[0], x[1], x[2]];
        let m = self.mass_matrix(q);
        solve_regularized(m, [1.0, 0.0, 0.0])
    }

    /// `M^{-1} (-(C qdot + G + friction))`, the uncontrolled angular
    /// acceleration, used alongside [`Plant::minv_b`] for equivalent control.
    pub fn minv_rest(&self, x: &State6) -> Option<[f64; 3]> {
        let q = [x[0], x[1], x[2]];
        let qdot = [x[3], x[4], x[5]];
        let m = self.mass_matrix(q);
        let rest = self.rhs(q, qdot);
        solve_regularized(m, [-rest[0], -rest[1], -rest[2]])
    }

    /// Total mechanical energy (kinetic + potential), used by the safety
    /// guard's energy-envelope check.
    pub fn energy(&self, x: &State6) -> f64 {
        let q = [x[0], x[1], x[2]];
        let qdot = [x[3], x[4], x[5]];
        let m = self.mass_matrix(q);
        let kinetic = 0.5 * qdot[0] * mat3_vec3(&m, qdot)[0]
            + 0.5 * qdot[1] * mat3_vec3(&m, qdot)[1]
            + 0.5 * qdot[2] * mat3_vec3(&m, qdot)[2];
        let potential = self.params.pendulum1_mass
            * self.params.gravity
            * self.params.pendulum1_length
            * q[1].cos()
            + self.params.pendulum2_mass
                * self.params.gravity
                * self.params.pendulum2_length
                * q[2].cos();
        kinetic + potential
    }
}
