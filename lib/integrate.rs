//! Adaptive ODE integrators driven through a pair of callbacks.
//!
//! Two steppers are provided: an explicit embedded Runge-Kutta (Cash-Karp
//! 4(5)) for the usual case and a linearly implicit Euler method for stiff
//! configurations, where strong lasers make the pumping rates much faster
//! than the spontaneous decay.

use ndarray as nd;
use ndarray_linalg::Solve;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

/// A first-order system `dy/dt = f(t, y)` of fixed dimension.
pub trait OdeSystem {
    /// Number of state variables.
    fn dim(&self) -> usize;

    /// Write `f(t, y)` into `dydt`.
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);

    /// Write `df_i/dy_j` into `dfdy[i * dim + j]` and `df/dt` into `dfdt`.
    fn jacobian(&self, t: f64, y: &[f64], dfdy: &mut [f64], dfdt: &mut [f64]);
}

/// Returned when an integration cannot proceed.
#[derive(Debug, Error, PartialEq)]
pub enum IntegrationError {
    #[error("step size underflow at t = {t:e}: h = {h:e}")]
    StepUnderflow { t: f64, h: f64 },

    #[error("singular iteration matrix at t = {0:e}")]
    Singular(f64),
}

/// Choice of stepper.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratorKind {
    #[default]
    Rk45,
    Implicit,
}

/// Error and step size controls shared by both steppers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tolerances {
    /// Absolute error bound per component.
    pub abs: f64,
    /// Relative error bound per component.
    pub rel: f64,
    /// First trial step.
    pub h_init: f64,
    /// Smallest step before giving up.
    pub h_min: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self { abs: 1e-10, rel: 1e-8, h_init: 1e-12, h_min: 1e-22 }
    }
}

impl Tolerances {
    /// Defaults suited to a stepper: the implicit method is first order, so
    /// its bounds are looser.
    pub fn for_integrator(kind: IntegratorKind) -> Self {
        match kind {
            IntegratorKind::Rk45 => Self::default(),
            IntegratorKind::Implicit
                => Self { abs: 1e-8, rel: 1e-6, ..Self::default() },
        }
    }

    // scaled max-norm of an error estimate; NaN counts as a failure
    fn error_norm(&self, y: &[f64], y_new: &[f64], err: &[f64]) -> f64 {
        let norm
            = y.iter().zip(y_new).zip(err)
            .map(|((a, b), e)| {
                e.abs() / (self.abs + self.rel * a.abs().max(b.abs()))
            })
            .fold(0.0, f64::max);
        if norm.is_nan() { f64::INFINITY } else { norm }
    }
}

const CK_A: [f64; 6] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 3.0 / 5.0, 1.0, 7.0 / 8.0];
const CK_B: [[f64; 5]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0],
    [3.0 / 10.0, -9.0 / 10.0, 6.0 / 5.0, 0.0, 0.0],
    [-11.0 / 54.0, 5.0 / 2.0, -70.0 / 27.0, 35.0 / 27.0, 0.0],
    [
        1631.0 / 55296.0,
        175.0 / 512.0,
        575.0 / 13824.0,
        44275.0 / 110592.0,
        253.0 / 4096.0,
    ],
];
const CK_C: [f64; 6] = [
    37.0 / 378.0, 0.0, 250.0 / 621.0, 125.0 / 594.0, 0.0, 512.0 / 1771.0,
];
const CK_C_STAR: [f64; 6] = [
    2825.0 / 27648.0,
    0.0,
    18575.0 / 48384.0,
    13525.0 / 55296.0,
    277.0 / 14336.0,
    1.0 / 4.0,
];

/// Cash-Karp embedded Runge-Kutta 4(5) stepper with adaptive step size.
#[derive(Clone, Debug)]
pub struct Rk45 {
    tol: Tolerances,
    h: f64,
    k: [Vec<f64>; 6],
    y_tmp: Vec<f64>,
    y_new: Vec<f64>,
    y_err: Vec<f64>,
}

impl Rk45 {
    /// Create a new stepper for systems of dimension `dim`.
    pub fn new(dim: usize, tol: Tolerances) -> Self {
        Self {
            tol,
            h: tol.h_init,
            k: std::array::from_fn(|_| vec![0.0; dim]),
            y_tmp: vec![0.0; dim],
            y_new: vec![0.0; dim],
            y_err: vec![0.0; dim],
        }
    }

    // one trial step of size `h` from (t, y) into y_new and y_err
    fn trial<S>(&mut self, sys: &S, t: f64, y: &[f64], h: f64)
    where S: OdeSystem + ?Sized
    {
        for s in 0..6 {
            for i in 0..y.len() {
                self.y_tmp[i]
                    = y[i]
                    + h * (0..s).map(|r| CK_B[s][r] * self.k[r][i]).sum::<f64>();
            }
            let (y_tmp, k) = (&self.y_tmp, &mut self.k[s]);
            sys.rhs(t + CK_A[s] * h, y_tmp, k);
        }
        for i in 0..y.len() {
            let (hi, lo)
                = (0..6).fold((0.0, 0.0), |(hi, lo), s| {
                    (hi + CK_C[s] * self.k[s][i], lo + CK_C_STAR[s] * self.k[s][i])
                });
            self.y_new[i] = y[i] + h * hi;
            self.y_err[i] = h * (hi - lo);
        }
    }

    /// Advance `y` from `t0` to `t1`, never taking a step longer than
    /// `h_max`.
    ///
    /// *Panics* if `y` doesn't match the system's dimension.
    pub fn evolve<S>(
        &mut self,
        sys: &S,
        t0: f64,
        t1: f64,
        y: &mut [f64],
        h_max: f64,
    ) -> Result<(), IntegrationError>
    where S: OdeSystem + ?Sized
    {
        assert_eq!(y.len(), sys.dim(), "Rk45::evolve: state dimension mismatch");
        assert_eq!(y.len(), self.y_new.len(), "Rk45::evolve: stepper dimension mismatch");
        let mut t = t0;
        while t < t1 {
            let mut h = self.h.min(h_max);
            let last = h >= t1 - t;
            if last { h = t1 - t; }
            loop {
                if h < self.tol.h_min {
                    return Err(IntegrationError::StepUnderflow { t, h });
                }
                self.trial(sys, t, y, h);
                let err = self.tol.error_norm(y, &self.y_new, &self.y_err);
                if err <= 1.0 {
                    y.copy_from_slice(&self.y_new);
                    t = if last && h == t1 - t { t1 } else { t + h };
                    let grow
                        = if err == 0.0 { 5.0 }
                        else { (0.9 * err.powf(-0.2)).min(5.0) };
                    let next = if last { (h * grow).max(self.h) } else { h * grow };
                    self.h = next.min(h_max);
                    break;
                }
                h *= (0.9 * err.powf(-0.25)).max(0.1);
            }
        }
        Ok(())
    }

    /// Current step size estimate.
    pub fn step_size(&self) -> f64 { self.h }
}

/// Linearly implicit Euler stepper, solving `(I - h J) dy = h f(t, y)` each
/// step. Step size is controlled by step doubling.
#[derive(Clone, Debug)]
pub struct ImplicitEuler {
    tol: Tolerances,
    h: f64,
    f: Vec<f64>,
    dfdy: Vec<f64>,
    dfdt: Vec<f64>,
}

impl ImplicitEuler {
    /// Create a new stepper for systems of dimension `dim`.
    pub fn new(dim: usize, tol: Tolerances) -> Self {
        Self {
            tol,
            h: tol.h_init,
            f: vec![0.0; dim],
            dfdy: vec![0.0; dim * dim],
            dfdt: vec![0.0; dim],
        }
    }

    // a single linearly implicit step; returns the new state
    fn single<S>(&mut self, sys: &S, t: f64, y: &[f64], h: f64)
        -> Result<Vec<f64>, IntegrationError>
    where S: OdeSystem + ?Sized
    {
        let n = y.len();
        sys.rhs(t, y, &mut self.f);
        sys.jacobian(t, y, &mut self.dfdy, &mut self.dfdt);
        let a: nd::Array2<f64>
            = nd::Array2::from_shape_fn((n, n), |(i, j)| {
                let id = if i == j { 1.0 } else { 0.0 };
                id - h * self.dfdy[i * n + j]
            });
        let b: nd::Array1<f64>
            = self.f.iter().zip(&self.dfdt)
            .map(|(f, dt)| h * (f + h * dt))
            .collect();
        let dy
            = a.solve_into(b)
            .map_err(|_| IntegrationError::Singular(t))?;
        Ok(y.iter().zip(dy.iter()).map(|(y, d)| y + d).collect())
    }

    /// Advance `y` from `t0` to `t1`, never taking a step longer than
    /// `h_max`.
    ///
    /// *Panics* if `y` doesn't match the system's dimension.
    pub fn evolve<S>(
        &mut self,
        sys: &S,
        t0: f64,
        t1: f64,
        y: &mut [f64],
        h_max: f64,
    ) -> Result<(), IntegrationError>
    where S: OdeSystem + ?Sized
    {
        assert_eq!(y.len(), sys.dim(), "ImplicitEuler::evolve: state dimension mismatch");
        assert_eq!(y.len(), self.f.len(), "ImplicitEuler::evolve: stepper dimension mismatch");
        let mut t = t0;
        while t < t1 {
            let mut h = self.h.min(h_max);
            let last = h >= t1 - t;
            if last { h = t1 - t; }
            loop {
                if h < self.tol.h_min {
                    return Err(IntegrationError::StepUnderflow { t, h });
                }
                let full = self.single(sys, t, y, h)?;
                let half = self.single(sys, t, y, h / 2.0)?;
                let two_half = self.single(sys, t + h / 2.0, &half, h / 2.0)?;
                let err_est: Vec<f64>
                    = two_half.iter().zip(&full).map(|(a, b)| a - b).collect();
                let err = self.tol.error_norm(y, &two_half, &err_est);
                if err <= 1.0 {
                    // implicit Euler keeps rate-equation populations non-negative
                    y.copy_from_slice(&two_half);
                    t = if last && h == t1 - t { t1 } else { t + h };
                    let grow
                        = if err == 0.0 { 5.0 }
                        else { (0.9 * err.powf(-0.5)).min(5.0) };
                    let next = if last { (h * grow).max(self.h) } else { h * grow };
                    self.h = next.min(h_max);
                    break;
                }
                h *= (0.9 * err.powf(-0.5)).clamp(0.1, 0.5);
            }
        }
        Ok(())
    }

    /// Current step size estimate.
    pub fn step_size(&self) -> f64 { self.h }
}

/// Either stepper behind one interface.
#[derive(Clone, Debug)]
pub enum Stepper {
    Rk45(Rk45),
    Implicit(ImplicitEuler),
}

impl Stepper {
    /// Create a new stepper of the requested kind.
    pub fn new(kind: IntegratorKind, dim: usize, tol: Tolerances) -> Self {
        match kind {
            IntegratorKind::Rk45 => Self::Rk45(Rk45::new(dim, tol)),
            IntegratorKind::Implicit
                => Self::Implicit(ImplicitEuler::new(dim, tol)),
        }
    }

    /// Advance `y` from `t0` to `t1` with steps no longer than `h_max`.
    pub fn evolve<S>(
        &mut self,
        sys: &S,
        t0: f64,
        t1: f64,
        y: &mut [f64],
        h_max: f64,
    ) -> Result<(), IntegrationError>
    where S: OdeSystem + ?Sized
    {
        match self {
            Self::Rk45(stepper) => stepper.evolve(sys, t0, t1, y, h_max),
            Self::Implicit(stepper) => stepper.evolve(sys, t0, t1, y, h_max),
        }
    }

    /// Current step size estimate.
    pub fn step_size(&self) -> f64 {
        match self {
            Self::Rk45(stepper) => stepper.step_size(),
            Self::Implicit(stepper) => stepper.step_size(),
        }
    }
}
