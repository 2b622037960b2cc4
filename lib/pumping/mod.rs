//! Evolution models for optical pumping and the plumbing that hands them to
//! an ODE integrator.
//!
//! An integrator only sees a flat `&[f64]` state and a pair of callbacks
//! ([`derivative`] and [`jacobian`]) with a fixed signature; everything the
//! callbacks need is gathered, by reference, in an [`IntegrationContext`].
//! The flat state holds populations only, laid out G, F, E as described by
//! [`ManifoldBounds`].

use ndarray as nd;
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };
use crate::{
    atom::AtomParameters,
    density::DensityMatrix,
    eigenbasis::ManifoldBounds,
    integrate::OdeSystem,
    laser::{ Laser, LaserError, LaserId },
};

pub mod rate_equations;
pub use rate_equations::{ RateEquations, TransitionRates };

/// Status returned by the integrator callbacks on success.
pub const SUCCESS: i32 = 0;

/// How the atomic natural linewidth and the laser linewidth (both FWHM) are
/// combined into the width of the absorption Lorentzian.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinewidthModel {
    /// Linear sum, exact for the convolution of two Lorentzians.
    #[default]
    Sum,
    /// Quadrature sum.
    Quadrature,
}

impl LinewidthModel {
    /// Combine an atomic and a laser linewidth.
    pub fn combine(self, atom_lw: f64, laser_lw: f64) -> f64 {
        match self {
            Self::Sum => atom_lw + laser_lw,
            Self::Quadrature => atom_lw.hypot(laser_lw),
        }
    }
}

/// Per-channel Rabi frequencies [rad/s] for a coherent treatment, indexed
/// like the coupling tensors.
#[derive(Clone, Debug, PartialEq)]
pub struct DipoleTensors {
    pub eg: nd::Array3<f64>,
    pub ef: nd::Array3<f64>,
}

impl DipoleTensors {
    /// Compute `a * gamma * sqrt(I_q / (2 I_sat))` for every coupling.
    pub fn new(
        atom: &AtomParameters,
        a_eg: &nd::Array3<f64>,
        a_ef: &nd::Array3<f64>,
        laser_fe: &Laser,
        laser_ge: &Laser,
    ) -> Self
    {
        let rabi = |a: &nd::Array3<f64>, laser: &Laser| {
            let mut out = a.clone();
            out.indexed_iter_mut()
                .for_each(|((_, _, q), x)| {
                    *x *= atom.gamma_spon * (laser.saturation(q) / 2.0).sqrt();
                });
            out
        };
        Self { eg: rabi(a_eg, laser_ge), ef: rabi(a_ef, laser_fe) }
    }
}

/// Transition data specific to an evolution model.
#[derive(Copy, Clone, Debug)]
pub enum TransitionTensors<'a> {
    /// Population transfer rates, for the rate equations.
    Rates(&'a TransitionRates),
    /// Dipole couplings, for the optical Bloch equations.
    Dipoles(&'a DipoleTensors),
}

/// Everything the integrator callbacks need, borrowed from whatever owns it
/// for the duration of one integration step.
#[derive(Copy, Clone, Debug)]
pub struct IntegrationContext<'a> {
    pub bounds: &'a ManifoldBounds,
    pub atom: &'a AtomParameters,
    pub laser_fe: &'a Laser,
    pub laser_ge: &'a Laser,
    pub a_eg: &'a nd::Array3<f64>,
    pub a_ef: &'a nd::Array3<f64>,
    pub nu_e: &'a nd::Array1<f64>,
    pub nu_f: &'a nd::Array1<f64>,
    pub nu_g: &'a nd::Array1<f64>,
    pub tensors: TransitionTensors<'a>,
    pub verbosity: u8,
}

/// Shared contract of the evolution models.
pub trait OpticalPumping {
    /// Precompute whatever transition data the model needs from the current
    /// lasers and level energies.
    fn setup_transition_data(&mut self);

    /// Compute the time derivative of a state.
    fn calculate_derivs(&self, state: &DensityMatrix) -> DensityMatrix;

    /// Extinguish one laser and refresh the transition data.
    fn switch_off_laser(&mut self, which: LaserId) -> Result<(), LaserError>;

    /// Change the field along the quantization axis [G] and refresh
    /// everything that depends on it.
    fn change_magnetic_field(&mut self, b_z: f64);

    /// Borrow the integration context for the current configuration.
    fn context(&self) -> IntegrationContext<'_>;
}

/// Derivative callback: write `dy/dt` at time `t` into `dydt`.
///
/// Always returns [`SUCCESS`]; validity of the result is checked by the
/// caller.
///
/// *Panics* if the context carries a coherent model's tensors.
pub fn derivative(
    t: f64,
    y: &[f64],
    dydt: &mut [f64],
    ctx: &IntegrationContext<'_>,
) -> i32
{
    match ctx.tensors {
        TransitionTensors::Rates(rates)
            => rate_equations::update_population(t, y, dydt, ctx, rates),
        TransitionTensors::Dipoles(_)
            => panic!("derivative: rate callback given a coherent context"),
    }
}

/// Jacobian callback: write `df_i/dy_j` into `dfdy[i * n + j]` and `df/dt`
/// into `dfdt`.
///
/// *Panics* if the context carries a coherent model's tensors.
pub fn jacobian(
    t: f64,
    y: &[f64],
    dfdy: &mut [f64],
    dfdt: &mut [f64],
    ctx: &IntegrationContext<'_>,
) -> i32
{
    match ctx.tensors {
        TransitionTensors::Rates(rates)
            => rate_equations::jacobian(t, y, dfdy, dfdt, ctx, rates),
        TransitionTensors::Dipoles(_)
            => panic!("jacobian: rate callback given a coherent context"),
    }
}

impl OdeSystem for IntegrationContext<'_> {
    fn dim(&self) -> usize { self.bounds.len() }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        derivative(t, y, dydt, self);
    }

    fn jacobian(&self, t: f64, y: &[f64], dfdy: &mut [f64], dfdt: &mut [f64]) {
        jacobian(t, y, dfdy, dfdt, self);
    }
}

/// Collect the populations of a state into the flat layout.
pub fn pack(state: &DensityMatrix, bounds: &ManifoldBounds) -> nd::Array1<f64> {
    let mut y: nd::Array1<f64> = nd::Array1::zeros(bounds.len());
    y.slice_mut(nd::s![bounds.g.clone()])
        .assign(&state.gg.diag().mapv(|p| p.re));
    y.slice_mut(nd::s![bounds.f.clone()])
        .assign(&state.ff.diag().mapv(|p| p.re));
    y.slice_mut(nd::s![bounds.e.clone()])
        .assign(&state.ee.diag().mapv(|p| p.re));
    y
}

/// Build a state with populations from the flat layout and no coherences.
pub fn unpack(y: &[f64], bounds: &ManifoldBounds) -> DensityMatrix {
    let mut state
        = DensityMatrix::new(bounds.num_e(), bounds.num_f(), bounds.num_g());
    let diag = |range: std::ops::Range<usize>| {
        nd::Array1::from_iter(y[range].iter().map(|p| C64::from(*p)))
    };
    state.gg.diag_mut().assign(&diag(bounds.g.clone()));
    state.ff.diag_mut().assign(&diag(bounds.f.clone()));
    state.ee.diag_mut().assign(&diag(bounds.e.clone()));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::{
        atom::{ Isotope, MagneticField },
        eigenbasis::Eigenbasis,
        units::MW_PER_CM2,
    };

    fn k37_d1() -> RateEquations {
        let atom = AtomParameters::new(Isotope::K37, 1).unwrap();
        let basis = Eigenbasis::new(&atom, MagneticField::default());
        let nu_fe = basis.transition_frequency(atom.f2_upper(), 4);
        let nu_ge = basis.transition_frequency(atom.f2_lower(), 4);
        let laser_fe
            = Laser::new(nu_fe, 2.0 * MW_PER_CM2, 0.0, 0.0, 0.5, atom.tau)
            .unwrap();
        let laser_ge
            = Laser::new(nu_ge, 0.5 * MW_PER_CM2, 0.0, 0.0, 1.0, atom.tau)
            .unwrap();
        RateEquations::new(basis, laser_fe, laser_ge, LinewidthModel::Sum, 0)
    }

    fn dipoles(model: &RateEquations) -> DipoleTensors {
        let basis = model.basis();
        DipoleTensors::new(
            basis.atom(),
            &basis.a_eg,
            &basis.a_ef,
            model.laser(LaserId::Fe),
            model.laser(LaserId::Ge),
        )
    }

    #[test]
    fn linewidth_models() {
        assert_relative_eq!(LinewidthModel::Sum.combine(3.0, 4.0), 7.0);
        assert_relative_eq!(LinewidthModel::Quadrature.combine(3.0, 4.0), 5.0);
        assert_eq!(LinewidthModel::default(), LinewidthModel::Sum);
    }

    #[test]
    fn pack_unpack_layout() {
        let bounds = ManifoldBounds::new(2, 3, 1);
        let y = [0.1, 0.2, 0.3, 0.15, 0.05, 0.2];
        let state = unpack(&y, &bounds);
        assert_relative_eq!(state.gg[[0, 0]].re, 0.1);
        assert_relative_eq!(state.ff[[2, 2]].re, 0.15);
        assert_relative_eq!(state.ee[[1, 1]].re, 0.2);
        assert_relative_eq!(state.trace(), 1.0, max_relative = 1e-12);
        assert_eq!(pack(&state, &bounds).to_vec(), y.to_vec());
    }

    #[test]
    fn rabi_frequencies_follow_couplings() {
        let model = k37_d1();
        let dip = dipoles(&model);
        let basis = model.basis();
        let gamma = basis.atom().gamma_spon;
        let check = |d: &nd::Array3<f64>, a: &nd::Array3<f64>, laser: &Laser| {
            assert_eq!(d.dim(), a.dim());
            for ((e, g, q), &x) in d.indexed_iter() {
                let i_rel = laser.intensity()[q] / laser.saturation_intensity();
                assert_relative_eq!(
                    x,
                    a[[e, g, q]] * gamma * (i_rel / 2.0).sqrt(),
                    max_relative = 1e-12,
                );
            }
        };
        check(&dip.eg, &basis.a_eg, model.laser(LaserId::Ge));
        check(&dip.ef, &basis.a_ef, model.laser(LaserId::Fe));
        // pure σ+ on G-E: no σ- or π drive at all
        assert!(dip.eg.iter().any(|x| *x != 0.0));
        assert!(dip.eg.indexed_iter()
            .filter(|((_, _, q), _)| *q != 2)
            .all(|(_, x)| *x == 0.0));
    }

    #[test]
    #[should_panic(expected = "coherent context")]
    fn rate_derivative_rejects_coherent_context() {
        let model = k37_d1();
        let dip = dipoles(&model);
        let mut ctx = model.context();
        ctx.tensors = TransitionTensors::Dipoles(&dip);
        let n = ctx.bounds.len();
        let y = vec![1.0 / n as f64; n];
        let mut dydt = vec![0.0; n];
        derivative(0.0, &y, &mut dydt, &ctx);
    }

    #[test]
    #[should_panic(expected = "coherent context")]
    fn rate_jacobian_rejects_coherent_context() {
        let model = k37_d1();
        let dip = dipoles(&model);
        let mut ctx = model.context();
        ctx.tensors = TransitionTensors::Dipoles(&dip);
        let n = ctx.bounds.len();
        let y = vec![1.0 / n as f64; n];
        let mut dfdy = vec![0.0; n * n];
        let mut dfdt = vec![0.0; n];
        jacobian(0.0, &y, &mut dfdy, &mut dfdt, &ctx);
    }
}
