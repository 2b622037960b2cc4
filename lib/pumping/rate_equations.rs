//! Population-only evolution under optical pumping.
//!
//! Coherences are dropped and every transition is reduced to a rate: the
//! excited state lifetime sets the spontaneous decay and each driven
//! transition absorbs and stimulates emission at a rate set by the laser
//! intensity in its polarization channel and a Lorentzian in the detuning.

use std::f64::consts::TAU;
use log::{ debug, info, trace };
use ndarray as nd;
use crate::{
    density::DensityMatrix,
    eigenbasis::Eigenbasis,
    laser::{ Laser, LaserError, LaserId },
    pumping::{
        IntegrationContext,
        LinewidthModel,
        OpticalPumping,
        SUCCESS,
        TransitionTensors,
        derivative,
        pack,
        unpack,
    },
};

/// Transfer rate [1/s] of one driven transition.
///
/// `intensity` and `sat_intensity` share units, as do the linewidths (FWHM)
/// and the two frequencies. The rate is
/// ```text
/// (I / I_sat) * (gamma / 2) * (Γ_atom / Γ) / (1 + (2 Δ / Γ)^2)
/// ```
/// with `gamma = 2 pi Γ_atom`, `Γ` the combined linewidth and `Δ` the
/// detuning of the laser from the atomic transition.
pub fn set_transition_rate(
    intensity: f64,
    sat_intensity: f64,
    atom_lw: f64,
    laser_lw: f64,
    atom_freq: f64,
    laser_freq: f64,
    model: LinewidthModel,
) -> f64
{
    if intensity == 0.0 { return 0.0; }
    let gamma = TAU * atom_lw;
    let lw = model.combine(atom_lw, laser_lw);
    let delta = laser_freq - atom_freq;
    (intensity / sat_intensity) * (gamma / 2.0) * (atom_lw / lw)
        / (1.0 + (2.0 * delta / lw).powi(2))
}

/// Per-transition transfer rates [1/s], indexed `[e, g, q]` and `[e, f, q]`
/// like the coupling tensors. The squared coupling is already folded in.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionRates {
    pub eg: nd::Array3<f64>,
    pub ef: nd::Array3<f64>,
}

impl TransitionRates {
    /// Create a new set of all-zero rates.
    pub fn zeros(num_e: usize, num_f: usize, num_g: usize) -> Self {
        Self {
            eg: nd::Array3::zeros((num_e, num_g, 3)),
            ef: nd::Array3::zeros((num_e, num_f, 3)),
        }
    }

    /// Compute every rate. The G-E transitions are driven by `laser_ge` and
    /// the F-E transitions by `laser_fe`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        atom_lw: f64,
        nu_e: &nd::Array1<f64>,
        nu_f: &nd::Array1<f64>,
        nu_g: &nd::Array1<f64>,
        a_eg: &nd::Array3<f64>,
        a_ef: &nd::Array3<f64>,
        laser_fe: &Laser,
        laser_ge: &Laser,
        model: LinewidthModel,
    ) -> Self
    {
        let rates = |a: &nd::Array3<f64>, nu_ground: &nd::Array1<f64>, laser: &Laser| {
            nd::Array3::from_shape_fn(a.raw_dim(), |(e, g, q)| {
                let a2 = a[[e, g, q]].powi(2);
                if a2 == 0.0 { return 0.0; }
                a2 * set_transition_rate(
                    laser.intensity()[q],
                    laser.saturation_intensity(),
                    atom_lw,
                    laser.linewidth(),
                    nu_e[e] - nu_ground[g],
                    laser.nu(),
                    model,
                )
            })
        };
        Self {
            eg: rates(a_eg, nu_g, laser_ge),
            ef: rates(a_ef, nu_f, laser_fe),
        }
    }

    /// Largest single rate, for logging.
    pub fn max_rate(&self) -> f64 {
        self.eg.iter().chain(self.ef.iter()).copied().fold(0.0, f64::max)
    }
}

/// Rate-equation model of the atom: owns the basis, both lasers and the
/// derived transfer rates.
#[derive(Clone, Debug)]
pub struct RateEquations {
    basis: Eigenbasis,
    laser_fe: Laser,
    laser_ge: Laser,
    model: LinewidthModel,
    rates: TransitionRates,
    verbosity: u8,
}

impl RateEquations {
    /// Create a new model and compute its transition rates.
    pub fn new(
        basis: Eigenbasis,
        laser_fe: Laser,
        laser_ge: Laser,
        model: LinewidthModel,
        verbosity: u8,
    ) -> Self
    {
        let b = basis.bounds();
        let rates = TransitionRates::zeros(b.num_e(), b.num_f(), b.num_g());
        let mut new = Self { basis, laser_fe, laser_ge, model, rates, verbosity };
        new.setup_transition_data();
        new
    }

    /// Get a reference to the level basis.
    pub fn basis(&self) -> &Eigenbasis { &self.basis }

    /// Get a reference to one of the lasers.
    pub fn laser(&self, which: LaserId) -> &Laser {
        match which {
            LaserId::Fe => &self.laser_fe,
            LaserId::Ge => &self.laser_ge,
        }
    }

    /// Get a reference to the current transition rates.
    pub fn rates(&self) -> &TransitionRates { &self.rates }

    /// Get the linewidth model in use.
    pub fn linewidth_model(&self) -> LinewidthModel { self.model }

    /// Recompute all transition rates for an atomic linewidth `linewidth`
    /// [Hz, FWHM].
    pub fn setup_transition_rates(&mut self, linewidth: f64) {
        let basis = &self.basis;
        self.rates = TransitionRates::new(
            linewidth,
            &basis.nu_e,
            &basis.nu_f,
            &basis.nu_g,
            &basis.a_eg,
            &basis.a_ef,
            &self.laser_fe,
            &self.laser_ge,
            self.model,
        );
        debug!("max transition rate = {:.6e} s^-1", self.rates.max_rate());
    }
}

impl OpticalPumping for RateEquations {
    fn setup_transition_data(&mut self) {
        let linewidth = self.basis.atom().linewidth;
        self.setup_transition_rates(linewidth);
    }

    fn calculate_derivs(&self, state: &DensityMatrix) -> DensityMatrix {
        let bounds = self.basis.bounds();
        let y = pack(state, bounds).to_vec();
        let mut dydt = vec![0.0; y.len()];
        derivative(0.0, &y, &mut dydt, &self.context());
        unpack(&dydt, bounds)
    }

    fn switch_off_laser(&mut self, which: LaserId) -> Result<(), LaserError> {
        let tau = self.basis.atom().tau;
        match which {
            LaserId::Fe => self.laser_fe.switch_off(tau)?,
            LaserId::Ge => self.laser_ge.switch_off(tau)?,
        }
        info!("switched off laser {}", which);
        self.setup_transition_data();
        Ok(())
    }

    fn change_magnetic_field(&mut self, b_z: f64) {
        self.basis.set_field(b_z);
        info!("magnetic field set to B_z = {} G", b_z);
        self.setup_transition_data();
    }

    fn context(&self) -> IntegrationContext<'_> {
        let basis = &self.basis;
        IntegrationContext {
            bounds: basis.bounds(),
            atom: basis.atom(),
            laser_fe: &self.laser_fe,
            laser_ge: &self.laser_ge,
            a_eg: &basis.a_eg,
            a_ef: &basis.a_ef,
            nu_e: &basis.nu_e,
            nu_f: &basis.nu_f,
            nu_g: &basis.nu_g,
            tensors: TransitionTensors::Rates(&self.rates),
            verbosity: self.verbosity,
        }
    }
}

// Walk every (excited, ground, channel) triple of one ground manifold.
fn for_each_transition<F>(
    a: &nd::Array3<f64>,
    rates: &nd::Array3<f64>,
    mut f: F,
)
where F: FnMut(usize, usize, f64, f64)
{
    for ((e, g, q), &r) in rates.indexed_iter() {
        let a2 = a[[e, g, q]].powi(2);
        if r == 0.0 && a2 == 0.0 { continue; }
        f(e, g, r, a2);
    }
}

/// Population derivatives for the flat G, F, E layout.
///
/// For every transition with rate `R` and squared coupling `a^2`:
/// ```text
/// dP_e += R (P_g - P_e)
/// dP_g += R (P_e - P_g) + gamma a^2 P_e
/// ```
/// and each excited level additionally decays as `-gamma P_e`.
pub(crate) fn update_population(
    t: f64,
    y: &[f64],
    dydt: &mut [f64],
    ctx: &IntegrationContext<'_>,
    rates: &TransitionRates,
) -> i32
{
    let b = ctx.bounds;
    let gamma = ctx.atom.gamma_spon;
    dydt.iter_mut().for_each(|d| { *d = 0.0; });
    for e in 0..b.num_e() {
        dydt[b.e.start + e] -= gamma * y[b.e.start + e];
    }
    for (a, r, offs) in [
        (ctx.a_eg, &rates.eg, b.g.start),
        (ctx.a_ef, &rates.ef, b.f.start),
    ] {
        for_each_transition(a, r, |e, g, r, a2| {
            let ie = b.e.start + e;
            let ig = offs + g;
            let flow = r * (y[ig] - y[ie]);
            dydt[ie] += flow;
            dydt[ig] += gamma * a2 * y[ie] - flow;
        });
    }
    if ctx.verbosity > 2 {
        let drift: f64 = dydt.iter().sum();
        trace!("t = {:.6e} s: sum(dP/dt) = {:.3e}", t, drift);
    }
    SUCCESS
}

/// Row-major Jacobian of [`update_population`]. The system is autonomous, so
/// `dfdt` is zero.
pub(crate) fn jacobian(
    _t: f64,
    _y: &[f64],
    dfdy: &mut [f64],
    dfdt: &mut [f64],
    ctx: &IntegrationContext<'_>,
    rates: &TransitionRates,
) -> i32
{
    let b = ctx.bounds;
    let n = b.len();
    let gamma = ctx.atom.gamma_spon;
    dfdy.iter_mut().for_each(|d| { *d = 0.0; });
    dfdt.iter_mut().for_each(|d| { *d = 0.0; });
    for ie in b.e.clone() {
        dfdy[ie * n + ie] -= gamma;
    }
    for (a, r, offs) in [
        (ctx.a_eg, &rates.eg, b.g.start),
        (ctx.a_ef, &rates.ef, b.f.start),
    ] {
        for_each_transition(a, r, |e, g, r, a2| {
            let ie = b.e.start + e;
            let ig = offs + g;
            dfdy[ie * n + ig] += r;
            dfdy[ie * n + ie] -= r;
            dfdy[ig * n + ie] += r + gamma * a2;
            dfdy[ig * n + ig] -= r;
        });
    }
    SUCCESS
}
