//! Outer driver: builds the model from a configuration, steps it through
//! time and records what comes out.

use std::path::Path;
use log::{ debug, info, warn };
use ndarray as nd;
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    mkdir,
    write_npz,
    atom::{ AtomParameters, CoherenceFlags, MagneticField },
    config::{ ConfigError, InitialPopulation, OpConfig },
    density::DensityMatrix,
    eigenbasis::{ Eigenbasis, Manifold, ManifoldBounds },
    integrate::{ IntegrationError, OdeSystem, Stepper, Tolerances },
    laser::{ Laser, LaserError, LaserId },
    pumping::{ OpticalPumping, RateEquations, pack, unpack },
    units::NS,
};

/// Number of times a chunk is retried with a halved step bound before a
/// run is declared non-physical.
pub const MAX_RETRIES: usize = 8;

/// Populations this far outside `[0, 1]` are treated as round-off and
/// clamped before the physicality check.
pub const ROUND_OFF: f64 = 1e-8;

/// Top-level error for building and running a simulation.
#[derive(Debug, Error)]
pub enum OpError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Laser(#[from] LaserError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error("non-physical populations at t = {time} ns after {retries} retries")]
    NonPhysical { time: f64, retries: usize },

    #[error("cannot write output: {0}")]
    Npz(#[from] ndarray_npy::WriteNpzError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recorded output of a run. Rows of the population arrays are time points
/// and columns are sublevels in ascending `m_F`.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    /// Time points [ns].
    pub time: nd::Array1<f64>,
    pub pop_g: nd::Array2<f64>,
    pub pop_f: nd::Array2<f64>,
    pub pop_e: nd::Array2<f64>,
    /// Nuclear polarization `<m_F> / F` of the F manifold.
    pub polarization: nd::Array1<f64>,
    /// Alignment `<3 m_F^2 - F (F + 1)> / (F (2F - 1))` of the F manifold.
    pub alignment: nd::Array1<f64>,
}

impl Trajectory {
    /// Total population at each time point.
    pub fn trace(&self) -> nd::Array1<f64> {
        self.pop_g.sum_axis(nd::Axis(1))
            + self.pop_f.sum_axis(nd::Axis(1))
            + self.pop_e.sum_axis(nd::Axis(1))
    }

    /// Write all arrays to a `.npz` file, creating parent directories as
    /// needed.
    pub fn write_npz<P>(&self, path: P) -> Result<(), OpError>
    where P: AsRef<Path>
    {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            mkdir!(dir)?;
        }
        write_npz!(
            path,
            arrays: {
                "time" => &self.time,
                "pop_g" => &self.pop_g,
                "pop_f" => &self.pop_f,
                "pop_e" => &self.pop_e,
                "polarization" => &self.polarization,
                "alignment" => &self.alignment,
            }
        )?;
        Ok(())
    }
}

// one row of recorded output
#[derive(Clone, Debug)]
struct Sample {
    time: f64,
    g: Vec<f64>,
    f: Vec<f64>,
    e: Vec<f64>,
    polarization: f64,
    alignment: f64,
}

/// Ground populations at the start of a run.
///
/// Every G and F sublevel gets weight 1 (`Uniform`) or
/// `max(0, 1 + tilt * m_F / F)` (`Tilted`); weights are then normalized to
/// unit trace. The excited manifold starts empty.
pub fn initial_populations(
    basis: &Eigenbasis,
    kind: InitialPopulation,
    tilt: f64,
) -> DensityMatrix
{
    let b = basis.bounds();
    let mut state = DensityMatrix::new(b.num_e(), b.num_f(), b.num_g());
    let weight = |spin: crate::spin::Spin| {
        match kind {
            InitialPopulation::Uniform => 1.0,
            InitialPopulation::Tilted if spin.j2() == 0 => 1.0,
            InitialPopulation::Tilted
                => (1.0 + tilt * spin.m() / spin.j()).max(0.0),
        }
    };
    let w_g: Vec<f64>
        = basis.manifold(Manifold::G).map(|(l, _)| weight(l.spin)).collect();
    let w_f: Vec<f64>
        = basis.manifold(Manifold::F).map(|(l, _)| weight(l.spin)).collect();
    let total: f64 = w_g.iter().chain(&w_f).sum();
    state.gg.diag_mut().iter_mut().zip(&w_g)
        .for_each(|(p, w)| { *p = C64::from(w / total); });
    state.ff.diag_mut().iter_mut().zip(&w_f)
        .for_each(|(p, w)| { *p = C64::from(w / total); });
    state
}

/// A configured run in progress.
#[derive(Clone, Debug)]
pub struct Simulation {
    model: RateEquations,
    stepper: Stepper,
    state: DensityMatrix,
    time: f64,
    tmax: f64,
    tstep: f64,
    offtimes: Vec<(LaserId, f64)>,
    verbosity: u8,
}

impl Simulation {
    /// Validate a configuration and build everything a run needs.
    pub fn from_config(config: &OpConfig) -> Result<Self, OpError> {
        config.validate()?;
        let isotope = config.isotope()?;
        let atom
            = AtomParameters::new(isotope, config.je2)
            .ok_or_else(|| ConfigError::Invalid {
                field: "je2".into(),
                reason: format!("unsupported value {}", config.je2),
            })?;
        let flags = CoherenceFlags {
            zeeman: config.zeeman,
            hyperfine_ex: config.hyperfine_ex,
            hyperfine_gr: config.hyperfine_gr,
        };
        if flags.any() {
            warn!("coherence flags {:?} are ignored by the rate equations", flags);
        }
        if config.rf_linewidth != 0.0 {
            warn!(
                "rf_linewidth = {} MHz is ignored by the rate equations",
                config.rf_linewidth,
            );
        }
        let field = MagneticField { b_z: config.bz, b_x: config.bx };
        let basis = Eigenbasis::new(&atom, field);

        let nu_fe = basis.transition_frequency(atom.f2_upper(), config.tune_fe);
        let nu_ge = basis.transition_frequency(atom.f2_lower(), config.tune_ge);
        debug!("laser fe:");
        let laser_fe = Laser::from_parameters(&config.laser_fe, nu_fe, atom.tau)?;
        debug!("laser ge:");
        let laser_ge = Laser::from_parameters(&config.laser_ge, nu_ge, atom.tau)?;

        let state
            = initial_populations(
                &basis, config.initial_population, config.population_tilt);
        let dim = basis.bounds().len();
        let model = RateEquations::new(
            basis,
            laser_fe,
            laser_ge,
            config.linewidth_model,
            config.verbosity,
        );
        let tmax = config.tmax * NS;
        let tstep = config.tstep * NS;
        let defaults = Tolerances::for_integrator(config.integrator);
        let tol = Tolerances { h_init: defaults.h_init.min(tstep), ..defaults };
        let offtimes
            = [LaserId::Fe, LaserId::Ge].into_iter()
            .filter_map(|id| config.laser(id).offtime_s().map(|t| (id, t)))
            .collect();
        info!(
            "{} J' = {}/2: {} levels ({} G, {} F, {} E), B_z = {} G",
            isotope, atom.je2, dim, atom.num_g, atom.num_f, atom.num_e, config.bz,
        );
        Ok(Self {
            model,
            stepper: Stepper::new(config.integrator, dim, tol),
            state,
            time: 0.0,
            tmax,
            tstep,
            offtimes,
            verbosity: config.verbosity,
        })
    }

    /// Get a reference to the underlying model.
    pub fn model(&self) -> &RateEquations { &self.model }

    /// Get a reference to the current state.
    pub fn state(&self) -> &DensityMatrix { &self.state }

    /// Current time [s].
    pub fn time(&self) -> f64 { self.time }

    /// Change the field along the laser axis [G].
    pub fn set_magnetic_field(&mut self, b_z: f64) {
        self.model.change_magnetic_field(b_z);
    }

    /// Switch off every laser whose off-time has been reached.
    fn switch_off_due(&mut self) -> Result<(), OpError> {
        let now = self.time;
        let (due, pending): (Vec<_>, Vec<_>)
            = std::mem::take(&mut self.offtimes).into_iter()
            .partition(|(_, t)| *t <= now);
        self.offtimes = pending;
        for (id, _) in due {
            self.model.switch_off_laser(id)?;
        }
        Ok(())
    }

    fn sample(&self) -> Sample {
        let bounds = self.model.basis().bounds();
        let y = pack(&self.state, bounds);
        let g = y.slice(nd::s![bounds.g.clone()]).to_vec();
        let f = y.slice(nd::s![bounds.f.clone()]).to_vec();
        let e = y.slice(nd::s![bounds.e.clone()]).to_vec();
        let ground: f64 = g.iter().chain(&f).sum();
        let (polarization, alignment)
            = if ground > 0.0 {
                self.model.basis().manifold(Manifold::F)
                    .zip(&f)
                    .fold((0.0, 0.0), |(pol, ali), ((level, _), p)| {
                        let ff = level.spin.j();
                        let m = level.spin.m();
                        (
                            pol + p * m / ff,
                            ali + p * (3.0 * m * m - ff * (ff + 1.0))
                                / (ff * (2.0 * ff - 1.0)),
                        )
                    })
            } else {
                (0.0, 0.0)
            };
        Sample {
            time: self.time / NS,
            g,
            f,
            e,
            polarization: polarization / ground.max(f64::MIN_POSITIVE),
            alignment: alignment / ground.max(f64::MIN_POSITIVE),
        }
    }

    // integrate from the current time to `t1` with no laser events in
    // between
    fn integrate_to(&mut self, t1: f64) -> Result<(), OpError> {
        self.state = evolve_physical(
            &mut self.stepper,
            &self.model.context(),
            &self.state,
            self.model.basis().bounds(),
            self.time,
            t1,
        )?;
        self.time = t1;
        Ok(())
    }

    /// Advance to `t1` [s], switching lasers off at their off-times along
    /// the way.
    pub fn advance(&mut self, t1: f64) -> Result<(), OpError> {
        while self.time < t1 {
            self.switch_off_due()?;
            let t_end
                = self.offtimes.iter()
                .map(|(_, t)| *t)
                .filter(|t| *t > self.time && *t < t1)
                .fold(t1, f64::min);
            self.integrate_to(t_end)?;
        }
        self.switch_off_due()?;
        Ok(())
    }

    /// Run from the current time to the configured end time, recording a
    /// sample every `tstep`.
    pub fn run(&mut self) -> Result<Trajectory, OpError> {
        let nsteps = ((self.tmax - self.time) / self.tstep - 1e-9).ceil().max(0.0) as usize;
        let t_start = self.time;
        let mut samples: Vec<Sample> = Vec::with_capacity(nsteps + 1);
        self.switch_off_due()?;
        samples.push(self.sample());
        for k in 1..=nsteps {
            let t1 = (t_start + k as f64 * self.tstep).min(self.tmax);
            self.advance(t1)?;
            let sample = self.sample();
            if self.verbosity >= 2 {
                debug!(
                    "t = {:.3} ns: trace = {:.9}, P = {:.6}, T = {:.6}",
                    sample.time, self.state.trace(),
                    sample.polarization, sample.alignment,
                );
            }
            samples.push(sample);
        }
        info!(
            "finished at t = {:.3} ns after {} samples",
            self.time / NS, samples.len(),
        );
        Ok(collect_trajectory(&samples))
    }
}

// step bound for the next attempt after a non-physical one: half of the
// smaller of the last bound and the step the stepper had settled on
fn retry_step_bound(h_max: f64, step: f64) -> f64 { h_max.min(step) / 2.0 }

// evolve `state` from `t0` to `t1`, retrying with smaller steps while the
// result is non-physical; `stepper` only advances on success
fn evolve_physical<S>(
    stepper: &mut Stepper,
    sys: &S,
    state: &DensityMatrix,
    bounds: &ManifoldBounds,
    t0: f64,
    t1: f64,
) -> Result<DensityMatrix, OpError>
where S: OdeSystem + ?Sized
{
    let y0 = pack(state, bounds).to_vec();
    let mut h_max = t1 - t0;
    for retry in 0..=MAX_RETRIES {
        let mut trial = stepper.clone();
        let mut y = y0.clone();
        trial.evolve(sys, t0, t1, &mut y, h_max)?;
        y.iter_mut()
            .for_each(|p| {
                if (-ROUND_OFF..0.0).contains(p) { *p = 0.0; }
                else if *p > 1.0 && *p <= 1.0 + ROUND_OFF { *p = 1.0; }
            });
        let mut delta = unpack(&y, bounds);
        let mut minus = unpack(&y0, bounds);
        minus.mul(-1.0);
        delta.add(&minus);
        if state.okay_to_add(&delta) {
            let mut next = state.clone();
            next.add(&delta);
            *stepper = trial;
            return Ok(next);
        }
        if retry < MAX_RETRIES {
            h_max = retry_step_bound(h_max, trial.step_size());
            warn!(
                "non-physical step at t = {:.3} ns; retrying with h <= {:.3e} ns",
                t1 / NS, h_max / NS,
            );
        }
    }
    Err(OpError::NonPhysical { time: t1 / NS, retries: MAX_RETRIES })
}

fn stack<F>(samples: &[Sample], get: F) -> nd::Array2<f64>
where F: Fn(&Sample) -> &[f64]
{
    let cols = samples.first().map(|s| get(s).len()).unwrap_or(0);
    nd::Array2::from_shape_fn((samples.len(), cols), |(i, j)| get(&samples[i])[j])
}

fn collect_trajectory(samples: &[Sample]) -> Trajectory {
    Trajectory {
        time: samples.iter().map(|s| s.time).collect(),
        pop_g: stack(samples, |s| &s.g),
        pop_f: stack(samples, |s| &s.f),
        pop_e: stack(samples, |s| &s.e),
        polarization: samples.iter().map(|s| s.polarization).collect(),
        alignment: samples.iter().map(|s| s.alignment).collect(),
    }
}
