//! Derived physical state of a single pumping laser.
//!
//! Polarization is handled in the circular basis along the propagation
//! direction, which is also the quantization axis. Index `q` of the
//! `intensity` and `field` arrays corresponds to photon angular momentum
//! projection `q - 1`; `q = 1` (π light) is never populated by the laser
//! itself but exists so that couplings can be indexed uniformly with
//! spontaneous decay.

use std::{ f64::consts::PI, fmt };
use log::debug;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use crate::units::{
    EPSILON_0,
    MHZ,
    MW_PER_CM2,
    NS,
    PLANCK_H,
    SPEED_OF_LIGHT,
    to_mw_per_cm2,
};

/// Polarization channel index of σ⁻ light.
pub const SIGMA_MINUS: usize = 0;
/// Polarization channel index of π light.
pub const PI_LIGHT: usize = 1;
/// Polarization channel index of σ⁺ light.
pub const SIGMA_PLUS: usize = 2;

/// Returned when a requested polarization state is unphysical.
#[derive(Debug, Error, PartialEq)]
pub enum LaserError {
    #[error("Stokes vectors not possible: S0 = {0:e} < 0")]
    NegativeStokes(f64),

    #[error("electric field not possible: radicand {radicand:e} < 0 in channel {channel}")]
    NegativeField { channel: usize, radicand: f64 },
}

/// Names one of the two lasers of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LaserId {
    /// Drives the upper ground manifold F to E.
    Fe,
    /// Drives the lower ground manifold G to E.
    Ge,
}

impl fmt::Display for LaserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fe => write!(f, "fe"),
            Self::Ge => write!(f, "ge"),
        }
    }
}

/// Configured values for one laser, in lab units.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaserParameters {
    /// Intensity [mW/cm²]. Called power for historical reasons.
    pub power: f64,
    /// Detuning from the tuned transition [MHz].
    pub detune: f64,
    /// Laser linewidth, FWHM [MHz].
    #[serde(default)]
    pub linewidth: f64,
    /// Normalized circular polarization `S3 / S0`, in `[-1, 1]`.
    pub s3s0: f64,
    /// Time at which the laser is switched off [ns]; negative for never.
    #[serde(default = "default_offtime")]
    pub offtime: f64,
}

fn default_offtime() -> f64 { -1.0 }

impl LaserParameters {
    /// Switch-off time in seconds, if any.
    pub fn offtime_s(&self) -> Option<f64> {
        (self.offtime >= 0.0).then_some(self.offtime * NS)
    }
}

/// Laser state with all field and intensity components derived from its
/// power and Stokes parameters.
///
/// Frequencies and linewidths are in Hz, `power`, `intensity`, and
/// `saturation_intensity` in W/m², `field` in V/m, and the Stokes parameters
/// in V²/m² as in Jackson. Once built, the only change a laser admits is
/// [`Laser::switch_off`].
#[derive(Clone, Debug, PartialEq)]
pub struct Laser {
    nu: f64,
    power: f64,
    intensity: [f64; 3],
    field: [f64; 3],
    stokes: [f64; 4],
    detune: f64,
    linewidth: f64,
    saturation_intensity: f64,
}

impl Laser {
    /// Create a new laser at frequency `nu` (detuning already included) and
    /// derive its field components.
    ///
    /// `tau` is the lifetime of the driven excited state and sets the
    /// saturation intensity. S1 and S2 carry the relative phase of the two
    /// circular components, which plays no role here, and are set to zero.
    ///
    /// Fails if the power is negative or `|s3_over_s0| > 1`.
    pub fn new(
        nu: f64,
        power: f64,
        detune: f64,
        linewidth: f64,
        s3_over_s0: f64,
        tau: f64,
    ) -> Result<Self, LaserError>
    {
        let s0 = 2.0 * power / (EPSILON_0 * SPEED_OF_LIGHT);
        let mut laser = Self {
            nu,
            power,
            intensity: [0.0; 3],
            field: [0.0; 3],
            stokes: [s0, 0.0, 0.0, s0 * s3_over_s0],
            detune,
            linewidth,
            saturation_intensity: 0.0,
        };
        laser.set_saturation_intensity(tau);
        laser.set_field_components()?;
        laser.set_intensity_components()?;
        Ok(laser)
    }

    /// Create a laser from configured lab-unit values, tuned to a transition
    /// at `nu_transition` [Hz].
    pub fn from_parameters(
        params: &LaserParameters,
        nu_transition: f64,
        tau: f64,
    ) -> Result<Self, LaserError>
    {
        Self::new(
            nu_transition + params.detune * MHZ,
            params.power * MW_PER_CM2,
            params.detune * MHZ,
            params.linewidth * MHZ,
            params.s3s0,
            tau,
        )
    }

    /// Laser frequency [Hz], detuning included.
    pub fn nu(&self) -> f64 { self.nu }

    /// Total intensity [W/m²].
    pub fn power(&self) -> f64 { self.power }

    /// Intensity per polarization channel [W/m²].
    pub fn intensity(&self) -> [f64; 3] { self.intensity }

    /// Electric field amplitude per polarization channel [V/m].
    pub fn field(&self) -> [f64; 3] { self.field }

    /// Stokes parameters `[S0, S1, S2, S3]` [V²/m²].
    pub fn stokes(&self) -> [f64; 4] { self.stokes }

    /// Detuning from the tuned transition [Hz].
    pub fn detune(&self) -> f64 { self.detune }

    /// Linewidth, FWHM [Hz].
    pub fn linewidth(&self) -> f64 { self.linewidth }

    pub fn saturation_intensity(&self) -> f64 { self.saturation_intensity }

    /// Set the saturation intensity `pi h nu^3 / (3 c^2 tau)`.
    pub fn set_saturation_intensity(&mut self, tau: f64) {
        self.saturation_intensity
            = PI * PLANCK_H * self.nu.powi(3)
            / (3.0 * SPEED_OF_LIGHT.powi(2) * tau);
        debug!(
            "I_s = {:10.8e} mW/cm^2",
            to_mw_per_cm2(self.saturation_intensity),
        );
    }

    fn set_field_components(&mut self) -> Result<(), LaserError> {
        let [s0, _, _, s3] = self.stokes;
        if s0 < 0.0 { return Err(LaserError::NegativeStokes(s0)); }
        let radicands = [(s0 - s3) / 2.0, 0.0, (s0 + s3) / 2.0];
        for (q, (field, radicand))
            in self.field.iter_mut().zip(radicands).enumerate()
        {
            if radicand < 0.0 {
                return Err(
                    LaserError::NegativeField { channel: q, radicand });
            }
            *field = radicand.sqrt();
        }
        Ok(())
    }

    fn set_intensity_components(&mut self) -> Result<(), LaserError> {
        if let Some((q, &e)) = self.field.iter().enumerate().find(|(_, e)| **e < 0.0) {
            return Err(LaserError::NegativeField { channel: q, radicand: e });
        }
        self.intensity
            = self.field.map(|e| 0.5 * EPSILON_0 * SPEED_OF_LIGHT * e.powi(2));
        Ok(())
    }

    /// Extinguish the laser: zero power and Stokes parameters and re-derive
    /// everything else, keeping the saturation intensity of the same `tau`.
    pub fn switch_off(&mut self, tau: f64) -> Result<(), LaserError> {
        self.power = 0.0;
        self.set_saturation_intensity(tau);
        self.stokes = [0.0; 4];
        self.set_field_components()?;
        self.set_intensity_components()?;
        Ok(())
    }

    /// `true` if no channel carries any intensity.
    pub fn is_off(&self) -> bool { self.intensity.iter().all(|i| *i == 0.0) }

    /// Saturation parameter `I_q / I_sat` of channel `q`.
    pub fn saturation(&self, q: usize) -> f64 {
        self.intensity[q] / self.saturation_intensity
    }
}
