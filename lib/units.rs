//! Physical constants and unit conversions.
//!
//! Everything inside the crate is SI: frequencies and linewidths in Hz (not
//! angular frequency), times in seconds, intensities in W/m², fields in Gauss
//! only at the configuration boundary.

// fundamental constants [SI]
pub const PLANCK_H: f64 = 6.626_070_15e-34; // J s
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0; // m / s
pub const EPSILON_0: f64 = 8.854_187_8128e-12; // F / m

// Bohr magneton [MHz / G]
pub const MU_B: f64 = 1.3996245168425658;

// electronic g-factors [dimensionless]
pub const G_J_2S12: f64 = 2.002_294_21;
pub const G_J_2P12: f64 = 2.0 / 3.0;
pub const G_J_2P32: f64 = 4.0 / 3.0;

// conversions to SI
pub const MHZ: f64 = 1e6;
pub const THZ: f64 = 1e12;
pub const NS: f64 = 1e-9;
pub const MW_PER_CM2: f64 = 1e-3 / 1e-4; // W / m^2

/// Convert an intensity in W/m² to mW/cm², for reporting.
pub fn to_mw_per_cm2(intensity: f64) -> f64 { intensity / MW_PER_CM2 }

/// Zeeman shift in Hz of a state with Landé factor `g` and doubled projection
/// `m2` in a field of `B` Gauss.
pub fn zeeman_shift(g: f64, m2: i32, B: f64) -> f64 {
    MU_B * MHZ * g * f64::from(m2) / 2.0 * B
}
