//! Static description of the pumped atom and the fields it sits in.

use std::{ fmt, str::FromStr };
use crate::units::{ MHZ, NS, THZ };

/// Isotopes with built-in structure constants.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Isotope {
    K37,
    K39,
    K41,
}

/// Tabulated constants for one isotope. Hyperfine `A` values are in MHz,
/// optical frequencies in THz and lifetimes in ns.
#[derive(Copy, Clone, Debug, PartialEq)]
struct IsotopeData {
    i2: u32,
    g_i: f64,
    aj_g: f64,
    aj_d1: f64,
    aj_d2: f64,
    nu_d1: f64,
    nu_d2: f64,
    tau_d1: f64,
    tau_d2: f64,
}

impl Isotope {
    fn data(self) -> IsotopeData {
        match self {
            Self::K37 => IsotopeData {
                i2: 3,
                g_i: -7.378e-5,
                aj_g: 120.1302,
                aj_d1: 14.45,
                aj_d2: 3.1,
                // K39 lines moved by the K39-K41 isotope shift scaled by
                // the nuclear mass factor; field shift neglected
                nu_d1: 389.285_798_841,
                nu_d2: 391.015_909_392,
                tau_d1: 26.72,
                tau_d2: 26.37,
            },
            Self::K39 => IsotopeData {
                i2: 3,
                g_i: -1.419_348_9e-4,
                aj_g: 230.859_860_1,
                aj_d1: 27.775,
                aj_d2: 6.093,
                nu_d1: 389.286_058_716,
                nu_d2: 391.016_170_03,
                tau_d1: 26.72,
                tau_d2: 26.37,
            },
            Self::K41 => IsotopeData {
                i2: 3,
                g_i: -7.790_600e-5,
                aj_g: 127.006_935_2,
                aj_d1: 15.245,
                aj_d2: 3.363,
                nu_d1: 389.286_294_205,
                nu_d2: 391.016_406_21,
                tau_d1: 26.72,
                tau_d2: 26.37,
            },
        }
    }

    /// Doubled nuclear spin.
    pub fn i2(self) -> u32 { self.data().i2 }
}

impl fmt::Display for Isotope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::K37 => write!(f, "K37"),
            Self::K39 => write!(f, "K39"),
            Self::K41 => write!(f, "K41"),
        }
    }
}

impl FromStr for Isotope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "K37" | "37K" => Ok(Self::K37),
            "K39" | "39K" => Ok(Self::K39),
            "K41" | "41K" => Ok(Self::K41),
            other => Err(other.to_string()),
        }
    }
}

/// Structure of the atom: angular momenta (doubled), manifold sizes and the
/// constants setting level energies and decay.
///
/// The F manifold is the upper ground hyperfine level `F = I + J`, the G
/// manifold the lower one `F = I - J`, and E holds every hyperfine level of
/// the excited `J'`. Built once per run and never mutated.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AtomParameters {
    pub isotope: Isotope,
    pub i2: u32,
    pub je2: u32,
    pub jg2: u32,
    pub num_e: usize,
    pub num_f: usize,
    pub num_g: usize,
    /// Fine-structure (hyperfine centroid) transition frequency [Hz].
    pub nu_excited: f64,
    /// Excited state lifetime [s].
    pub tau: f64,
    /// Spontaneous decay rate `1 / tau` [1/s].
    pub gamma_spon: f64,
    /// Ground state magnetic dipole hyperfine constant [Hz].
    pub aj_g: f64,
    /// Excited state magnetic dipole hyperfine constant [Hz].
    pub aj_e: f64,
    /// Nuclear g-factor in units of the Bohr magneton.
    pub g_i: f64,
    /// Natural linewidth (FWHM) `1 / (2 pi tau)` [Hz].
    pub linewidth: f64,
}

impl AtomParameters {
    /// Assemble the parameters for an isotope driven on the D1 (`je2 = 1`)
    /// or D2 (`je2 = 3`) line.
    ///
    /// Returns `None` for any other `je2`.
    pub fn new(isotope: Isotope, je2: u32) -> Option<Self> {
        let data = isotope.data();
        let (aj_e, nu, tau)
            = match je2 {
                1 => (data.aj_d1, data.nu_d1, data.tau_d1),
                3 => (data.aj_d2, data.nu_d2, data.tau_d2),
                _ => { return None; },
            };
        let jg2: u32 = 1;
        let i2 = data.i2;
        let num_f = (i2 + jg2 + 1) as usize;
        let num_g = (i2.abs_diff(jg2) + 1) as usize;
        let num_e
            = crate::spin::coupled_totals(i2, je2)
            .map(|f2| (f2 + 1) as usize)
            .sum();
        let tau = tau * NS;
        Some(Self {
            isotope,
            i2,
            je2,
            jg2,
            num_e,
            num_f,
            num_g,
            nu_excited: nu * THZ,
            tau,
            gamma_spon: tau.recip(),
            aj_g: data.aj_g * MHZ,
            aj_e: aj_e * MHZ,
            g_i: data.g_i,
            linewidth: (std::f64::consts::TAU * tau).recip(),
        })
    }

    /// Doubled total angular momentum of the F ground manifold.
    pub fn f2_upper(&self) -> u32 { self.i2 + self.jg2 }

    /// Doubled total angular momentum of the G ground manifold.
    pub fn f2_lower(&self) -> u32 { self.i2.abs_diff(self.jg2) }

    /// Total number of sublevels across all three manifolds.
    pub fn num_levels(&self) -> usize { self.num_e + self.num_f + self.num_g }
}

/// Static magnetic field [G]. `b_z` lies along the laser propagation axis.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MagneticField {
    pub b_z: f64,
    pub b_x: f64,
}

/// Which coherences a coherent (optical Bloch) treatment would track. The
/// rate equations only evolve populations and carry these along unused.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CoherenceFlags {
    pub zeeman: bool,
    pub hyperfine_ex: bool,
    pub hyperfine_gr: bool,
}

impl CoherenceFlags {
    /// `true` if any coherence is requested.
    pub fn any(&self) -> bool {
        self.zeeman || self.hyperfine_ex || self.hyperfine_gr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn potassium_d1_manifolds() {
        let atom = AtomParameters::new(Isotope::K37, 1).unwrap();
        assert_eq!(atom.num_f, 5);
        assert_eq!(atom.num_g, 3);
        assert_eq!(atom.num_e, 8);
        assert_eq!(atom.f2_upper(), 4);
        assert_eq!(atom.f2_lower(), 2);
        assert_relative_eq!(atom.gamma_spon * atom.tau, 1.0);
    }

    #[test]
    fn potassium_d2_manifolds() {
        let atom = AtomParameters::new(Isotope::K39, 3).unwrap();
        assert_eq!(atom.num_e, 16);
        assert_eq!(atom.num_levels(), 24);
        assert!(AtomParameters::new(Isotope::K39, 5).is_none());
    }

    #[test]
    fn linewidth_from_lifetime() {
        let atom = AtomParameters::new(Isotope::K41, 1).unwrap();
        // ~5.96 MHz for potassium D1
        assert_relative_eq!(atom.linewidth / 1e6, 5.956, max_relative = 1e-3);
    }

    #[test]
    fn isotope_names() {
        assert_eq!("k37".parse::<Isotope>(), Ok(Isotope::K37));
        assert_eq!("41K".parse::<Isotope>(), Ok(Isotope::K41));
        assert!("Rb87".parse::<Isotope>().is_err());
        assert_eq!(Isotope::K39.to_string(), "K39");
    }

    #[test]
    fn isotope_shifted_lines() {
        let nu = |iso, je2| AtomParameters::new(iso, je2).unwrap().nu_excited;
        for je2 in [1, 3] {
            let shift_37 = nu(Isotope::K37, je2) - nu(Isotope::K39, je2);
            let shift_41 = nu(Isotope::K41, je2) - nu(Isotope::K39, je2);
            // lighter isotope sits below K39, by slightly more than K41 sits above
            assert!(shift_37 < 0.0 && shift_41 > 0.0);
            assert_relative_eq!(-shift_37 / shift_41, 1.1036, max_relative = 1e-3);
        }
    }
}
