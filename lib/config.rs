//! Run configuration, read from a TOML file.
//!
//! Lab units throughout: intensities in mW/cm², frequencies in MHz, times in
//! ns and fields in G. Conversion to SI happens when the simulation is
//! built.

use std::{ fs, path::{ Path, PathBuf } };
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use crate::{
    atom::Isotope,
    integrate::IntegratorKind,
    laser::{ LaserId, LaserParameters },
    pumping::LinewidthModel,
    spin::coupled_totals,
};

/// Returned when a configuration cannot be read or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("unknown isotope '{0}'")]
    UnknownIsotope(String),

    #[error("unsupported method '{0}': only the rate equations are implemented")]
    UnsupportedMethod(String),
}

fn invalid<F, R>(field: F, reason: R) -> ConfigError
where
    F: Into<String>,
    R: Into<String>,
{
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

/// Evolution model.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Rate equations.
    #[default]
    Rate,
    /// Optical Bloch equations.
    Obe,
}

impl Method {
    fn name(self) -> &'static str {
        match self {
            Self::Rate => "rate",
            Self::Obe => "obe",
        }
    }
}

/// How the ground state populations are initialized.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialPopulation {
    /// Equal over every ground sublevel.
    #[default]
    Uniform,
    /// Weighted by `1 + tilt * m_F / F`.
    Tilted,
}

fn default_je2() -> u32 { 1 }
fn default_tune() -> u32 { 4 }
fn default_verbosity() -> u8 { 1 }
fn default_out_file() -> PathBuf { PathBuf::from("output/optical_pumping.npz") }

/// Complete description of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpConfig {
    pub isotope: String,
    #[serde(default)]
    pub method: Method,
    /// Doubled excited state `J`: 1 for D1, 3 for D2.
    #[serde(default = "default_je2")]
    pub je2: u32,
    /// Doubled `F'` of the excited level the fe laser is tuned to.
    #[serde(default = "default_tune")]
    pub tune_fe: u32,
    /// Doubled `F'` of the excited level the ge laser is tuned to.
    #[serde(default = "default_tune")]
    pub tune_ge: u32,
    /// Total evolution time [ns].
    pub tmax: f64,
    /// Output spacing [ns].
    pub tstep: f64,
    #[serde(default)]
    pub zeeman: bool,
    #[serde(default)]
    pub hyperfine_gr: bool,
    #[serde(default)]
    pub hyperfine_ex: bool,
    /// Transverse field [G].
    #[serde(default)]
    pub bx: f64,
    /// Field along the laser axis [G].
    #[serde(default)]
    pub bz: f64,
    #[serde(default)]
    pub population_tilt: f64,
    #[serde(default)]
    pub initial_population: InitialPopulation,
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,
    /// Linewidth of an RF drive between ground sublevels, FWHM [MHz]. Read
    /// and checked but not used by the rate equations.
    #[serde(default)]
    pub rf_linewidth: f64,
    #[serde(default)]
    pub linewidth_model: LinewidthModel,
    #[serde(default)]
    pub integrator: IntegratorKind,
    #[serde(default = "default_out_file")]
    pub out_file: PathBuf,
    pub laser_fe: LaserParameters,
    pub laser_ge: LaserParameters,
}

impl OpConfig {
    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a configuration file.
    pub fn load<P>(path: P) -> Result<Self, ConfigError>
    where P: AsRef<Path>
    {
        let path = path.as_ref();
        let text
            = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Render the configuration back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Parsed isotope.
    pub fn isotope(&self) -> Result<Isotope, ConfigError> {
        self.isotope.parse()
            .map_err(|_| ConfigError::UnknownIsotope(self.isotope.clone()))
    }

    /// Configured values for one laser.
    pub fn laser(&self, which: LaserId) -> &LaserParameters {
        match which {
            LaserId::Fe => &self.laser_fe,
            LaserId::Ge => &self.laser_ge,
        }
    }

    /// Doubled `F'` a laser is tuned to.
    pub fn tune(&self, which: LaserId) -> u32 {
        match which {
            LaserId::Fe => self.tune_fe,
            LaserId::Ge => self.tune_ge,
        }
    }

    /// Check every value, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let isotope = self.isotope()?;
        if self.method != Method::Rate {
            return Err(ConfigError::UnsupportedMethod(self.method.name().into()));
        }
        if !(self.tmax > 0.0) {
            return Err(invalid("tmax", format!("must be positive, got {}", self.tmax)));
        }
        if !(self.tstep > 0.0 && self.tstep <= self.tmax) {
            return Err(invalid(
                "tstep", format!("must be in (0, tmax], got {}", self.tstep)));
        }
        if self.je2 != 1 && self.je2 != 3 {
            return Err(invalid(
                "je2", format!("must be 1 (D1) or 3 (D2), got {}", self.je2)));
        }
        if self.verbosity > 3 {
            return Err(invalid(
                "verbosity", format!("must be at most 3, got {}", self.verbosity)));
        }
        if !(self.rf_linewidth >= 0.0 && self.rf_linewidth.is_finite()) {
            return Err(invalid(
                "rf_linewidth",
                format!("must be non-negative, got {}", self.rf_linewidth),
            ));
        }
        if !self.population_tilt.is_finite() {
            return Err(invalid("population_tilt", "must be finite"));
        }
        for which in [LaserId::Fe, LaserId::Ge] {
            let tune = self.tune(which);
            if !coupled_totals(isotope.i2(), self.je2).any(|f2| f2 == tune) {
                return Err(invalid(
                    format!("tune_{}", which),
                    format!("no excited level with 2F' = {} for {}", tune, isotope),
                ));
            }
            let params = self.laser(which);
            let table = format!("laser_{}", which);
            if !(params.power >= 0.0) {
                return Err(invalid(
                    format!("{}.power", table),
                    format!("must be non-negative, got {}", params.power),
                ));
            }
            if !(params.linewidth >= 0.0) {
                return Err(invalid(
                    format!("{}.linewidth", table),
                    format!("must be non-negative, got {}", params.linewidth),
                ));
            }
            if !(params.s3s0.abs() <= 1.0) {
                return Err(invalid(
                    format!("{}.s3s0", table),
                    format!("must be in [-1, 1], got {}", params.s3s0),
                ));
            }
            if !params.detune.is_finite() {
                return Err(invalid(format!("{}.detune", table), "must be finite"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        isotope = "K37"
        je2 = 1
        tune_fe = 4
        tune_ge = 4
        tmax = 500.0
        tstep = 5.0
        bz = 2.0
        initial_population = "tilted"
        population_tilt = 0.1
        linewidth_model = "quadrature"
        integrator = "implicit"

        [laser_fe]
        power = 1.0
        detune = 0.0
        linewidth = 0.2
        s3s0 = 1.0

        [laser_ge]
        power = 0.5
        detune = -2.0
        s3s0 = 1.0
        offtime = 100.0
    "#;

    #[test]
    fn parses_sample() {
        let config = OpConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.isotope().unwrap(), Isotope::K37);
        assert_eq!(config.method, Method::Rate);
        assert_eq!(config.initial_population, InitialPopulation::Tilted);
        assert_eq!(config.linewidth_model, LinewidthModel::Quadrature);
        assert_eq!(config.integrator, IntegratorKind::Implicit);
        assert_eq!(config.verbosity, 1);
        assert_eq!(config.rf_linewidth, 0.0);
        assert_eq!(config.laser_ge.linewidth, 0.0);
        assert_eq!(config.laser_fe.offtime, -1.0);
        assert_eq!(config.laser_ge.offtime_s(), Some(100e-9));
        assert!(!config.zeeman);
    }

    #[test]
    fn serialized_config_parses_back() {
        let config = OpConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(OpConfig::from_toml_str(&text).unwrap(), config);
    }

    fn with(line: &str) -> Result<OpConfig, ConfigError> {
        let (key, _) = line.split_once('=').unwrap();
        let key = key.trim();
        let text: String
            = SAMPLE.lines()
            .filter(|l| l.split_once('=').map(|(k, _)| k.trim()) != Some(key))
            .collect::<Vec<_>>()
            .join("\n");
        OpConfig::from_toml_str(&format!("{}\n{}", line, text))
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(with("tmax = -1.0"), Err(ConfigError::Invalid { .. })));
        assert!(matches!(with("tstep = 1000.0"), Err(ConfigError::Invalid { .. })));
        assert!(matches!(with("je2 = 5"), Err(ConfigError::Invalid { .. })));
        assert!(matches!(with("tune_fe = 6"), Err(ConfigError::Invalid { .. })));
        assert!(matches!(with("verbosity = 4"), Err(ConfigError::Invalid { .. })));
        assert!(matches!(with("rf_linewidth = -0.1"), Err(ConfigError::Invalid { .. })));
        assert!(matches!(with("isotope = \"Rb87\""), Err(ConfigError::UnknownIsotope(_))));
        assert!(matches!(with("method = \"obe\""), Err(ConfigError::UnsupportedMethod(_))));
        assert!(matches!(with("bogus = 1"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_bad_laser() {
        let text = SAMPLE.replacen("s3s0 = 1.0", "s3s0 = 1.5", 1);
        match OpConfig::from_toml_str(&text) {
            Err(ConfigError::Invalid { field, .. })
                => assert_eq!(field, "laser_fe.s3s0"),
            other => panic!("unexpected result {:?}", other),
        }
        let text = SAMPLE.replacen("power = 0.5", "power = -0.5", 1);
        assert!(matches!(
            OpConfig::from_toml_str(&text), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn d2_allows_more_tunings() {
        let text
            = SAMPLE
            .replacen("je2 = 1", "je2 = 3", 1)
            .replacen("tune_fe = 4", "tune_fe = 6", 1);
        let config = OpConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.tune(LaserId::Fe), 6);
    }

    #[test]
    fn rf_linewidth_is_carried() {
        let config = with("rf_linewidth = 0.05").unwrap();
        assert_eq!(config.rf_linewidth, 0.05);
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("rf_linewidth = 0.05"));
        assert_eq!(OpConfig::from_toml_str(&text).unwrap(), config);
    }
}
