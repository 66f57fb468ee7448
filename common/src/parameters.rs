use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    constants::*,
    error::{CommonError, InvalidCosmologyError},
};

pub const DEFAULT_GROWTH_RTOL: f64 = 1e-5;
pub const DEFAULT_GROWTH_ATOL: f64 = 1e-10;
pub const DEFAULT_GROWTH_MAX_STEPS: u64 = 100_000;

/// Neutrino mass(es) in eV. Either a single species or an ordered list of species.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum NeutrinoMasses {
    Single(f64),
    Species(Vec<f64>),
}

impl NeutrinoMasses {
    pub fn as_slice(&self) -> &[f64] {
        match self {
            NeutrinoMasses::Single(m) => std::slice::from_ref(m),
            NeutrinoMasses::Species(masses) => masses,
        }
    }

    /// Sum of all species masses
    pub fn total(&self) -> f64 {
        self.as_slice().iter().sum()
    }

    pub fn is_massless(&self) -> bool {
        self.as_slice().iter().all(|&m| m == 0.0)
    }
}

impl Default for NeutrinoMasses {
    fn default() -> Self {
        NeutrinoMasses::Single(0.0)
    }
}

impl From<f64> for NeutrinoMasses {
    fn from(m: f64) -> Self {
        NeutrinoMasses::Single(m)
    }
}

impl From<Vec<f64>> for NeutrinoMasses {
    fn from(masses: Vec<f64>) -> Self {
        NeutrinoMasses::Species(masses)
    }
}

impl From<&[f64]> for NeutrinoMasses {
    fn from(masses: &[f64]) -> Self {
        NeutrinoMasses::Species(masses.to_vec())
    }
}

/// An immutable set of cosmological parameters. Every constructor validates,
/// so a value of this type always has finite entries, h > 0 and non-negative
/// densities and masses. The flatness closure is checked when a background
/// model is built from it since it needs the neutrino integral.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawCosmologicalParameters")]
pub struct CosmologicalParameters {
    /// ln(10^10 A_s)
    #[serde(rename = "ln10As")]
    ln10_as: f64,

    /// Scalar spectral index
    ns: f64,

    /// Hubble constant now (little h)
    h: f64,

    /// Physical baryon density omega_b = Omega_b h^2
    omega_b: f64,

    /// Physical cold dark matter density omega_c = Omega_c h^2
    omega_c: f64,

    /// Neutrino mass(es) in eV
    m_nu: NeutrinoMasses,

    /// CPL equation of state today
    w0: f64,

    /// CPL equation of state slope, w(a) = w0 + wa (1 - a)
    wa: f64,
}

#[derive(Deserialize)]
struct RawCosmologicalParameters {
    #[serde(rename = "ln10As")]
    ln10_as: f64,
    ns: f64,
    h: f64,
    omega_b: f64,
    omega_c: f64,
    #[serde(default)]
    m_nu: NeutrinoMasses,
    #[serde(default = "default_w0")]
    w0: f64,
    #[serde(default)]
    wa: f64,
}

fn default_w0() -> f64 {
    -1.0
}

impl TryFrom<RawCosmologicalParameters> for CosmologicalParameters {
    type Error = InvalidCosmologyError;

    fn try_from(raw: RawCosmologicalParameters) -> Result<Self, Self::Error> {
        CosmologicalParameters::new(raw.ln10_as, raw.ns, raw.h, raw.omega_b, raw.omega_c)?
            .with_neutrino_masses(raw.m_nu)?
            .with_dark_energy(raw.w0, raw.wa)
    }
}

impl CosmologicalParameters {
    /// Massless neutrinos and a cosmological constant (w0 = -1, wa = 0).
    pub fn new(
        ln10_as: f64,
        ns: f64,
        h: f64,
        omega_b: f64,
        omega_c: f64,
    ) -> Result<Self, InvalidCosmologyError> {
        let params = CosmologicalParameters {
            ln10_as,
            ns,
            h,
            omega_b,
            omega_c,
            m_nu: NeutrinoMasses::default(),
            w0: -1.0,
            wa: 0.0,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn with_neutrino_masses(
        self,
        m_nu: impl Into<NeutrinoMasses>,
    ) -> Result<Self, InvalidCosmologyError> {
        let params = CosmologicalParameters {
            m_nu: m_nu.into(),
            ..self
        };
        params.validate()?;
        Ok(params)
    }

    pub fn with_dark_energy(self, w0: f64, wa: f64) -> Result<Self, InvalidCosmologyError> {
        let params = CosmologicalParameters { w0, wa, ..self };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), InvalidCosmologyError> {
        for (name, value) in [
            ("ln10As", self.ln10_as),
            ("ns", self.ns),
            ("h", self.h),
            ("omega_b", self.omega_b),
            ("omega_c", self.omega_c),
            ("w0", self.w0),
            ("wa", self.wa),
        ] {
            if !value.is_finite() {
                return Err(InvalidCosmologyError::NonFinite { name, value });
            }
        }

        if self.h <= 0.0 {
            return Err(InvalidCosmologyError::NonPositiveHubble { h: self.h });
        }

        for (name, value) in [("omega_b", self.omega_b), ("omega_c", self.omega_c)] {
            if value < 0.0 {
                return Err(InvalidCosmologyError::NegativeDensity { name, value });
            }
        }

        for (index, &mass) in self.m_nu.as_slice().iter().enumerate() {
            if !mass.is_finite() {
                return Err(InvalidCosmologyError::NonFinite {
                    name: "m_nu",
                    value: mass,
                });
            }
            if mass < 0.0 {
                return Err(InvalidCosmologyError::NegativeNeutrinoMass { index, mass });
            }
        }

        Ok(())
    }

    pub fn ln10_as(&self) -> f64 {
        self.ln10_as
    }

    pub fn ns(&self) -> f64 {
        self.ns
    }

    pub fn h(&self) -> f64 {
        self.h
    }

    pub fn omega_b(&self) -> f64 {
        self.omega_b
    }

    pub fn omega_c(&self) -> f64 {
        self.omega_c
    }

    pub fn neutrino_masses(&self) -> &NeutrinoMasses {
        &self.m_nu
    }

    pub fn w0(&self) -> f64 {
        self.w0
    }

    pub fn wa(&self) -> f64 {
        self.wa
    }

    /// Omega_cb0 = (omega_b + omega_c) / h^2
    pub fn omega_cb0(&self) -> f64 {
        (self.omega_b + self.omega_c) / (self.h * self.h)
    }

    /// Omega_gamma0 = 2.469e-5 / h^2
    pub fn omega_gamma0(&self) -> f64 {
        OMEGA_GAMMA_H2 / (self.h * self.h)
    }
}

/// Tolerances and step budget of the growth integrator. Deserialized from the
/// optional `[growth]` table of a run file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GrowthSettings {
    /// Relative tolerance. Default value of [`DEFAULT_GROWTH_RTOL`].
    #[serde(default = "default_rtol")]
    pub rtol: f64,

    /// Absolute tolerance. Default value of [`DEFAULT_GROWTH_ATOL`].
    #[serde(default = "default_atol")]
    pub atol: f64,

    /// Maximum number of attempted steps. Default value of [`DEFAULT_GROWTH_MAX_STEPS`].
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

fn default_rtol() -> f64 {
    DEFAULT_GROWTH_RTOL
}

fn default_atol() -> f64 {
    DEFAULT_GROWTH_ATOL
}

fn default_max_steps() -> u64 {
    DEFAULT_GROWTH_MAX_STEPS
}

impl Default for GrowthSettings {
    fn default() -> Self {
        GrowthSettings {
            rtol: DEFAULT_GROWTH_RTOL,
            atol: DEFAULT_GROWTH_ATOL,
            max_steps: DEFAULT_GROWTH_MAX_STEPS,
        }
    }
}

impl GrowthSettings {
    pub fn validate(&self) -> Result<(), CommonError> {
        if !(self.rtol > 0.0 && self.rtol.is_finite()) {
            return Err(CommonError::GrowthSettingsError {
                msg: format!("rtol must be positive and finite, got {}", self.rtol),
            });
        }
        if !(self.atol >= 0.0 && self.atol.is_finite()) {
            return Err(CommonError::GrowthSettingsError {
                msg: format!("atol must be non-negative and finite, got {}", self.atol),
            });
        }
        if self.max_steps == 0 {
            return Err(CommonError::GrowthSettingsError {
                msg: "max_steps must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Contents of a run file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunParameters {
    /// Cosmological Parameters
    pub cosmology: CosmologicalParameters,

    /// Redshifts at which everything is evaluated
    #[serde(deserialize_with = "deserialize_redshifts")]
    pub redshifts: Vec<f64>,

    /// Redshift of the baryon drag epoch. Default value of [`DEFAULT_Z_DRAG`].
    pub z_drag: Option<f64>,

    /// Growth solver settings
    pub growth: Option<GrowthSettings>,
}

impl RunParameters {
    pub fn z_drag(&self) -> f64 {
        self.z_drag.unwrap_or(DEFAULT_Z_DRAG)
    }

    pub fn growth_settings(&self) -> GrowthSettings {
        self.growth.unwrap_or_default()
    }
}

/// This function reads toml files
pub fn read_toml(path: &str) -> Result<RunParameters, CommonError> {
    // Read toml config file
    let toml_contents: &str =
        &std::fs::read_to_string(path).map_err(|_| CommonError::TomlReadError {
            path: path.to_string(),
        })?;

    parse_toml(toml_contents)
}

/// Parses the contents of a run file
pub fn parse_toml(toml_contents: &str) -> Result<RunParameters, CommonError> {
    let run: RunParameters = toml::from_str(toml_contents).map_err(|e| {
        CommonError::TomlParseError {
            msg: format!("{e}"),
        }
    })?;
    if let Some(settings) = run.growth {
        settings.validate()?;
    }
    Ok(run)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RedshiftInput {
    List(Vec<f64>),
    Text(String),
}

fn deserialize_redshifts<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match RedshiftInput::deserialize(deserializer)? {
        RedshiftInput::List(redshifts) => Ok(redshifts),
        RedshiftInput::Text(text) => parse_redshifts(&text).map_err(serde::de::Error::custom),
    }
}

/// Parses `"start to end by step"` (inclusive) or a comma separated list such as `"[0, 0.5, 1]"`.
///
/// NOTE: this compiles the regexes internally; it is meant for run files, not hot loops.
pub fn parse_redshifts(s: &str) -> Result<Vec<f64>, CommonError> {
    const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";
    let range = Regex::new(&format!(
        r"^\s*({NUMBER})\s+to\s+({NUMBER})\s+by\s+({NUMBER})\s*$"
    ))
    .expect("static regex");
    let number = Regex::new(NUMBER).expect("static regex");
    let list = Regex::new(&format!(
        r"^\s*\[?\s*{NUMBER}(?:\s*,\s*{NUMBER})*\s*,?\s*\]?\s*$"
    ))
    .expect("static regex");

    let error = |msg: &str| CommonError::RedshiftParseError {
        input: s.to_string(),
        msg: msg.to_string(),
    };
    let parse = |text: &str| text.parse::<f64>().map_err(|e| error(&e.to_string()));

    match s {
        // Inclusive range (a to b by step)
        _ if range.is_match(s) => {
            let captures = range.captures(s).ok_or_else(|| error("malformed range"))?;
            let start = parse(&captures[1])?;
            let end = parse(&captures[2])?;
            let step = parse(&captures[3])?;
            if !(step > 0.0) || end < start {
                return Err(error("range needs step > 0 and end >= start"));
            }

            // Number of whole steps, tolerant to round-off in (end - start) / step
            let n = ((end - start) / step + 1e-9).floor() as usize;
            Ok((0..=n).map(|i| start + i as f64 * step).collect())
        }

        // Comma separated numbers
        _ if list.is_match(s) => number
            .find_iter(s)
            .map(|m| parse(m.as_str()))
            .collect(),

        _ => Err(error(
            "redshifts did not match expected patterns: start to end by step, [z1, z2, z3]",
        )),
    }
}

#[test]
fn test_regex_range() {
    let redshifts = parse_redshifts("0 to 2 by 0.5").unwrap();
    assert_eq!(redshifts, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
}

#[test]
fn test_regex_range_roundoff() {
    let redshifts = parse_redshifts("0.0 to 0.3 by 0.1").unwrap();
    assert_eq!(redshifts.len(), 4);
    assert!((redshifts[3] - 0.3).abs() < 1e-12);
}

#[test]
fn test_regex_comma_separated() {
    let redshifts = parse_redshifts("[0, 0.5, 1e1]").unwrap();
    assert_eq!(redshifts, vec![0.0, 0.5, 10.0]);

    let redshifts = parse_redshifts("3, 1.25").unwrap();
    assert_eq!(redshifts, vec![3.0, 1.25]);
}

#[test]
fn test_regex_rejects_garbage() {
    assert!(parse_redshifts("zero to one").is_err());
    assert!(parse_redshifts("1 to 0 by 0.1").is_err());
    assert!(parse_redshifts("0 to 1 by 0").is_err());
}

#[test]
fn test_parameters_defaults_and_derived() {
    let params = CosmologicalParameters::new(3.0, 0.96, 0.6736, 0.02237, 0.1200).unwrap();
    assert_eq!(params.w0(), -1.0);
    assert_eq!(params.wa(), 0.0);
    assert!(params.neutrino_masses().is_massless());
    assert!((params.omega_cb0() - 0.313860).abs() < 1e-5);
}

#[test]
fn test_parameters_validation() {
    let base = CosmologicalParameters::new(3.0, 0.96, 0.7, 0.022, 0.12).unwrap();

    assert_eq!(
        CosmologicalParameters::new(3.0, 0.96, 0.0, 0.022, 0.12),
        Err(InvalidCosmologyError::NonPositiveHubble { h: 0.0 })
    );
    assert!(matches!(
        CosmologicalParameters::new(3.0, 0.96, 0.7, -0.022, 0.12),
        Err(InvalidCosmologyError::NegativeDensity { name: "omega_b", .. })
    ));
    assert!(matches!(
        base.clone().with_neutrino_masses(vec![0.06, -0.01]),
        Err(InvalidCosmologyError::NegativeNeutrinoMass { index: 1, .. })
    ));
    assert!(matches!(
        base.with_dark_energy(f64::NAN, 0.0),
        Err(InvalidCosmologyError::NonFinite { name: "w0", .. })
    ));
}

#[test]
fn test_parse_run_toml() {
    let contents = r#"
        redshifts = "0 to 1 by 0.25"
        z_drag = 1059.9

        [cosmology]
        ln10As = 3.044
        ns = 0.9649
        h = 0.6736
        omega_b = 0.02237
        omega_c = 0.1200
        m_nu = [0.0, 0.0, 0.06]
        w0 = -0.9
        wa = 0.1

        [growth]
        rtol = 1e-6
    "#;
    let run = parse_toml(contents).unwrap();
    assert_eq!(run.redshifts.len(), 5);
    assert_eq!(run.cosmology.neutrino_masses().as_slice(), &[0.0, 0.0, 0.06]);
    assert_eq!(run.cosmology.w0(), -0.9);
    assert_eq!(run.z_drag(), 1059.9);

    let settings = run.growth_settings();
    assert_eq!(settings.rtol, 1e-6);
    assert_eq!(settings.atol, DEFAULT_GROWTH_ATOL);
    assert_eq!(settings.max_steps, DEFAULT_GROWTH_MAX_STEPS);
}

#[test]
fn test_parse_run_toml_defaults_and_validation() {
    let contents = r#"
        redshifts = [0.0, 2.0]

        [cosmology]
        ln10As = 3.0
        ns = 0.96
        h = 0.7
        omega_b = 0.022
        omega_c = 0.12
        m_nu = 0.06
    "#;
    let run = parse_toml(contents).unwrap();
    assert_eq!(run.cosmology.neutrino_masses(), &NeutrinoMasses::Single(0.06));
    assert_eq!(run.cosmology.w0(), -1.0);
    assert_eq!(run.z_drag(), DEFAULT_Z_DRAG);
    assert_eq!(run.growth_settings(), GrowthSettings::default());

    let invalid = contents.replace("h = 0.7", "h = -0.7");
    assert!(matches!(
        parse_toml(&invalid),
        Err(CommonError::TomlParseError { .. })
    ));
}
