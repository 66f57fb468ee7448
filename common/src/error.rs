use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Unable to load toml: {path}")]
    TomlReadError { path: String },

    #[error("Unable to parse toml: {msg}")]
    TomlParseError { msg: String },

    #[error("Unable to parse redshifts from {input:?}: {msg}")]
    RedshiftParseError { input: String, msg: String },

    #[error("Invalid growth settings: {msg}")]
    GrowthSettingsError { msg: String },

    #[error("Invalid cosmology: {err}")]
    InvalidCosmology {
        #[from]
        err: InvalidCosmologyError,
    },
}

/// Parameter sets that cannot describe a physical flat universe.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidCosmologyError {
    #[error("Parameter {name} must be finite (got {value})")]
    NonFinite { name: &'static str, value: f64 },

    #[error("The reduced Hubble parameter must be positive (got h = {h})")]
    NonPositiveHubble { h: f64 },

    #[error("You've discovered matter with negative density; pick {name} >= 0.0 (got {value})")]
    NegativeDensity { name: &'static str, value: f64 },

    #[error("Neutrino species {index} has negative mass {mass} eV")]
    NegativeNeutrinoMass { index: usize, mass: f64 },

    #[error("Flatness closure gives a negative dark energy density Omega_de0 = {omega_de0} (Omega_gamma0 = {omega_gamma0}, Omega_cb0 = {omega_cb0}, Omega_nu0 = {omega_nu0})")]
    NegativeDarkEnergyDensity {
        omega_de0: f64,
        omega_gamma0: f64,
        omega_cb0: f64,
        omega_nu0: f64,
    },
}
