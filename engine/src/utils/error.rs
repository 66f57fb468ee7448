use cpl_common::{CommonError, CosmologicalParameters, InvalidCosmologyError};
use thiserror::Error;

/// Adaptive quadrature failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("Quadrature over [{lower}, {upper}] reached relative error {achieved:e}, requested {requested:e}")]
    ToleranceNotReached {
        requested: f64,
        achieved: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Integrand is not finite at x = {x} (value {value})")]
    NonFiniteIntegrand { x: f64, value: f64 },

    #[error("Invalid integration interval [{lower}, {upper}]")]
    InvalidInterval { lower: f64, upper: f64 },
}

/// Growth ODE failures. Solver failures carry the failing log(a) and the parameter set.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GrowthSolverError {
    #[error("Step size {h:e} too small at log(a) = {loga}")]
    StepSizeTooSmall {
        loga: f64,
        h: f64,
        params: Box<CosmologicalParameters>,
    },

    #[error("Growth solver exceeded {max_steps} steps at log(a) = {loga}")]
    MaxStepsExceeded {
        loga: f64,
        max_steps: u64,
        params: Box<CosmologicalParameters>,
    },

    #[error("A NaN or Inf value was produced at log(a) = {loga}")]
    NonFiniteState {
        loga: f64,
        params: Box<CosmologicalParameters>,
    },

    #[error("Redshift z = {z} is outside the solved range [{z_min}, {z_max}]")]
    OutOfRange { z: f64, z_min: f64, z_max: f64 },

    #[error("No redshifts were requested")]
    EmptyRequest,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid cosmology: {err}")]
    InvalidCosmology {
        #[from]
        err: InvalidCosmologyError,
    },

    #[error("Integration failed: {err}")]
    Integration {
        #[from]
        err: IntegrationError,
    },

    #[error("Growth solver failed: {err}")]
    Growth {
        #[from]
        err: GrowthSolverError,
    },

    #[error("Error in common: {err}")]
    Common {
        #[from]
        err: CommonError,
    },

    #[error("Failed to write {path}: {msg}")]
    IOError { path: String, msg: String },
}
