pub mod background;
pub mod batch;
pub mod distances;
pub mod growth;
pub mod neutrino;
pub mod utils;

pub use background::{redshift, scale_factor, Background};
pub use distances::Distances;
pub use growth::{GrowthSolution, GrowthSolver};
pub use neutrino::NeutrinoTable;
pub use utils::error::{EngineError, GrowthSolverError, IntegrationError};
pub use utils::quadrature::{QuadResult, QuadStatus};

pub use cpl_common::{CosmologicalParameters, GrowthSettings, InvalidCosmologyError, NeutrinoMasses};

/// Runs `f` on the background of `params`, built over the shared neutrino table.
pub fn with_background<T, F>(params: &CosmologicalParameters, f: F) -> Result<T, EngineError>
where
    F: FnOnce(&Background<'_>) -> Result<T, EngineError>,
{
    let table = NeutrinoTable::shared()?;
    let background = Background::new(params, table)?;
    f(&background)
}

/// E(a) at each scale factor
pub fn e_a(params: &CosmologicalParameters, a: &[f64]) -> Result<Vec<f64>, EngineError> {
    with_background(params, |bg| Ok(a.iter().map(|&a| bg.e_a(a)).collect()))
}

/// E(z) at each redshift
pub fn e_z(params: &CosmologicalParameters, z: &[f64]) -> Result<Vec<f64>, EngineError> {
    with_background(params, |bg| Ok(z.iter().map(|&z| bg.e_z(z)).collect()))
}

fn map_distances<F>(params: &CosmologicalParameters, z: &[f64], f: F) -> Result<Vec<f64>, EngineError>
where
    F: Fn(&Distances<'_, '_>, f64) -> f64,
{
    with_background(params, |bg| {
        let distances = Distances::new(bg);
        Ok(z.iter().map(|&z| f(&distances, z)).collect())
    })
}

/// Dimensionless conformal distance r̃(z)
pub fn conformal_distance(params: &CosmologicalParameters, z: &[f64]) -> Result<Vec<f64>, EngineError> {
    map_distances(params, z, |d, z| d.conformal_distance(z))
}

/// Comoving distance r(z) in Mpc
pub fn comoving_distance(params: &CosmologicalParameters, z: &[f64]) -> Result<Vec<f64>, EngineError> {
    map_distances(params, z, |d, z| d.comoving_distance(z))
}

pub fn conformal_angular_diameter_distance(
    params: &CosmologicalParameters,
    z: &[f64],
) -> Result<Vec<f64>, EngineError> {
    map_distances(params, z, |d, z| d.conformal_angular_diameter_distance(z))
}

/// Angular diameter distance d_A(z) in Mpc
pub fn angular_diameter_distance(
    params: &CosmologicalParameters,
    z: &[f64],
) -> Result<Vec<f64>, EngineError> {
    map_distances(params, z, |d, z| d.angular_diameter_distance(z))
}

/// Sound horizon rs(z) in Mpc, with ω_b0 taken from the parameters
pub fn sound_horizon(params: &CosmologicalParameters, z: &[f64]) -> Result<Vec<f64>, EngineError> {
    let omega_b0 = params.omega_b();
    map_distances(params, z, |d, z| d.sound_horizon(z, omega_b0))
}

/// Growth factor D(z), one integration for all redshifts
pub fn growth_factor(params: &CosmologicalParameters, z: &[f64]) -> Result<Vec<f64>, EngineError> {
    with_background(params, |bg| Ok(GrowthSolver::new(bg).growth_factor(z)?))
}

/// Growth rate f(z) = dln D / dln a
pub fn growth_rate(params: &CosmologicalParameters, z: &[f64]) -> Result<Vec<f64>, EngineError> {
    with_background(params, |bg| Ok(GrowthSolver::new(bg).growth_rate(z)?))
}

/// D(z) and f(z) from a single integration
pub fn growth_factor_and_rate(
    params: &CosmologicalParameters,
    z: &[f64],
) -> Result<(Vec<f64>, Vec<f64>), EngineError> {
    with_background(params, |bg| Ok(GrowthSolver::new(bg).growth_factor_and_rate(z)?))
}

pub fn growth_factor_at(params: &CosmologicalParameters, z: f64) -> Result<f64, EngineError> {
    with_background(params, |bg| Ok(GrowthSolver::new(bg).growth_factor_at(z)?))
}

pub fn growth_rate_at(params: &CosmologicalParameters, z: f64) -> Result<f64, EngineError> {
    with_background(params, |bg| Ok(GrowthSolver::new(bg).growth_rate_at(z)?))
}
