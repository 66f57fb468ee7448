//! Evaluation of many independent parameter sets on the rayon thread pool.
//!
//! Each parameter set gets its own background and growth integration; the only
//! thing the workers share is the read-only neutrino table.

use rayon::prelude::*;

use cpl_common::CosmologicalParameters;

use crate::distances::Distances;
use crate::growth::GrowthSolver;
use crate::utils::error::EngineError;
use crate::with_background;

/// D(z) and f(z) of one parameter set
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthTable {
    pub growth_factor: Vec<f64>,
    pub growth_rate: Vec<f64>,
}

/// Background quantities of one parameter set at each requested redshift
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceTable {
    pub e: Vec<f64>,
    pub comoving_distance: Vec<f64>,
    pub angular_diameter_distance: Vec<f64>,
}

/// Growth factor and rate of every parameter set at the redshifts `z`.
/// Fails with the first error encountered.
pub fn growth_batch(
    params: &[CosmologicalParameters],
    z: &[f64],
) -> Result<Vec<GrowthTable>, EngineError> {
    params
        .par_iter()
        .map(|p| {
            with_background(p, |bg| {
                let (growth_factor, growth_rate) = GrowthSolver::new(bg).growth_factor_and_rate(z)?;
                Ok(GrowthTable {
                    growth_factor,
                    growth_rate,
                })
            })
        })
        .collect()
}

/// E, comoving and angular diameter distance of every parameter set at the redshifts `z`.
pub fn distance_batch(
    params: &[CosmologicalParameters],
    z: &[f64],
) -> Result<Vec<DistanceTable>, EngineError> {
    params
        .par_iter()
        .map(|p| {
            with_background(p, |bg| {
                let distances = Distances::new(bg);
                Ok(DistanceTable {
                    e: z.iter().map(|&z| bg.e_z(z)).collect(),
                    comoving_distance: z.iter().map(|&z| distances.comoving_distance(z)).collect(),
                    angular_diameter_distance: z
                        .iter()
                        .map(|&z| distances.angular_diameter_distance(z))
                        .collect(),
                })
            })
        })
        .collect()
}
