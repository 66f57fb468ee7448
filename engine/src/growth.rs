//! Linear growth of matter perturbations.
//!
//! With u = [D, dD/dln a] the growth equation reads
//!
//!   du₁/dln a = u₂
//!   du₂/dln a = -(2 + dln E/dln a) u₂ + 3/2 Ω_m(a) u₁
//!
//! and is integrated forward from a_min = 1/139, deep in matter domination
//! where D ≈ a, up to a = 1.01. D is not renormalized: D(z = 0) comes out
//! below one, see [`GrowthSolver::normalized_growth_factor`] for D / D(0).

use cpl_common::GrowthSettings;

use crate::background::{scale_factor, Background};
use crate::utils::error::GrowthSolverError;
use crate::utils::ode::{DenseOutput, DormandPrince, OdeFailure, OdeSystem, Stats, Tolerances};

/// Scale factor at which the integration starts, with D = dD/dln a = a
pub const A_MIN: f64 = 1.0 / 139.0;

/// Scale factor at which the integration stops
pub const A_MAX: f64 = 1.01;

/// Redshift range covered by a growth solution, (z_min, z_max)
pub fn redshift_range() -> (f64, f64) {
    (A_MAX.recip() - 1.0, A_MIN.recip() - 1.0)
}

/// Right-hand side of the growth equation in ln a
struct GrowthSystem<'b, 't> {
    background: &'b Background<'t>,
}

impl<'b, 't> OdeSystem<2> for GrowthSystem<'b, 't> {
    fn rhs(&self, loga: f64, u: &[f64; 2]) -> [f64; 2] {
        let a = loga.exp();
        let friction = 2.0 + self.background.dlog_e_dlog_a(a);
        let source = 1.5 * self.background.omega_m(a);
        [u[1], -friction * u[1] + source * u[0]]
    }
}

/// Dense growth history over the full ln a span
#[derive(Debug, Clone)]
pub struct GrowthSolution {
    dense: DenseOutput<2>,
}

impl GrowthSolution {
    /// [D, dD/dln a] at `loga`, or `None` outside the solved span
    pub fn eval(&self, loga: f64) -> Option<[f64; 2]> {
        self.dense.eval(loga)
    }

    pub fn at_redshift(&self, z: f64) -> Result<[f64; 2], GrowthSolverError> {
        let loga = checked_log_scale_factor(z)?;
        self.eval(loga).ok_or_else(|| out_of_range(z))
    }

    pub fn growth_factor(&self, z: f64) -> Result<f64, GrowthSolverError> {
        Ok(self.at_redshift(z)?[0])
    }

    /// f = dln D / dln a
    pub fn growth_rate(&self, z: f64) -> Result<f64, GrowthSolverError> {
        let [d, dd] = self.at_redshift(z)?;
        Ok(dd / d)
    }

    /// Solved ln a interval
    pub fn span(&self) -> (f64, f64) {
        self.dense.span()
    }

    pub fn stats(&self) -> Stats {
        self.dense.stats
    }
}

fn out_of_range(z: f64) -> GrowthSolverError {
    let (z_min, z_max) = redshift_range();
    GrowthSolverError::OutOfRange { z, z_min, z_max }
}

/// ln a for a redshift inside the solved range
fn checked_log_scale_factor(z: f64) -> Result<f64, GrowthSolverError> {
    let a = scale_factor(z);
    if !(a >= A_MIN && a <= A_MAX) {
        return Err(out_of_range(z));
    }
    Ok(a.ln())
}

/// Integrates the growth equation on a [`Background`].
#[derive(Debug, Clone, Copy)]
pub struct GrowthSolver<'b, 't> {
    background: &'b Background<'t>,
    settings: GrowthSettings,
}

impl<'b, 't> GrowthSolver<'b, 't> {
    pub fn new(background: &'b Background<'t>) -> GrowthSolver<'b, 't> {
        GrowthSolver {
            background,
            settings: GrowthSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: GrowthSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> GrowthSettings {
        self.settings
    }

    fn integrator(&self) -> DormandPrince<2> {
        DormandPrince::new(Tolerances::new(self.settings.atol, self.settings.rtol))
            .with_max_steps(self.settings.max_steps)
    }

    fn system(&self) -> GrowthSystem<'b, 't> {
        GrowthSystem {
            background: self.background,
        }
    }

    fn solver_error(&self, failure: OdeFailure) -> GrowthSolverError {
        let params = Box::new(self.background.params().clone());
        match failure {
            OdeFailure::StepSizeTooSmall { t, h } => {
                GrowthSolverError::StepSizeTooSmall { loga: t, h, params }
            }
            OdeFailure::MaxStepsExceeded { t } => GrowthSolverError::MaxStepsExceeded {
                loga: t,
                max_steps: self.settings.max_steps,
                params,
            },
            OdeFailure::NonFiniteState { t } => GrowthSolverError::NonFiniteState { loga: t, params },
        }
    }

    /// Dense solution over [ln a_min, ln a_max]
    pub fn solve(&self) -> Result<GrowthSolution, GrowthSolverError> {
        let mut integrator = self.integrator();
        let dense = integrator
            .integrate(&self.system(), A_MIN.ln(), [A_MIN, A_MIN], A_MAX.ln())
            .map_err(|failure| self.solver_error(failure))?;

        log::debug!(
            "growth solve: {} accepted / {} rejected steps, {} rhs evaluations",
            dense.stats.accepted_steps,
            dense.stats.rejected_steps,
            dense.stats.fn_evals
        );
        Ok(GrowthSolution { dense })
    }

    /// [D, dD/dln a] at each of the redshifts, in the order given. The states
    /// are recorded during a single integration in ascending a.
    pub fn solve_at(&self, z: &[f64]) -> Result<Vec<[f64; 2]>, GrowthSolverError> {
        if z.is_empty() {
            return Err(GrowthSolverError::EmptyRequest);
        }
        let loga = z
            .iter()
            .map(|&z| checked_log_scale_factor(z))
            .collect::<Result<Vec<f64>, _>>()?;

        let mut order: Vec<usize> = (0..loga.len()).collect();
        order.sort_by(|&i, &j| loga[i].total_cmp(&loga[j]));
        let times: Vec<f64> = order.iter().map(|&i| loga[i]).collect();

        let mut integrator = self.integrator();
        let saved = integrator
            .integrate_at(&self.system(), A_MIN.ln(), [A_MIN, A_MIN], A_MAX.ln(), &times)
            .map_err(|failure| self.solver_error(failure))?;
        if saved.len() != times.len() {
            // Only possible if the last requested ln a was never reached
            return Err(out_of_range(z[order[saved.len()]]));
        }

        log::debug!(
            "growth solve at {} redshifts: {} accepted / {} rejected steps",
            z.len(),
            integrator.stats.accepted_steps,
            integrator.stats.rejected_steps
        );

        let mut out = vec![[0.0; 2]; z.len()];
        for (state, &i) in saved.into_iter().zip(&order) {
            out[i] = state;
        }
        Ok(out)
    }

    /// D(z)
    pub fn growth_factor(&self, z: &[f64]) -> Result<Vec<f64>, GrowthSolverError> {
        Ok(self.solve_at(z)?.into_iter().map(|[d, _]| d).collect())
    }

    /// f(z) = dln D / dln a
    pub fn growth_rate(&self, z: &[f64]) -> Result<Vec<f64>, GrowthSolverError> {
        Ok(self.solve_at(z)?.into_iter().map(|[d, dd]| dd / d).collect())
    }

    /// D(z) and f(z) from one integration
    pub fn growth_factor_and_rate(
        &self,
        z: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), GrowthSolverError> {
        Ok(self
            .solve_at(z)?
            .into_iter()
            .map(|[d, dd]| (d, dd / d))
            .unzip())
    }

    pub fn growth_factor_at(&self, z: f64) -> Result<f64, GrowthSolverError> {
        self.growth_factor(&[z])?
            .first()
            .copied()
            .ok_or(GrowthSolverError::EmptyRequest)
    }

    pub fn growth_rate_at(&self, z: f64) -> Result<f64, GrowthSolverError> {
        self.growth_rate(&[z])?
            .first()
            .copied()
            .ok_or(GrowthSolverError::EmptyRequest)
    }

    /// D(z) / D(0)
    pub fn normalized_growth_factor(&self, z: &[f64]) -> Result<Vec<f64>, GrowthSolverError> {
        if z.is_empty() {
            return Err(GrowthSolverError::EmptyRequest);
        }
        let mut with_today = z.to_vec();
        with_today.push(0.0);
        let mut d = self.growth_factor(&with_today)?;
        let today = d.pop().ok_or(GrowthSolverError::EmptyRequest)?;
        Ok(d.into_iter().map(|d| d / today).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neutrino::NeutrinoTable;
    use approx::assert_relative_eq;
    use cpl_common::CosmologicalParameters;

    fn planck() -> CosmologicalParameters {
        CosmologicalParameters::new(3.0, 0.96, 0.6736, 0.02237, 0.1200).unwrap()
    }

    #[test]
    fn test_starts_at_matter_domination_asymptote() {
        let params = planck();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let solver = GrowthSolver::new(&bg);

        let (_, z_max) = redshift_range();
        assert_relative_eq!(z_max, 138.0, max_relative = 1e-12);
        let [d, dd] = solver.solve_at(&[138.0]).unwrap()[0];
        assert_eq!(d, A_MIN);
        assert_eq!(dd, A_MIN);

        let z = 137.9;
        assert_relative_eq!(solver.growth_factor_at(z).unwrap(), scale_factor(z), max_relative = 1e-5);
    }

    #[test]
    fn test_results_follow_input_order() {
        let params = planck();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let solver = GrowthSolver::new(&bg);

        let z = [0.5, 3.0, 0.0, 1.0];
        let d = solver.growth_factor(&z).unwrap();
        assert!(d[2] > d[0] && d[0] > d[3] && d[3] > d[1]);

        for (zi, di) in z.iter().zip(&d) {
            assert_eq!(solver.growth_factor_at(*zi).unwrap(), *di);
        }
    }

    #[test]
    fn test_dense_and_saved_modes_agree() {
        let params = planck();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let solver = GrowthSolver::new(&bg);
        let solution = solver.solve().unwrap();
        assert_relative_eq!(solution.span().0, A_MIN.ln());
        assert_relative_eq!(solution.span().1, A_MAX.ln());
        assert!(solution.stats().accepted_steps > 0);

        let z = [0.0, 0.7, 2.0, 20.0];
        let (d, f) = solver.growth_factor_and_rate(&z).unwrap();
        for i in 0..z.len() {
            assert_relative_eq!(solution.growth_factor(z[i]).unwrap(), d[i], max_relative = 1e-6);
            assert_relative_eq!(solution.growth_rate(z[i]).unwrap(), f[i], max_relative = 1e-6);
        }
    }

    #[test]
    fn test_out_of_range_and_empty() {
        let params = planck();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let solver = GrowthSolver::new(&bg);

        assert_eq!(solver.growth_factor(&[]), Err(GrowthSolverError::EmptyRequest));
        for z in [200.0, -0.5, f64::NAN] {
            assert!(matches!(
                solver.growth_factor_at(z),
                Err(GrowthSolverError::OutOfRange { .. })
            ));
        }
        let solution = solver.solve().unwrap();
        assert!(solution.eval(0.1).is_none());
        assert!(solution.at_redshift(500.0).is_err());
    }

    #[test]
    fn test_step_budget_is_reported() {
        let params = planck();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let settings = GrowthSettings {
            max_steps: 3,
            ..GrowthSettings::default()
        };
        let solver = GrowthSolver::new(&bg).with_settings(settings);
        match solver.solve() {
            Err(GrowthSolverError::MaxStepsExceeded { max_steps, params: p, .. }) => {
                assert_eq!(max_steps, 3);
                assert_eq!(*p, params);
            }
            other => panic!("expected MaxStepsExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_normalized_growth() {
        let params = planck();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let solver = GrowthSolver::new(&bg);
        let normalized = solver.normalized_growth_factor(&[0.0, 1.0]).unwrap();
        assert_eq!(normalized[0], 1.0);
        assert!(normalized[1] < 1.0 && normalized[1] > 0.5);
    }
}
