//! Fermi-Dirac phase-space integrals of massive neutrinos.
//!
//! F(y) = ∫₀^∞ x² √(x² + y²) / (1 + eˣ) dx turns a neutrino mass into an energy
//! density relative to the massless case; y = m_ν a / (k_B T_ν). Evaluating it
//! by quadrature for every (a, m_ν) pair is too slow for the distance and growth
//! integrals, so a table of F and dF/dy is built once and interpolated.

use std::f64::consts::PI;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use cpl_common::{K_B, T_NU};

use crate::utils::error::IntegrationError;
use crate::utils::quadrature::{quad_semi_infinite, QuadOptions};
use crate::utils::spline::{CubicSpline, EndCondition};

/// Relative tolerance of the phase-space integrals
pub const NEUTRINO_REL_TOL: f64 = 1e-12;

/// Upper end of the default table; a 1.7 eV species reaches it at a = 1
pub const DEFAULT_Y_MAX: f64 = 1e4;

/// The grid is linear up to here and geometric beyond
const Y_LINEAR_MAX: f64 = 10.0;
const N_LINEAR: usize = 201;
const N_GEOMETRIC: usize = 240;

/// F(0) = 7π⁴/120, the massless limit
pub const F_MASSLESS: f64 = 7.0 * PI * PI * PI * PI / 120.0;

/// d²F/dy² at y = 0, i.e. ∫₀^∞ x / (1 + eˣ) dx = π²/12
const D2F_DY2_AT_ZERO: f64 = PI * PI / 12.0;

fn options() -> QuadOptions {
    QuadOptions {
        max_segments: 8192,
        ..QuadOptions::new(NEUTRINO_REL_TOL)
    }
}

/// 1 / (1 + eˣ) written so that large x underflows to zero instead of overflowing
fn fermi_dirac_occupation(x: f64) -> f64 {
    let e = (-x).exp();
    e / (1.0 + e)
}

/// F(y) by adaptive quadrature
pub fn fermi_dirac_integral(y: f64) -> Result<f64, IntegrationError> {
    let integrand = |x: f64| x * x * (x * x + y * y).sqrt() * fermi_dirac_occupation(x);
    Ok(quad_semi_infinite(integrand, 0.0, &options())?.value)
}

/// dF/dy(y) = y ∫₀^∞ x² / ((1 + eˣ) √(x² + y²)) dx by adaptive quadrature
pub fn fermi_dirac_integral_dy(y: f64) -> Result<f64, IntegrationError> {
    if y == 0.0 {
        return Ok(0.0);
    }
    let integrand = |x: f64| {
        if x == 0.0 {
            return 0.0;
        }
        x * x / (x * x + y * y).sqrt() * fermi_dirac_occupation(x)
    };
    Ok(y * quad_semi_infinite(integrand, 0.0, &options())?.value)
}

/// y = m_ν a / (k_B T_ν)
pub fn neutrino_y(m_nu: f64, a: f64) -> f64 {
    m_nu * a / (K_B * T_NU)
}

/// Tabulated F(y) and dF/dy(y) with cubic spline interpolation.
#[derive(Debug, Clone)]
pub struct NeutrinoTable {
    f: CubicSpline,
    dfdy: CubicSpline,
    y_max: f64,
    warned: std::sync::Arc<AtomicBool>,
}

static SHARED_TABLE: OnceLock<Result<NeutrinoTable, IntegrationError>> = OnceLock::new();

impl NeutrinoTable {
    /// Process-wide table over [0, DEFAULT_Y_MAX], built on first use. Concurrent
    /// first callers block until the single build has finished.
    pub fn shared() -> Result<&'static NeutrinoTable, IntegrationError> {
        SHARED_TABLE
            .get_or_init(|| NeutrinoTable::build(DEFAULT_Y_MAX))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Builds a table over [0, y_max]
    pub fn build(y_max: f64) -> Result<NeutrinoTable, IntegrationError> {
        if !(y_max > 0.0 && y_max.is_finite()) {
            return Err(IntegrationError::InvalidInterval {
                lower: 0.0,
                upper: y_max,
            });
        }

        let grid = y_grid(y_max);
        log::debug!(
            "building neutrino table over [0, {y_max:e}] with {} points",
            grid.len()
        );

        let f_values = grid
            .iter()
            .map(|&y| fermi_dirac_integral(y))
            .collect::<Result<Vec<f64>, _>>()?;
        let dfdy_values = grid
            .iter()
            .map(|&y| fermi_dirac_integral_dy(y))
            .collect::<Result<Vec<f64>, _>>()?;

        let slope_at_end = dfdy_values[dfdy_values.len() - 1];
        let invalid = || IntegrationError::InvalidInterval {
            lower: 0.0,
            upper: y_max,
        };
        let f = CubicSpline::new(
            grid.clone(),
            f_values,
            EndCondition::Clamped(0.0),
            EndCondition::Clamped(slope_at_end),
        )
        .ok_or_else(invalid)?;
        let dfdy = CubicSpline::new(
            grid,
            dfdy_values,
            EndCondition::Clamped(D2F_DY2_AT_ZERO),
            EndCondition::Natural,
        )
        .ok_or_else(invalid)?;

        Ok(NeutrinoTable {
            f,
            dfdy,
            y_max,
            warned: Default::default(),
        })
    }

    /// Tabulated range of y
    pub fn y_range(&self) -> (f64, f64) {
        (0.0, self.y_max)
    }

    fn check_range(&self, y: f64) {
        if y > self.y_max && !self.warned.swap(true, Ordering::Relaxed) {
            log::warn!(
                "neutrino table extrapolated to y = {y:e} beyond y_max = {:e}; accuracy degrades",
                self.y_max
            );
        }
    }

    /// Interpolated F(y)
    pub fn f(&self, y: f64) -> f64 {
        self.check_range(y);
        self.f.value(y)
    }

    /// Interpolated dF/dy(y)
    pub fn dfdy(&self, y: f64) -> f64 {
        self.check_range(y);
        self.dfdy.value(y)
    }
}

/// Linear spacing on [0, 10] (where F bends) followed by geometric spacing up to y_max
fn y_grid(y_max: f64) -> Vec<f64> {
    let linear_max = Y_LINEAR_MAX.min(y_max);
    let mut grid: Vec<f64> = (0..N_LINEAR)
        .map(|i| linear_max * i as f64 / (N_LINEAR - 1) as f64)
        .collect();

    if y_max > linear_max {
        let ratio = (y_max / linear_max).powf(1.0 / N_GEOMETRIC as f64);
        grid.extend((1..=N_GEOMETRIC).map(|i| linear_max * ratio.powi(i as i32)));
        // Land exactly on y_max
        let last = grid.len() - 1;
        grid[last] = y_max;
    }
    grid
}
