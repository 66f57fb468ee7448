//! Line-of-sight distances and the baryon drag sound horizon.
//!
//! The fast path uses fixed Gauss rules: 9-point Gauss–Legendre on [0, z] for
//! the conformal distance and 16-point Gauss–Laguerre for the sound horizon.
//! Each has an adaptive reference counterpart for cross-checking.

use cpl_common::{BARYON_PHOTON_RATIO_COEFF, C0};

use crate::background::Background;
use crate::utils::error::IntegrationError;
use crate::utils::quadrature::{laguerre_rule, legendre_rule, quad, QuadOptions, QuadResult};

/// Relative tolerance of the adaptive conformal distance
pub const DISTANCE_REFERENCE_REL_TOL: f64 = 1e-12;

/// Relative tolerance of the adaptive sound horizon
pub const SOUND_HORIZON_REFERENCE_REL_TOL: f64 = 1e-10;

/// Upper redshift of the adaptive sound horizon integral
pub const SOUND_HORIZON_Z_MAX: f64 = 1e7;

#[derive(Debug, Clone, Copy)]
pub struct Distances<'b, 't> {
    background: &'b Background<'t>,
}

impl<'b, 't> Distances<'b, 't> {
    pub fn new(background: &'b Background<'t>) -> Distances<'b, 't> {
        Distances { background }
    }

    /// c₀ / (100 h) in Mpc
    pub fn hubble_distance(&self) -> f64 {
        C0 / (100.0 * self.background.params().h())
    }

    fn inverse_e(&self, z: f64) -> f64 {
        self.background.e_z(z).recip()
    }

    /// R = 3ρ_b / 4ρ_γ at redshift z
    fn baryon_photon_ratio(z: f64, omega_b0: f64) -> f64 {
        BARYON_PHOTON_RATIO_COEFF * omega_b0 / (1.0 + z)
    }

    /// c_s / E at redshift z, with c_s = 1 / √(3 (1 + R))
    fn sound_speed_over_e(&self, z: f64, omega_b0: f64) -> f64 {
        let r = Self::baryon_photon_ratio(z, omega_b0);
        (3.0 * (1.0 + r)).sqrt().recip() * self.inverse_e(z)
    }

    /// Dimensionless conformal distance r̃(z) = ∫₀^z dz' / E(z')
    pub fn conformal_distance(&self, z: f64) -> f64 {
        if z == 0.0 {
            return 0.0;
        }
        legendre_rule()
            .mapped(0.0, z)
            .integrate(|zp| self.inverse_e(zp))
    }

    /// Comoving distance in Mpc
    pub fn comoving_distance(&self, z: f64) -> f64 {
        self.hubble_distance() * self.conformal_distance(z)
    }

    pub fn conformal_angular_diameter_distance(&self, z: f64) -> f64 {
        self.conformal_distance(z) / (1.0 + z)
    }

    /// Angular diameter distance in Mpc
    pub fn angular_diameter_distance(&self, z: f64) -> f64 {
        self.comoving_distance(z) / (1.0 + z)
    }

    /// Sound horizon in Mpc, rs(z) = c₀/(100h) ∫_z^∞ c_s(z') / E(z') dz'.
    ///
    /// The Laguerre nodes live in u = ln(1 + z'), shifted to start at ln(1 + z),
    /// and the weights are multiplied by e^node since the integrand does not
    /// carry the e⁻ᵘ weight itself. In that variable the integrand decays like
    /// e⁻ᵘ during radiation domination, which the rule captures well.
    pub fn sound_horizon(&self, z: f64, omega_b0: f64) -> f64 {
        let rule = laguerre_rule();
        let one_plus_z = 1.0 + z;
        let integral: f64 = rule
            .nodes
            .iter()
            .zip(&rule.weights)
            .map(|(&u, &w)| {
                let one_plus_zp = one_plus_z * u.exp();
                // dz' = (1 + z') du
                w * u.exp() * one_plus_zp * self.sound_speed_over_e(one_plus_zp - 1.0, omega_b0)
            })
            .sum();
        self.hubble_distance() * integral
    }

    /// Adaptive conformal distance
    pub fn conformal_distance_reference(&self, z: f64) -> Result<QuadResult, IntegrationError> {
        quad(
            |zp| self.inverse_e(zp),
            0.0,
            z,
            &QuadOptions::new(DISTANCE_REFERENCE_REL_TOL),
        )
    }

    /// Adaptive comoving distance in Mpc
    pub fn comoving_distance_reference(&self, z: f64) -> Result<QuadResult, IntegrationError> {
        let scale = self.hubble_distance();
        let result = self.conformal_distance_reference(z)?;
        Ok(QuadResult {
            value: scale * result.value,
            abs_error: scale * result.abs_error,
            ..result
        })
    }

    /// Adaptive sound horizon in Mpc, truncated at [`SOUND_HORIZON_Z_MAX`]
    pub fn sound_horizon_reference(
        &self,
        z: f64,
        omega_b0: f64,
    ) -> Result<QuadResult, IntegrationError> {
        let scale = self.hubble_distance();
        let result = quad(
            |zp| self.sound_speed_over_e(zp, omega_b0),
            z,
            SOUND_HORIZON_Z_MAX,
            &QuadOptions::new(SOUND_HORIZON_REFERENCE_REL_TOL),
        )?;
        Ok(QuadResult {
            value: scale * result.value,
            abs_error: scale * result.abs_error,
            ..result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neutrino::NeutrinoTable;
    use approx::assert_relative_eq;
    use cpl_common::CosmologicalParameters;

    fn params() -> CosmologicalParameters {
        CosmologicalParameters::new(3.0, 0.96, 0.7, 0.022, 0.125).unwrap()
    }

    #[test]
    fn test_zero_redshift() {
        let params = params();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let d = Distances::new(&bg);
        assert_eq!(d.conformal_distance(0.0), 0.0);
        assert_eq!(d.comoving_distance(0.0), 0.0);
        assert_eq!(d.angular_diameter_distance(0.0), 0.0);
        assert_eq!(d.conformal_distance_reference(0.0).unwrap().value, 0.0);
    }

    #[test]
    fn test_low_redshift_hubble_law() {
        let params = params();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let d = Distances::new(&bg);
        let z = 1e-4;
        assert_relative_eq!(d.comoving_distance(z), d.hubble_distance() * z, max_relative = 1e-4);
    }

    #[test]
    fn test_fixed_matches_reference() {
        let params = params();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let d = Distances::new(&bg);
        for z in [0.1, 1.0, 2.5] {
            let reference = d.comoving_distance_reference(z).unwrap();
            assert!(reference.is_converged());
            assert_relative_eq!(d.comoving_distance(z), reference.value, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_angular_diameter_relation() {
        let params = params();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let d = Distances::new(&bg);
        let z = 0.8;
        assert_relative_eq!(
            d.angular_diameter_distance(z) * (1.0 + z),
            d.comoving_distance(z),
            max_relative = 1e-14
        );
        assert_relative_eq!(
            d.conformal_angular_diameter_distance(z) * d.hubble_distance(),
            d.angular_diameter_distance(z),
            max_relative = 1e-14
        );
    }

    #[test]
    fn test_sound_horizon() {
        let params = params();
        let bg = Background::new(&params, NeutrinoTable::shared().unwrap()).unwrap();
        let d = Distances::new(&bg);
        let fixed = d.sound_horizon(1060.0, params.omega_b());
        let reference = d.sound_horizon_reference(1060.0, params.omega_b()).unwrap();
        assert!((130.0..175.0).contains(&fixed), "rs = {fixed}");
        // The reference stops at z = 1e7, which drops ~1e-4 of the integral
        assert_relative_eq!(fixed, reference.value, max_relative = 1e-3);
        assert!(d.sound_horizon(500.0, params.omega_b()) > fixed);
    }
}
