use std::f64::consts::PI;

use cpl_common::{CosmologicalParameters, InvalidCosmologyError, K_B, N_EFF, T_NU};

use crate::neutrino::NeutrinoTable;

/// a = 1 / (1 + z)
pub fn scale_factor(z: f64) -> f64 {
    (1.0 + z).recip()
}

/// z = 1 / a - 1
pub fn redshift(a: f64) -> f64 {
    a.recip() - 1.0
}

/// 15/π⁴ Γν⁴ with Γν = (4/11)^(1/3) (Neff/3)^(1/4)
fn neutrino_prefactor() -> f64 {
    let gamma_nu = (4.0f64 / 11.0).powf(1.0 / 3.0) * (N_EFF / 3.0).powf(0.25);
    15.0 / PI.powi(4) * gamma_nu.powi(4)
}

/// Flat background made of photons, baryons + CDM, massive neutrinos and CPL dark energy.
///
/// Built from a [`CosmologicalParameters`] value and a neutrino table; the
/// density parameters today are derived once here, including the flatness
/// closure Ω_de0 = 1 - (Ω_γ0 + Ω_cb0 + Ω_ν0), which must not be negative.
#[derive(Debug, Clone)]
pub struct Background<'t> {
    params: CosmologicalParameters,
    table: &'t NeutrinoTable,

    omega_gamma0: f64,
    omega_cb0: f64,
    omega_nu0: f64,
    omega_de0: f64,

    /// 15/π⁴ Γν⁴ Ω_γ0
    nu_amplitude: f64,
    /// m_i / (k_B T_ν) of the massive species. Massless ones are dropped.
    nu_y_today: Vec<f64>,
}

impl<'t> Background<'t> {
    pub fn new(
        params: &CosmologicalParameters,
        table: &'t NeutrinoTable,
    ) -> Result<Background<'t>, InvalidCosmologyError> {
        let omega_gamma0 = params.omega_gamma0();
        let omega_cb0 = params.omega_cb0();
        let nu_y_today: Vec<f64> = params
            .neutrino_masses()
            .as_slice()
            .iter()
            .filter(|&&m| m > 0.0)
            .map(|&m| m / (K_B * T_NU))
            .collect();

        let mut background = Background {
            params: params.clone(),
            table,
            omega_gamma0,
            omega_cb0,
            omega_nu0: 0.0,
            omega_de0: 0.0,
            nu_amplitude: neutrino_prefactor() * omega_gamma0,
            nu_y_today,
        };

        let omega_nu0 = background.omega_nu_e2(1.0);
        let omega_de0 = 1.0 - (omega_gamma0 + omega_cb0 + omega_nu0);
        if !(omega_de0 >= 0.0 && omega_de0.is_finite()) {
            return Err(InvalidCosmologyError::NegativeDarkEnergyDensity {
                omega_de0,
                omega_gamma0,
                omega_cb0,
                omega_nu0,
            });
        }
        background.omega_nu0 = omega_nu0;
        background.omega_de0 = omega_de0;

        log::debug!(
            "background: Omega_gamma0 = {omega_gamma0:.6e}, Omega_cb0 = {omega_cb0:.6}, \
             Omega_nu0 = {omega_nu0:.6e}, Omega_de0 = {omega_de0:.6}"
        );

        Ok(background)
    }

    pub fn params(&self) -> &CosmologicalParameters {
        &self.params
    }

    pub fn table(&self) -> &'t NeutrinoTable {
        self.table
    }

    pub fn omega_gamma0(&self) -> f64 {
        self.omega_gamma0
    }

    pub fn omega_cb0(&self) -> f64 {
        self.omega_cb0
    }

    pub fn omega_nu0(&self) -> f64 {
        self.omega_nu0
    }

    pub fn omega_lambda0(&self) -> f64 {
        self.omega_de0
    }

    /// CPL equation of state w(a) = w0 + wa (1 - a)
    pub fn w_de(&self, a: f64) -> f64 {
        self.params.w0() + self.params.wa() * (1.0 - a)
    }

    /// Dark energy density relative to today, a^(-3(1 + w0 + wa)) exp(3 wa (a - 1))
    pub fn rho_de(&self, a: f64) -> f64 {
        let (w0, wa) = (self.params.w0(), self.params.wa());
        a.powf(-3.0 * (1.0 + w0 + wa)) * (3.0 * wa * (a - 1.0)).exp()
    }

    pub fn d_rho_de_da(&self, a: f64) -> f64 {
        let (w0, wa) = (self.params.w0(), self.params.wa());
        3.0 * (wa - (1.0 + w0 + wa) / a) * self.rho_de(a)
    }

    /// Massive neutrino contribution to E², Σ_i 15/π⁴ Γν⁴ Ω_γ0 / a⁴ F(y_i)
    pub fn omega_nu_e2(&self, a: f64) -> f64 {
        if self.nu_y_today.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .nu_y_today
            .iter()
            .map(|&y_today| self.table.f(y_today * a))
            .sum();
        self.nu_amplitude / a.powi(4) * sum
    }

    /// d(ΩνE2)/da
    pub fn d_omega_nu_e2_da(&self, a: f64) -> f64 {
        if self.nu_y_today.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .nu_y_today
            .iter()
            .map(|&y_today| {
                let y = y_today * a;
                -4.0 * self.table.f(y) / a.powi(5) + self.table.dfdy(y) * y_today / a.powi(4)
            })
            .sum();
        self.nu_amplitude * sum
    }

    /// E²(a). Each component enters as Ω_i (f_i(a) - f_i(1)) on top of 1, which
    /// is the same sum once the closure is substituted but keeps E(1) = 1 exact.
    pub fn e2_a(&self, a: f64) -> f64 {
        1.0 + self.omega_gamma0 * (a.powi(-4) - 1.0)
            + self.omega_cb0 * (a.powi(-3) - 1.0)
            + self.omega_de0 * (self.rho_de(a) - 1.0)
            + (self.omega_nu_e2(a) - self.omega_nu0)
    }

    /// E(a) = H(a) / H0
    pub fn e_a(&self, a: f64) -> f64 {
        self.e2_a(a).sqrt()
    }

    /// E(z) = H(z) / H0
    pub fn e_z(&self, z: f64) -> f64 {
        self.e_a(scale_factor(z))
    }

    /// Ω_m(a) = Ω_cb0 a⁻³ / E²(a)
    pub fn omega_m(&self, a: f64) -> f64 {
        self.omega_cb0 * a.powi(-3) / self.e2_a(a)
    }

    /// d ln E / d ln a
    pub fn dlog_e_dlog_a(&self, a: f64) -> f64 {
        a * 0.5 / self.e2_a(a)
            * (-3.0 * self.omega_cb0 * a.powi(-4) - 4.0 * self.omega_gamma0 * a.powi(-5)
                + self.omega_de0 * self.d_rho_de_da(a)
                + self.d_omega_nu_e2_da(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn table() -> &'static NeutrinoTable {
        NeutrinoTable::shared().unwrap()
    }

    fn lcdm() -> CosmologicalParameters {
        CosmologicalParameters::new(3.0, 0.96, 0.7, 0.022, 0.125).unwrap()
    }

    #[test]
    fn test_lcdm_closed_form() {
        let params = lcdm();
        let bg = Background::new(&params, table()).unwrap();
        assert_eq!(bg.omega_nu0(), 0.0);
        assert_eq!(bg.omega_nu_e2(0.3), 0.0);
        assert_eq!(bg.d_omega_nu_e2_da(0.3), 0.0);

        let (og, om, ol) = (bg.omega_gamma0(), bg.omega_cb0(), bg.omega_lambda0());
        assert_abs_diff_eq!(og + om + ol, 1.0, epsilon = 1e-15);
        for a in [0.001_f64, 0.1, 0.5, 1.0, 1.2] {
            let expected = (og / a.powi(4) + om / a.powi(3) + ol).sqrt();
            assert_relative_eq!(bg.e_a(a), expected, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_today_is_exactly_one() {
        let params = lcdm()
            .with_neutrino_masses(vec![0.02, 0.05])
            .unwrap()
            .with_dark_energy(-0.8, -0.4)
            .unwrap();
        let bg = Background::new(&params, table()).unwrap();
        assert_eq!(bg.e_a(1.0), 1.0);
        assert_eq!(bg.e_z(0.0), 1.0);
        assert_eq!(bg.rho_de(1.0), 1.0);
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let params = lcdm()
            .with_neutrino_masses(0.1)
            .unwrap()
            .with_dark_energy(-0.9, 0.3)
            .unwrap();
        let bg = Background::new(&params, table()).unwrap();

        for a in [0.05, 0.3, 0.8, 1.0] {
            let da = 1e-6 * a;

            let numeric = (bg.rho_de(a + da) - bg.rho_de(a - da)) / (2.0 * da);
            assert_relative_eq!(bg.d_rho_de_da(a), numeric, max_relative = 1e-6);

            let numeric = (bg.omega_nu_e2(a + da) - bg.omega_nu_e2(a - da)) / (2.0 * da);
            assert_relative_eq!(bg.d_omega_nu_e2_da(a), numeric, max_relative = 1e-5);

            let numeric =
                a * (bg.e_a(a + da).ln() - bg.e_a(a - da).ln()) / (2.0 * da);
            assert_relative_eq!(bg.dlog_e_dlog_a(a), numeric, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_neutrino_species_add_up() {
        let base = lcdm();
        let both = Background::new(&base.clone().with_neutrino_masses(vec![0.05, 0.1]).unwrap(), table()).unwrap();
        let first = Background::new(&base.clone().with_neutrino_masses(0.05).unwrap(), table()).unwrap();
        let second = Background::new(&base.with_neutrino_masses(0.1).unwrap(), table()).unwrap();

        for a in [0.01, 0.2, 1.0] {
            assert_relative_eq!(
                both.omega_nu_e2(a),
                first.omega_nu_e2(a) + second.omega_nu_e2(a),
                max_relative = 1e-14
            );
        }
    }

    #[test]
    fn test_massless_species_are_skipped() {
        let base = lcdm();
        let with_zero = Background::new(&base.clone().with_neutrino_masses(vec![0.0, 0.06]).unwrap(), table()).unwrap();
        let single = Background::new(&base.with_neutrino_masses(0.06).unwrap(), table()).unwrap();
        assert_eq!(with_zero.omega_nu_e2(0.5), single.omega_nu_e2(0.5));
    }

    #[test]
    fn test_neutrino_density_today() {
        // Ω_ν h² ≈ Σm / 93.14 eV for non-relativistic neutrinos
        let params = lcdm().with_neutrino_masses(0.06).unwrap();
        let bg = Background::new(&params, table()).unwrap();
        assert_relative_eq!(bg.omega_nu0() * 0.49, 0.06 / 93.14, max_relative = 0.01);
    }

    #[test]
    fn test_matter_fraction() {
        let params = lcdm();
        let bg = Background::new(&params, table()).unwrap();
        assert_relative_eq!(bg.omega_m(1.0), params.omega_cb0(), max_relative = 1e-15);
        // Deep in matter domination (radiation still small)
        assert!(bg.omega_m(0.01) > 0.95);
        assert!((bg.dlog_e_dlog_a(0.01) + 1.5).abs() < 0.05);
    }

    #[test]
    fn test_closure_violation_is_rejected() {
        let params = CosmologicalParameters::new(3.0, 0.96, 0.5, 0.1, 0.3).unwrap();
        let err = Background::new(&params, table()).unwrap_err();
        assert!(matches!(err, InvalidCosmologyError::NegativeDarkEnergyDensity { .. }));
    }

    #[test]
    fn test_scale_factor_redshift() {
        assert_eq!(scale_factor(0.0), 1.0);
        assert_eq!(scale_factor(1.0), 0.5);
        assert_relative_eq!(redshift(scale_factor(3.7)), 3.7, max_relative = 1e-14);
    }
}
