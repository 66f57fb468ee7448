/// Speed of light in km/s
pub const C0: f64 = 2.99792458e5;

/// Photon density today times h^2 (T_cmb = 2.7255 K)
pub const OMEGA_GAMMA_H2: f64 = 2.469e-5;

/// Boltzmann constant in eV / K
pub const K_B: f64 = 8.617342e-5;

/// CMB temperature today in K
pub const T_CMB: f64 = 2.7255;

/// Neutrino temperature today in K. The 0.71611 factor is slightly above
/// (4/11)^(1/3) to account for non-instantaneous decoupling.
pub const T_NU: f64 = 0.71611 * T_CMB;

/// Effective number of relativistic species
pub const N_EFF: f64 = 3.044;

/// Baryon-to-photon momentum density ratio coefficient: R(z) = R_COEFF * omega_b / (1 + z)
pub const BARYON_PHOTON_RATIO_COEFF: f64 = 3.0328e4;

/// Redshift of the baryon drag epoch used when none is given
pub const DEFAULT_Z_DRAG: f64 = 1060.0;
