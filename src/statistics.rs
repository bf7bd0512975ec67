//! Chi-squared quantiles used as decision thresholds.
//!
//! The table is produced by `build.rs`, which bisects the regularized lower
//! incomplete gamma function, so no special functions are evaluated at
//! runtime.

include!(concat!(env!("OUT_DIR"), "/chi2_quantiles.rs"));

/// Degrees of freedom of the point-identity test.
pub const IDENTITY_DOF: usize = 2;
/// Degrees of freedom of the point-line incidence test.
pub const INCIDENCE_DOF: usize = 1;
/// Degrees of freedom of the symmetric transfer residual.
pub const RESIDUAL_DOF: usize = 4;

/// Quantile of the chi-squared distribution with `dof` degrees of freedom.
///
/// Only the tabulated confidences (0.90, 0.95, 0.975, 0.99, 0.999) for
/// `dof` in `1..=4` are available; anything else yields `None`.
pub fn chi_squared_quantile(dof: usize, confidence: f64) -> Option<f64> {
    CHI_SQUARED_QUANTILES
        .iter()
        .find(|(d, c, _)| *d == dof && (c - confidence).abs() < 1e-9)
        .map(|&(_, _, q)| q)
}
