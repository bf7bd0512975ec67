//! Configuration types for the estimation primitives.
//!
//! Thresholds default to the 95% chi-squared quantiles of the corresponding
//! test; `from_confidence` picks another tabulated confidence level.

use nalgebra::Matrix2;

use crate::error::{EstimationError, Result};
use crate::statistics::{chi_squared_quantile, IDENTITY_DOF, INCIDENCE_DOF, RESIDUAL_DOF};
use crate::types::MINIMAL_SET_SIZE;

fn quantile(dof: usize, confidence: f64) -> Result<f64> {
    chi_squared_quantile(dof, confidence).ok_or_else(|| {
        EstimationError::InvalidInput(format!(
            "no chi-squared quantile for {dof} degrees of freedom at confidence {confidence}"
        ))
    })
}

/// Thresholds of the minimal-set degeneracy tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegeneracySettings {
    /// Point-identity threshold (chi-squared, 2 DOF). Pairs below it coincide.
    pub identity_threshold: f64,
    /// Point-line incidence threshold (chi-squared, 1 DOF). Triples below it
    /// are collinear.
    pub incidence_threshold: f64,
    /// Also reject sets whose orientation differs between the views.
    pub check_flip: bool,
}

impl Default for DegeneracySettings {
    fn default() -> Self {
        Self {
            identity_threshold: 5.99,
            incidence_threshold: 3.84,
            check_flip: true,
        }
    }
}

impl DegeneracySettings {
    pub fn from_confidence(confidence: f64) -> Result<Self> {
        Ok(Self {
            identity_threshold: quantile(IDENTITY_DOF, confidence)?,
            incidence_threshold: quantile(INCIDENCE_DOF, confidence)?,
            ..Self::default()
        })
    }
}

/// Threshold of the residual hypothesis test (chi-squared, 4 DOF).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InlierSettings {
    pub threshold: f64,
}

impl Default for InlierSettings {
    fn default() -> Self {
        Self { threshold: 9.49 }
    }
}

impl InlierSettings {
    pub fn from_confidence(confidence: f64) -> Result<Self> {
        Ok(Self {
            threshold: quantile(RESIDUAL_DOF, confidence)?,
        })
    }
}

/// Budget for drawing a usable minimal set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingSettings {
    /// Samples drawn before giving up.
    pub max_attempts: usize,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self { max_attempts: 100 }
    }
}

/// Settings of the Monte Carlo validator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonteCarloSettings {
    /// Number of noisy trials.
    pub trials: usize,
    /// Covariance of the Gaussian noise added to every point.
    pub noise_covariance: Matrix2<f64>,
    /// Correspondences the homography is estimated from.
    pub minimal_set: [usize; MINIMAL_SET_SIZE],
    /// Base seed of the per-trial random streams.
    pub seed: u64,
    /// Report residuals whose statistic exceeds `verbose_threshold`.
    pub verbose: bool,
    pub verbose_threshold: f64,
}

impl Default for MonteCarloSettings {
    fn default() -> Self {
        Self {
            trials: 1000,
            noise_covariance: Matrix2::identity(),
            minimal_set: [0, 1, 2, 3],
            seed: 0,
            verbose: false,
            verbose_threshold: 18.47,
        }
    }
}

impl MonteCarloSettings {
    /// Same settings with the noise covariance scaled by `factor`.
    pub fn with_noise_scale(self, factor: f64) -> Self {
        Self {
            noise_covariance: self.noise_covariance * factor,
            ..self
        }
    }
}
