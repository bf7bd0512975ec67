//! Monte Carlo check of first-order covariance propagation.
//!
//! Every trial perturbs all ground-truth correspondences with Gaussian noise,
//! re-estimates the homography from the configured minimal set and computes
//! the residual of every correspondence. The empirical covariance of those
//! residuals is compared against the covariance propagated analytically at the
//! noise-free correspondences.
//!
//! Trials run in parallel on the rayon pool. Each trial seeds its own `StdRng`
//! from the base seed and the trial index, and every worker folds into a
//! private accumulator that is merged at the end, so results do not depend on
//! scheduling beyond floating-point summation order.

use log::{debug, info, warn};
use nalgebra::{Matrix2, Matrix4, Vector2, Vector4};
use rand::prelude::*;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::error::{EstimationError, Result};
use crate::estimators::homography::gather_minimal_set;
use crate::models::Correspondence;
use crate::residuals::{compute_uncertain_homography, compute_uncertain_residuals};
use crate::scoring::compute_inlier_test_statistic;
use crate::settings::MonteCarloSettings;
use crate::types::MINIMAL_SET_SIZE;

/// Empirical against analytic residual covariance of one correspondence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonteCarloRow {
    pub index: usize,
    /// The homography was estimated from this correspondence, so its analytic
    /// covariance relies on the independence approximation.
    pub in_minimal_set: bool,
    pub empirical: Matrix4<f64>,
    pub analytic: Matrix4<f64>,
    /// `‖empirical - analytic‖_F`.
    pub discrepancy: f64,
    /// `discrepancy / ‖analytic‖_F`.
    pub relative_discrepancy: f64,
}

/// A residual whose test statistic exceeded the verbose threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LargeResidual {
    pub trial: usize,
    pub index: usize,
    pub residual: Vector4<f64>,
    pub statistic: f64,
}

/// Outcome of a Monte Carlo run.
#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloReport {
    pub rows: Vec<MonteCarloRow>,
    /// Trials that contributed to the empirical covariances.
    pub trials: usize,
    /// Trials whose noisy minimal set could not be solved.
    pub failed_trials: usize,
    /// Only filled in verbose mode.
    pub large_residuals: Vec<LargeResidual>,
}

impl MonteCarloReport {
    /// Sum of the discrepancies of correspondences outside the minimal set.
    pub fn total_discrepancy(&self) -> f64 {
        self.rows
            .iter()
            .filter(|row| !row.in_minimal_set)
            .map(|row| row.discrepancy)
            .sum()
    }
}

/// Running mean and scatter of one residual (Welford, merged with Chan et al.).
#[derive(Debug, Clone, Copy)]
struct RunningCovariance {
    count: usize,
    mean: Vector4<f64>,
    scatter: Matrix4<f64>,
}

impl RunningCovariance {
    fn new() -> Self {
        Self {
            count: 0,
            mean: Vector4::zeros(),
            scatter: Matrix4::zeros(),
        }
    }

    fn push(&mut self, x: &Vector4<f64>) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta_after = x - self.mean;
        self.scatter += delta * delta_after.transpose();
    }

    fn merge(self, other: Self) -> Self {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }
        let count = self.count + other.count;
        let (na, nb) = (self.count as f64, other.count as f64);
        let delta = other.mean - self.mean;
        Self {
            count,
            mean: self.mean + delta * (nb / count as f64),
            scatter: self.scatter + other.scatter + delta * delta.transpose() * (na * nb / count as f64),
        }
    }

    fn covariance(&self) -> Matrix4<f64> {
        if self.count < 2 {
            return Matrix4::zeros();
        }
        let covariance = self.scatter / (self.count - 1) as f64;
        (covariance + covariance.transpose()) * 0.5
    }
}

/// Per-worker partial result.
#[derive(Debug, Clone)]
struct Accumulator {
    residuals: Vec<RunningCovariance>,
    failed: usize,
    large: Vec<LargeResidual>,
}

impl Accumulator {
    fn new(len: usize) -> Self {
        Self {
            residuals: vec![RunningCovariance::new(); len],
            failed: 0,
            large: Vec::new(),
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.residuals = self
            .residuals
            .into_iter()
            .zip(other.residuals)
            .map(|(a, b)| a.merge(b))
            .collect();
        self.failed += other.failed;
        self.large.extend(other.large);
        self
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn trial_rng(seed: u64, trial: usize) -> StdRng {
    StdRng::seed_from_u64(splitmix64(seed ^ (trial as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)))
}

/// Symmetric square root of a PSD 2x2 covariance, so that `L z` with standard
/// normal `z` has covariance `Σ`. Zero eigenvalues are allowed.
fn noise_factor(covariance: &Matrix2<f64>) -> Result<Matrix2<f64>> {
    let invalid = |reason: &str| EstimationError::InvalidInput(format!("noise covariance {reason}"));
    if !covariance.iter().all(|v| v.is_finite()) {
        return Err(invalid("is not finite"));
    }
    let scale = covariance.abs().max().max(f64::MIN_POSITIVE);
    if (covariance - covariance.transpose()).abs().max() > 1e-12 * scale {
        return Err(invalid("is not symmetric"));
    }
    let eigen = covariance.symmetric_eigen();
    if eigen.eigenvalues.iter().any(|&e| e < -1e-12 * scale) {
        return Err(invalid("is not positive semi-definite"));
    }
    let roots = Matrix2::from_diagonal(&eigen.eigenvalues.map(|e| e.max(0.0).sqrt()));
    Ok(eigen.eigenvectors * roots * eigen.eigenvectors.transpose())
}

fn perturb(
    truth: &[Correspondence<f64>],
    factor: &Matrix2<f64>,
    rng: &mut StdRng,
) -> Vec<Correspondence<f64>> {
    let draw = |rng: &mut StdRng| {
        let z = Vector2::new(rng.sample::<f64, _>(StandardNormal), rng.sample::<f64, _>(StandardNormal));
        factor * z
    };
    truth
        .iter()
        .map(|c| {
            let mut noisy = *c;
            let du = draw(rng);
            let dv = draw(rng);
            noisy.first.x += du.x;
            noisy.first.y += du.y;
            noisy.second.x += dv.x;
            noisy.second.y += dv.y;
            noisy
        })
        .collect()
}

fn validate(truth: &[Correspondence<f64>], settings: &MonteCarloSettings) -> Result<()> {
    if truth.len() < MINIMAL_SET_SIZE {
        return Err(EstimationError::TooFewCorrespondences {
            needed: MINIMAL_SET_SIZE,
            got: truth.len(),
        });
    }
    if settings.trials < 2 {
        return Err(EstimationError::InvalidInput(format!(
            "at least 2 trials are needed, got {}",
            settings.trials
        )));
    }
    let set = &settings.minimal_set;
    for i in 0..MINIMAL_SET_SIZE {
        if set[(i + 1)..].contains(&set[i]) {
            return Err(EstimationError::InvalidInput(format!(
                "minimal set {set:?} repeats index {}",
                set[i]
            )));
        }
    }
    Ok(())
}

/// Compares empirical and propagated residual covariances.
///
/// The covariances stored in `truth` are ignored: every point is assigned
/// `settings.noise_covariance`, which is also the covariance of the injected
/// noise. The analytic covariance is propagated at the noise-free data.
pub fn monte_carlo_cov_residuals(
    truth: &[Correspondence<f64>],
    settings: &MonteCarloSettings,
) -> Result<MonteCarloReport> {
    validate(truth, settings)?;
    let factor = noise_factor(&settings.noise_covariance)?;
    let noise = settings.noise_covariance;

    let truth: Vec<Correspondence<f64>> = truth
        .iter()
        .map(|c| c.with_covariances(noise, noise))
        .collect();
    let minimal_set = gather_minimal_set(&truth, &settings.minimal_set)?;
    let homography = compute_uncertain_homography(&minimal_set)?;
    let analytic = compute_uncertain_residuals(&homography, &truth)?;

    debug!(
        "running {} Monte Carlo trials over {} correspondences",
        settings.trials,
        truth.len()
    );

    let accumulated = (0..settings.trials)
        .into_par_iter()
        .fold(
            || Accumulator::new(truth.len()),
            |mut acc, trial| {
                let mut rng = trial_rng(settings.seed, trial);
                let noisy = perturb(&truth, &factor, &mut rng);
                let residuals = gather_minimal_set(&noisy, &settings.minimal_set)
                    .and_then(|set| compute_uncertain_homography(&set))
                    .and_then(|h| compute_uncertain_residuals(&h, &noisy));
                let residuals = match residuals {
                    Ok(residuals) => residuals,
                    Err(e) => {
                        debug!("trial {trial} failed: {e}");
                        acc.failed += 1;
                        return acc;
                    }
                };
                for (index, residual) in residuals.iter().enumerate() {
                    acc.residuals[index].push(&residual.residual);
                    if settings.verbose && !settings.minimal_set.contains(&index) {
                        let statistic = compute_inlier_test_statistic(residual);
                        if statistic > settings.verbose_threshold {
                            warn!(
                                "trial {trial}: correspondence {index} has a large residual (statistic {statistic:.2})"
                            );
                            acc.large.push(LargeResidual {
                                trial,
                                index,
                                residual: residual.residual,
                                statistic,
                            });
                        }
                    }
                }
                acc
            },
        )
        .reduce(|| Accumulator::new(truth.len()), Accumulator::merge);

    if accumulated.failed > 0 {
        warn!(
            "{} of {} Monte Carlo trials failed",
            accumulated.failed, settings.trials
        );
    }

    let rows = analytic
        .iter()
        .zip(&accumulated.residuals)
        .enumerate()
        .map(|(index, (analytic, running))| {
            let empirical = running.covariance();
            let discrepancy = (empirical - analytic.covariance).norm();
            let analytic_norm = analytic.covariance.norm();
            let relative_discrepancy = if analytic_norm > 0.0 {
                discrepancy / analytic_norm
            } else if discrepancy == 0.0 {
                0.0
            } else {
                f64::INFINITY
            };
            MonteCarloRow {
                index,
                in_minimal_set: settings.minimal_set.contains(&index),
                empirical,
                analytic: analytic.covariance,
                discrepancy,
                relative_discrepancy,
            }
        })
        .collect();

    let mut large_residuals = accumulated.large;
    large_residuals.sort_by_key(|r| (r.trial, r.index));

    Ok(MonteCarloReport {
        rows,
        trials: settings.trials - accumulated.failed,
        failed_trials: accumulated.failed,
        large_residuals,
    })
}

/// Runs [`monte_carlo_cov_residuals`] once per noise scale, multiplying the
/// base noise covariance by each factor. The seed is shared, so the runs see
/// the same standard normal draws.
pub fn run_monte_carlo_sweep(
    truth: &[Correspondence<f64>],
    settings: &MonteCarloSettings,
    factors: &[f64],
) -> Result<Vec<MonteCarloReport>> {
    factors
        .iter()
        .map(|&factor| {
            let report = monte_carlo_cov_residuals(truth, &settings.with_noise_scale(factor))?;
            info!(
                "noise scale {factor}: total discrepancy {:.3e} over {} trials",
                report.total_discrepancy(),
                report.trials
            );
            Ok(report)
        })
        .collect()
}
