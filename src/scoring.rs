//! Inlier classification by a Mahalanobis hypothesis test.
//!
//! Under the null hypothesis "the correspondence is an inlier" the residual is
//! zero-mean Gaussian with the propagated covariance, so `r^T Σr^-1 r` follows
//! a chi-squared distribution with 4 degrees of freedom. The test accepts the
//! inlier hypothesis when the statistic does not exceed the threshold (9.49 at
//! 95% confidence).

use std::cmp::Ordering;

use crate::core::Scoring;
use crate::error::{EstimationError, Result};
use crate::models::{Correspondence, UncertainHomography, UncertainResidual};
use crate::residuals::compute_uncertain_residual;
use crate::settings::InlierSettings;
use crate::types::{lit, Real};
use crate::utils::mahalanobis_squared;

/// `r^T Σr^-1 r`.
///
/// A singular covariance gives zero for a vanishing residual and infinity
/// otherwise (per exactly known direction).
pub fn compute_inlier_test_statistic<T: Real>(residual: &UncertainResidual<T>) -> T {
    mahalanobis_squared(&residual.residual, &residual.covariance, T::one())
}

/// Test statistic of every residual, in order.
pub fn compute_inlier_statistics<T: Real>(residuals: &[UncertainResidual<T>]) -> Vec<T> {
    residuals.iter().map(compute_inlier_test_statistic).collect()
}

/// `true` where the inlier hypothesis is not rejected (`statistic <= threshold`).
pub fn compute_inlier_mask<T: Real>(residuals: &[UncertainResidual<T>], threshold: T) -> Vec<bool> {
    residuals
        .iter()
        .map(|r| compute_inlier_test_statistic(r) <= threshold)
        .collect()
}

/// Quality of a model: more inliers is better; on ties a smaller sum of
/// inlier statistics is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score<T: Real> {
    pub inlier_count: usize,
    pub statistic_sum: T,
}

impl<T: Real> Score<T> {
    pub fn new(inlier_count: usize, statistic_sum: T) -> Self {
        Self {
            inlier_count,
            statistic_sum,
        }
    }
}

impl<T: Real> PartialOrd for Score<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.inlier_count.cmp(&other.inlier_count) {
            Ordering::Equal => other.statistic_sum.partial_cmp(&self.statistic_sum),
            ordering => Some(ordering),
        }
    }
}

/// Scores an uncertain homography by counting correspondences that pass the
/// residual test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MahalanobisScoring {
    threshold: f64,
}

impl Default for MahalanobisScoring {
    fn default() -> Self {
        Self::new(InlierSettings::default())
    }
}

impl MahalanobisScoring {
    pub fn new(settings: InlierSettings) -> Self {
        Self {
            threshold: settings.threshold,
        }
    }
}

impl<T: Real> Scoring<T, UncertainHomography<T>> for MahalanobisScoring {
    type Score = Score<T>;

    fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Correspondences transferred to infinity count as outliers; a singular
    /// homography is an error.
    fn score(
        &self,
        data: &[Correspondence<T>],
        model: &UncertainHomography<T>,
        inliers_out: &mut Vec<usize>,
    ) -> Result<Self::Score> {
        model.inverse()?;
        let threshold = lit::<T>(self.threshold);
        inliers_out.clear();

        let mut statistic_sum = T::zero();
        for (i, correspondence) in data.iter().enumerate() {
            let statistic = match compute_uncertain_residual(model, correspondence) {
                Ok(residual) => compute_inlier_test_statistic(&residual),
                Err(EstimationError::SingularSolve) => continue,
                Err(e) => return Err(e),
            };
            if statistic <= threshold {
                inliers_out.push(i);
                statistic_sum += statistic;
            }
        }
        Ok(Score::new(inliers_out.len(), statistic_sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::residuals::{compute_uncertain_homography, compute_uncertain_residuals};
    use crate::types::MinimalSet;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix2, Matrix3, Matrix4, Vector2, Vector3, Vector4};

    fn truth() -> Matrix3<f64> {
        Matrix3::new(
            0.9, -0.12, 30.0, //
            0.08, 1.1, -12.0, //
            1.5e-4, -2.0e-4, 1.0,
        )
    }

    fn exact(p: Vector2<f64>) -> Correspondence<f64> {
        let q = truth() * Vector3::new(p.x, p.y, 1.0);
        Correspondence::new(p, Matrix2::identity(), q.xy() / q.z, Matrix2::identity())
    }

    fn scene() -> (UncertainHomography<f64>, Vec<Correspondence<f64>>) {
        let minimal_set: MinimalSet<f64> = [
            Vector2::new(100.0, 120.0),
            Vector2::new(620.0, 90.0),
            Vector2::new(580.0, 450.0),
            Vector2::new(130.0, 400.0),
        ]
        .map(exact);
        let homography = compute_uncertain_homography(&minimal_set).unwrap();

        let mut data = minimal_set.to_vec();
        for (x, y) in [(300.0, 250.0), (50.0, 50.0), (700.0, 500.0), (400.0, 100.0)] {
            data.push(exact(Vector2::new(x, y)));
        }
        let mut outlier = exact(Vector2::new(350.0, 300.0));
        outlier.second.x += 50.0;
        data.push(outlier);
        (homography, data)
    }

    #[test]
    fn statistic_is_the_mahalanobis_distance() {
        let residual = UncertainResidual::new(
            Vector4::new(1.0, 2.0, 0.0, 3.0),
            Matrix4::from_diagonal(&Vector4::new(1.0, 4.0, 1.0, 9.0)),
        );
        assert_relative_eq!(compute_inlier_test_statistic(&residual), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn noise_free_correspondences_are_inliers_and_gross_error_is_not() {
        let (homography, data) = scene();
        let residuals = compute_uncertain_residuals(&homography, &data).unwrap();
        let statistics = compute_inlier_statistics(&residuals);
        let mask = compute_inlier_mask(&residuals, 9.49);

        assert!(mask[..data.len() - 1].iter().all(|&inlier| inlier));
        assert!(!mask[data.len() - 1]);
        assert!(statistics[data.len() - 1] > 100.0);
    }

    #[test]
    fn scoring_collects_inlier_indices() {
        let (homography, data) = scene();
        let scoring = MahalanobisScoring::default();
        let mut inliers = Vec::new();
        let score = scoring.score(&data, &homography, &mut inliers).unwrap();
        assert_eq!(score.inlier_count, data.len() - 1);
        assert_eq!(inliers, (0..data.len() - 1).collect::<Vec<_>>());
        assert!(score.statistic_sum < 1e-6);
    }

    #[test]
    fn scores_order_by_count_then_statistic() {
        assert!(Score::new(5, 10.0) > Score::new(4, 0.0));
        assert!(Score::new(5, 1.0) > Score::new(5, 2.0));
        assert_eq!(
            Score::new(3, 1.0).partial_cmp(&Score::new(3, 1.0)),
            Some(Ordering::Equal)
        );
    }
}
