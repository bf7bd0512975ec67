//! ROC analysis of inlier classifiers.
//!
//! A classifier assigns every correspondence a statistic where larger values
//! make the inlier hypothesis less plausible (e.g. the residual test
//! statistic). Outliers are the positive class: a true positive is an outlier
//! whose statistic exceeds the threshold.

use crate::error::{EstimationError, Result};

/// One operating point of a classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocPoint {
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
    /// Correspondences with a statistic `>= threshold` are declared outliers.
    pub threshold: f64,
}

/// ROC curve from `(0, 0)` to `(1, 1)` with one point per distinct statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
}

impl RocCurve {
    /// Area under the curve by the trapezoidal rule.
    pub fn auc(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| {
                let dx = w[1].false_positive_rate - w[0].false_positive_rate;
                dx * (w[0].true_positive_rate + w[1].true_positive_rate) * 0.5
            })
            .sum()
    }
}

/// Sweeps the decision threshold over all observed statistics.
///
/// `is_inlier[i]` is the ground truth for `statistics[i]`. Both classes must
/// be present and no statistic may be NaN.
pub fn roc_curve(statistics: &[f64], is_inlier: &[bool]) -> Result<RocCurve> {
    if statistics.len() != is_inlier.len() {
        return Err(EstimationError::InvalidInput(format!(
            "{} statistics but {} labels",
            statistics.len(),
            is_inlier.len()
        )));
    }
    if statistics.iter().any(|s| s.is_nan()) {
        return Err(EstimationError::InvalidInput("statistic is NaN".into()));
    }
    let outliers = is_inlier.iter().filter(|&&inlier| !inlier).count();
    let inliers = is_inlier.len() - outliers;
    if outliers == 0 || inliers == 0 {
        return Err(EstimationError::InvalidInput(
            "both inliers and outliers are needed".into(),
        ));
    }

    let mut order: Vec<usize> = (0..statistics.len()).collect();
    order.sort_by(|&a, &b| statistics[b].total_cmp(&statistics[a]));

    let mut points = vec![RocPoint {
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
        threshold: f64::INFINITY,
    }];
    let (mut true_positives, mut false_positives) = (0usize, 0usize);
    for (rank, &i) in order.iter().enumerate() {
        if is_inlier[i] {
            false_positives += 1;
        } else {
            true_positives += 1;
        }
        let last_of_tie = order
            .get(rank + 1)
            .map_or(true, |&next| statistics[next] != statistics[i]);
        if last_of_tie {
            points.push(RocPoint {
                false_positive_rate: false_positives as f64 / inliers as f64,
                true_positive_rate: true_positives as f64 / outliers as f64,
                threshold: statistics[i],
            });
        }
    }
    Ok(RocCurve { points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const LABELS: [bool; 10] = [true, true, true, false, true, true, false, false, true, false];

    #[test]
    fn perfect_separation_has_unit_area() {
        let statistics = [0.1, 0.4, 0.35, 0.8, 0.2, 0.05, 0.9, 0.6, 0.3, 0.7];
        let curve = roc_curve(&statistics, &LABELS).unwrap();
        assert_relative_eq!(curve.auc(), 1.0);
        let first = curve.points[0];
        let last = *curve.points.last().unwrap();
        assert_eq!((first.false_positive_rate, first.true_positive_rate), (0.0, 0.0));
        assert_eq!((last.false_positive_rate, last.true_positive_rate), (1.0, 1.0));
    }

    #[test]
    fn area_counts_correctly_ordered_pairs() {
        let statistics = [0.05, 0.3, 0.25, 0.9, 0.15, 0.65, 0.35, 0.5, 0.45, 0.85];
        let curve = roc_curve(&statistics, &LABELS).unwrap();
        assert_relative_eq!(curve.auc(), 21.0 / 24.0, epsilon = 1e-12);
        assert!(curve
            .points
            .windows(2)
            .all(|w| w[0].threshold > w[1].threshold));
    }

    #[test]
    fn ties_share_one_operating_point() {
        let curve = roc_curve(&[1.0, 1.0, 2.0, f64::INFINITY], &[true, false, true, false]).unwrap();
        assert_eq!(curve.points.len(), 4);
        assert_relative_eq!(curve.auc(), 0.625);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(roc_curve(&[1.0], &[true, false]).is_err());
        assert!(roc_curve(&[1.0, 2.0], &[true, true]).is_err());
        assert!(roc_curve(&[f64::NAN, 2.0], &[true, false]).is_err());
    }
}
