//! Statistical degeneracy tests for minimal sets.
//!
//! Two uncertain points are tested for identity with a 2-DOF chi-squared
//! statistic and a point is tested for incidence with an uncertain line with a
//! 1-DOF statistic (Förstner's conventions). A minimal set is rejected when any
//! two points of one view coincide, any three points of one view are
//! collinear, or, optionally, the orientation of the points differs between the
//! views.

use log::trace;
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

use crate::error::{DegeneracyKind, EstimationError, Result};
use crate::models::{UncertainLine, UncertainPoint};
use crate::projective::find_uncertain_line;
use crate::propagation::{divide_by_coordinate, select_divisor};
use crate::settings::DegeneracySettings;
use crate::types::{lit, max_abs, MinimalSet, Real, MINIMAL_SET_SIZE};
use crate::utils::{mahalanobis_squared, EXACT_TOLERANCE};

const PAIRS: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];
const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

/// Drops coordinate `index` of a normalized point.
fn reduce<T: Real>(
    point: &Vector3<T>,
    covariance: &Matrix3<T>,
    index: usize,
) -> (Vector2<T>, Matrix2<T>) {
    let keep: [usize; 2] = match index {
        0 => [1, 2],
        1 => [0, 2],
        _ => [0, 1],
    };
    let reduced = Vector2::new(point[keep[0]], point[keep[1]]);
    let reduced_covariance = Matrix2::from_fn(|r, c| covariance[(keep[r], keep[c])]);
    (reduced, reduced_covariance)
}

/// Statistic of the hypothesis `p1 ≡ p2`, chi-squared with 2 DOF.
///
/// Both points are divided by the same coordinate (`w` unless it is unstable
/// for `p1`) and the remaining two coordinates are compared. Small values mean
/// the points coincide.
pub fn compute_identity_statistic<T: Real>(p1: &UncertainPoint<T>, p2: &UncertainPoint<T>) -> T {
    let index = match select_divisor(&p1.point, 2).or_else(|_| select_divisor(&p2.point, 2)) {
        Ok(index) => index,
        Err(_) => return T::zero(),
    };
    let tiny = lit::<T>(EXACT_TOLERANCE);
    if p1.point[index].abs() <= tiny * max_abs(p1.point.as_slice())
        || p2.point[index].abs() <= tiny * max_abs(p2.point.as_slice())
    {
        return lit::<T>(f64::INFINITY);
    }

    let (x1, s1) = divide_by_coordinate(&p1.point, &p1.covariance, index);
    let (x2, s2) = divide_by_coordinate(&p2.point, &p2.covariance, index);
    let (a, sa) = reduce(&x1, &s1, index);
    let (b, sb) = reduce(&x2, &s2, index);

    let scale = max_abs(a.as_slice()).max(max_abs(b.as_slice())).max(T::one());
    mahalanobis_squared(&(a - b), &(sa + sb), scale)
}

/// Statistic of the hypothesis `point ∈ line`, chi-squared with 1 DOF.
///
/// `d = l^T x`, `σ² = l^T Σx l + x^T Σl x`; the point and the line are assumed
/// independent.
pub fn compute_incidence_statistic<T: Real>(point: &UncertainPoint<T>, line: &UncertainLine<T>) -> T {
    let x = &point.point;
    let l = &line.line;
    let d = l.dot(x);
    let variance = (l.transpose() * point.covariance * l)[(0, 0)]
        + (x.transpose() * line.covariance * x)[(0, 0)];

    if variance.is_finite() && variance > T::zero() {
        return d * d / variance;
    }
    if d.abs() <= lit::<T>(EXACT_TOLERANCE) * l.norm() * x.norm() {
        T::zero()
    } else {
        lit::<T>(f64::INFINITY)
    }
}

fn is_incident<T: Real>(
    a: &UncertainPoint<T>,
    b: &UncertainPoint<T>,
    third: &UncertainPoint<T>,
    incidence_threshold: T,
) -> bool {
    let line = find_uncertain_line(a, b);
    compute_incidence_statistic(third, &line) < incidence_threshold
}

// Each point of the triple against the line through the other two.
fn collinear_rotation<T: Real>(points: [&UncertainPoint<T>; 3], incidence_threshold: T) -> bool {
    let [p1, p2, p3] = points;
    is_incident(p1, p2, p3, incidence_threshold)
        || is_incident(p1, p3, p2, incidence_threshold)
        || is_incident(p2, p3, p1, incidence_threshold)
}

/// Whether three points are statistically collinear.
///
/// Identical pairs (identity statistic below `identity_threshold`) count as
/// collinear; otherwise the line through each pair is tested against the
/// remaining point.
pub fn are_three_points_collinear<T: Real>(
    p1: &UncertainPoint<T>,
    p2: &UncertainPoint<T>,
    p3: &UncertainPoint<T>,
    identity_threshold: T,
    incidence_threshold: T,
) -> bool {
    if compute_identity_statistic(p1, p2) < identity_threshold
        || compute_identity_statistic(p1, p3) < identity_threshold
        || compute_identity_statistic(p2, p3) < identity_threshold
    {
        return true;
    }
    collinear_rotation([p1, p2, p3], incidence_threshold)
}

/// Whether the orientation of the first three points differs between views.
///
/// Compares the sign of `det[u1 u2 u3]` with that of `det[v1 v2 v3]`, each
/// point scaled to `w > 0`. A homography preserving the set's orientation
/// keeps both signs equal.
pub fn is_minimal_set_flipped<T: Real>(minimal_set: &MinimalSet<T>) -> bool {
    let orientation = |view: usize| {
        let mut m = Matrix3::zeros();
        for (i, c) in minimal_set.iter().take(3).enumerate() {
            let p = if view == 0 { c.first } else { c.second };
            let p = if p.z < T::zero() { -p } else { p };
            m.set_column(i, &p);
        }
        m.determinant()
    };
    orientation(0) * orientation(1) < T::zero()
}

/// Explains why a minimal set is unusable.
///
/// Checks every pair for identity, then every triple for collinearity (each
/// view in turn), then the orientation when `settings.check_flip` is set.
pub fn diagnose_minimal_set<T: Real>(
    minimal_set: &MinimalSet<T>,
    settings: &DegeneracySettings,
) -> Result<()> {
    let identity_threshold = lit::<T>(settings.identity_threshold);
    let incidence_threshold = lit::<T>(settings.incidence_threshold);

    for view in 0..2 {
        let points: [UncertainPoint<T>; MINIMAL_SET_SIZE] =
            std::array::from_fn(|i| minimal_set[i].point(view));

        for [first, second] in PAIRS {
            if compute_identity_statistic(&points[first], &points[second]) < identity_threshold {
                trace!("points {first} and {second} coincide in view {view}");
                return Err(EstimationError::DegenerateInput(
                    DegeneracyKind::IdenticalPoints {
                        view,
                        first,
                        second,
                    },
                ));
            }
        }

        for indices in TRIPLES {
            let [a, b, c] = indices;
            if collinear_rotation([&points[a], &points[b], &points[c]], incidence_threshold) {
                trace!("points {indices:?} are collinear in view {view}");
                return Err(EstimationError::DegenerateInput(
                    DegeneracyKind::CollinearPoints { view, indices },
                ));
            }
        }
    }

    if settings.check_flip && is_minimal_set_flipped(minimal_set) {
        trace!("minimal set is flipped");
        return Err(EstimationError::DegenerateInput(DegeneracyKind::Flipped));
    }
    Ok(())
}

/// Returns `true` iff the minimal set is usable: no identical pairs, no
/// collinear triples in either view and, with `check_flip`, no flip.
pub fn verify_no_points_are_collinear<T: Real>(
    minimal_set: &MinimalSet<T>,
    identity_threshold: f64,
    incidence_threshold: f64,
    check_flip: bool,
) -> bool {
    let settings = DegeneracySettings {
        identity_threshold,
        incidence_threshold,
        check_flip,
    };
    diagnose_minimal_set(minimal_set, &settings).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Correspondence;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3 as M3;

    fn point(x: f64, y: f64, variance: f64) -> UncertainPoint<f64> {
        UncertainPoint::from_euclidean_covariance(
            Vector3::new(x, y, 1.0),
            &(Matrix2::identity() * variance),
        )
    }

    fn set_from(first: [(f64, f64); 4], second: [(f64, f64); 4]) -> MinimalSet<f64> {
        std::array::from_fn(|i| {
            Correspondence::new(
                Vector2::new(first[i].0, first[i].1),
                Matrix2::identity(),
                Vector2::new(second[i].0, second[i].1),
                Matrix2::identity(),
            )
        })
    }

    const SQUARE: [(f64, f64); 4] = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)];

    #[test]
    fn identity_statistic_is_scaled_squared_distance() {
        let stat = compute_identity_statistic(&point(0.0, 0.0, 1.0), &point(3.0, 4.0, 1.0));
        assert_relative_eq!(stat, 12.5, epsilon = 1e-12);

        let close = compute_identity_statistic(&point(0.0, 0.0, 1.0), &point(1.0, 1.0, 1.0));
        assert!(close < 5.99);
    }

    #[test]
    fn identity_statistic_ignores_homogeneous_scale() {
        let mut p2 = point(3.0, 4.0, 1.0);
        p2.point *= 2.0;
        p2.covariance *= 4.0;
        let stat = compute_identity_statistic(&point(0.0, 0.0, 1.0), &p2);
        assert_relative_eq!(stat, 12.5, epsilon = 1e-12);
    }

    #[test]
    fn exact_points_are_identical_or_infinitely_apart() {
        let a = UncertainPoint::exact(1.0_f64, 2.0);
        assert_eq!(compute_identity_statistic(&a, &a), 0.0);
        let b = UncertainPoint::exact(1.0, 2.5);
        assert!(compute_identity_statistic(&a, &b).is_infinite());
    }

    #[test]
    fn unit_offset_from_line_gives_unit_statistic() {
        let line = UncertainLine::new(Vector3::new(0.0, 1.0, 0.0), M3::zeros());
        let stat = compute_incidence_statistic(&point(0.0, 1.0, 1.0), &line);
        assert_relative_eq!(stat, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn exactly_collinear_points_have_zero_incidence() {
        let a = UncertainPoint::exact(0.0_f64, 0.0);
        let b = UncertainPoint::exact(2.0, 1.0);
        let c = UncertainPoint::exact(7.0, 3.5);
        let line = find_uncertain_line(&a, &b);
        assert!(compute_incidence_statistic(&c, &line).abs() < 1e-12);
        assert!(are_three_points_collinear(&a, &b, &c, 1e-6, 1e-6));
    }

    #[test]
    fn well_spread_triangle_is_not_collinear() {
        let a = point(0.0, 0.0, 1.0);
        let b = point(100.0, 0.0, 1.0);
        let c = point(50.0, 80.0, 1.0);
        assert!(!are_three_points_collinear(&a, &b, &c, 5.99, 3.84));
        let nearly = point(50.0, 1.0, 1.0);
        assert!(are_three_points_collinear(&a, &b, &nearly, 5.99, 3.84));
    }

    #[test]
    fn square_in_both_views_is_usable() {
        let set = set_from(SQUARE, SQUARE);
        assert!(verify_no_points_are_collinear(&set, 5.99, 3.84, true));
        assert!(diagnose_minimal_set(&set, &DegeneracySettings::default()).is_ok());
    }

    #[test]
    fn collinear_second_view_is_rejected() {
        let second = [(0.0, 0.0), (50.0, 0.0), (100.0, 0.5), (20.0, 100.0)];
        let set = set_from(SQUARE, second);
        assert!(!verify_no_points_are_collinear(&set, 5.99, 3.84, false));
        assert_eq!(
            diagnose_minimal_set(&set, &DegeneracySettings::default()),
            Err(EstimationError::DegenerateInput(
                DegeneracyKind::CollinearPoints {
                    view: 1,
                    indices: [0, 1, 2]
                }
            ))
        );
    }

    #[test]
    fn coincident_points_are_reported_before_collinearity() {
        let first = [(0.0, 0.0), (0.5, 0.5), (100.0, 100.0), (0.0, 100.0)];
        let set = set_from(first, SQUARE);
        assert_eq!(
            diagnose_minimal_set(&set, &DegeneracySettings::default()),
            Err(EstimationError::DegenerateInput(
                DegeneracyKind::IdenticalPoints {
                    view: 0,
                    first: 0,
                    second: 1
                }
            ))
        );
    }

    #[test]
    fn mirrored_view_is_flipped() {
        let mirrored = SQUARE.map(|(x, y)| (-x, y));
        let set = set_from(SQUARE, mirrored);
        assert!(is_minimal_set_flipped(&set));
        assert!(!verify_no_points_are_collinear(&set, 5.99, 3.84, true));
        assert!(verify_no_points_are_collinear(&set, 5.99, 3.84, false));
        assert!(!is_minimal_set_flipped(&set_from(SQUARE, SQUARE)));
    }
}
