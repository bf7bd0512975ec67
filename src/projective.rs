//! Projective-plane helpers: cross products as matrices and lines through
//! uncertain points.

use nalgebra::{Matrix3, Vector3};

use crate::models::{UncertainLine, UncertainPoint};
use crate::propagation::symmetrize;
use crate::types::Real;

/// Skew-symmetric `S_x` such that `x × y = S_x y`.
pub fn get_skew_symmetric_matrix_for_cross_product<T: Real>(x: &Vector3<T>) -> Matrix3<T> {
    Matrix3::new(
        T::zero(),
        -x.z,
        x.y,
        x.z,
        T::zero(),
        -x.x,
        -x.y,
        x.x,
        T::zero(),
    )
}

/// Line joining two independent uncertain points, `l = p1 × p2`.
///
/// `Σl = S(p2) Σ1 S(p2)^T + S(p1) Σ2 S(p1)^T`. The result is not
/// spherically normalized.
pub fn find_uncertain_line<T: Real>(
    p1: &UncertainPoint<T>,
    p2: &UncertainPoint<T>,
) -> UncertainLine<T> {
    let s1 = get_skew_symmetric_matrix_for_cross_product(&p1.point);
    let s2 = get_skew_symmetric_matrix_for_cross_product(&p2.point);
    let line = s1 * p2.point;
    let covariance = s2 * p1.covariance * s2.transpose() + s1 * p2.covariance * s1.transpose();
    UncertainLine::new(line, symmetrize(&covariance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix2;

    #[test]
    fn skew_matrix_reproduces_cross_product() {
        let x = Vector3::new(1.5, -2.0, 0.25);
        let y = Vector3::new(-0.5, 4.0, 3.0);
        let s = get_skew_symmetric_matrix_for_cross_product(&x);
        assert_relative_eq!(s * y, x.cross(&y), epsilon = 1e-14);
        assert_eq!(s, -s.transpose());
    }

    #[test]
    fn line_through_x_axis_points_is_canonical() {
        let sigma = Matrix2::identity();
        let p1 = UncertainPoint::from_euclidean_covariance(Vector3::new(1.0_f64, 0.0, 1.0), &sigma);
        let p2 = UncertainPoint::from_euclidean_covariance(Vector3::new(5.0, 0.0, 1.0), &sigma);
        let l = find_uncertain_line(&p1, &p2).normalized().unwrap();
        let canonical = Vector3::new(0.0, 1.0, 0.0);
        assert_relative_eq!(l.line.dot(&canonical).abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn line_covariance_matches_numeric_jacobian() {
        let p1 = UncertainPoint::from_euclidean_covariance(
            Vector3::new(3.0, 1.0, 1.0),
            &Matrix2::new(0.4, 0.1, 0.1, 0.3),
        );
        let p2 = UncertainPoint::from_euclidean_covariance(
            Vector3::new(-2.0, 6.0, 1.0),
            &Matrix2::new(1.0, -0.2, -0.2, 0.7),
        );
        let line = find_uncertain_line(&p1, &p2);

        // The map is bilinear, so central differences are exact up to round-off.
        let step = 1e-3;
        let mut j1 = Matrix3::zeros();
        let mut j2 = Matrix3::zeros();
        for k in 0..3 {
            let mut e = Vector3::zeros();
            e[k] = step;
            let d1 = (p1.point + e).cross(&p2.point) - (p1.point - e).cross(&p2.point);
            let d2 = p1.point.cross(&(p2.point + e)) - p1.point.cross(&(p2.point - e));
            j1.set_column(k, &(d1 / (2.0 * step)));
            j2.set_column(k, &(d2 / (2.0 * step)));
        }
        let expected = j1 * p1.covariance * j1.transpose() + j2 * p2.covariance * j2.transpose();
        assert_relative_eq!(line.covariance, expected, epsilon = 1e-9);
    }
}
