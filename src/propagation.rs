//! First-order covariance propagation and normalization of homogeneous
//! entities.
//!
//! For `y = f(x)` with `Cov(x) = Σx`, the linearized covariance of `y` is
//! `J Σx J^T` where `J = ∂f/∂x`. Results are symmetrized to remove round-off.

use log::debug;
use nalgebra::{DMatrix, SMatrix, SVector};

use crate::error::{EstimationError, Result};
use crate::types::{lit, max_abs, Matrix16, MinimalSet, Real, MINIMAL_SET_SIZE};

/// Relative magnitude below which a coordinate is not used as a divisor.
const UNSTABLE_DIVISOR_RATIO: f64 = 1e-8;

/// `Σf = J Σx J^T`, with shapes checked at compile time.
pub fn propagate_the_covariance<T: Real, const M: usize, const N: usize>(
    jacobian: &SMatrix<T, M, N>,
    covariance: &SMatrix<T, N, N>,
) -> SMatrix<T, M, M> {
    symmetrize(&(jacobian * covariance * jacobian.transpose()))
}

/// Runtime-checked variant of [`propagate_the_covariance`].
pub fn propagate_the_covariance_dyn<T: Real>(
    jacobian: &DMatrix<T>,
    covariance: &DMatrix<T>,
) -> Result<DMatrix<T>> {
    if !covariance.is_square() {
        return Err(EstimationError::DimensionMismatch {
            expected: covariance.nrows(),
            actual: covariance.ncols(),
        });
    }
    if jacobian.ncols() != covariance.nrows() {
        return Err(EstimationError::DimensionMismatch {
            expected: covariance.nrows(),
            actual: jacobian.ncols(),
        });
    }
    let propagated = jacobian * covariance * jacobian.transpose();
    Ok((&propagated + propagated.transpose()) * lit::<T>(0.5))
}

/// `(M + M^T) / 2`.
pub fn symmetrize<T: Real, const N: usize>(matrix: &SMatrix<T, N, N>) -> SMatrix<T, N, N> {
    (matrix + matrix.transpose()) * lit::<T>(0.5)
}

/// Places square blocks along the diagonal of a zero matrix.
pub fn small_block_diagonal<T: Real>(blocks: &[DMatrix<T>]) -> Result<DMatrix<T>> {
    let mut size = 0;
    for block in blocks {
        if !block.is_square() {
            return Err(EstimationError::DimensionMismatch {
                expected: block.nrows(),
                actual: block.ncols(),
            });
        }
        size += block.nrows();
    }

    let mut out = DMatrix::zeros(size, size);
    let mut offset = 0;
    for block in blocks {
        let n = block.nrows();
        out.view_mut((offset, offset), (n, n)).copy_from(block);
        offset += n;
    }
    Ok(out)
}

/// 16x16 block-diagonal covariance of a minimal set, in the same order as
/// [`crate::estimators::homography::flatten_minimal_set`].
pub fn minimal_set_covariance<T: Real>(minimal_set: &MinimalSet<T>) -> Matrix16<T> {
    let mut covariance = Matrix16::zeros();
    for (i, c) in minimal_set.iter().enumerate() {
        covariance
            .fixed_view_mut::<2, 2>(2 * i, 2 * i)
            .copy_from(&c.first_covariance);
        let j = 2 * (MINIMAL_SET_SIZE + i);
        covariance
            .fixed_view_mut::<2, 2>(j, j)
            .copy_from(&c.second_covariance);
    }
    covariance
}

/// Scales a homogeneous vector onto the unit sphere and propagates its
/// covariance through `J = (I - x̂ x̂^T) / |x|`.
pub fn normalize_onto_unit_sphere<T: Real, const N: usize>(
    elements: &SVector<T, N>,
    covariance: &SMatrix<T, N, N>,
) -> Result<(SVector<T, N>, SMatrix<T, N, N>)> {
    let norm = elements.norm();
    if !norm.is_finite() || norm <= lit::<T>(f64::MIN_POSITIVE) {
        return Err(EstimationError::SingularSolve);
    }
    let unit = elements / norm;
    let jacobian = (SMatrix::<T, N, N>::identity() - unit * unit.transpose()) / norm;
    Ok((unit, propagate_the_covariance(&jacobian, covariance)))
}

/// Result of dividing a homogeneous vector by one of its coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateNormalization<T: Real, const N: usize> {
    /// Scaled vector; `elements[index] == 1`.
    pub elements: SVector<T, N>,
    /// Propagated covariance; row and column `index` are zero.
    pub covariance: SMatrix<T, N, N>,
    /// Coordinate actually used as the divisor.
    pub index: usize,
}

/// Divides `elements` by the coordinate at `preferred`.
///
/// When that coordinate is too small relative to the largest one, the
/// largest-magnitude coordinate is used instead (lowest index on ties). Fails
/// with [`EstimationError::SingularSolve`] when every coordinate vanishes.
pub fn normalize_by_coordinate<T: Real, const N: usize>(
    elements: &SVector<T, N>,
    covariance: &SMatrix<T, N, N>,
    preferred: usize,
) -> Result<CoordinateNormalization<T, N>> {
    if preferred >= N {
        return Err(EstimationError::DimensionMismatch {
            expected: N,
            actual: preferred + 1,
        });
    }
    let index = select_divisor(elements, preferred)?;
    if index != preferred {
        debug!("coordinate {preferred} is unstable as a divisor, scaling by coordinate {index}");
    }

    let (scaled, propagated) = divide_by_coordinate(elements, covariance, index);
    Ok(CoordinateNormalization {
        elements: scaled,
        covariance: propagated,
        index,
    })
}

/// Divides by `elements[index]` (assumed non-zero) with `J = (I - y e_k^T) / x_k`.
pub(crate) fn divide_by_coordinate<T: Real, const N: usize>(
    elements: &SVector<T, N>,
    covariance: &SMatrix<T, N, N>,
    index: usize,
) -> (SVector<T, N>, SMatrix<T, N, N>) {
    let divisor = elements[index];
    let mut scaled = elements / divisor;
    scaled[index] = T::one();

    let mut jacobian = SMatrix::<T, N, N>::identity();
    for i in 0..N {
        jacobian[(i, index)] -= scaled[i];
    }
    let jacobian = jacobian / divisor;

    let mut propagated = propagate_the_covariance(&jacobian, covariance);
    for i in 0..N {
        propagated[(index, i)] = T::zero();
        propagated[(i, index)] = T::zero();
    }
    (scaled, propagated)
}

/// Picks the divisor coordinate for [`normalize_by_coordinate`].
pub(crate) fn select_divisor<T: Real, const N: usize>(
    elements: &SVector<T, N>,
    preferred: usize,
) -> Result<usize> {
    let largest = max_abs(elements.as_slice());
    if !largest.is_finite() || largest <= lit::<T>(f64::MIN_POSITIVE) {
        return Err(EstimationError::SingularSolve);
    }
    if elements[preferred].abs() > largest * lit::<T>(UNSTABLE_DIVISOR_RATIO) {
        return Ok(preferred);
    }
    let mut best = 0;
    for i in 1..N {
        if elements[i].abs() > elements[best].abs() {
            best = i;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Correspondence;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix2, Matrix3, SMatrix, Vector2, Vector3};
    use rand::{Rng, SeedableRng};

    fn random_matrix<const R: usize, const C: usize>(rng: &mut impl Rng) -> SMatrix<f64, R, C> {
        SMatrix::<f64, R, C>::from_fn(|_, _| rng.gen_range(-2.0..2.0))
    }

    fn random_covariance<const N: usize>(rng: &mut impl Rng) -> SMatrix<f64, N, N> {
        let a = random_matrix::<N, N>(rng);
        a * a.transpose()
    }

    #[test]
    fn identity_jacobian_preserves_covariance() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let sigma = random_covariance::<5>(&mut rng);
        let out = propagate_the_covariance(&SMatrix::<f64, 5, 5>::identity(), &sigma);
        assert_relative_eq!(out, sigma, epsilon = 1e-12);
    }

    #[test]
    fn propagated_covariance_is_symmetric_psd() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let j = random_matrix::<3, 6>(&mut rng);
            let sigma = random_covariance::<6>(&mut rng);
            let out = propagate_the_covariance(&j, &sigma);
            assert_eq!(out, out.transpose());
            let eigen = out.symmetric_eigen();
            assert!(eigen.eigenvalues.iter().all(|&l| l > -1e-9));
        }
    }

    #[test]
    fn dynamic_propagation_checks_shapes() {
        let j = DMatrix::<f64>::identity(2, 3);
        let sigma = DMatrix::<f64>::identity(2, 2);
        assert_eq!(
            propagate_the_covariance_dyn(&j, &sigma),
            Err(EstimationError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
        let not_square = DMatrix::<f64>::zeros(3, 2);
        assert!(propagate_the_covariance_dyn(&j, &not_square).is_err());

        let sigma = DMatrix::<f64>::from_diagonal_element(3, 3, 2.0);
        let out = propagate_the_covariance_dyn(&j, &sigma).unwrap();
        assert_eq!(out, DMatrix::from_diagonal_element(2, 2, 2.0));
    }

    #[test]
    fn block_diagonal_rejects_non_square_blocks() {
        let blocks = [DMatrix::<f64>::identity(2, 2), DMatrix::<f64>::zeros(1, 2)];
        assert!(matches!(
            small_block_diagonal(&blocks),
            Err(EstimationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn block_diagonal_places_blocks() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 5.0]);
        let b = DMatrix::from_row_slice(1, 1, &[7.0]);
        let out = small_block_diagonal(&[a, b]).unwrap();
        assert_eq!(out.shape(), (3, 3));
        assert_eq!(out[(1, 0)], 2.0);
        assert_eq!(out[(2, 2)], 7.0);
        assert_eq!(out[(2, 0)], 0.0);
    }

    #[test]
    fn minimal_set_covariance_follows_flattening_order() {
        let set: [Correspondence<f64>; 4] = std::array::from_fn(|i| {
            let k = i as f64;
            Correspondence::new(
                Vector2::new(k, k),
                Matrix2::from_diagonal_element(k + 1.0),
                Vector2::new(k, -k),
                Matrix2::from_diagonal_element(10.0 + k),
            )
        });
        let sigma = minimal_set_covariance(&set);
        assert_eq!(sigma[(0, 0)], 1.0);
        assert_eq!(sigma[(7, 7)], 4.0);
        assert_eq!(sigma[(8, 8)], 10.0);
        assert_eq!(sigma[(15, 15)], 13.0);
        assert_eq!(sigma[(0, 8)], 0.0);
    }

    #[test]
    fn unit_sphere_normalization_matches_numeric_jacobian() {
        let x = Vector3::new(3.0, -4.0, 12.0);
        let sigma = Matrix3::new(1.0, 0.1, 0.0, 0.1, 2.0, 0.3, 0.0, 0.3, 0.5);
        let (unit, cov) = normalize_onto_unit_sphere(&x, &sigma).unwrap();
        assert_relative_eq!(unit.norm(), 1.0, epsilon = 1e-15);

        let step = 1e-6;
        let mut numeric = Matrix3::zeros();
        for k in 0..3 {
            let mut plus = x;
            let mut minus = x;
            plus[k] += step;
            minus[k] -= step;
            let d = (plus.normalize() - minus.normalize()) / (2.0 * step);
            numeric.set_column(k, &d);
        }
        let expected = numeric * sigma * numeric.transpose();
        assert_relative_eq!(cov, expected, epsilon = 1e-9);
    }

    #[test]
    fn unit_sphere_normalization_rejects_zero_vector() {
        let r = normalize_onto_unit_sphere(&Vector3::<f64>::zeros(), &Matrix3::identity());
        assert_eq!(r, Err(EstimationError::SingularSolve));
    }

    #[test]
    fn coordinate_normalization_uses_preferred_coordinate() {
        let x = Vector3::new(2.0, 4.0, 2.0);
        let out = normalize_by_coordinate(&x, &Matrix3::identity(), 2).unwrap();
        assert_eq!(out.index, 2);
        assert_eq!(out.elements, Vector3::new(1.0, 2.0, 1.0));
        assert_eq!(out.covariance.row(2).norm(), 0.0);
        // d(x/w)/dx = 1/w, d(x/w)/dw = -x/w^2  ->  var = 1/4 + 1/4
        assert_relative_eq!(out.covariance[(0, 0)], 0.5, epsilon = 1e-15);
    }

    #[test]
    fn coordinate_normalization_substitutes_largest_coordinate() {
        let x = Vector3::new(-5.0, 3.0, 1e-12);
        let out = normalize_by_coordinate(&x, &Matrix3::identity(), 2).unwrap();
        assert_eq!(out.index, 0);
        assert_eq!(out.elements[0], 1.0);

        let tie = Vector3::new(2.0, -2.0, 0.0);
        assert_eq!(normalize_by_coordinate(&tie, &Matrix3::identity(), 2).unwrap().index, 0);
    }

    #[test]
    fn coordinate_normalization_fails_on_vanishing_vector() {
        let x = Vector3::<f64>::zeros();
        assert_eq!(
            normalize_by_coordinate(&x, &Matrix3::identity(), 2),
            Err(EstimationError::SingularSolve)
        );
    }
}
