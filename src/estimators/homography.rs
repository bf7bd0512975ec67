//! Closed-form 4-point homography solver and its Jacobian.
//!
//! With `h33 = 1` each correspondence `(x, y, w) -> (x', y', w')` contributes
//! two rows of an 8x8 linear system:
//!
//! ```text
//! w'x h1 + w'y h2 + w'w h3 - x'x h7 - x'y h8 = x'w
//! w'x h4 + w'y h5 + w'w h6 - y'x h7 - y'y h8 = y'w
//! ```
//!
//! Differentiating `f(h, z) = A(z) h - b(z) = 0` gives `∂h/∂z = -A^-1 ∂f/∂z`,
//! the Jacobian used to propagate point covariances into `H`.

use nalgebra::{Matrix3, Matrix3x4, SMatrix, SVector};

use crate::core::Estimator;
use crate::degeneracy::diagnose_minimal_set;
use crate::error::{DegeneracyKind, EstimationError, Result};
use crate::models::{Correspondence, UncertainHomography};
use crate::residuals::compute_uncertain_homography;
use crate::settings::DegeneracySettings;
use crate::types::{HomographyJacobian, MinimalSet, Real, Vector16, MINIMAL_SET_SIZE};
use crate::utils::gauss_elimination;

/// Flattens a minimal set as `(x1, y1, .., x4, y4, x'1, y'1, .., x'4, y'4)`.
pub fn flatten_minimal_set<T: Real>(minimal_set: &MinimalSet<T>) -> Vector16<T> {
    let mut flat = Vector16::zeros();
    for (i, c) in minimal_set.iter().enumerate() {
        flat[2 * i] = c.first.x;
        flat[2 * i + 1] = c.first.y;
        flat[2 * (MINIMAL_SET_SIZE + i)] = c.second.x;
        flat[2 * (MINIMAL_SET_SIZE + i) + 1] = c.second.y;
    }
    flat
}

/// Homogeneous points of both views as 3x4 column matrices.
pub fn minimal_set_columns<T: Real>(minimal_set: &MinimalSet<T>) -> (Matrix3x4<T>, Matrix3x4<T>) {
    let mut u = Matrix3x4::zeros();
    let mut v = Matrix3x4::zeros();
    for (i, c) in minimal_set.iter().enumerate() {
        u.set_column(i, &c.first);
        v.set_column(i, &c.second);
    }
    (u, v)
}

fn build_system<T: Real>(u: &Matrix3x4<T>, v: &Matrix3x4<T>) -> (SMatrix<T, 8, 8>, SVector<T, 8>) {
    let mut a = SMatrix::<T, 8, 8>::zeros();
    let mut b = SVector::<T, 8>::zeros();

    for i in 0..MINIMAL_SET_SIZE {
        let (x, y, w) = (u[(0, i)], u[(1, i)], u[(2, i)]);
        let (xp, yp, wp) = (v[(0, i)], v[(1, i)], v[(2, i)]);
        let (r1, r2) = (2 * i, 2 * i + 1);

        a[(r1, 0)] = wp * x;
        a[(r1, 1)] = wp * y;
        a[(r1, 2)] = wp * w;
        a[(r1, 6)] = -xp * x;
        a[(r1, 7)] = -xp * y;
        b[r1] = xp * w;

        a[(r2, 3)] = wp * x;
        a[(r2, 4)] = wp * y;
        a[(r2, 5)] = wp * w;
        a[(r2, 6)] = -yp * x;
        a[(r2, 7)] = -yp * y;
        b[r2] = yp * w;
    }
    (a, b)
}

fn reshape<T: Real>(h: &SVector<T, 8>) -> Matrix3<T> {
    Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], T::one())
}

/// Solves for `H` (with `h33 = 1`) from homogeneous points stored as columns.
///
/// `u` holds the points of the first view and `v` those of the second.
pub fn compute_homography_from_columns<T: Real>(
    u: &Matrix3x4<T>,
    v: &Matrix3x4<T>,
) -> Result<Matrix3<T>> {
    let (a, b) = build_system(u, v);
    let h = gauss_elimination(a, b).ok_or(EstimationError::SingularSolve)?;
    Ok(reshape(&h))
}

/// Returns the homography only.
pub fn compute_homography<T: Real>(minimal_set: &MinimalSet<T>) -> Result<Matrix3<T>> {
    let (u, v) = minimal_set_columns(minimal_set);
    compute_homography_from_columns(&u, &v)
}

/// Returns `(H, J)` where `J = ∂vec(H)/∂z` for the flattened minimal set `z`
/// (see [`flatten_minimal_set`]). The last row of `J` is zero since `h33` is
/// fixed.
pub fn compute_homography_and_jacobian<T: Real>(
    minimal_set: &MinimalSet<T>,
) -> Result<(Matrix3<T>, HomographyJacobian<T>)> {
    let (u, v) = minimal_set_columns(minimal_set);
    let (a, b) = build_system(&u, &v);
    let a_inv = gauss_elimination(a, SMatrix::<T, 8, 8>::identity())
        .ok_or(EstimationError::SingularSolve)?;
    let h = a_inv * b;
    if !h.iter().all(|v| v.is_finite()) {
        return Err(EstimationError::SingularSolve);
    }

    // ∂f/∂z for f = A h - b.
    let mut df = SMatrix::<T, 8, 16>::zeros();
    for (i, c) in minimal_set.iter().enumerate() {
        let (x, y) = (c.first.x, c.first.y);
        let (xp, yp) = (c.second.x, c.second.y);
        let denominator = h[6] * x + h[7] * y + T::one();
        let (r1, r2) = (2 * i, 2 * i + 1);
        let (cx, cy) = (2 * i, 2 * i + 1);
        let (cxp, cyp) = (2 * (MINIMAL_SET_SIZE + i), 2 * (MINIMAL_SET_SIZE + i) + 1);

        df[(r1, cx)] = h[0] - h[6] * xp;
        df[(r1, cy)] = h[1] - h[7] * xp;
        df[(r1, cxp)] = -denominator;

        df[(r2, cx)] = h[3] - h[6] * yp;
        df[(r2, cy)] = h[4] - h[7] * yp;
        df[(r2, cyp)] = -denominator;
    }

    let dh = -(a_inv * df);
    let mut jacobian = HomographyJacobian::zeros();
    jacobian.fixed_view_mut::<8, 16>(0, 0).copy_from(&dh);
    Ok((reshape(&h), jacobian))
}

/// Minimal-set homography estimator with statistical degeneracy checks.
#[derive(Debug, Clone, Default)]
pub struct HomographyEstimator {
    pub settings: DegeneracySettings,
}

impl HomographyEstimator {
    pub fn new(settings: DegeneracySettings) -> Self {
        Self { settings }
    }
}

/// Collects the correspondences named by `sample` into a minimal set.
pub fn gather_minimal_set<T: Real>(
    data: &[Correspondence<T>],
    sample: &[usize],
) -> Result<MinimalSet<T>> {
    if sample.len() != MINIMAL_SET_SIZE {
        return Err(EstimationError::DimensionMismatch {
            expected: MINIMAL_SET_SIZE,
            actual: sample.len(),
        });
    }
    if let Some(&idx) = sample.iter().find(|&&idx| idx >= data.len()) {
        return Err(EstimationError::InvalidInput(format!(
            "sample index {idx} out of range for {} correspondences",
            data.len()
        )));
    }
    Ok(std::array::from_fn(|i| data[sample[i]]))
}

impl<T: Real> Estimator<T> for HomographyEstimator {
    type Model = UncertainHomography<T>;

    fn sample_size(&self) -> usize {
        MINIMAL_SET_SIZE
    }

    fn check_sample(&self, data: &[Correspondence<T>], sample: &[usize]) -> Result<()> {
        for i in 0..sample.len() {
            for j in (i + 1)..sample.len() {
                if sample[i] == sample[j] {
                    return Err(EstimationError::DegenerateInput(
                        DegeneracyKind::DuplicateIndices,
                    ));
                }
            }
        }
        let minimal_set = gather_minimal_set(data, sample)?;
        diagnose_minimal_set(&minimal_set, &self.settings)
    }

    fn estimate_model(&self, data: &[Correspondence<T>], sample: &[usize]) -> Result<Self::Model> {
        let minimal_set = gather_minimal_set(data, sample)?;
        compute_uncertain_homography(&minimal_set)
    }
}
