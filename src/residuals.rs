//! Symmetric transfer residuals and their propagated covariances.
//!
//! For a correspondence `(u, v)` the residual stacks the forward and backward
//! transfer errors,
//!
//! ```text
//! r = [ π(H ũ) - v ;  π(H^-1 ṽ) - u ]
//! ```
//!
//! where `π` drops the homogeneous coordinate. Its covariance sums the
//! contribution of the homography and that of the correspondence, the two
//! being treated as independent:
//! `Σr = J_H ΣH J_H^T + J_x blockdiag(Σu, Σv) J_x^T`.
//! For correspondences that were part of the minimal set this is an
//! approximation, since `H` was computed from them.

use nalgebra::{Matrix2, Matrix3, Matrix4, SMatrix, Vector2, Vector3, Vector4};

use crate::error::{EstimationError, Result};
use crate::estimators::homography::compute_homography_and_jacobian;
use crate::models::{Correspondence, UncertainHomography, UncertainResidual};
use crate::propagation::{minimal_set_covariance, propagate_the_covariance, symmetrize};
use crate::types::{lit, max_abs, MinimalSet, Real};

/// Jacobian of `π` with respect to the homogeneous point.
fn dehomogenization_jacobian<T: Real>(p: &Vector3<T>) -> SMatrix<T, 2, 3> {
    let w = p.z;
    let w2 = w * w;
    SMatrix::<T, 2, 3>::new(
        T::one() / w,
        T::zero(),
        -p.x / w2,
        T::zero(),
        T::one() / w,
        -p.y / w2,
    )
}

fn dehomogenize<T: Real>(p: &Vector3<T>) -> Result<Vector2<T>> {
    if p.z.abs() <= lit::<T>(1e-12) * max_abs(p.as_slice()) {
        return Err(EstimationError::SingularSolve);
    }
    Ok(p.xy() / p.z)
}

/// `∂(M x)/∂vec(M)` for row-major `vec(M)`, i.e. `I ⊗ x^T`.
fn product_jacobian<T: Real>(x: &Vector3<T>) -> SMatrix<T, 3, 9> {
    let mut jacobian = SMatrix::<T, 3, 9>::zeros();
    for row in 0..3 {
        for col in 0..3 {
            jacobian[(row, 3 * row + col)] = x[col];
        }
    }
    jacobian
}

fn lift<T: Real>(p: &Vector2<T>) -> Vector3<T> {
    Vector3::new(p.x, p.y, T::one())
}

fn invert<T: Real>(h: &Matrix3<T>) -> Result<Matrix3<T>> {
    let g = h.try_inverse().ok_or(EstimationError::SingularSolve)?;
    if g.iter().all(|v| v.is_finite()) {
        Ok(g)
    } else {
        Err(EstimationError::SingularSolve)
    }
}

/// Symmetric transfer residual of `(u, v)` under `h`.
///
/// Fails with [`EstimationError::SingularSolve`] when `h` is not invertible or
/// a transferred point lands at infinity.
pub fn compute_residual<T: Real>(h: &Matrix3<T>, u: &Vector2<T>, v: &Vector2<T>) -> Result<Vector4<T>> {
    let g = invert(h)?;
    let forward = dehomogenize(&(h * lift(u)))? - v;
    let backward = dehomogenize(&(g * lift(v)))? - u;
    Ok(Vector4::new(forward.x, forward.y, backward.x, backward.y))
}

/// Returns `(J_H, J_x)`: the residual's Jacobians with respect to the
/// row-major `vec(H)` and to `(u_x, u_y, v_x, v_y)`.
pub fn compute_residual_jacobians<T: Real>(
    h: &Matrix3<T>,
    u: &Vector2<T>,
    v: &Vector2<T>,
) -> Result<(SMatrix<T, 4, 9>, Matrix4<T>)> {
    let g = invert(h)?;
    let p = h * lift(u);
    let q = g * lift(v);
    dehomogenize(&p)?;
    dehomogenize(&q)?;

    let jp = dehomogenization_jacobian(&p);
    let jq = dehomogenization_jacobian(&q);

    // dq = -G dH q since d(H^-1) = -H^-1 dH H^-1.
    let forward_h = jp * product_jacobian(&lift(u));
    let backward_h = -(jq * g * product_jacobian(&q));

    let forward_u = jp * h.fixed_view::<3, 2>(0, 0);
    let backward_v = jq * g.fixed_view::<3, 2>(0, 0);

    let mut j_h = SMatrix::<T, 4, 9>::zeros();
    j_h.fixed_view_mut::<2, 9>(0, 0).copy_from(&forward_h);
    j_h.fixed_view_mut::<2, 9>(2, 0).copy_from(&backward_h);

    let mut j_x = Matrix4::zeros();
    j_x.fixed_view_mut::<2, 2>(0, 0).copy_from(&forward_u);
    j_x.fixed_view_mut::<2, 2>(0, 2)
        .copy_from(&(-Matrix2::<T>::identity()));
    j_x.fixed_view_mut::<2, 2>(2, 0)
        .copy_from(&(-Matrix2::<T>::identity()));
    j_x.fixed_view_mut::<2, 2>(2, 2).copy_from(&backward_v);

    Ok((j_h, j_x))
}

/// Homography of a minimal set together with the covariance of `vec(H)`
/// propagated from the 16 point coordinates.
pub fn compute_uncertain_homography<T: Real>(
    minimal_set: &MinimalSet<T>,
) -> Result<UncertainHomography<T>> {
    let (h, jacobian) = compute_homography_and_jacobian(minimal_set)?;
    let covariance = propagate_the_covariance(&jacobian, &minimal_set_covariance(minimal_set));
    Ok(UncertainHomography::new(h, covariance))
}

/// Residual of one correspondence with its covariance.
pub fn compute_uncertain_residual<T: Real>(
    homography: &UncertainHomography<T>,
    correspondence: &Correspondence<T>,
) -> Result<UncertainResidual<T>> {
    let u = correspondence.first.xy();
    let v = correspondence.second.xy();
    let residual = compute_residual(&homography.h, &u, &v)?;
    let (j_h, j_x) = compute_residual_jacobians(&homography.h, &u, &v)?;

    let mut points = Matrix4::zeros();
    points
        .fixed_view_mut::<2, 2>(0, 0)
        .copy_from(&correspondence.first_covariance);
    points
        .fixed_view_mut::<2, 2>(2, 2)
        .copy_from(&correspondence.second_covariance);

    let covariance = propagate_the_covariance(&j_h, &homography.covariance)
        + propagate_the_covariance(&j_x, &points);
    Ok(UncertainResidual::new(residual, symmetrize(&covariance)))
}

/// Residuals of all correspondences, in order.
pub fn compute_uncertain_residuals<T: Real>(
    homography: &UncertainHomography<T>,
    correspondences: &[Correspondence<T>],
) -> Result<Vec<UncertainResidual<T>>> {
    correspondences
        .iter()
        .map(|c| compute_uncertain_residual(homography, c))
        .collect()
}
