//! Core shared types for the crate.
//!
//! Every quantity handled by the estimator has a size known at compile time
//! (at most 16x16), so we work with `nalgebra` fixed-size aliases. Numerical
//! routines are generic over [`Real`].

use nalgebra::{RealField, SMatrix, SVector};

use crate::models::Correspondence;

/// Scalar bound used across the crate: any `nalgebra` real field that is `Copy`
/// (in practice `f32` or `f64`).
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Number of correspondences in a minimal set.
pub const MINIMAL_SET_SIZE: usize = 4;

/// Four correspondences, enough to determine a homography.
pub type MinimalSet<T> = [Correspondence<T>; MINIMAL_SET_SIZE];

/// Flattened non-homogeneous coordinates of a minimal set
/// (view 1 `x, y` for points 1..4, then view 2).
pub type Vector16<T> = SVector<T, 16>;

/// Block-diagonal covariance of a flattened minimal set.
pub type Matrix16<T> = SMatrix<T, 16, 16>;

/// Covariance of the row-major `vec(H)`.
pub type Matrix9<T> = SMatrix<T, 9, 9>;

/// Jacobian of the row-major `vec(H)` w.r.t. the flattened minimal set.
pub type HomographyJacobian<T> = SMatrix<T, 9, 16>;

/// Converts an `f64` literal into the working scalar type.
#[inline]
pub(crate) fn lit<T: Real>(value: f64) -> T {
    nalgebra::convert(value)
}

/// Largest absolute value of a slice (zero for an empty slice).
#[inline]
pub(crate) fn max_abs<T: Real>(values: &[T]) -> T {
    values.iter().fold(T::zero(), |m, &v| m.max(v.abs()))
}
