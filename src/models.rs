//! Uncertain geometric entities.
//!
//! Each type pairs a mean with its covariance. Points and lines live in the
//! projective plane and carry 3x3 covariances; a homography carries the 9x9
//! covariance of its row-major `vec(H)`; a residual carries a 4x4 covariance.

use nalgebra::{Matrix2, Matrix3, Matrix4, SMatrix, SVector, Vector2, Vector3, Vector4};

use crate::error::{EstimationError, Result};
use crate::propagation::{normalize_by_coordinate, normalize_onto_unit_sphere};
use crate::types::{lit, max_abs, Matrix9, Real};

/// A feature observed in two views: homogeneous points with `w = 1` and the
/// 2x2 covariances of their non-homogeneous coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence<T: Real> {
    /// Point in the first view.
    pub first: Vector3<T>,
    /// Covariance of `first.xy()`.
    pub first_covariance: Matrix2<T>,
    /// Point in the second view.
    pub second: Vector3<T>,
    /// Covariance of `second.xy()`.
    pub second_covariance: Matrix2<T>,
}

impl<T: Real> Correspondence<T> {
    pub fn new(
        first: Vector2<T>,
        first_covariance: Matrix2<T>,
        second: Vector2<T>,
        second_covariance: Matrix2<T>,
    ) -> Self {
        Self {
            first: Vector3::new(first.x, first.y, T::one()),
            first_covariance,
            second: Vector3::new(second.x, second.y, T::one()),
            second_covariance,
        }
    }

    /// Builds a correspondence from arbitrary homogeneous points, dividing each
    /// by its last coordinate. Points at infinity are rejected.
    pub fn from_homogeneous(
        first: Vector3<T>,
        first_covariance: Matrix2<T>,
        second: Vector3<T>,
        second_covariance: Matrix2<T>,
    ) -> Result<Self> {
        let dehomogenize = |p: Vector3<T>| -> Result<Vector2<T>> {
            if p.z == T::zero() || p.z.abs() <= lit::<T>(1e-12) * max_abs(p.as_slice()) {
                return Err(EstimationError::SingularSolve);
            }
            Ok(p.xy() / p.z)
        };
        Ok(Self::new(
            dehomogenize(first)?,
            first_covariance,
            dehomogenize(second)?,
            second_covariance,
        ))
    }

    /// Same points, new covariances.
    pub fn with_covariances(self, first_covariance: Matrix2<T>, second_covariance: Matrix2<T>) -> Self {
        Self {
            first_covariance,
            second_covariance,
            ..self
        }
    }

    /// Exchanges the two views in place: `x <-> x'` together with covariances.
    pub fn swap_points(&mut self) {
        std::mem::swap(&mut self.first, &mut self.second);
        std::mem::swap(&mut self.first_covariance, &mut self.second_covariance);
    }

    /// Value-returning counterpart of [`Correspondence::swap_points`].
    pub fn swapped(mut self) -> Self {
        self.swap_points();
        self
    }

    pub fn first_point(&self) -> UncertainPoint<T> {
        UncertainPoint::from_euclidean_covariance(self.first, &self.first_covariance)
    }

    pub fn second_point(&self) -> UncertainPoint<T> {
        UncertainPoint::from_euclidean_covariance(self.second, &self.second_covariance)
    }

    /// Point of the given view (`0` or `1`).
    pub fn point(&self, view: usize) -> UncertainPoint<T> {
        if view == 0 {
            self.first_point()
        } else {
            self.second_point()
        }
    }
}

/// Homogeneous image point with a 3x3 covariance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UncertainPoint<T: Real> {
    pub point: Vector3<T>,
    pub covariance: Matrix3<T>,
}

impl<T: Real> UncertainPoint<T> {
    pub fn new(point: Vector3<T>, covariance: Matrix3<T>) -> Self {
        Self { point, covariance }
    }

    /// Embeds a 2x2 covariance of `(x, y)`; the homogeneous coordinate is
    /// treated as an exact constant.
    pub fn from_euclidean_covariance(point: Vector3<T>, covariance: &Matrix2<T>) -> Self {
        let mut full = Matrix3::zeros();
        full.fixed_view_mut::<2, 2>(0, 0).copy_from(covariance);
        Self::new(point, full)
    }

    /// Exactly known point `(x, y, 1)`.
    pub fn exact(x: T, y: T) -> Self {
        Self::new(Vector3::new(x, y, T::one()), Matrix3::zeros())
    }

    /// Spherically normalized copy.
    pub fn normalized(&self) -> Result<Self> {
        let (point, covariance) = normalize_onto_unit_sphere(&self.point, &self.covariance)?;
        Ok(Self::new(point, covariance))
    }
}

/// Line `l = (a, b, c)` with `x^T l = 0` for incident points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UncertainLine<T: Real> {
    pub line: Vector3<T>,
    pub covariance: Matrix3<T>,
}

impl<T: Real> UncertainLine<T> {
    pub fn new(line: Vector3<T>, covariance: Matrix3<T>) -> Self {
        Self { line, covariance }
    }

    pub fn normalized(&self) -> Result<Self> {
        let (line, covariance) = normalize_onto_unit_sphere(&self.line, &self.covariance)?;
        Ok(Self::new(line, covariance))
    }
}

/// Full-rank homography with the covariance of its row-major `vec(H)`.
///
/// When `h[(2, 2)]` is fixed to one the last row and column of the covariance
/// vanish and the remaining 8x8 block describes the free parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UncertainHomography<T: Real> {
    pub h: Matrix3<T>,
    pub covariance: Matrix9<T>,
}

impl<T: Real> UncertainHomography<T> {
    pub fn new(h: Matrix3<T>, covariance: Matrix9<T>) -> Self {
        Self { h, covariance }
    }

    /// Homography without uncertainty.
    pub fn exact(h: Matrix3<T>) -> Self {
        Self::new(h, Matrix9::zeros())
    }

    /// Row-major `vec(H)`.
    pub fn vectorized(&self) -> SVector<T, 9> {
        vectorize(&self.h)
    }

    /// Covariance of `h11 .. h32` when `h33` is the fixed coefficient.
    pub fn free_parameter_covariance(&self) -> SMatrix<T, 8, 8> {
        self.covariance.fixed_view::<8, 8>(0, 0).into_owned()
    }

    /// Scales `vec(H)` to unit norm and propagates the covariance.
    pub fn normalized(self) -> Result<Self> {
        let (v, covariance) = normalize_onto_unit_sphere(&self.vectorized(), &self.covariance)?;
        Ok(Self::new(devectorize(&v), covariance))
    }

    /// Rescales so that `h33 = 1`, falling back to the largest coefficient
    /// when `h33` is too small to divide by.
    pub fn fixed_scale(self) -> Result<Self> {
        let scaled = normalize_by_coordinate(&self.vectorized(), &self.covariance, 8)?;
        Ok(Self::new(devectorize(&scaled.elements), scaled.covariance))
    }

    /// Maps a homogeneous point through `H`.
    pub fn transfer(&self, point: &Vector3<T>) -> Vector3<T> {
        self.h * point
    }

    pub fn inverse(&self) -> Result<Matrix3<T>> {
        self.h.try_inverse().ok_or(EstimationError::SingularSolve)
    }
}

/// Symmetric transfer residual, assumed zero-mean Gaussian for inliers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UncertainResidual<T: Real> {
    pub residual: Vector4<T>,
    pub covariance: Matrix4<T>,
}

impl<T: Real> UncertainResidual<T> {
    pub fn new(residual: Vector4<T>, covariance: Matrix4<T>) -> Self {
        Self {
            residual,
            covariance,
        }
    }
}

pub(crate) fn vectorize<T: Real>(h: &Matrix3<T>) -> SVector<T, 9> {
    SVector::<T, 9>::from_iterator(h.transpose().iter().copied())
}

pub(crate) fn devectorize<T: Real>(v: &SVector<T, 9>) -> Matrix3<T> {
    Matrix3::from_row_slice(v.as_slice())
}
