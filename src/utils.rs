//! Miscellaneous utilities: a seedable unique-index generator, a fixed-size
//! Gaussian elimination, and a guarded Mahalanobis quadratic form.

use nalgebra::{SMatrix, SVector};
use rand::distributions::uniform::SampleUniform;
use rand::distributions::Uniform;
use rand::prelude::*;

use crate::types::{lit, max_abs, Real};

/// Pivots smaller than this fraction of the largest entry count as zero.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Relative size under which a vector is treated as exactly zero.
pub(crate) const EXACT_TOLERANCE: f64 = 1e-9;

/// Uniform integer random-number generator.
///
/// By default this uses an entropy-seeded RNG, but test code can construct
/// it from a fixed seed for reproducible behavior.
pub struct UniformRandomGenerator<T>
where
    T: Copy + SampleUniform + PartialOrd,
{
    rng: StdRng,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Default for UniformRandomGenerator<T>
where
    T: Copy + SampleUniform + PartialOrd,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UniformRandomGenerator<T>
where
    T: Copy + SampleUniform + PartialOrd,
{
    /// Construct with a random seed (suitable for production use).
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Construct with a fixed seed (useful for tests).
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            _marker: std::marker::PhantomData,
        }
    }

    /// Fill `out` with distinct values drawn uniformly from `[min, max]`.
    ///
    /// Rejection sampling; suitable for the small sample sizes of minimal
    /// solvers. The range must hold at least `out.len()` values.
    pub fn gen_unique(&mut self, out: &mut [T], min: T, max: T) {
        let dist = Uniform::new_inclusive(min, max);
        for i in 0..out.len() {
            loop {
                let candidate = self.rng.sample(&dist);
                if out[..i].iter().all(|&v| v != candidate) {
                    out[i] = candidate;
                    break;
                }
            }
        }
    }
}

/// Solves `A X = B` by Gaussian elimination with partial pivoting.
///
/// Returns `None` when a pivot falls below `1e-12` times the largest entry of
/// `A`, or when the solution is not finite.
pub fn gauss_elimination<T: Real, const N: usize, const M: usize>(
    mut a: SMatrix<T, N, N>,
    mut b: SMatrix<T, N, M>,
) -> Option<SMatrix<T, N, M>> {
    let scale = max_abs(a.as_slice());
    if !scale.is_finite() || scale == T::zero() {
        return None;
    }
    let tolerance = scale * lit::<T>(PIVOT_TOLERANCE);

    for i in 0..N {
        let mut max_row = i;
        let mut max_val = a[(i, i)].abs();
        for k in (i + 1)..N {
            let val = a[(k, i)].abs();
            if val > max_val {
                max_val = val;
                max_row = k;
            }
        }
        if max_row != i {
            a.swap_rows(i, max_row);
            b.swap_rows(i, max_row);
        }

        if !(max_val > tolerance) {
            return None;
        }

        for k in (i + 1)..N {
            let factor = a[(k, i)] / a[(i, i)];
            for j in i..N {
                let delta = factor * a[(i, j)];
                a[(k, j)] -= delta;
            }
            for j in 0..M {
                let delta = factor * b[(i, j)];
                b[(k, j)] -= delta;
            }
        }
    }

    let mut x = SMatrix::<T, N, M>::zeros();
    for c in 0..M {
        for i in (0..N).rev() {
            let mut acc = b[(i, c)];
            for j in (i + 1)..N {
                acc -= a[(i, j)] * x[(j, c)];
            }
            x[(i, c)] = acc / a[(i, i)];
        }
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

/// Pivots of the `L D L^T` factorization below this fraction of the largest
/// variance are treated as exact directions.
const RANK_TOLERANCE: f64 = 1e-12;

/// `d^T Σ^-1 d` for a positive semi-definite `Σ`.
///
/// Factors `Σ = L D L^T` without pivoting. A direction with a vanishing pivot
/// is known exactly: it contributes zero when the whitened component of `d`
/// vanishes relative to `scale` and makes the result infinite otherwise.
pub(crate) fn mahalanobis_squared<T: Real, const N: usize>(
    d: &SVector<T, N>,
    covariance: &SMatrix<T, N, N>,
    scale: T,
) -> T {
    let largest = (0..N).fold(T::zero(), |m, i| m.max(covariance[(i, i)].abs()));
    let pivot_tolerance = largest * lit::<T>(RANK_TOLERANCE);
    let exact_tolerance = scale * lit::<T>(EXACT_TOLERANCE);

    let mut l = SMatrix::<T, N, N>::identity();
    let mut pivots = SVector::<T, N>::zeros();
    for j in 0..N {
        let mut pivot = covariance[(j, j)];
        for k in 0..j {
            pivot -= l[(j, k)] * l[(j, k)] * pivots[k];
        }
        if !(pivot > pivot_tolerance) {
            continue;
        }
        pivots[j] = pivot;
        for i in (j + 1)..N {
            let mut acc = covariance[(i, j)];
            for k in 0..j {
                acc -= l[(i, k)] * l[(j, k)] * pivots[k];
            }
            l[(i, j)] = acc / pivot;
        }
    }

    let mut y = SVector::<T, N>::zeros();
    let mut value = T::zero();
    for i in 0..N {
        let mut acc = d[i];
        for k in 0..i {
            acc -= l[(i, k)] * y[k];
        }
        y[i] = acc;
        if pivots[i] > T::zero() {
            value += acc * acc / pivots[i];
        } else if acc.abs() > exact_tolerance {
            return lit::<T>(f64::INFINITY);
        }
    }
    if value.is_finite() {
        value
    } else {
        lit::<T>(f64::INFINITY)
    }
}
