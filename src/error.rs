//! Error taxonomy for the estimator.
//!
//! Geometric degeneracies are expected during sampling and are recoverable by
//! drawing a new minimal set. Dimension mismatches are programming errors.

use thiserror::Error;

/// Which degeneracy test rejected a minimal set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegeneracyKind {
    /// Two points in the same view are statistically identical.
    IdenticalPoints {
        view: usize,
        first: usize,
        second: usize,
    },
    /// Three points in the same view are statistically collinear.
    CollinearPoints { view: usize, indices: [usize; 3] },
    /// Orientation of the set differs between the two views.
    Flipped,
    /// The sample contains the same correspondence twice.
    DuplicateIndices,
}

impl std::fmt::Display for DegeneracyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdenticalPoints {
                view,
                first,
                second,
            } => write!(f, "points {first} and {second} coincide in view {view}"),
            Self::CollinearPoints { view, indices } => {
                write!(f, "points {indices:?} are collinear in view {view}")
            }
            Self::Flipped => write!(f, "orientation is flipped between views"),
            Self::DuplicateIndices => write!(f, "sample contains duplicate indices"),
        }
    }
}

/// Errors produced by the estimation primitives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    /// The minimal set failed an identity, incidence or flip check.
    #[error("degenerate minimal set: {0}")]
    DegenerateInput(DegeneracyKind),

    /// A linear system or normalization was numerically singular.
    #[error("numerically singular computation")]
    SingularSolve,

    /// Matrix shapes do not agree.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Not enough correspondences for the requested operation.
    #[error("not enough correspondences: need {needed}, got {got}")]
    TooFewCorrespondences { needed: usize, got: usize },

    /// No usable minimal set was found within the attempt budget.
    #[error("no usable minimal set after {attempts} attempts")]
    SamplingExhausted { attempts: usize },

    /// Caller-supplied input is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EstimationError {
    /// Whether drawing a new minimal set may resolve the error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DegenerateInput(_) | Self::SingularSolve)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EstimationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degeneracies_are_recoverable_but_shape_errors_are_not() {
        assert!(EstimationError::DegenerateInput(DegeneracyKind::Flipped).is_recoverable());
        assert!(EstimationError::SingularSolve.is_recoverable());
        assert!(!EstimationError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
        .is_recoverable());
    }

    #[test]
    fn messages_name_the_offending_points() {
        let err = EstimationError::DegenerateInput(DegeneracyKind::CollinearPoints {
            view: 1,
            indices: [0, 2, 3],
        });
        assert_eq!(
            err.to_string(),
            "degenerate minimal set: points [0, 2, 3] are collinear in view 1"
        );
    }
}
