//! Estimators for geometric models.
//!
//! Only the planar homography is provided; it is the model whose uncertainty
//! the rest of the crate knows how to propagate.

pub mod homography;

pub use homography::{
    compute_homography, compute_homography_and_jacobian, compute_homography_from_columns,
    flatten_minimal_set, gather_minimal_set, HomographyEstimator,
};
