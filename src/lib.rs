//! # ransac-uncertainty - Uncertainty-aware homography estimation
//!
//! `ransac_uncertainty` supplies the per-iteration primitives of a RANSAC
//! homography estimator whose decisions are statistical: every image point
//! carries a 2x2 covariance, the covariance is propagated to first order
//! through the closed-form 4-point solver and through the symmetric transfer
//! residual, and correspondences are classified with a chi-squared test on
//! the residual's Mahalanobis distance.
//!
//! ## Quick Start
//!
//! ```rust
//! use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
//! use ransac_uncertainty::{
//!     compute_inlier_mask, compute_uncertain_homography, compute_uncertain_residuals,
//!     Correspondence, MinimalSet,
//! };
//!
//! let h = Matrix3::new(1.0, 0.1, 5.0, -0.05, 0.95, 2.0, 1e-4, 0.0, 1.0);
//! let observe = |x: f64, y: f64| {
//!     let q = h * Vector3::new(x, y, 1.0);
//!     Correspondence::new(Vector2::new(x, y), Matrix2::identity(), q.xy() / q.z, Matrix2::identity())
//! };
//!
//! let minimal_set: MinimalSet<f64> = [
//!     observe(0.0, 0.0),
//!     observe(400.0, 0.0),
//!     observe(400.0, 300.0),
//!     observe(0.0, 300.0),
//! ];
//! let homography = compute_uncertain_homography(&minimal_set).unwrap();
//!
//! let data = vec![observe(200.0, 150.0), observe(50.0, 250.0)];
//! let residuals = compute_uncertain_residuals(&homography, &data).unwrap();
//! let mask = compute_inlier_mask(&residuals, 9.49);
//! assert_eq!(mask, vec![true, true]);
//! ```
//!
//! ## Drawing hypotheses
//!
//! The traits in [`core`] describe the pieces a robust estimation loop is
//! built from. [`draw_minimal_model`] samples with a [`Sampler`], rejects
//! degenerate minimal sets through the [`Estimator`] and returns the first
//! model that could be solved; a [`Scoring`] strategy then rates it.
//!
//! ```rust
//! use nalgebra::{Matrix2, Vector2};
//! use ransac_uncertainty::{
//!     draw_minimal_model, HomographyEstimator, MahalanobisScoring, SamplingSettings, Scoring,
//!     UniformRandomSampler,
//! };
//! # use ransac_uncertainty::Correspondence;
//!
//! let data: Vec<Correspondence<f64>> = (0..5)
//!     .flat_map(|i| (0..4).map(move |j| (i as f64 * 100.0, j as f64 * 80.0 + i as f64 * 7.0)))
//!     .map(|(x, y)| {
//!         let p = Vector2::new(x, y);
//!         Correspondence::new(p, Matrix2::identity(), p + Vector2::new(3.0, -1.0), Matrix2::identity())
//!     })
//!     .collect();
//!
//! let estimator = HomographyEstimator::default();
//! let mut sampler = UniformRandomSampler::from_seed(1);
//! let drawn = draw_minimal_model(&estimator, &mut sampler, &data, &SamplingSettings::default())
//!     .unwrap();
//!
//! let mut inliers = Vec::new();
//! let score = MahalanobisScoring::default()
//!     .score(&data, &drawn.model, &mut inliers)
//!     .unwrap();
//! assert_eq!(score.inlier_count, data.len());
//! ```
//!
//! ## Modules
//!
//! - **[`models`]**: uncertain points, lines, homographies, residuals and correspondences
//! - **[`propagation`]**: first-order covariance propagation and normalization
//! - **[`projective`]**: cross products and lines through uncertain points
//! - **[`degeneracy`]**: identity, incidence and flip tests for minimal sets
//! - **[`estimators`]**: the 4-point homography solver and its Jacobian
//! - **[`residuals`]**: symmetric transfer residuals with covariances
//! - **[`scoring`]**: the chi-squared inlier test
//! - **[`core`]**: sampler, estimator and scoring traits
//! - **[`samplers`]**: minimal-set samplers
//! - **[`monte_carlo`]**: empirical validation of the propagated covariances
//! - **[`evaluation`]**: ROC curves of inlier classifiers
//! - **[`statistics`]**: chi-squared quantiles
//! - **[`settings`]**: configuration types

pub mod core;
pub mod degeneracy;
pub mod error;
pub mod estimators;
pub mod evaluation;
pub mod models;
pub mod monte_carlo;
pub mod projective;
pub mod propagation;
pub mod residuals;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod statistics;
pub mod types;
pub mod utils;

pub use crate::core::{draw_minimal_model, DrawnModel, Estimator, Sampler, Scoring};
pub use degeneracy::{
    are_three_points_collinear, compute_identity_statistic, compute_incidence_statistic,
    diagnose_minimal_set, is_minimal_set_flipped, verify_no_points_are_collinear,
};
pub use error::{DegeneracyKind, EstimationError, Result};
pub use estimators::{
    compute_homography, compute_homography_and_jacobian, compute_homography_from_columns,
    flatten_minimal_set, HomographyEstimator,
};
pub use evaluation::{roc_curve, RocCurve, RocPoint};
pub use models::{
    Correspondence, UncertainHomography, UncertainLine, UncertainPoint, UncertainResidual,
};
pub use monte_carlo::{
    monte_carlo_cov_residuals, run_monte_carlo_sweep, LargeResidual, MonteCarloReport,
    MonteCarloRow,
};
pub use projective::{find_uncertain_line, get_skew_symmetric_matrix_for_cross_product};
pub use propagation::{
    minimal_set_covariance, normalize_by_coordinate, normalize_onto_unit_sphere,
    propagate_the_covariance, propagate_the_covariance_dyn, small_block_diagonal,
};
pub use residuals::{
    compute_residual, compute_residual_jacobians, compute_uncertain_homography,
    compute_uncertain_residual, compute_uncertain_residuals,
};
pub use samplers::UniformRandomSampler;
pub use scoring::{
    compute_inlier_mask, compute_inlier_statistics, compute_inlier_test_statistic,
    MahalanobisScoring, Score,
};
pub use settings::{DegeneracySettings, InlierSettings, MonteCarloSettings, SamplingSettings};
pub use types::{MinimalSet, Real};
