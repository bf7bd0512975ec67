//! Sampling strategies for minimal sets.
//!
//! Samplers implement the shared [`Sampler`](crate::core::Sampler) trait and
//! only propose indices; usability of a sample is decided by the estimator.

pub mod uniform;

pub use uniform::UniformRandomSampler;
