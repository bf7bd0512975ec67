//! Per-iteration primitives of a RANSAC-style estimator.
//!
//! The traits mirror the pieces a robust estimation loop is assembled from:
//! a [`Sampler`] proposes minimal samples, an [`Estimator`] checks them and
//! solves for a model, and a [`Scoring`] strategy rates the model against all
//! correspondences. [`draw_minimal_model`] ties the first two together,
//! resampling until a usable minimal set yields a model. The adaptive outer
//! loop (iteration budget, termination) is left to the caller.

use log::trace;

use crate::error::{EstimationError, Result};
use crate::models::Correspondence;
use crate::settings::SamplingSettings;
use crate::types::Real;

/// Draws minimal samples from a population of correspondences.
pub trait Sampler {
    /// Draw `sample_size` distinct indices below `population` into
    /// `out_indices`.
    ///
    /// Returns `false` if a sample could not be drawn (caller may retry).
    fn sample(&mut self, population: usize, sample_size: usize, out_indices: &mut [usize]) -> bool;

    /// Feedback after a sample was used or rejected.
    fn update(&mut self, _sample: &[usize], _accepted: bool) {}
}

/// Generates a model hypothesis from a minimal sample.
pub trait Estimator<T: Real> {
    /// Model type produced by this estimator.
    type Model: Clone;

    /// Size of a minimal sample for this estimator.
    fn sample_size(&self) -> usize;

    /// Explains why a sample cannot be used, if it cannot.
    fn check_sample(&self, data: &[Correspondence<T>], sample: &[usize]) -> Result<()>;

    /// Check whether a given sample is usable.
    fn is_valid_sample(&self, data: &[Correspondence<T>], sample: &[usize]) -> bool {
        self.check_sample(data, sample).is_ok()
    }

    /// Estimate the model from a minimal sample.
    fn estimate_model(&self, data: &[Correspondence<T>], sample: &[usize]) -> Result<Self::Model>;
}

/// Rates a model against the data and determines its inliers.
pub trait Scoring<T: Real, M> {
    /// Score type; greater is better.
    type Score: Clone + PartialOrd;

    /// Threshold of the inlier decision.
    fn threshold(&self) -> f64;

    /// Score a model and write the indices of its inliers to `inliers_out`.
    fn score(&self, data: &[Correspondence<T>], model: &M, inliers_out: &mut Vec<usize>) -> Result<Self::Score>;
}

/// A model together with the minimal sample it was estimated from.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnModel<M> {
    pub sample: Vec<usize>,
    pub model: M,
    /// Samples drawn, including the successful one.
    pub attempts: usize,
}

/// Samples, verifies and solves until a model is found.
///
/// Degenerate samples and numerically singular solves are resampled, up to
/// `settings.max_attempts` draws; any other error is returned immediately.
pub fn draw_minimal_model<T, E, S>(
    estimator: &E,
    sampler: &mut S,
    data: &[Correspondence<T>],
    settings: &SamplingSettings,
) -> Result<DrawnModel<E::Model>>
where
    T: Real,
    E: Estimator<T>,
    S: Sampler,
{
    let sample_size = estimator.sample_size();
    if data.len() < sample_size {
        return Err(EstimationError::TooFewCorrespondences {
            needed: sample_size,
            got: data.len(),
        });
    }

    let mut sample = vec![0usize; sample_size];
    for attempt in 1..=settings.max_attempts {
        if !sampler.sample(data.len(), sample_size, &mut sample) {
            trace!("sampler could not draw a sample (attempt {attempt})");
            continue;
        }

        let outcome = estimator
            .check_sample(data, &sample)
            .and_then(|()| estimator.estimate_model(data, &sample));
        match outcome {
            Ok(model) => {
                sampler.update(&sample, true);
                return Ok(DrawnModel {
                    sample,
                    model,
                    attempts: attempt,
                });
            }
            Err(e) if e.is_recoverable() => {
                trace!("rejected sample {sample:?}: {e}");
                sampler.update(&sample, false);
            }
            Err(e) => return Err(e),
        }
    }

    Err(EstimationError::SamplingExhausted {
        attempts: settings.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DegeneracyKind;
    use nalgebra::{Matrix2, Vector2};

    #[derive(Clone, Debug, PartialEq)]
    struct MockModel(Vec<usize>);

    /// Accepts samples whose first index is even.
    struct MockEstimator;

    impl Estimator<f64> for MockEstimator {
        type Model = MockModel;

        fn sample_size(&self) -> usize {
            2
        }

        fn check_sample(&self, _data: &[Correspondence<f64>], sample: &[usize]) -> Result<()> {
            if sample[0] % 2 == 0 {
                Ok(())
            } else {
                Err(EstimationError::DegenerateInput(DegeneracyKind::Flipped))
            }
        }

        fn estimate_model(&self, _data: &[Correspondence<f64>], sample: &[usize]) -> Result<Self::Model> {
            Ok(MockModel(sample.to_vec()))
        }
    }

    /// Hands out consecutive pairs `(k, k + 1)`.
    struct MockSampler {
        next: usize,
        rejected: usize,
    }

    impl Sampler for MockSampler {
        fn sample(&mut self, population: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
            for (i, v) in out_indices.iter_mut().enumerate().take(sample_size) {
                *v = (self.next + i) % population;
            }
            self.next += 1;
            true
        }

        fn update(&mut self, _sample: &[usize], accepted: bool) {
            if !accepted {
                self.rejected += 1;
            }
        }
    }

    fn data(n: usize) -> Vec<Correspondence<f64>> {
        (0..n)
            .map(|i| {
                let p = Vector2::new(i as f64, 0.0);
                Correspondence::new(p, Matrix2::identity(), p, Matrix2::identity())
            })
            .collect()
    }

    #[test]
    fn resamples_until_a_sample_is_accepted() {
        let mut sampler = MockSampler { next: 1, rejected: 0 };
        let drawn =
            draw_minimal_model(&MockEstimator, &mut sampler, &data(5), &SamplingSettings::default())
                .unwrap();
        assert_eq!(drawn.sample, vec![2, 3]);
        assert_eq!(drawn.model, MockModel(vec![2, 3]));
        assert_eq!(drawn.attempts, 2);
        assert_eq!(sampler.rejected, 1);
    }

    #[test]
    fn gives_up_after_the_attempt_budget() {
        // Always proposes a sample the estimator rejects.
        struct OddSampler;
        impl Sampler for OddSampler {
            fn sample(&mut self, _population: usize, _sample_size: usize, out: &mut [usize]) -> bool {
                out[0] = 1;
                out[1] = 2;
                true
            }
        }
        let settings = SamplingSettings { max_attempts: 7 };
        assert_eq!(
            draw_minimal_model(&MockEstimator, &mut OddSampler, &data(5), &settings),
            Err(EstimationError::SamplingExhausted { attempts: 7 })
        );
    }

    #[test]
    fn too_little_data_is_an_error() {
        let mut sampler = MockSampler { next: 0, rejected: 0 };
        assert_eq!(
            draw_minimal_model(&MockEstimator, &mut sampler, &data(1), &SamplingSettings::default()),
            Err(EstimationError::TooFewCorrespondences { needed: 2, got: 1 })
        );
    }
}
