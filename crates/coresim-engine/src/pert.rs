//! Beta-PERT distribution sampling.
//!
//! The PERT distribution is a beta distribution re-parameterised by
//! (min, max, mode, lambda). LDBR draws per-subscription detection
//! probabilities from it: one mode for malicious subscriptions, the
//! complementary mode for benign ones.

use rand::Rng;
use rand_distr::{Beta, Distribution};

use coresim_core::{Result, SimError};

/// Beta shape parameters for a PERT distribution.
///
/// Follows the standard PERT construction: the mean is
/// `(min + max + lambda * mode) / (lambda + 2)`, from which the two beta
/// shapes follow.
pub fn shape_params(min: f64, max: f64, mode: f64, lambda: f64) -> (f64, f64) {
    let mu = (min + max + lambda * mode) / (lambda + 2.0);

    let alpha = if mu == mode {
        lambda / 2.0 + 1.0
    } else {
        ((mu - min) * (2.0 * mode - min - max)) / ((mode - mu) * (max - min))
    };
    let beta = (alpha * (max - mu)) / (mu - min);

    (alpha, beta)
}

/// A sampler for PERT-distributed values over `[min, max]`.
#[derive(Debug, Clone)]
pub struct PertSampler {
    dist: Beta<f64>,
    min: f64,
    range: f64,
}

impl PertSampler {
    pub fn new(min: f64, max: f64, mode: f64, lambda: f64) -> Result<Self> {
        if !(min <= mode && mode <= max) {
            return Err(SimError::config(format!(
                "PERT mode {mode} outside [{min}, {max}]"
            )));
        }
        let (alpha, beta) = shape_params(min, max, mode, lambda);
        let dist = Beta::new(alpha, beta)
            .map_err(|e| SimError::config(format!("degenerate PERT shape: {e}")))?;
        Ok(PertSampler {
            dist,
            min,
            range: max - min,
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.dist.sample(rng) * self.range + self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_shape_params_symmetric_mode() {
        // mode at the midpoint makes the distribution symmetric
        let (alpha, beta) = shape_params(0.0, 1.0, 0.5, 3.0);
        assert!((alpha - beta).abs() < 1e-12);
        assert!((alpha - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_shape_params_skewed() {
        let (alpha, beta) = shape_params(0.0, 1.0, 0.9, 3.0);
        // right-skewed mode needs alpha > beta
        assert!(alpha > beta);

        let (alpha_c, beta_c) = shape_params(0.0, 1.0, 0.1, 3.0);
        // the complementary mode mirrors the shapes
        assert!((alpha - beta_c).abs() < 1e-9);
        assert!((beta - alpha_c).abs() < 1e-9);
    }

    #[test]
    fn test_samples_stay_in_range_and_cluster_at_mode() {
        let sampler = PertSampler::new(0.0, 1.0, 0.9, 3.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut sum = 0.0;
        for _ in 0..2000 {
            let x = sampler.sample(&mut rng);
            assert!((0.0..=1.0).contains(&x));
            sum += x;
        }
        let mean = sum / 2000.0;
        // PERT mean for mode 0.9, lambda 3 is (0 + 1 + 2.7) / 5 = 0.74
        assert!((mean - 0.74).abs() < 0.05, "mean {mean} too far from 0.74");
    }

    #[test]
    fn test_mode_out_of_range_is_rejected() {
        assert!(PertSampler::new(0.0, 1.0, 1.5, 3.0).is_err());
    }
}
