//! Participant sampling for a round.

use crate::core::{Error, ParticipantId, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const SIZE_EPSILON: f64 = 1e-9;

/// Selects a random subset of the roster without replacement.
pub struct ClientSampler {
    rng: StdRng,
}

impl ClientSampler {
    /// Create a sampler; a seed makes selections reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Number of participants selected for `fraction` of `roster_size`.
    ///
    /// `ceil(fraction * n)`, at least 1 and at most `n`. Products within
    /// `SIZE_EPSILON` above an integer round down to it, so `0.07 * 100`
    /// selects 7.
    pub fn sample_size(roster_size: usize, fraction: f64) -> usize {
        let n = (fraction * roster_size as f64 - SIZE_EPSILON).ceil() as usize;
        n.clamp(1, roster_size.max(1))
    }

    /// Select `ceil(fraction * N)` participants.
    pub fn sample(&mut self, roster: &[ParticipantId], fraction: f64) -> Result<Vec<ParticipantId>> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(Error::Config(format!(
                "Sampling fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        if roster.is_empty() {
            return Err(Error::Aggregation(
                "No participants available to sample".to_string(),
            ));
        }

        let n = Self::sample_size(roster.len(), fraction);
        Ok(roster
            .choose_multiple(&mut self.rng, n)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn roster(n: usize) -> Vec<ParticipantId> {
        (0..n).map(|i| format!("site-{}", i)).collect()
    }

    #[test]
    fn test_sample_size() {
        assert_eq!(ClientSampler::sample_size(10, 1.0), 10);
        assert_eq!(ClientSampler::sample_size(10, 0.25), 3);
        assert_eq!(ClientSampler::sample_size(10, 0.01), 1);
        assert_eq!(ClientSampler::sample_size(3, 0.5), 2);
    }

    #[test]
    fn test_sample_size_ignores_float_noise() {
        assert_eq!(ClientSampler::sample_size(100, 0.07), 7);
        assert_eq!(ClientSampler::sample_size(100, 0.29), 29);
        assert_eq!(ClientSampler::sample_size(10, 0.7), 7);
        assert_eq!(ClientSampler::sample_size(5, 0.6), 3);
        assert_eq!(ClientSampler::sample_size(100, 0.071), 8);
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut sampler = ClientSampler::new(Some(1));
        let picked = sampler.sample(&roster(10), 0.5).unwrap();
        assert_eq!(picked.len(), 5);
        let distinct: HashSet<_> = picked.iter().collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn test_full_fraction_selects_everyone() {
        let mut sampler = ClientSampler::new(None);
        let mut picked = sampler.sample(&roster(4), 1.0).unwrap();
        picked.sort();
        assert_eq!(picked, roster(4));
    }

    #[test]
    fn test_seed_reproducible() {
        let a = ClientSampler::new(Some(42)).sample(&roster(20), 0.3).unwrap();
        let b = ClientSampler::new(Some(42)).sample(&roster(20), 0.3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_fraction() {
        let mut sampler = ClientSampler::new(Some(0));
        assert!(matches!(sampler.sample(&roster(3), 0.0), Err(Error::Config(_))));
        assert!(matches!(sampler.sample(&roster(3), 1.5), Err(Error::Config(_))));
        assert!(matches!(sampler.sample(&roster(3), f64::NAN), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_roster() {
        let mut sampler = ClientSampler::new(Some(0));
        assert!(matches!(sampler.sample(&[], 1.0), Err(Error::Aggregation(_))));
    }
}
