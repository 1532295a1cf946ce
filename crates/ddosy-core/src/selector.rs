//! Weighted payload selection.

use bytes::Bytes;
use rand::prelude::*;

use crate::error::RunError;
use crate::types::TrafficPattern;

/// Picks one payload per emission, with probability proportional to weight.
pub struct TrafficSelector<R = StdRng> {
    payloads: Vec<Bytes>,
    cumulative: Vec<f64>,
    total: f64,
    rng: R,
}

impl TrafficSelector<StdRng> {
    /// Create a selector seeded from OS entropy.
    pub fn new(patterns: &[TrafficPattern]) -> Result<Self, RunError> {
        Self::with_rng(patterns, StdRng::from_entropy())
    }

    /// Create a selector with a fixed seed for reproducible draws.
    pub fn seeded(patterns: &[TrafficPattern], seed: u64) -> Result<Self, RunError> {
        Self::with_rng(patterns, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> TrafficSelector<R> {
    pub fn with_rng(patterns: &[TrafficPattern], rng: R) -> Result<Self, RunError> {
        let mut cumulative = Vec::with_capacity(patterns.len());
        let mut total = 0.0;
        for (index, pattern) in patterns.iter().enumerate() {
            if !pattern.weight.is_finite() || pattern.weight < 0.0 {
                return Err(RunError::InvalidWeight {
                    index,
                    weight: pattern.weight,
                });
            }
            total += pattern.weight;
            cumulative.push(total);
        }
        if total <= 0.0 || !total.is_finite() {
            return Err(RunError::NoTrafficPatterns);
        }

        Ok(Self {
            payloads: patterns.iter().map(|p| p.payload.clone()).collect(),
            cumulative,
            total,
            rng,
        })
    }

    /// Index of the next pattern to send.
    pub fn select_index(&mut self) -> usize {
        let sample = self.rng.gen_range(0.0..self.total);
        // First interval whose upper bound lies above the sample; zero-weight
        // patterns have empty intervals and are skipped.
        let index = self.cumulative.partition_point(|&upper| upper <= sample);
        index.min(self.cumulative.len() - 1)
    }

    /// Payload of the next pattern to send. Cloning `Bytes` is a refcount bump.
    pub fn select(&mut self) -> Bytes {
        let index = self.select_index();
        self.payloads[index].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(weight: f64, payload: &'static str) -> TrafficPattern {
        TrafficPattern::new(weight, payload)
    }

    #[test]
    fn test_weighted_share_converges() {
        let patterns = vec![pattern(1.0, "A"), pattern(3.0, "B")];
        let mut selector = TrafficSelector::seeded(&patterns, 42).unwrap();

        let draws = 100_000;
        let b = (0..draws).filter(|_| selector.select_index() == 1).count();
        let share = b as f64 / draws as f64;
        assert!((share - 0.75).abs() < 0.01, "share of B was {}", share);
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let patterns = vec![pattern(0.0, "never"), pattern(2.0, "yes"), pattern(0.0, "no")];
        let mut selector = TrafficSelector::seeded(&patterns, 7).unwrap();

        for _ in 0..10_000 {
            assert_eq!(selector.select(), Bytes::from_static(b"yes"));
        }
    }

    #[test]
    fn test_single_pattern() {
        let patterns = vec![pattern(0.5, "only")];
        let mut selector = TrafficSelector::new(&patterns).unwrap();
        assert_eq!(selector.select(), Bytes::from_static(b"only"));
    }

    #[test]
    fn test_rejects_empty_and_zero_total() {
        assert_eq!(
            TrafficSelector::new(&[]).err(),
            Some(RunError::NoTrafficPatterns)
        );
        assert_eq!(
            TrafficSelector::new(&[pattern(0.0, "x")]).err(),
            Some(RunError::NoTrafficPatterns)
        );
    }

    #[test]
    fn test_rejects_overflowing_total() {
        let patterns = vec![pattern(1e308, "a"), pattern(1e308, "b")];
        assert_eq!(
            TrafficSelector::new(&patterns).err(),
            Some(RunError::NoTrafficPatterns)
        );
    }

    #[test]
    fn test_rejects_negative_weight() {
        let err = TrafficSelector::new(&[pattern(1.0, "a"), pattern(-1.0, "b")]).err();
        assert_eq!(
            err,
            Some(RunError::InvalidWeight {
                index: 1,
                weight: -1.0
            })
        );
    }
}
