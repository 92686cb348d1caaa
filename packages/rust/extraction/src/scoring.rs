//! Confidence scoring for parsed grants.
//!
//! The provider does not report how much it trusts each record, so the
//! parser asks a [`ConfidenceScorer`] for one. Every score lands in
//! `[MIN_CONFIDENCE, MAX_CONFIDENCE)`.

use rand::Rng;
use serde_json::Value;

/// Inclusive lower bound of a confidence score.
pub const MIN_CONFIDENCE: f64 = 0.90;

/// Exclusive upper bound of a confidence score.
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Strategy that assigns a trust weight to one raw extracted record.
pub trait ConfidenceScorer: Send + Sync {
    /// Score the raw JSON object the grant was built from.
    fn score(&self, raw: &Value) -> f64;
}

/// Uniformly random score in `[0.90, 0.99)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomScorer;

impl ConfidenceScorer for RandomScorer {
    fn score(&self, _raw: &Value) -> f64 {
        sample_confidence(&mut rand::rng())
    }
}

/// Draw a score from `rng`. Float sampling can round up to the exclusive
/// bound, so the draw is clamped back into range.
pub fn sample_confidence<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    clamp_confidence(rng.random_range(MIN_CONFIDENCE..MAX_CONFIDENCE))
}

/// Always returns the same score, clamped into range. Useful in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer(pub f64);

impl ConfidenceScorer for FixedScorer {
    fn score(&self, _raw: &Value) -> f64 {
        clamp_confidence(self.0)
    }
}

/// Pull an arbitrary score into `[MIN_CONFIDENCE, MAX_CONFIDENCE)`.
pub fn clamp_confidence(score: f64) -> f64 {
    if score.is_nan() || score < MIN_CONFIDENCE {
        MIN_CONFIDENCE
    } else if score >= MAX_CONFIDENCE {
        // Largest f64 strictly below the exclusive bound.
        f64::from_bits(MAX_CONFIDENCE.to_bits() - 1)
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    /// Generator stuck at its largest output.
    struct SaturatedRng;

    impl RngCore for SaturatedRng {
        fn next_u32(&mut self) -> u32 {
            u32::MAX
        }

        fn next_u64(&mut self) -> u64 {
            u64::MAX
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(0xff);
        }
    }

    #[test]
    fn random_scores_stay_in_range() {
        let raw = serde_json::json!({});
        for _ in 0..1_000 {
            let s = RandomScorer.score(&raw);
            assert!((MIN_CONFIDENCE..MAX_CONFIDENCE).contains(&s), "out of range: {s}");
        }
    }

    #[test]
    fn saturated_draw_stays_below_upper_bound() {
        let s = sample_confidence(&mut SaturatedRng);
        assert!(s < MAX_CONFIDENCE, "reached the exclusive bound: {s}");
        assert!(s >= MIN_CONFIDENCE);
    }

    #[test]
    fn fixed_scorer_clamps() {
        let raw = serde_json::json!({});
        assert_eq!(FixedScorer(0.95).score(&raw), 0.95);
        assert_eq!(FixedScorer(0.1).score(&raw), MIN_CONFIDENCE);
        assert!(FixedScorer(1.0).score(&raw) < MAX_CONFIDENCE);
        assert_eq!(FixedScorer(f64::NAN).score(&raw), MIN_CONFIDENCE);
    }
}
