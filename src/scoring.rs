//! Momentum scoring
//!
//! Scores one video observation against its account baseline. Rates are
//! standardized with robust z-scores, squashed through a sigmoid, combined with
//! age-tiered weights and finally shrunk toward the neutral midpoint by how much
//! the baseline and snapshot pair can be trusted.
//!
//! The engine is a pure function of its inputs and performs no I/O.

use crate::normalizer::RateNormalizer;
use crate::phase::PhaseDetector;
use crate::stats::{clamp, robust_z_score, sigmoid};
use crate::types::{
    AgeBucket, BaselineBucket, BaselineTable, HypeComputation, RateSample, ScoreWeights,
    Snapshot, SubScores,
};

/// Videos in the baseline needed for full baseline confidence
const FULL_CONFIDENCE_SAMPLE_SIZE: f64 = 20.0;

/// Confidence floor and ceiling
pub const MIN_CONFIDENCE: f64 = 0.30;
pub const MAX_CONFIDENCE: f64 = 1.0;

/// Confidence multiplier when the interval had to be assumed
const NO_PREVIOUS_CONFIDENCE: f64 = 0.6;

/// Score at which breakout probability is one half, and its logistic scale
const BREAKOUT_MIDPOINT: f64 = 70.0;
const BREAKOUT_SCALE: f64 = 8.0;

/// Number of recent scores the phase detector looks at
pub const PHASE_HISTORY_LEN: usize = 2;

/// Resolution (in fractions of a point) the scaled score is snapped to before rounding
const SCORE_QUANTUM: f64 = 1e4;

/// Engine for per-video momentum scores
pub struct HypeScoringEngine;

impl HypeScoringEngine {
    /// Score the current observation of a video.
    ///
    /// # Arguments
    /// * `current` - Latest snapshot
    /// * `previous` - Snapshot before it, if any
    /// * `table` - Account baseline table
    /// * `recent_scores` - Prior scores for this video, oldest first
    pub fn score(
        current: &Snapshot,
        previous: Option<&Snapshot>,
        table: &BaselineTable,
        recent_scores: &[f64],
    ) -> HypeComputation {
        let age_minutes = current.age_minutes();
        let age_bucket = AgeBucket::from_age_minutes(age_minutes);
        let baseline = table.get(age_bucket);

        let rates = RateNormalizer::point_rates(current, previous);
        let components = sub_scores(&rates, &baseline);
        let weights = ScoreWeights::for_bucket(age_bucket);

        let raw = clamp(
            weights.velocity * components.velocity
                + weights.shares * components.shares
                + weights.acceleration * components.acceleration
                + weights.engagement * components.engagement,
            0.0,
            1.0,
        );

        let confidence = confidence(baseline.sample_size, previous.is_some());
        let adjusted = clamp(0.5 + (raw - 0.5) * confidence, 0.0, 1.0);
        let score = to_score(adjusted);

        let breakout_probability = clamp(
            sigmoid((score as f64 - BREAKOUT_MIDPOINT) / BREAKOUT_SCALE) * confidence,
            0.0,
            1.0,
        );

        let history_start = recent_scores.len().saturating_sub(PHASE_HISTORY_LEN);
        let phase =
            PhaseDetector::detect(score as f64, &recent_scores[history_start..], age_minutes);

        tracing::trace!(
            video_id = %current.video_id,
            score,
            raw,
            confidence,
            phase = phase.as_str(),
            bucket = age_bucket.as_str(),
            "scored snapshot"
        );

        HypeComputation {
            score,
            raw,
            confidence,
            phase,
            breakout_probability,
            weights,
            age_bucket,
            age_minutes,
            rates,
            components,
        }
    }
}

/// Robust-z then sigmoid for each rate against its matching baseline field
pub fn sub_scores(rates: &RateSample, baseline: &BaselineBucket) -> SubScores {
    SubScores {
        velocity: sigmoid(robust_z_score(rates.vpm, baseline.median_vpm, baseline.iqr_vpm)),
        shares: sigmoid(robust_z_score(rates.spm, baseline.median_spm, baseline.iqr_spm)),
        engagement: sigmoid(robust_z_score(rates.epr, baseline.median_epr, baseline.iqr_epr)),
        acceleration: sigmoid(robust_z_score(rates.acc, baseline.median_acc, baseline.iqr_acc)),
    }
}

/// Baseline adequacy times snapshot availability, kept within [0.3, 1.0]
pub fn confidence(sample_size: u32, has_previous: bool) -> f64 {
    let baseline_confidence = clamp(
        sample_size as f64 / FULL_CONFIDENCE_SAMPLE_SIZE,
        MIN_CONFIDENCE,
        MAX_CONFIDENCE,
    );
    let snapshot_confidence = if has_previous { 1.0 } else { NO_PREVIOUS_CONFIDENCE };
    clamp(
        baseline_confidence * snapshot_confidence,
        MIN_CONFIDENCE,
        MAX_CONFIDENCE,
    )
}

/// Scale an index in [0, 1] to an integer score in [0, 100]
fn to_score(adjusted: f64) -> u8 {
    // Snap sub-quantum float residue (e.g. a saturated sigmoid at 0.99999998) first
    let points = (adjusted * 100.0 * SCORE_QUANTUM).round() / SCORE_QUANTUM;
    points.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn posted() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn snap(age_min: i64, views: u64, likes: u64, comments: u64, shares: u64) -> Snapshot {
        Snapshot {
            video_id: "v1".to_string(),
            timestamp: posted() + Duration::minutes(age_min),
            post_created_at: posted(),
            views,
            likes,
            comments,
            shares,
        }
    }

    fn reference_table(sample_size: u32) -> BaselineTable {
        let profile = BaselineBucket {
            bucket: AgeBucket::Hour1To2,
            median_vpm: 10.0,
            iqr_vpm: 2.0,
            median_spm: 0.01,
            iqr_spm: 0.005,
            median_epr: 0.05,
            iqr_epr: 0.01,
            median_acc: 0.0,
            iqr_acc: 1.0,
            sample_size,
        };
        BaselineTable::uniform("acct", posted(), profile)
    }

    #[test]
    fn test_typical_interval_scores_above_midpoint() {
        let previous = snap(50, 500, 20, 2, 2);
        let current = snap(60, 600, 25, 2, 3);
        let result = HypeScoringEngine::score(&current, Some(&previous), &reference_table(50), &[]);

        assert_eq!(result.age_bucket, AgeBucket::Hour1To2);
        assert_eq!(result.score, 63);
        assert!((result.confidence - 1.0).abs() < 1e-12);
        assert!((result.breakout_probability - 0.294).abs() < 0.01);
        assert_eq!(result.weights, ScoreWeights::for_bucket(AgeBucket::Hour1To2));
    }

    #[test]
    fn test_surging_interval_saturates() {
        let previous = snap(50, 500, 20, 2, 2);
        let current = snap(60, 1600, 100, 20, 30);
        let result = HypeScoringEngine::score(&current, Some(&previous), &reference_table(50), &[]);

        assert_eq!(result.score, 100);
        assert!((result.confidence - 1.0).abs() < 1e-12);
        assert!(result.breakout_probability > 0.95);
    }

    #[test]
    fn test_scoring_is_pure() {
        let previous = snap(50, 500, 20, 2, 2);
        let current = snap(60, 900, 40, 5, 8);
        let table = reference_table(12);
        let history = [55.0, 61.0, 64.0];

        let first = HypeScoringEngine::score(&current, Some(&previous), &table, &history);
        for _ in 0..5 {
            let again = HypeScoringEngine::score(&current, Some(&previous), &table, &history);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_missing_previous_lowers_confidence() {
        let current = snap(60, 600, 25, 2, 3);
        let result = HypeScoringEngine::score(&current, None, &reference_table(50), &[]);
        assert!((result.confidence - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_small_baseline_confidence_floor() {
        assert!((confidence(0, true) - 0.3).abs() < 1e-12);
        assert!((confidence(0, false) - 0.3).abs() < 1e-12);
        assert!((confidence(10, true) - 0.5).abs() < 1e-12);
        assert!((confidence(10, false) - 0.3).abs() < 1e-12);
        assert!((confidence(40, false) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_low_confidence_shrinks_toward_midpoint() {
        let previous = snap(50, 500, 20, 2, 2);
        let current = snap(60, 1600, 100, 20, 30);
        let result = HypeScoringEngine::score(&current, Some(&previous), &reference_table(0), &[]);

        // raw ~0.997 shrunk by 0.3 toward 0.5
        assert_eq!(result.score, 65);
        assert!(result.raw > 0.99);
    }

    #[test]
    fn test_empty_table_does_not_blow_up() {
        let empty = BaselineTable::new("acct", posted(), 0, Vec::new());
        let current = snap(3, 0, 0, 0, 0);
        let result = HypeScoringEngine::score(&current, None, &empty, &[]);

        assert!(result.score <= 100);
        assert!(result.raw.is_finite());
        assert!((result.confidence - MIN_CONFIDENCE).abs() < 1e-12);
    }

    #[test]
    fn test_output_ranges_hold_across_inputs() {
        let tables = [reference_table(0), reference_table(7), reference_table(50)];
        let ages = [1, 14, 29, 59, 119, 359, 1439, 20_000];
        let views = [0, 10, 1_000, 1_000_000];

        for table in &tables {
            for &age in &ages {
                for &v in &views {
                    let previous = snap(age - 1, v / 2, v / 20, v / 50, v / 100);
                    let current = snap(age, v, v / 10, v / 40, v / 80);
                    for prev in [None, Some(&previous)] {
                        let r = HypeScoringEngine::score(&current, prev, table, &[40.0, 80.0]);
                        assert!(r.score <= 100);
                        assert!((0.0..=1.0).contains(&r.raw));
                        assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&r.confidence));
                        assert!((0.0..=1.0).contains(&r.breakout_probability));
                    }
                }
            }
        }
    }

    #[test]
    fn test_phase_uses_last_two_scores() {
        let previous = snap(50, 500, 20, 2, 2);
        let current = snap(60, 600, 25, 2, 3);

        // Score 63; only [58, 59] are considered, slope 4.5 on a 60 minute post
        let result = HypeScoringEngine::score(
            &current,
            Some(&previous),
            &reference_table(50),
            &[95.0, 58.0, 59.0],
        );
        assert_eq!(result.score, 63);
        assert_eq!(result.phase, Phase::Expanding);
    }
}
