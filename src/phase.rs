//! Lifecycle phase detection
//!
//! Stateless rule evaluation over (score, short score history, age). Rules are
//! checked in priority order and the first match wins; nothing about the
//! previous phase is stored, so a phase can never drift out of sync with the
//! scores it was derived from.

use crate::stats::mean;
use crate::types::Phase;

const MOMENTUM_SLOPE: f64 = 4.0;
const EXPANSION_SLOPE: f64 = 2.0;
const FLAT_SLOPE: f64 = 2.0;

const REIGNITE_MIN_AGE_MIN: f64 = 360.0;
const REIGNITE_PRIOR_LOW_SCORE: f64 = 50.0;
const REIGNITE_MIN_SCORE: f64 = 60.0;

const BREAKOUT_MIN_AGE_MIN: f64 = 45.0;
const BREAKOUT_MIN_SCORE: f64 = 65.0;

const PLATEAU_MIN_SCORE: f64 = 45.0;
const PLATEAU_MAX_SCORE: f64 = 70.0;
const PLATEAU_MIN_AGE_MIN: f64 = 20.0;

const EXPANDING_MIN_SCORE: f64 = 60.0;

const TESTING_MAX_AGE_MIN: f64 = 20.0;
const TESTING_MAX_SCORE: f64 = 55.0;

const FALLBACK_PLATEAU_AGE_MIN: f64 = 60.0;

/// Rule engine mapping a score trajectory to a lifecycle phase
pub struct PhaseDetector;

impl PhaseDetector {
    /// Classify a video.
    ///
    /// # Arguments
    /// * `score` - Current momentum score (0-100)
    /// * `history` - Recent prior scores, oldest first (typically the last two)
    /// * `age_minutes` - Post age of the scored observation
    pub fn detect(score: f64, history: &[f64], age_minutes: f64) -> Phase {
        let slope = slope(score, history);
        let dipped_before = history.iter().any(|&h| h < REIGNITE_PRIOR_LOW_SCORE);

        if age_minutes > REIGNITE_MIN_AGE_MIN
            && slope >= MOMENTUM_SLOPE
            && dipped_before
            && score > REIGNITE_MIN_SCORE
        {
            return Phase::Reignite;
        }

        if age_minutes > BREAKOUT_MIN_AGE_MIN
            && slope >= MOMENTUM_SLOPE
            && score >= BREAKOUT_MIN_SCORE
        {
            return Phase::Breakout;
        }

        if slope.abs() < FLAT_SLOPE
            && (PLATEAU_MIN_SCORE..=PLATEAU_MAX_SCORE).contains(&score)
            && age_minutes >= PLATEAU_MIN_AGE_MIN
        {
            return Phase::Plateau;
        }

        if score >= EXPANDING_MIN_SCORE && (slope >= EXPANSION_SLOPE || history.is_empty()) {
            return Phase::Expanding;
        }

        if age_minutes < TESTING_MAX_AGE_MIN && score < TESTING_MAX_SCORE {
            return Phase::Testing;
        }

        if score >= EXPANDING_MIN_SCORE {
            Phase::Expanding
        } else if age_minutes >= FALLBACK_PLATEAU_AGE_MIN {
            Phase::Plateau
        } else {
            Phase::Testing
        }
    }
}

/// Score minus the mean of the history; the score itself when history is empty
fn slope(score: f64, history: &[f64]) -> f64 {
    if history.is_empty() {
        score
    } else {
        score - mean(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reignite_after_dip() {
        assert_eq!(PhaseDetector::detect(65.0, &[40.0, 45.0], 400.0), Phase::Reignite);
    }

    #[test]
    fn test_reignite_requires_prior_dip() {
        // Same climb without any history below 50 is a breakout instead
        assert_eq!(PhaseDetector::detect(70.0, &[60.0, 62.0], 400.0), Phase::Breakout);
    }

    #[test]
    fn test_breakout() {
        assert_eq!(PhaseDetector::detect(70.0, &[65.0, 65.0], 50.0), Phase::Breakout);
    }

    #[test]
    fn test_breakout_needs_age() {
        // Too young for breakout; climbing above 60 reads as expanding
        assert_eq!(PhaseDetector::detect(70.0, &[65.0, 65.0], 40.0), Phase::Expanding);
    }

    #[test]
    fn test_plateau_flat_midrange() {
        assert_eq!(PhaseDetector::detect(55.0, &[54.0, 56.0], 90.0), Phase::Plateau);
        assert_eq!(PhaseDetector::detect(70.0, &[69.0, 71.0], 25.0), Phase::Plateau);
    }

    #[test]
    fn test_expanding_without_history() {
        // Empty history makes slope equal to the score, which is steep enough for breakout
        assert_eq!(PhaseDetector::detect(62.0, &[], 30.0), Phase::Expanding);
        assert_eq!(PhaseDetector::detect(66.0, &[], 50.0), Phase::Breakout);
    }

    #[test]
    fn test_expanding_moderate_climb() {
        assert_eq!(PhaseDetector::detect(75.0, &[72.0, 72.0], 120.0), Phase::Expanding);
    }

    #[test]
    fn test_testing_young_low_score() {
        assert_eq!(PhaseDetector::detect(40.0, &[], 5.0), Phase::Testing);
        assert_eq!(PhaseDetector::detect(40.0, &[45.0, 50.0], 10.0), Phase::Testing);
    }

    #[test]
    fn test_fallbacks() {
        // High score, falling: not plateau (outside range), not expanding by slope
        assert_eq!(PhaseDetector::detect(80.0, &[90.0, 95.0], 200.0), Phase::Expanding);
        // Low score on an older video
        assert_eq!(PhaseDetector::detect(30.0, &[50.0, 50.0], 240.0), Phase::Plateau);
        // Low score, middle age, falling
        assert_eq!(PhaseDetector::detect(30.0, &[50.0, 50.0], 40.0), Phase::Testing);
    }

    #[test]
    fn test_rule_priority_reignite_over_breakout() {
        // Satisfies both reignite and breakout; reignite is checked first
        assert_eq!(PhaseDetector::detect(80.0, &[45.0, 90.0], 500.0), Phase::Reignite);
    }
}
