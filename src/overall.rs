//! Account-level aggregate
//!
//! Folds an account's most recent video scores into one health number. Newer
//! scores count more: each is weighted by `exp(-age_days / 7)`. Stability is
//! read from the plain (unweighted) spread of the same scores.

use chrono::{DateTime, Utc};

use crate::stats::{clamp, population_std_dev};
use crate::types::{AccountOverallComputation, Stability};

/// Default number of most recent scores considered
pub const DEFAULT_OVERALL_WINDOW: usize = 10;

/// Recency decay constant in days
pub const RECENCY_DECAY_DAYS: f64 = 7.0;

const LOW_STABILITY_MAX_SD: f64 = 10.0;
const MODERATE_STABILITY_MAX_SD: f64 = 20.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Engine for account health aggregates
#[derive(Debug, Clone)]
pub struct AccountOverallEngine {
    window: usize,
}

impl Default for AccountOverallEngine {
    fn default() -> Self {
        Self::new(DEFAULT_OVERALL_WINDOW)
    }
}

impl AccountOverallEngine {
    /// Create an engine considering at most `window` scores
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Aggregate `(timestamp, score)` pairs relative to `now`.
    ///
    /// Input order does not matter; only the newest `window` entries are used.
    /// Scores stamped after `now` are treated as zero days old.
    pub fn compute(
        &self,
        scores: &[(DateTime<Utc>, f64)],
        now: DateTime<Utc>,
    ) -> AccountOverallComputation {
        let mut recent: Vec<(DateTime<Utc>, f64)> = scores.to_vec();
        recent.sort_by(|a, b| b.0.cmp(&a.0));
        recent.truncate(self.window);

        if recent.is_empty() {
            return AccountOverallComputation {
                overall_score: 0,
                stability: Stability::Low,
                raw_std_dev: 0.0,
                sample_count: 0,
            };
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (timestamp, score) in &recent {
            let weight = recency_weight(*timestamp, now);
            weighted_sum += weight * score;
            weight_total += weight;
        }

        let weighted_mean = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        let values: Vec<f64> = recent.iter().map(|(_, score)| *score).collect();
        let raw_std_dev = population_std_dev(&values);

        AccountOverallComputation {
            overall_score: clamp(weighted_mean.round(), 0.0, 100.0) as u8,
            stability: stability_for(raw_std_dev),
            raw_std_dev,
            sample_count: recent.len(),
        }
    }
}

/// `exp(-age_days / 7)` with negative ages clamped to zero
pub fn recency_weight(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = ((now - timestamp).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    (-age_days / RECENCY_DECAY_DAYS).exp()
}

/// Map a score spread to a stability label
pub fn stability_for(std_dev: f64) -> Stability {
    if std_dev < LOW_STABILITY_MAX_SD {
        Stability::Low
    } else if std_dev <= MODERATE_STABILITY_MAX_SD {
        Stability::Moderate
    } else {
        Stability::High
    }
}
