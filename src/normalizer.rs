//! Snapshot rate normalization
//!
//! Converts raw engagement counters into per-minute and per-view rates. Every
//! engine derives its rates here so baselines, scores, driver explanations and
//! lifecycle curves agree on the same numbers.

use crate::types::{minutes_between, RateSample, Snapshot};

/// Floor for the interval between two observations, in minutes
pub const MIN_INTERVAL_MINUTES: f64 = 0.5;

/// Interval assumed when no previous observation exists, in minutes
pub const DEFAULT_INTERVAL_MINUTES: f64 = 5.0;

/// Normalizer for snapshot counters
pub struct RateNormalizer;

impl RateNormalizer {
    /// Rates for a scoring pair.
    ///
    /// Acceleration compares the interval velocity against the lifetime-average
    /// velocity of the previous observation (views / age), so a single pair is
    /// enough to tell whether a video is speeding up.
    pub fn point_rates(current: &Snapshot, previous: Option<&Snapshot>) -> RateSample {
        let dt = interval_minutes(current, previous);
        let vpm = views_per_minute(current, previous, dt);
        let spm = shares_per_minute(current, previous, dt);
        let epr = engagement_per_view(current);
        let acc = vpm - inferred_previous_vpm(previous);

        RateSample { vpm, spm, epr, acc }
    }

    /// Rates for every consecutive pair of a chronological series.
    ///
    /// Returns `(index_of_later_snapshot, rates)`. Acceleration is the change in
    /// interval velocity between consecutive pairs and is zero for the first pair.
    pub fn series_rates(series: &[Snapshot]) -> Vec<(usize, RateSample)> {
        let mut samples = Vec::with_capacity(series.len().saturating_sub(1));
        let mut previous_vpm: Option<f64> = None;

        for (index, pair) in series.windows(2).enumerate() {
            let (earlier, later) = (&pair[0], &pair[1]);
            let dt = interval_minutes(later, Some(earlier));
            let vpm = views_per_minute(later, Some(earlier), dt);
            let spm = shares_per_minute(later, Some(earlier), dt);
            let epr = engagement_per_view(later);
            let acc = previous_vpm.map(|prev| vpm - prev).unwrap_or(0.0);
            previous_vpm = Some(vpm);

            samples.push((index + 1, RateSample { vpm, spm, epr, acc }));
        }

        samples
    }
}

/// Minutes between two observations, floored; 5 minutes when there is no previous
pub fn interval_minutes(current: &Snapshot, previous: Option<&Snapshot>) -> f64 {
    match previous {
        Some(prev) => minutes_between(prev.timestamp, current.timestamp).max(MIN_INTERVAL_MINUTES),
        None => DEFAULT_INTERVAL_MINUTES,
    }
}

/// Non-negative view delta per minute (missing previous counts as zero views)
pub fn views_per_minute(current: &Snapshot, previous: Option<&Snapshot>, dt_minutes: f64) -> f64 {
    let prev_views = previous.map(|p| p.views).unwrap_or(0);
    counter_delta(current.views, prev_views) / dt_minutes
}

/// Non-negative share delta per minute (missing previous counts as zero shares)
pub fn shares_per_minute(current: &Snapshot, previous: Option<&Snapshot>, dt_minutes: f64) -> f64 {
    let prev_shares = previous.map(|p| p.shares).unwrap_or(0);
    counter_delta(current.shares, prev_shares) / dt_minutes
}

/// (likes + comments + shares) / views, with views floored at one
pub fn engagement_per_view(snapshot: &Snapshot) -> f64 {
    snapshot.interactions() as f64 / snapshot.views.max(1) as f64
}

/// Lifetime-average velocity of the previous observation; zero without one
pub fn inferred_previous_vpm(previous: Option<&Snapshot>) -> f64 {
    match previous {
        Some(prev) => prev.views as f64 / prev.age_minutes().max(MIN_INTERVAL_MINUTES),
        None => 0.0,
    }
}

/// Counters can be corrected downward by the platform; treat drops as no growth
fn counter_delta(current: u64, previous: u64) -> f64 {
    current.saturating_sub(previous) as f64
}
