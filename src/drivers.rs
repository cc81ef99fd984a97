//! Driver explanations
//!
//! Breaks a momentum score back down into its four drivers (velocity,
//! acceleration, shares, engagement) and packages each one as a display-ready
//! insight: how strong it is relative to the account baseline, which way it is
//! trending, and how much it contributes to the score at the video's age.
//!
//! Rates are re-derived with the same normalizer the scoring engine uses so the
//! explanation always matches the number it explains.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::normalizer::RateNormalizer;
use crate::stats::{mean, robust_z_score, sigmoid, IQR_EPSILON};
use crate::types::{AgeBucket, BaselineBucket, BaselineTable, RateSample, ScoreWeights, Snapshot};

/// Default number of prior samples in the trend window
pub const DEFAULT_TREND_WINDOW: usize = 3;

const STRONG_RATIO: f64 = 1.40;
const GOOD_RATIO: f64 = 1.15;
const NEUTRAL_RATIO: f64 = 0.90;

/// Pseudo-ratio slope per unit of z-score for drivers without a usable median
const PSEUDO_RATIO_PER_Z: f64 = 0.25;

/// Relative change beyond which a driver counts as rising or falling
const TREND_THRESHOLD: f64 = 0.05;

/// The four score drivers, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Velocity,
    Acceleration,
    Shares,
    Engagement,
}

impl DriverKind {
    pub const ALL: [DriverKind; 4] = [
        DriverKind::Velocity,
        DriverKind::Acceleration,
        DriverKind::Shares,
        DriverKind::Engagement,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DriverKind::Velocity => "Velocity",
            DriverKind::Acceleration => "Acceleration",
            DriverKind::Shares => "Shares",
            DriverKind::Engagement => "Engagement",
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            DriverKind::Velocity | DriverKind::Acceleration => "views/min",
            DriverKind::Shares => "shares/min",
            DriverKind::Engagement => "interactions/view",
        }
    }

    fn rate(&self, rates: &RateSample) -> f64 {
        match self {
            DriverKind::Velocity => rates.vpm,
            DriverKind::Acceleration => rates.acc,
            DriverKind::Shares => rates.spm,
            DriverKind::Engagement => rates.epr,
        }
    }

    fn baseline(&self, baseline: &BaselineBucket) -> (f64, f64) {
        match self {
            DriverKind::Velocity => (baseline.median_vpm, baseline.iqr_vpm),
            DriverKind::Acceleration => (baseline.median_acc, baseline.iqr_acc),
            DriverKind::Shares => (baseline.median_spm, baseline.iqr_spm),
            DriverKind::Engagement => (baseline.median_epr, baseline.iqr_epr),
        }
    }

    fn weight(&self, weights: &ScoreWeights) -> f64 {
        match self {
            DriverKind::Velocity => weights.velocity,
            DriverKind::Acceleration => weights.acceleration,
            DriverKind::Shares => weights.shares,
            DriverKind::Engagement => weights.engagement,
        }
    }
}

/// Driver level relative to the account's typical value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Strong,
    Good,
    Neutral,
    Weak,
}

impl Strength {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= STRONG_RATIO {
            Strength::Strong
        } else if ratio >= GOOD_RATIO {
            Strength::Good
        } else if ratio >= NEUTRAL_RATIO {
            Strength::Neutral
        } else {
            Strength::Weak
        }
    }

    fn phrase(&self) -> &'static str {
        match self {
            Strength::Strong => "well above usual",
            Strength::Good => "above usual",
            Strength::Neutral => "about usual",
            Strength::Weak => "below usual",
        }
    }
}

/// Direction of a driver versus its recent history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

/// One explained driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverInsight {
    pub kind: DriverKind,
    /// Current rate
    pub value: f64,
    /// Account median for the same age bucket
    pub baseline_median: f64,
    /// Ratio to baseline (pseudo-ratio for acceleration)
    pub ratio: f64,
    pub z_score: f64,
    /// Sigmoid-normalized contribution input (0-1)
    pub sub_score: f64,
    pub strength: Strength,
    pub trend: Trend,
    /// Share of the score weight at this age, in percent
    pub contribution_pct: u8,
    pub headline: String,
    pub detail: String,
}

/// Four insights in fixed order plus the weight breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverPack {
    pub age_bucket: AgeBucket,
    pub insights: Vec<DriverInsight>,
    /// Integer percentages summing to 100
    pub contributions: BTreeMap<DriverKind, u8>,
}

impl DriverPack {
    pub fn insight(&self, kind: DriverKind) -> Option<&DriverInsight> {
        self.insights.iter().find(|i| i.kind == kind)
    }
}

/// Builder for driver packs
#[derive(Debug, Clone)]
pub struct DriverPackBuilder {
    trend_window: usize,
}

impl Default for DriverPackBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TREND_WINDOW)
    }
}

impl DriverPackBuilder {
    /// Create a builder comparing against `trend_window` prior samples
    pub fn new(trend_window: usize) -> Self {
        Self { trend_window }
    }

    /// Explain the current observation.
    ///
    /// `history` holds rates from earlier observations, oldest first; only the
    /// newest `trend_window` entries are used for trend classification.
    pub fn build(
        &self,
        current: &Snapshot,
        previous: Option<&Snapshot>,
        table: &BaselineTable,
        history: &[RateSample],
    ) -> DriverPack {
        let age_bucket = AgeBucket::from_age_minutes(current.age_minutes());
        let baseline = table.get(age_bucket);
        let weights = ScoreWeights::for_bucket(age_bucket);
        let contributions = contribution_percentages(&weights);

        let rates = RateNormalizer::point_rates(current, previous);
        let window_start = history.len().saturating_sub(self.trend_window);
        let window = &history[window_start..];

        let insights = DriverKind::ALL
            .iter()
            .map(|&kind| {
                let value = kind.rate(&rates);
                let (median, iqr) = kind.baseline(&baseline);
                let z_score = robust_z_score(value, median, iqr);
                let ratio = strength_ratio(kind, value, median, z_score);
                let strength = Strength::from_ratio(ratio);
                let past: Vec<f64> = window.iter().map(|r| kind.rate(r)).collect();
                let trend = classify_trend(value, &past);
                let contribution_pct = contributions.get(&kind).copied().unwrap_or(0);

                DriverInsight {
                    kind,
                    value,
                    baseline_median: median,
                    ratio,
                    z_score,
                    sub_score: sigmoid(z_score),
                    strength,
                    trend,
                    contribution_pct,
                    headline: headline(kind, strength, trend),
                    detail: detail(kind, value, median, ratio, z_score),
                }
            })
            .collect();

        DriverPack {
            age_bucket,
            insights,
            contributions,
        }
    }

    /// Explain the latest observation of a snapshot series.
    ///
    /// The series is sorted; earlier consecutive pairs feed the trend window.
    /// Returns `None` for an empty series.
    pub fn build_from_series(
        &self,
        series: &[Snapshot],
        table: &BaselineTable,
    ) -> Option<DriverPack> {
        let mut sorted = series.to_vec();
        sorted.sort_by_key(|s| s.timestamp);

        let (current, earlier) = sorted.split_last()?;
        let previous = earlier.last();

        let history: Vec<RateSample> = earlier
            .windows(2)
            .map(|pair| RateNormalizer::point_rates(&pair[1], Some(&pair[0])))
            .collect();

        Some(self.build(current, previous, table, &history))
    }
}

/// Literal ratio to median, or `1 + 0.25·z` where a ratio is meaningless
fn strength_ratio(kind: DriverKind, value: f64, median: f64, z_score: f64) -> f64 {
    if kind == DriverKind::Acceleration || median.abs() <= IQR_EPSILON {
        1.0 + PSEUDO_RATIO_PER_Z * z_score
    } else {
        value / median
    }
}

/// Compare the current value against the mean of the window
pub fn classify_trend(current: f64, history: &[f64]) -> Trend {
    if history.is_empty() {
        return Trend::Flat;
    }

    let reference = mean(history);
    let change = if reference.abs() <= IQR_EPSILON {
        // No meaningful base to take a percentage of
        if current > reference + IQR_EPSILON {
            1.0
        } else if current < reference - IQR_EPSILON {
            -1.0
        } else {
            0.0
        }
    } else {
        (current - reference) / reference.abs()
    };

    if change > TREND_THRESHOLD {
        Trend::Rising
    } else if change < -TREND_THRESHOLD {
        Trend::Falling
    } else {
        Trend::Flat
    }
}

/// Weights as integer percentages, largest remainder so the total is exactly 100
pub fn contribution_percentages(weights: &ScoreWeights) -> BTreeMap<DriverKind, u8> {
    let total: f64 = DriverKind::ALL.iter().map(|k| k.weight(weights)).sum();
    let total = if total > 0.0 { total } else { 1.0 };

    let exact: Vec<(DriverKind, f64)> = DriverKind::ALL
        .iter()
        .map(|&k| {
            let pct = k.weight(weights) / total * 100.0;
            // Drop float residue so 29.999999999999996 floors to 30
            (k, (pct * 1e6).round() / 1e6)
        })
        .collect();

    let mut floors: BTreeMap<DriverKind, u8> = exact
        .iter()
        .map(|&(k, pct)| (k, pct.floor() as u8))
        .collect();
    let assigned: u32 = floors.values().map(|&v| v as u32).sum();

    let mut by_remainder = exact.clone();
    by_remainder.sort_by(|a, b| (b.1 - b.1.floor()).total_cmp(&(a.1 - a.1.floor())));

    for (kind, _) in by_remainder.iter().take(100u32.saturating_sub(assigned) as usize) {
        if let Some(pct) = floors.get_mut(kind) {
            *pct += 1;
        }
    }

    floors
}

fn headline(kind: DriverKind, strength: Strength, trend: Trend) -> String {
    let direction = match trend {
        Trend::Rising => ", rising",
        Trend::Falling => ", falling",
        Trend::Flat => "",
    };
    format!("{} {}{}", kind.label(), strength.phrase(), direction)
}

fn detail(kind: DriverKind, value: f64, median: f64, ratio: f64, z_score: f64) -> String {
    match kind {
        DriverKind::Acceleration => {
            format!("{value:+.2} {} change (z {z_score:+.2})", kind.unit())
        }
        DriverKind::Engagement => {
            format!(
                "{:.2}% vs {:.2}% typical ({ratio:.2}x)",
                value * 100.0,
                median * 100.0
            )
        }
        _ => format!("{value:.2} {} vs {median:.2} typical ({ratio:.2}x)", kind.unit()),
    }
}
