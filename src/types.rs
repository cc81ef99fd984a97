//! Core data types
//!
//! Value types that flow through the momentum pipeline: engagement snapshots,
//! age buckets, per-bucket baselines, score computations and account aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ComputeError;
use crate::stats::IQR_EPSILON;

/// A single engagement observation of a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Platform video identifier
    pub video_id: String,
    /// When the observation was captured
    pub timestamp: DateTime<Utc>,
    /// When the video was published
    pub post_created_at: DateTime<Utc>,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
}

impl Snapshot {
    /// Post age at capture time, in fractional minutes
    pub fn age_minutes(&self) -> f64 {
        minutes_between(self.post_created_at, self.timestamp)
    }

    /// Likes + comments + shares
    pub fn interactions(&self) -> u64 {
        self.likes
            .saturating_add(self.comments)
            .saturating_add(self.shares)
    }

    /// Reject snapshots that cannot describe a real observation
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.video_id.trim().is_empty() {
            return Err(ComputeError::InvalidSnapshot(
                "video_id must not be empty".to_string(),
            ));
        }
        if self.timestamp < self.post_created_at {
            return Err(ComputeError::InvalidSnapshot(format!(
                "video {} observed at {} before it was posted at {}",
                self.video_id, self.timestamp, self.post_created_at
            )));
        }
        Ok(())
    }
}

/// Fractional minutes from `from` to `to` (negative when `to` is earlier)
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

/// Post-age window used to pick a comparable baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBucket {
    #[serde(rename = "0-15m")]
    Min0To15,
    #[serde(rename = "15-30m")]
    Min15To30,
    #[serde(rename = "30-60m")]
    Min30To60,
    #[serde(rename = "1-2h")]
    Hour1To2,
    #[serde(rename = "2-6h")]
    Hour2To6,
    #[serde(rename = "6-24h")]
    Hour6To24,
    #[serde(rename = "1-7d")]
    Day1To7,
}

impl AgeBucket {
    /// All buckets in ascending age order
    pub const ALL: [AgeBucket; 7] = [
        AgeBucket::Min0To15,
        AgeBucket::Min15To30,
        AgeBucket::Min30To60,
        AgeBucket::Hour1To2,
        AgeBucket::Hour2To6,
        AgeBucket::Hour6To24,
        AgeBucket::Day1To7,
    ];

    /// Map a post age to its bucket.
    ///
    /// Intervals are half-open; negative (or NaN) ages land in the first bucket and
    /// anything past a day, including beyond seven days, lands in the last.
    pub fn from_age_minutes(age_minutes: f64) -> Self {
        if age_minutes.is_nan() || age_minutes < 15.0 {
            AgeBucket::Min0To15
        } else if age_minutes < 30.0 {
            AgeBucket::Min15To30
        } else if age_minutes < 60.0 {
            AgeBucket::Min30To60
        } else if age_minutes < 120.0 {
            AgeBucket::Hour1To2
        } else if age_minutes < 360.0 {
            AgeBucket::Hour2To6
        } else if age_minutes < 1440.0 {
            AgeBucket::Hour6To24
        } else {
            AgeBucket::Day1To7
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBucket::Min0To15 => "0-15m",
            AgeBucket::Min15To30 => "15-30m",
            AgeBucket::Min30To60 => "30-60m",
            AgeBucket::Hour1To2 => "1-2h",
            AgeBucket::Hour2To6 => "2-6h",
            AgeBucket::Hour6To24 => "6-24h",
            AgeBucket::Day1To7 => "1-7d",
        }
    }
}

/// Distribution lifecycle stage of a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Testing,
    Expanding,
    Breakout,
    Plateau,
    Reignite,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Testing => "testing",
            Phase::Expanding => "expanding",
            Phase::Breakout => "breakout",
            Phase::Plateau => "plateau",
            Phase::Reignite => "reignite",
        }
    }
}

/// Median/IQR profile of the four rates for one age bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineBucket {
    pub bucket: AgeBucket,
    pub median_vpm: f64,
    pub iqr_vpm: f64,
    pub median_spm: f64,
    pub iqr_spm: f64,
    pub median_epr: f64,
    pub iqr_epr: f64,
    pub median_acc: f64,
    pub iqr_acc: f64,
    /// Number of contributing videos
    pub sample_size: u32,
}

impl BaselineBucket {
    /// Fallback for a bucket without observations: zero medians, ε IQRs
    pub fn empty(bucket: AgeBucket) -> Self {
        Self {
            bucket,
            median_vpm: 0.0,
            iqr_vpm: IQR_EPSILON,
            median_spm: 0.0,
            iqr_spm: IQR_EPSILON,
            median_epr: 0.0,
            iqr_epr: IQR_EPSILON,
            median_acc: 0.0,
            iqr_acc: IQR_EPSILON,
            sample_size: 0,
        }
    }
}

/// Full per-bucket baseline for one account, rebuilt wholesale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineTable {
    pub account_id: String,
    pub built_at: DateTime<Utc>,
    /// Number of videos that qualified for the build
    pub video_count: u32,
    buckets: BTreeMap<AgeBucket, BaselineBucket>,
}

impl BaselineTable {
    /// Build a table, filling any bucket not supplied with the empty fallback
    pub fn new(
        account_id: impl Into<String>,
        built_at: DateTime<Utc>,
        video_count: u32,
        buckets: impl IntoIterator<Item = BaselineBucket>,
    ) -> Self {
        let mut map: BTreeMap<AgeBucket, BaselineBucket> =
            buckets.into_iter().map(|b| (b.bucket, b)).collect();
        for bucket in AgeBucket::ALL {
            map.entry(bucket).or_insert_with(|| BaselineBucket::empty(bucket));
        }
        Self {
            account_id: account_id.into(),
            built_at,
            video_count,
            buckets: map,
        }
    }

    /// Table where every bucket uses the same profile (handy for fixtures and FFI callers)
    pub fn uniform(
        account_id: impl Into<String>,
        built_at: DateTime<Utc>,
        profile: BaselineBucket,
    ) -> Self {
        let buckets = AgeBucket::ALL.map(|bucket| BaselineBucket { bucket, ..profile });
        Self::new(account_id, built_at, profile.sample_size, buckets)
    }

    /// Baseline for a bucket; never missing
    pub fn get(&self, bucket: AgeBucket) -> BaselineBucket {
        self.buckets
            .get(&bucket)
            .copied()
            .unwrap_or_else(|| BaselineBucket::empty(bucket))
    }

    pub fn buckets(&self) -> impl Iterator<Item = &BaselineBucket> {
        self.buckets.values()
    }

    /// Load a table from JSON, restoring any bucket the payload omits
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let table: BaselineTable = serde_json::from_str(json)?;
        let BaselineTable {
            account_id,
            built_at,
            video_count,
            buckets,
        } = table;
        Ok(Self::new(account_id, built_at, video_count, buckets.into_values()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Per-driver weights applied to sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub velocity: f64,
    pub shares: f64,
    pub acceleration: f64,
    pub engagement: f64,
}

impl ScoreWeights {
    /// Tiered weights: early life is velocity/shares driven, late life engagement driven
    pub fn for_bucket(bucket: AgeBucket) -> Self {
        match bucket {
            AgeBucket::Min0To15 | AgeBucket::Min15To30 | AgeBucket::Min30To60 => Self {
                velocity: 0.35,
                shares: 0.30,
                acceleration: 0.20,
                engagement: 0.15,
            },
            AgeBucket::Hour1To2 | AgeBucket::Hour2To6 => Self {
                velocity: 0.35,
                shares: 0.25,
                acceleration: 0.15,
                engagement: 0.25,
            },
            AgeBucket::Hour6To24 | AgeBucket::Day1To7 => Self {
                velocity: 0.30,
                shares: 0.20,
                acceleration: 0.10,
                engagement: 0.40,
            },
        }
    }
}

/// Rates derived from a snapshot pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    /// Views per minute
    pub vpm: f64,
    /// Shares per minute
    pub spm: f64,
    /// Engagement per view
    pub epr: f64,
    /// Change in views per minute
    pub acc: f64,
}

/// Sigmoid-normalized sub-scores (0-1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub velocity: f64,
    pub shares: f64,
    pub engagement: f64,
    pub acceleration: f64,
}

/// Result of scoring one snapshot against its account baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypeComputation {
    /// Momentum score (0-100)
    pub score: u8,
    /// Weighted index before confidence shrinkage (0-1)
    pub raw: f64,
    /// Shrinkage factor (0.3-1.0)
    pub confidence: f64,
    pub phase: Phase,
    /// Confidence-scaled breakout likelihood (0-1)
    pub breakout_probability: f64,
    pub weights: ScoreWeights,
    pub age_bucket: AgeBucket,
    pub age_minutes: f64,
    pub rates: RateSample,
    pub components: SubScores,
}

/// A persisted computation tagged with its origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: Uuid,
    pub account_id: String,
    pub video_id: String,
    /// Capture time of the snapshot that was scored
    pub timestamp: DateTime<Utc>,
    pub computation: HypeComputation,
}

impl ScoreRecord {
    pub fn new(
        account_id: impl Into<String>,
        video_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        computation: HypeComputation,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.into(),
            video_id: video_id.into(),
            timestamp,
            computation,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// How much recent scores swing around their mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    Low,
    Moderate,
    High,
}

/// Account-level health aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountOverallComputation {
    /// Recency-weighted score (0-100)
    pub overall_score: u8,
    pub stability: Stability,
    /// Unweighted population standard deviation of the considered scores
    pub raw_std_dev: f64,
    /// Number of scores considered
    pub sample_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(AgeBucket::from_age_minutes(0.0), AgeBucket::Min0To15);
        assert_eq!(AgeBucket::from_age_minutes(14.99), AgeBucket::Min0To15);
        assert_eq!(AgeBucket::from_age_minutes(15.0), AgeBucket::Min15To30);
        assert_eq!(AgeBucket::from_age_minutes(30.0), AgeBucket::Min30To60);
        assert_eq!(AgeBucket::from_age_minutes(60.0), AgeBucket::Hour1To2);
        assert_eq!(AgeBucket::from_age_minutes(120.0), AgeBucket::Hour2To6);
        assert_eq!(AgeBucket::from_age_minutes(360.0), AgeBucket::Hour6To24);
        assert_eq!(AgeBucket::from_age_minutes(1440.0), AgeBucket::Day1To7);
        assert_eq!(AgeBucket::from_age_minutes(60.0 * 24.0 * 30.0), AgeBucket::Day1To7);
    }

    #[test]
    fn test_negative_age_maps_to_first_bucket() {
        assert_eq!(AgeBucket::from_age_minutes(-5.0), AgeBucket::Min0To15);
        assert_eq!(AgeBucket::from_age_minutes(f64::NAN), AgeBucket::Min0To15);
    }

    #[test]
    fn test_empty_bucket_is_division_safe() {
        let empty = BaselineBucket::empty(AgeBucket::Hour2To6);
        assert_eq!(empty.median_vpm, 0.0);
        assert_eq!(empty.iqr_vpm, IQR_EPSILON);
        assert_eq!(empty.iqr_spm, IQR_EPSILON);
        assert_eq!(empty.iqr_epr, IQR_EPSILON);
        assert_eq!(empty.iqr_acc, IQR_EPSILON);
        assert_eq!(empty.sample_size, 0);
    }

    #[test]
    fn test_table_never_missing_buckets() {
        let table = BaselineTable::new("acct", ts(12, 0), 0, Vec::new());
        assert_eq!(table.buckets().count(), 7);
        for bucket in AgeBucket::ALL {
            assert_eq!(table.get(bucket), BaselineBucket::empty(bucket));
        }
    }

    #[test]
    fn test_table_json_restores_omitted_buckets() {
        let json = r#"{
            "account_id": "acct",
            "built_at": "2024-03-01T12:00:00Z",
            "video_count": 4,
            "buckets": {
                "1-2h": {
                    "bucket": "1-2h",
                    "median_vpm": 10.0, "iqr_vpm": 2.0,
                    "median_spm": 0.01, "iqr_spm": 0.005,
                    "median_epr": 0.05, "iqr_epr": 0.01,
                    "median_acc": 0.0, "iqr_acc": 1.0,
                    "sample_size": 4
                }
            }
        }"#;
        let table = BaselineTable::from_json(json).unwrap();
        assert_eq!(table.buckets().count(), 7);
        assert_eq!(table.get(AgeBucket::Hour1To2).median_vpm, 10.0);
        assert_eq!(
            table.get(AgeBucket::Day1To7),
            BaselineBucket::empty(AgeBucket::Day1To7)
        );
    }

    #[test]
    fn test_weight_tiers_sum_to_one() {
        for bucket in AgeBucket::ALL {
            let w = ScoreWeights::for_bucket(bucket);
            let total = w.velocity + w.shares + w.acceleration + w.engagement;
            assert!((total - 1.0).abs() < 1e-9, "{bucket:?} sums to {total}");
        }
    }

    #[test]
    fn test_snapshot_validation() {
        let snapshot = Snapshot {
            video_id: "v1".to_string(),
            timestamp: ts(12, 0),
            post_created_at: ts(11, 0),
            views: 10,
            likes: 1,
            comments: 0,
            shares: 0,
        };
        assert!(snapshot.validate().is_ok());
        assert!((snapshot.age_minutes() - 60.0).abs() < 1e-9);

        let backwards = Snapshot {
            post_created_at: ts(13, 0),
            ..snapshot.clone()
        };
        assert!(backwards.validate().is_err());

        let anonymous = Snapshot {
            video_id: "  ".to_string(),
            ..snapshot
        };
        assert!(anonymous.validate().is_err());
    }
}
