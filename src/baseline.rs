//! Baseline construction
//!
//! This module builds per-age-bucket baselines from an account's snapshot history.
//! Baselines let a video's current rates be read relative to how the account's
//! videos usually perform at the same age.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::error::ComputeError;
use crate::normalizer::RateNormalizer;
use crate::stats::{iqr, median, IQR_EPSILON};
use crate::store::SnapshotStore;
use crate::types::{AgeBucket, BaselineBucket, BaselineTable, RateSample, Snapshot};

/// Default lookback window in days; older videos do not contribute
pub const DEFAULT_BASELINE_LOOKBACK_DAYS: i64 = 60;

/// Largest lookback accepted from configuration and requests
pub const MAX_BASELINE_LOOKBACK_DAYS: i64 = 3650;

/// Raw rate samples collected for one bucket
#[derive(Debug, Default)]
struct BucketSamples {
    vpm: Vec<f64>,
    spm: Vec<f64>,
    epr: Vec<f64>,
    acc: Vec<f64>,
}

impl BucketSamples {
    fn push(&mut self, rates: RateSample) {
        self.vpm.push(rates.vpm);
        self.spm.push(rates.spm);
        self.epr.push(rates.epr);
        self.acc.push(rates.acc);
    }

    fn summarize(&self, bucket: AgeBucket, sample_size: u32) -> BaselineBucket {
        if self.vpm.is_empty() {
            return BaselineBucket::empty(bucket);
        }

        BaselineBucket {
            bucket,
            median_vpm: median(&self.vpm),
            iqr_vpm: floored_iqr(&self.vpm),
            median_spm: median(&self.spm),
            iqr_spm: floored_iqr(&self.spm),
            median_epr: median(&self.epr),
            iqr_epr: floored_iqr(&self.epr),
            median_acc: median(&self.acc),
            iqr_acc: floored_iqr(&self.acc),
            sample_size,
        }
    }
}

fn floored_iqr(values: &[f64]) -> f64 {
    iqr(values).max(IQR_EPSILON)
}

/// Builder for account baseline tables
#[derive(Debug, Clone)]
pub struct BaselineBuilder {
    lookback_days: i64,
}

impl Default for BaselineBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE_LOOKBACK_DAYS)
    }
}

impl BaselineBuilder {
    /// Create a builder with a specific lookback window in days
    pub fn new(lookback_days: i64) -> Self {
        Self { lookback_days }
    }

    /// Build a table from in-memory snapshot series, one series per video.
    ///
    /// Series need not be sorted. A video qualifies when its earliest snapshot is
    /// within the lookback window. Every qualifying video counts toward the
    /// table's sample size, even if it has too few snapshots to produce a rate.
    pub fn build<I>(&self, account_id: &str, series: I, now: DateTime<Utc>) -> BaselineTable
    where
        I: IntoIterator<Item = Vec<Snapshot>>,
    {
        // An out-of-range window admits every video
        let cutoff = Duration::try_days(self.lookback_days)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut samples: BTreeMap<AgeBucket, BucketSamples> = BTreeMap::new();
        let mut qualifying_videos: u32 = 0;

        for mut snapshots in series {
            snapshots.sort_by_key(|s| s.timestamp);

            let Some(earliest) = snapshots.first() else {
                continue;
            };
            if earliest.timestamp < cutoff {
                continue;
            }
            qualifying_videos += 1;

            for (later_index, rates) in RateNormalizer::series_rates(&snapshots) {
                let bucket = AgeBucket::from_age_minutes(snapshots[later_index].age_minutes());
                samples.entry(bucket).or_default().push(rates);
            }
        }

        let buckets = AgeBucket::ALL.map(|bucket| match samples.get(&bucket) {
            Some(collected) => collected.summarize(bucket, qualifying_videos),
            None => BaselineBucket::empty(bucket),
        });

        tracing::debug!(
            account_id,
            qualifying_videos,
            populated_buckets = samples.len(),
            "baseline table built"
        );

        BaselineTable::new(account_id, now, qualifying_videos, buckets)
    }

    /// Fetch each candidate's series through the snapshot store, then build.
    pub async fn build_from_store(
        &self,
        store: &dyn SnapshotStore,
        account_id: &str,
        video_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<BaselineTable, ComputeError> {
        let mut series = Vec::with_capacity(video_ids.len());
        for video_id in video_ids {
            series.push(store.snapshots(video_id, None).await?);
        }
        Ok(self.build(account_id, series, now))
    }
}
