//! Pipeline orchestration
//!
//! This module provides the public API for Momentum Flux. `AnalyticsScoringService`
//! drives the engines against injected stores; the `*_json` functions run the same
//! engines statelessly over request payloads and back the FFI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::baseline::{BaselineBuilder, MAX_BASELINE_LOOKBACK_DAYS};
use crate::config::ServiceConfig;
use crate::drivers::{DriverPack, DriverPackBuilder};
use crate::error::ComputeError;
use crate::lifecycle::{LifecycleLineBuilder, LifecycleLineModel};
use crate::overall::AccountOverallEngine;
use crate::scoring::HypeScoringEngine;
use crate::store::{BaselineStore, InMemoryStore, ScoreStore, SnapshotStore};
use crate::types::{
    AccountOverallComputation, BaselineTable, HypeComputation, ScoreRecord, Snapshot,
};

/// Stateful orchestration over snapshot, baseline and score stores.
///
/// Each call runs its stages sequentially; a store fault aborts the call before
/// anything further is written.
pub struct AnalyticsScoringService {
    snapshots: Arc<dyn SnapshotStore>,
    baselines: Arc<dyn BaselineStore>,
    scores: Arc<dyn ScoreStore>,
    config: ServiceConfig,
}

impl AnalyticsScoringService {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        baselines: Arc<dyn BaselineStore>,
        scores: Arc<dyn ScoreStore>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            snapshots,
            baselines,
            scores,
            config,
        }
    }

    /// Service backed by one in-memory store for all three contracts
    pub fn in_memory(store: Arc<InMemoryStore>, config: ServiceConfig) -> Self {
        Self::new(store.clone(), store.clone(), store, config)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Score the latest snapshot of a video and persist the result.
    ///
    /// Builds and saves the account baseline first if none exists. Returns
    /// `Ok(None)` when the video has no snapshots.
    pub async fn refresh_hype_for_video(
        &self,
        account_id: &str,
        video_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<HypeComputation>, ComputeError> {
        let table = self.baseline_or_build(account_id, now).await?;

        let series = self.snapshots.snapshots(video_id, None).await?;
        let Some((current, earlier)) = series.split_last() else {
            tracing::warn!(account_id, video_id, "no snapshots for video, skipping refresh");
            return Ok(None);
        };
        let previous = earlier.last();

        let mut recent = self
            .scores
            .recent_scores_for_video(account_id, video_id, self.config.video_history_limit)
            .await?;
        recent.reverse();
        let history: Vec<f64> = recent.iter().map(|r| r.computation.score as f64).collect();

        tracing::debug!(account_id, video_id, history = history.len(), "scoring latest snapshot");
        let computation = HypeScoringEngine::score(current, previous, &table, &history);

        let record =
            ScoreRecord::new(account_id, video_id, current.timestamp, computation.clone());
        self.scores.save_score(&record).await?;

        tracing::info!(
            account_id,
            video_id,
            score = computation.score,
            phase = computation.phase.as_str(),
            "score persisted"
        );

        Ok(Some(computation))
    }

    /// Recency-weighted aggregate over the account's most recent scores
    pub async fn compute_overall_for_account(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AccountOverallComputation, ComputeError> {
        let recent = self
            .scores
            .recent_scores(account_id, self.config.overall_window)
            .await?;
        let scores: Vec<(DateTime<Utc>, f64)> = recent
            .iter()
            .map(|r| (r.timestamp, r.computation.score as f64))
            .collect();

        tracing::debug!(account_id, samples = scores.len(), "computing account overall");
        Ok(AccountOverallEngine::new(self.config.overall_window).compute(&scores, now))
    }

    /// Rebuild the account baseline from its recent videos and replace the stored table
    pub async fn rebuild_baseline(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<BaselineTable, ComputeError> {
        let video_ids = self
            .snapshots
            .recent_video_ids(account_id, self.config.baseline_candidate_limit)
            .await?;

        let table = BaselineBuilder::new(self.config.baseline_lookback_days)
            .build_from_store(self.snapshots.as_ref(), account_id, &video_ids, now)
            .await?;
        self.baselines.save_baseline(&table).await?;

        tracing::info!(
            account_id,
            candidates = video_ids.len(),
            videos = table.video_count,
            "baseline rebuilt"
        );
        Ok(table)
    }

    /// Replay a video's series in order, scoring and persisting every snapshot.
    ///
    /// Each snapshot is scored against its predecessor, with the scores produced so
    /// far as phase history. Snapshots that already have a stored record keep it and
    /// are not written again, so repeated runs leave the history unchanged. Returns
    /// one computation per snapshot in series order.
    pub async fn backfill_video(
        &self,
        account_id: &str,
        video_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<HypeComputation>, ComputeError> {
        let table = self.baseline_or_build(account_id, now).await?;
        let series = self.snapshots.snapshots(video_id, None).await?;
        if series.is_empty() {
            tracing::warn!(account_id, video_id, "no snapshots for video, nothing to backfill");
            return Ok(Vec::new());
        }

        let stored: BTreeMap<DateTime<Utc>, HypeComputation> = self
            .scores
            .score_history(account_id, video_id, usize::MAX)
            .await?
            .into_iter()
            .map(|r| (r.timestamp, r.computation))
            .collect();

        let mut history: Vec<f64> = Vec::new();
        let mut computations = Vec::with_capacity(series.len());
        let mut written = 0usize;
        for (i, current) in series.iter().enumerate() {
            let computation = match stored.get(&current.timestamp) {
                Some(existing) => existing.clone(),
                None => {
                    let previous = i.checked_sub(1).map(|p| &series[p]);
                    let window_start =
                        history.len().saturating_sub(self.config.video_history_limit);
                    let computation = HypeScoringEngine::score(
                        current,
                        previous,
                        &table,
                        &history[window_start..],
                    );

                    let record = ScoreRecord::new(
                        account_id,
                        video_id,
                        current.timestamp,
                        computation.clone(),
                    );
                    self.scores.save_score(&record).await?;
                    written += 1;
                    computation
                }
            };

            history.push(computation.score as f64);
            computations.push(computation);
        }

        tracing::info!(
            account_id,
            video_id,
            written,
            kept = computations.len() - written,
            "video backfilled"
        );
        Ok(computations)
    }

    /// Refresh every recent video of an account, one after another
    pub async fn refresh_account(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, HypeComputation)>, ComputeError> {
        let video_ids = self
            .snapshots
            .recent_video_ids(account_id, self.config.baseline_candidate_limit)
            .await?;

        let mut results = Vec::with_capacity(video_ids.len());
        for video_id in video_ids {
            let refreshed = self.refresh_hype_for_video(account_id, &video_id, now).await?;
            if let Some(computation) = refreshed {
                results.push((video_id, computation));
            }
        }
        Ok(results)
    }

    /// Driver breakdown for the latest snapshot of a video
    pub async fn driver_pack_for_video(
        &self,
        account_id: &str,
        video_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DriverPack>, ComputeError> {
        let table = self.baseline_or_build(account_id, now).await?;
        let series = self.snapshots.snapshots(video_id, None).await?;
        let builder = DriverPackBuilder::new(self.config.driver_trend_window);
        Ok(builder.build_from_series(&series, &table))
    }

    /// Lifecycle curve from the video's series and persisted score history
    pub async fn lifecycle_for_video(
        &self,
        account_id: &str,
        video_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LifecycleLineModel, ComputeError> {
        let series = self.snapshots.snapshots(video_id, None).await?;
        let history: Vec<(DateTime<Utc>, HypeComputation)> = self
            .scores
            .score_history(account_id, video_id, self.config.lifecycle_history_limit)
            .await?
            .into_iter()
            .map(|r| (r.timestamp, r.computation))
            .collect();

        Ok(LifecycleLineBuilder::build(&series, &history, now))
    }

    async fn baseline_or_build(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<BaselineTable, ComputeError> {
        match self.baselines.baseline(account_id).await? {
            Some(table) => Ok(table),
            None => {
                tracing::debug!(account_id, "no stored baseline, building one");
                self.rebuild_baseline(account_id, now).await
            }
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Score the latest snapshot of one video's series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub snapshots: Vec<Snapshot>,
    pub baseline: BaselineTable,
    /// Prior scores of this video, oldest first
    #[serde(default)]
    pub recent_scores: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimedScore {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
}

/// Aggregate an account's recent scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallRequest {
    pub scores: Vec<TimedScore>,
    pub now: DateTime<Utc>,
    #[serde(default)]
    pub window: Option<usize>,
}

/// Explain the latest snapshot of one video's series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriversRequest {
    pub snapshots: Vec<Snapshot>,
    pub baseline: BaselineTable,
    #[serde(default)]
    pub trend_window: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub computation: HypeComputation,
}

/// Draw one video's lifecycle curve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRequest {
    pub snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub now: DateTime<Utc>,
}

/// Build a baseline from snapshots of any number of videos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineRequest {
    pub account_id: String,
    pub snapshots: Vec<Snapshot>,
    pub now: DateTime<Utc>,
    #[serde(default)]
    pub lookback_days: Option<i64>,
}

/// Score a request payload, returning the computation as JSON
pub fn score_json(request_json: &str) -> Result<String, ComputeError> {
    let request: ScoreRequest = serde_json::from_str(request_json)?;
    let series = validated_series(request.snapshots)?;
    let (current, earlier) = series
        .split_last()
        .ok_or_else(|| ComputeError::InvalidSnapshot("snapshots must not be empty".to_string()))?;

    let computation = HypeScoringEngine::score(
        current,
        earlier.last(),
        &request.baseline,
        &request.recent_scores,
    );
    encode(&computation)
}

/// Aggregate a request payload, returning the account overall as JSON
pub fn overall_json(request_json: &str) -> Result<String, ComputeError> {
    let request: OverallRequest = serde_json::from_str(request_json)?;
    let engine = match request.window {
        Some(0) => {
            return Err(ComputeError::ParseError("window must be positive".to_string()));
        }
        Some(window) => AccountOverallEngine::new(window),
        None => AccountOverallEngine::default(),
    };
    let scores: Vec<(DateTime<Utc>, f64)> =
        request.scores.iter().map(|s| (s.timestamp, s.score)).collect();
    encode(&engine.compute(&scores, request.now))
}

/// Driver pack for a request payload as JSON
pub fn drivers_json(request_json: &str) -> Result<String, ComputeError> {
    let request: DriversRequest = serde_json::from_str(request_json)?;
    let series = validated_series(request.snapshots)?;
    let builder = match request.trend_window {
        Some(window) => DriverPackBuilder::new(window),
        None => DriverPackBuilder::default(),
    };
    let pack = builder
        .build_from_series(&series, &request.baseline)
        .ok_or_else(|| ComputeError::InvalidSnapshot("snapshots must not be empty".to_string()))?;
    encode(&pack)
}

/// Lifecycle curve for a request payload as JSON
pub fn lifecycle_json(request_json: &str) -> Result<String, ComputeError> {
    let request: LifecycleRequest = serde_json::from_str(request_json)?;
    let series = validated_series(request.snapshots)?;
    let history: Vec<(DateTime<Utc>, HypeComputation)> = request
        .history
        .into_iter()
        .map(|h| (h.timestamp, h.computation))
        .collect();
    encode(&LifecycleLineBuilder::build(&series, &history, request.now))
}

/// Baseline table for a request payload as JSON
pub fn build_baseline_json(request_json: &str) -> Result<String, ComputeError> {
    let request: BaselineRequest = serde_json::from_str(request_json)?;
    let series = validated_series(request.snapshots)?;
    let builder = match request.lookback_days {
        Some(days) if !(1..=MAX_BASELINE_LOOKBACK_DAYS).contains(&days) => {
            return Err(ComputeError::ParseError(format!(
                "lookback_days must be between 1 and {MAX_BASELINE_LOOKBACK_DAYS}"
            )));
        }
        Some(days) => BaselineBuilder::new(days),
        None => BaselineBuilder::default(),
    };
    let table = builder.build(
        &request.account_id,
        group_by_video(series).into_values(),
        request.now,
    );
    table
        .to_json()
        .map_err(|e| ComputeError::EncodingError(e.to_string()))
}

/// Split a flat snapshot list into per-video series sorted by timestamp
pub fn group_by_video(snapshots: Vec<Snapshot>) -> BTreeMap<String, Vec<Snapshot>> {
    let mut grouped: BTreeMap<String, Vec<Snapshot>> = BTreeMap::new();
    for snapshot in snapshots {
        grouped.entry(snapshot.video_id.clone()).or_default().push(snapshot);
    }
    for series in grouped.values_mut() {
        series.sort_by_key(|s| s.timestamp);
    }
    grouped
}

fn validated_series(mut snapshots: Vec<Snapshot>) -> Result<Vec<Snapshot>, ComputeError> {
    for snapshot in &snapshots {
        snapshot.validate()?;
    }
    snapshots.sort_by_key(|s| s.timestamp);
    Ok(snapshots)
}

fn encode<T: Serialize>(value: &T) -> Result<String, ComputeError> {
    serde_json::to_string(value).map_err(|e| ComputeError::EncodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::types::{AgeBucket, BaselineBucket, Phase, Stability};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn posted() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn snap(
        video: &str,
        age_min: i64,
        views: u64,
        likes: u64,
        comments: u64,
        shares: u64,
    ) -> Snapshot {
        Snapshot {
            video_id: video.to_string(),
            timestamp: posted() + Duration::minutes(age_min),
            post_created_at: posted(),
            views,
            likes,
            comments,
            shares,
        }
    }

    fn reference_table() -> BaselineTable {
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
            sample_size: 50,
        };
        BaselineTable::uniform("acct", posted(), profile)
    }

    fn now() -> DateTime<Utc> {
        posted() + Duration::hours(2)
    }

    async fn seeded_service() -> (Arc<InMemoryStore>, AnalyticsScoringService) {
        let store = Arc::new(InMemoryStore::new());
        store.save_baseline(&reference_table()).await.unwrap();
        store
            .insert_snapshots(
                "acct",
                vec![snap("v1", 50, 500, 20, 2, 2), snap("v1", 60, 600, 25, 2, 3)],
            )
            .unwrap();
        let service = AnalyticsScoringService::in_memory(store.clone(), ServiceConfig::default());
        (store, service)
    }

    #[tokio::test]
    async fn test_refresh_scores_and_persists() {
        let (store, service) = seeded_service().await;

        let computation = service
            .refresh_hype_for_video("acct", "v1", now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(computation.score, 63);

        let saved = store.recent_scores("acct", 10).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].video_id, "v1");
        assert_eq!(saved[0].timestamp, posted() + Duration::minutes(60));
        assert_eq!(saved[0].computation, computation);
    }

    /// Stored record for v1 carrying `score`, captured `age_min` after posting
    fn prior_record(age_min: i64, score: u8) -> ScoreRecord {
        let current = snap("v1", age_min, 10 * age_min as u64, 0, 0, 0);
        let mut computation = HypeScoringEngine::score(&current, None, &reference_table(), &[]);
        computation.score = score;
        ScoreRecord::new("acct", "v1", current.timestamp, computation)
    }

    #[tokio::test]
    async fn test_refresh_phase_uses_newest_prior_scores() {
        let (store, service) = seeded_service().await;
        for (age_min, score) in [(20, 20), (30, 62), (40, 64)] {
            store.save_score(&prior_record(age_min, score)).await.unwrap();
        }

        let computation = service
            .refresh_hype_for_video("acct", "v1", now())
            .await
            .unwrap()
            .unwrap();

        // 63 against [62, 64] is flat; against the two oldest it would be expanding
        assert_eq!(computation.score, 63);
        assert_eq!(computation.phase, Phase::Plateau);
        assert_eq!(store.score_history("acct", "v1", 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_without_snapshots_is_noop() {
        let (store, service) = seeded_service().await;
        let result = service.refresh_hype_for_video("acct", "ghost", now()).await.unwrap();
        assert!(result.is_none());
        assert!(store.recent_scores("acct", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_builds_missing_baseline() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_snapshots("acct", vec![snap("v1", 0, 0, 0, 0, 0), snap("v1", 10, 100, 5, 1, 1)])
            .unwrap();
        let service = AnalyticsScoringService::in_memory(store.clone(), ServiceConfig::default());

        let computation = service.refresh_hype_for_video("acct", "v1", now()).await.unwrap();
        assert!(computation.is_some());

        let table = store.baseline("acct").await.unwrap().unwrap();
        assert_eq!(table.video_count, 1);
        assert_eq!(table.built_at, now());
    }

    #[tokio::test]
    async fn test_overall_from_persisted_scores() {
        let store = Arc::new(InMemoryStore::new());
        let service = AnalyticsScoringService::in_memory(store.clone(), ServiceConfig::default());

        let empty = service.compute_overall_for_account("acct", now()).await.unwrap();
        assert_eq!(empty.overall_score, 0);
        assert_eq!(empty.stability, Stability::Low);

        let (_, seeded) = seeded_service().await;
        seeded.refresh_hype_for_video("acct", "v1", now()).await.unwrap();
        let overall = seeded.compute_overall_for_account("acct", now()).await.unwrap();
        assert_eq!(overall.overall_score, 63);
        assert_eq!(overall.sample_count, 1);
    }

    #[tokio::test]
    async fn test_backfill_feeds_lifecycle() {
        let store = Arc::new(InMemoryStore::new());
        store.save_baseline(&reference_table()).await.unwrap();
        let series: Vec<Snapshot> = (0..=6)
            .map(|i| snap("v1", i * 10, 100 * (i * i) as u64, 4 * i as u64, i as u64, i as u64))
            .collect();
        store.insert_snapshots("acct", series).unwrap();
        let service = AnalyticsScoringService::in_memory(store.clone(), ServiceConfig::default());

        let computations = service.backfill_video("acct", "v1", now()).await.unwrap();
        assert_eq!(computations.len(), 7);
        // First snapshot has no predecessor
        assert!((computations[0].confidence - 0.6).abs() < 1e-12);

        let history = store.score_history("acct", "v1", 100).await.unwrap();
        assert_eq!(history.len(), 7);

        let model = service.lifecycle_for_video("acct", "v1", now()).await.unwrap();
        let points: usize = model.segments.iter().map(|s| s.points.len()).sum();
        assert!(points >= 7);
        assert!(model
            .segments
            .iter()
            .flat_map(|s| s.points.iter())
            .all(|p| p.score.is_some()));
    }

    #[tokio::test]
    async fn test_backfill_skips_scored_snapshots() {
        let store = Arc::new(InMemoryStore::new());
        store.save_baseline(&reference_table()).await.unwrap();
        let series: Vec<Snapshot> = (0..=6)
            .map(|i| snap("v1", i * 10, 100 * (i * i) as u64, 4 * i as u64, i as u64, i as u64))
            .collect();
        store.insert_snapshots("acct", series[..4].to_vec()).unwrap();
        let service = AnalyticsScoringService::in_memory(store.clone(), ServiceConfig::default());

        let first = service.backfill_video("acct", "v1", now()).await.unwrap();
        assert_eq!(first.len(), 4);

        store.insert_snapshots("acct", series[4..].to_vec()).unwrap();
        let second = service.backfill_video("acct", "v1", now()).await.unwrap();
        assert_eq!(second.len(), 7);
        assert_eq!(&second[..4], first.as_slice());
        assert_eq!(store.score_history("acct", "v1", 100).await.unwrap().len(), 7);

        let third = service.backfill_video("acct", "v1", now()).await.unwrap();
        assert_eq!(third, second);
        assert_eq!(store.score_history("acct", "v1", 100).await.unwrap().len(), 7);
        assert_eq!(store.recent_scores("acct", 100).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_refresh_account_covers_recent_videos() {
        let (store, service) = seeded_service().await;
        store
            .insert_snapshots(
                "acct",
                vec![snap("v2", 30, 100, 1, 0, 0), snap("v2", 40, 300, 6, 1, 2)],
            )
            .unwrap();

        let results = service.refresh_account("acct", now()).await.unwrap();
        let mut ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn test_driver_pack_for_video() {
        let (_, service) = seeded_service().await;
        let pack = service
            .driver_pack_for_video("acct", "v1", now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pack.age_bucket, AgeBucket::Hour1To2);
        assert_eq!(pack.insights.len(), 4);

        assert!(service
            .driver_pack_for_video("acct", "ghost", now())
            .await
            .unwrap()
            .is_none());
    }

    struct UnavailableSnapshots;

    #[async_trait]
    impl SnapshotStore for UnavailableSnapshots {
        async fn append_snapshots(&self, _: &str, _: &[Snapshot]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn snapshots(
            &self,
            _: &str,
            _: Option<DateTime<Utc>>,
        ) -> Result<Vec<Snapshot>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn recent_video_ids(&self, _: &str, _: usize) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn latest_snapshot(&self, _: &str) -> Result<Option<Snapshot>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_fault_aborts_before_writes() {
        let store = Arc::new(InMemoryStore::new());
        let service = AnalyticsScoringService::new(
            Arc::new(UnavailableSnapshots),
            store.clone(),
            store.clone(),
            ServiceConfig::default(),
        );

        let err = service.refresh_hype_for_video("acct", "v1", now()).await.unwrap_err();
        assert!(matches!(err, ComputeError::Store(StoreError::Unavailable(_))));
        assert!(store.baseline("acct").await.unwrap().is_none());
        assert!(store.recent_scores("acct", 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_score_json() {
        let request = ScoreRequest {
            snapshots: vec![snap("v1", 60, 600, 25, 2, 3), snap("v1", 50, 500, 20, 2, 2)],
            baseline: reference_table(),
            recent_scores: Vec::new(),
        };
        let json = score_json(&serde_json::to_string(&request).unwrap()).unwrap();
        let computation: HypeComputation = serde_json::from_str(&json).unwrap();
        assert_eq!(computation.score, 63);
    }

    #[test]
    fn test_score_json_rejects_bad_input() {
        assert!(matches!(score_json("not json"), Err(ComputeError::JsonError(_))));

        let empty = ScoreRequest {
            snapshots: Vec::new(),
            baseline: reference_table(),
            recent_scores: Vec::new(),
        };
        assert!(matches!(
            score_json(&serde_json::to_string(&empty).unwrap()),
            Err(ComputeError::InvalidSnapshot(_))
        ));

        let mut backwards = snap("v1", 60, 600, 25, 2, 3);
        backwards.post_created_at = backwards.timestamp + Duration::minutes(1);
        let invalid = ScoreRequest {
            snapshots: vec![backwards],
            baseline: reference_table(),
            recent_scores: Vec::new(),
        };
        assert!(matches!(
            score_json(&serde_json::to_string(&invalid).unwrap()),
            Err(ComputeError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_overall_json() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let request = OverallRequest {
            scores: [80.0, 85.0, 90.0]
                .iter()
                .enumerate()
                .map(|(i, &score)| TimedScore {
                    timestamp: at - Duration::days(i as i64 + 1),
                    score,
                })
                .collect(),
            now: at,
            window: None,
        };
        let json = overall_json(&serde_json::to_string(&request).unwrap()).unwrap();
        let overall: AccountOverallComputation = serde_json::from_str(&json).unwrap();
        assert_eq!(overall.overall_score, 85);
        assert_eq!(overall.stability, Stability::Low);
    }

    #[test]
    fn test_lifecycle_json_empty() {
        let request = LifecycleRequest {
            snapshots: Vec::new(),
            history: Vec::new(),
            now: now(),
        };
        let json = lifecycle_json(&serde_json::to_string(&request).unwrap()).unwrap();
        let model: LifecycleLineModel = serde_json::from_str(&json).unwrap();
        assert!(model.segments.is_empty());
        assert_eq!(model.active_phase, Phase::Testing);
    }

    #[test]
    fn test_build_baseline_json_groups_by_video() {
        let mut snapshots = Vec::new();
        for (video, vpm) in [("a", 5u64), ("b", 10), ("c", 15)] {
            for i in 0..=6u64 {
                snapshots.push(snap(video, i as i64 * 10, vpm * 10 * i, 0, 0, 0));
            }
        }
        let request = BaselineRequest {
            account_id: "acct".to_string(),
            snapshots,
            now: now(),
            lookback_days: None,
        };
        let json = build_baseline_json(&serde_json::to_string(&request).unwrap()).unwrap();
        let table = BaselineTable::from_json(&json).unwrap();
        assert_eq!(table.video_count, 3);
        assert!((table.get(AgeBucket::Min30To60).median_vpm - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_baseline_json_rejects_out_of_range_lookback() {
        for days in [0, -5, MAX_BASELINE_LOOKBACK_DAYS + 1, i64::MAX] {
            let request = BaselineRequest {
                account_id: "acct".to_string(),
                snapshots: vec![snap("a", 0, 0, 0, 0, 0), snap("a", 10, 100, 0, 0, 0)],
                now: now(),
                lookback_days: Some(days),
            };
            let result = build_baseline_json(&serde_json::to_string(&request).unwrap());
            assert!(matches!(result, Err(ComputeError::ParseError(_))), "lookback {days}");
        }
    }

    #[test]
    fn test_drivers_json() {
        let request = DriversRequest {
            snapshots: vec![snap("v1", 50, 500, 20, 2, 2), snap("v1", 60, 600, 25, 2, 3)],
            baseline: reference_table(),
            trend_window: None,
        };
        let json = drivers_json(&serde_json::to_string(&request).unwrap()).unwrap();
        let pack: DriverPack = serde_json::from_str(&json).unwrap();
        assert_eq!(pack.insights.len(), 4);
    }
}
