//! Storage contracts
//!
//! The service reads and writes through three async traits so any backing
//! (SQL, KV, remote) can be injected. `InMemoryStore` implements all three and
//! is what the CLI, the FFI and the tests run against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::types::{BaselineTable, ScoreRecord, Snapshot};

/// Time series of engagement snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Append snapshots observed for an account's videos
    async fn append_snapshots(
        &self,
        account_id: &str,
        snapshots: &[Snapshot],
    ) -> Result<(), StoreError>;

    /// A video's series in ascending timestamp order, optionally from `since` on
    async fn snapshots(
        &self,
        video_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Snapshot>, StoreError>;

    /// Up to `limit` of the account's videos, most recently observed first
    async fn recent_video_ids(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    async fn latest_snapshot(&self, video_id: &str) -> Result<Option<Snapshot>, StoreError>;
}

/// Per-account baseline tables
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Replace the account's table
    async fn save_baseline(&self, table: &BaselineTable) -> Result<(), StoreError>;

    async fn baseline(&self, account_id: &str) -> Result<Option<BaselineTable>, StoreError>;
}

/// Persisted score computations
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn save_score(&self, record: &ScoreRecord) -> Result<(), StoreError>;

    /// Up to `limit` of the account's records, newest first
    async fn recent_scores(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, StoreError>;

    /// Up to `limit` of one video's records, newest first
    async fn recent_scores_for_video(
        &self,
        account_id: &str,
        video_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, StoreError>;

    /// The newest `limit` records of one video, oldest first
    async fn score_history(
        &self,
        account_id: &str,
        video_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    /// video_id -> series sorted by timestamp
    series: BTreeMap<String, Vec<Snapshot>>,
    /// account_id -> owned video ids
    videos: BTreeMap<String, Vec<String>>,
    baselines: BTreeMap<String, BaselineTable>,
    /// Insertion order
    scores: Vec<ScoreRecord>,
}

impl StoreState {
    fn insert(&mut self, account_id: &str, snapshots: &[Snapshot]) {
        for snapshot in snapshots {
            let owned = self.videos.entry(account_id.to_string()).or_default();
            if !owned.contains(&snapshot.video_id) {
                owned.push(snapshot.video_id.clone());
            }

            let series = self.series.entry(snapshot.video_id.clone()).or_default();
            // Re-observing a timestamp replaces the earlier reading
            match series.binary_search_by_key(&snapshot.timestamp, |s| s.timestamp) {
                Ok(i) => series[i] = snapshot.clone(),
                Err(i) => series.insert(i, snapshot.clone()),
            }
        }
    }

    /// Records newest first; later insertions win timestamp ties
    fn newest_first<'a>(&'a self, keep: impl Fn(&ScoreRecord) -> bool) -> Vec<&'a ScoreRecord> {
        let mut records: Vec<&ScoreRecord> =
            self.scores.iter().rev().filter(|r| keep(*r)).collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records
    }
}

/// Process-local store implementing every storage contract
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed snapshots without going through the async contract
    pub fn insert_snapshots(
        &self,
        account_id: &str,
        snapshots: Vec<Snapshot>,
    ) -> Result<(), StoreError> {
        self.write()?.insert(account_id, &snapshots);
        Ok(())
    }

    /// Serialize the whole store
    pub fn export_json(&self) -> Result<String, StoreError> {
        let state = self.read()?;
        serde_json::to_string(&*state).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Restore a store previously produced by `export_json`
    pub fn import_json(json: &str) -> Result<Self, StoreError> {
        let state: StoreState =
            serde_json::from_str(json).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn append_snapshots(
        &self,
        account_id: &str,
        snapshots: &[Snapshot],
    ) -> Result<(), StoreError> {
        self.write()?.insert(account_id, snapshots);
        Ok(())
    }

    async fn snapshots(
        &self,
        video_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Snapshot>, StoreError> {
        let state = self.read()?;
        let Some(series) = state.series.get(video_id) else {
            return Ok(Vec::new());
        };
        Ok(series
            .iter()
            .filter(|s| since.map_or(true, |t| s.timestamp >= t))
            .cloned()
            .collect())
    }

    async fn recent_video_ids(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.read()?;
        let Some(owned) = state.videos.get(account_id) else {
            return Ok(Vec::new());
        };

        let mut by_recency: Vec<(Option<DateTime<Utc>>, &String)> = owned
            .iter()
            .map(|id| {
                let last_seen = state.series.get(id).and_then(|s| s.last()).map(|s| s.timestamp);
                (last_seen, id)
            })
            .collect();
        by_recency.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        Ok(by_recency
            .into_iter()
            .take(limit)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn latest_snapshot(&self, video_id: &str) -> Result<Option<Snapshot>, StoreError> {
        let state = self.read()?;
        Ok(state.series.get(video_id).and_then(|s| s.last()).cloned())
    }
}

#[async_trait]
impl BaselineStore for InMemoryStore {
    async fn save_baseline(&self, table: &BaselineTable) -> Result<(), StoreError> {
        self.write()?
            .baselines
            .insert(table.account_id.clone(), table.clone());
        Ok(())
    }

    async fn baseline(&self, account_id: &str) -> Result<Option<BaselineTable>, StoreError> {
        Ok(self.read()?.baselines.get(account_id).cloned())
    }
}

#[async_trait]
impl ScoreStore for InMemoryStore {
    async fn save_score(&self, record: &ScoreRecord) -> Result<(), StoreError> {
        self.write()?.scores.push(record.clone());
        Ok(())
    }

    async fn recent_scores(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .newest_first(|r| r.account_id == account_id)
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_scores_for_video(
        &self,
        account_id: &str,
        video_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .newest_first(|r| r.account_id == account_id && r.video_id == video_id)
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn score_history(
        &self,
        account_id: &str,
        video_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, StoreError> {
        let mut history = self.recent_scores_for_video(account_id, video_id, limit).await?;
        history.reverse();
        Ok(history)
    }
}
