//! Lifecycle curve construction
//!
//! Turns a video's snapshot series and score history into a chart-ready curve:
//! views-per-minute checkpoints colored by phase, split into contiguous
//! same-phase segments, with up to two inflection markers and an optional
//! dashed projection when the video looks like it is about to break out.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::normalizer::{RateNormalizer, MIN_INTERVAL_MINUTES};
use crate::phase::PhaseDetector;
use crate::stats::percentile;
use crate::types::{minutes_between, HypeComputation, Phase, Snapshot};

/// Checkpoints closer than this to the previous one are dropped
const CHECKPOINT_MIN_SPACING_SECS: i64 = 60;

/// A history entry within this distance supplies a checkpoint's phase
const HISTORY_MATCH_WINDOW_SECS: i64 = 5 * 60;

const CAP_LOW_PERCENTILE: f64 = 0.05;
const CAP_HIGH_PERCENTILE: f64 = 0.95;

const MAX_INFLECTIONS: usize = 2;
const INFLECTION_MIN_SLOPE_DELTA: f64 = 1.0;
const INFLECTION_HIGH_FRACTION: f64 = 0.8;

const PROJECTION_MIN_CONFIDENCE: f64 = 0.70;
const PROJECTION_MIN_BREAKOUT: f64 = 0.80;
const PROJECTION_HORIZON_MIN: i64 = 20;

/// One checkpoint on the curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecyclePoint {
    pub timestamp: DateTime<Utc>,
    /// Views per minute before capping
    pub vpm: f64,
    /// Views per minute after p5/p95 capping (the plotted value)
    pub capped_vpm: f64,
    /// Score of the matched history entry, if one was within range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    pub phase: Phase,
}

/// Maximal run of consecutive same-phase points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRunSegment {
    pub phase: Phase,
    /// Includes the previous segment's last point so the line stays continuous
    pub points: Vec<LifecyclePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InflectionKind {
    Peak,
    Trough,
}

/// Notable local extremum of the curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflectionMarker {
    pub timestamp: DateTime<Utc>,
    pub capped_vpm: f64,
    pub kind: InflectionKind,
    pub phase: Phase,
}

/// Point on the dashed forward projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub timestamp: DateTime<Utc>,
    pub capped_vpm: f64,
}

/// Dashed extension past the last checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleProjection {
    pub start: ProjectedPoint,
    pub end: ProjectedPoint,
}

/// Render model for a video's lifecycle chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleLineModel {
    pub segments: Vec<PhaseRunSegment>,
    pub active_phase: Phase,
    pub inflections: Vec<InflectionMarker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<LifecycleProjection>,
    /// Capping bounds used for chart scaling
    pub vpm_floor: f64,
    pub vpm_ceiling: f64,
}

impl LifecycleLineModel {
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
            active_phase: Phase::Testing,
            inflections: Vec::new(),
            projection: None,
            vpm_floor: 0.0,
            vpm_ceiling: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Builder for lifecycle curves
pub struct LifecycleLineBuilder;

impl LifecycleLineBuilder {
    /// Build the curve.
    ///
    /// # Arguments
    /// * `snapshots` - The video's snapshot series (any order)
    /// * `history` - `(timestamp, computation)` score history (any order)
    /// * `now` - Checkpoints after this instant are ignored
    pub fn build(
        snapshots: &[Snapshot],
        history: &[(DateTime<Utc>, HypeComputation)],
        now: DateTime<Utc>,
    ) -> LifecycleLineModel {
        let mut series = snapshots.to_vec();
        series.sort_by_key(|s| s.timestamp);
        if series.is_empty() {
            return LifecycleLineModel::empty();
        }
        let mut history: Vec<&(DateTime<Utc>, HypeComputation)> =
            history.iter().filter(|(t, _)| *t <= now).collect();
        history.sort_by_key(|(t, _)| *t);

        let checkpoints = checkpoint_times(&series, &history, now);
        if checkpoints.is_empty() {
            return LifecycleLineModel::empty();
        }

        let mut points: Vec<LifecyclePoint> = checkpoints
            .iter()
            .map(|&t| build_point(t, &series, &history))
            .collect();

        let raw: Vec<f64> = points.iter().map(|p| p.vpm).collect();
        let floor = percentile(CAP_LOW_PERCENTILE, &raw);
        let ceiling = percentile(CAP_HIGH_PERCENTILE, &raw);
        for point in &mut points {
            point.capped_vpm = point.vpm.max(floor).min(ceiling);
        }

        let active_phase = points.last().map(|p| p.phase).unwrap_or(Phase::Testing);
        let inflections = find_inflections(&points, ceiling);
        let projection = history
            .last()
            .and_then(|(_, latest)| project(&points, latest, active_phase));
        let segments = segment_by_phase(&points);

        tracing::debug!(
            checkpoints = points.len(),
            segments = segments.len(),
            inflections = inflections.len(),
            projected = projection.is_some(),
            "lifecycle line built"
        );

        LifecycleLineModel {
            segments,
            active_phase,
            inflections,
            projection,
            vpm_floor: floor,
            vpm_ceiling: ceiling,
        }
    }
}

/// One checkpoint per history entry (or per snapshot without history), spaced ≥60s
fn checkpoint_times(
    series: &[Snapshot],
    history: &[&(DateTime<Utc>, HypeComputation)],
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let candidates: Vec<DateTime<Utc>> = if history.is_empty() {
        series.iter().map(|s| s.timestamp).filter(|t| *t <= now).collect()
    } else {
        history.iter().map(|(t, _)| *t).collect()
    };

    let mut kept: Vec<DateTime<Utc>> = Vec::with_capacity(candidates.len());
    for t in candidates {
        let too_close = kept
            .last()
            .map_or(false, |last| (t - *last).num_seconds() < CHECKPOINT_MIN_SPACING_SECS);
        if !too_close {
            kept.push(t);
        }
    }
    kept
}

fn build_point(
    t: DateTime<Utc>,
    series: &[Snapshot],
    history: &[&(DateTime<Utc>, HypeComputation)],
) -> LifecyclePoint {
    // Latest snapshot at or before the checkpoint
    let at = series.partition_point(|s| s.timestamp <= t);
    let vpm = if at >= 2 {
        RateNormalizer::point_rates(&series[at - 1], Some(&series[at - 2])).vpm
    } else {
        0.0
    };

    let nearest = history
        .iter()
        .min_by_key(|(ht, _)| (*ht - t).num_milliseconds().abs());

    let matched = nearest
        .filter(|(ht, _)| (*ht - t).num_seconds().abs() <= HISTORY_MATCH_WINDOW_SECS);

    let (score, phase) = match matched {
        Some((_, computation)) => (Some(computation.score), computation.phase),
        None => {
            let fallback_score = nearest.map(|(_, c)| c.score).unwrap_or(0);
            let age = series
                .get(at.saturating_sub(1))
                .map(|s| minutes_between(s.post_created_at, t))
                .unwrap_or(0.0);
            (None, PhaseDetector::detect(fallback_score as f64, &[], age))
        }
    };

    LifecyclePoint {
        timestamp: t,
        vpm,
        capped_vpm: vpm,
        score,
        phase,
    }
}

/// Split into same-phase runs, duplicating each boundary point into the next run
fn segment_by_phase(points: &[LifecyclePoint]) -> Vec<PhaseRunSegment> {
    let mut segments: Vec<PhaseRunSegment> = Vec::new();

    for point in points {
        let continues = segments
            .last()
            .map(|seg| seg.phase == point.phase)
            .unwrap_or(false);

        if continues {
            if let Some(seg) = segments.last_mut() {
                seg.points.push(point.clone());
            }
            continue;
        }

        let mut run = Vec::new();
        if let Some(bridge) = segments.last().and_then(|seg| seg.points.last()) {
            run.push(bridge.clone());
        }
        run.push(point.clone());
        segments.push(PhaseRunSegment {
            phase: point.phase,
            points: run,
        });
    }

    segments
}

/// Up to two local extrema with a sharp slope change or a high value
fn find_inflections(points: &[LifecyclePoint], ceiling: f64) -> Vec<InflectionMarker> {
    if points.len() < 3 {
        return Vec::new();
    }

    let mut candidates: Vec<(usize, InflectionKind)> = Vec::new();
    for i in 1..points.len() - 1 {
        let prev = points[i - 1].capped_vpm;
        let cur = points[i].capped_vpm;
        let next = points[i + 1].capped_vpm;

        let kind = if cur > prev && cur >= next {
            InflectionKind::Peak
        } else if cur < prev && cur <= next {
            InflectionKind::Trough
        } else {
            continue;
        };

        let slope_delta = (next - cur) - (cur - prev);
        if slope_delta.abs() > INFLECTION_MIN_SLOPE_DELTA
            || cur > INFLECTION_HIGH_FRACTION * ceiling
        {
            candidates.push((i, kind));
        }
    }

    candidates.sort_by(|a, b| {
        points[b.0]
            .capped_vpm
            .abs()
            .total_cmp(&points[a.0].capped_vpm.abs())
            .then(a.0.cmp(&b.0))
    });
    candidates.truncate(MAX_INFLECTIONS);
    candidates.sort_by_key(|(i, _)| *i);

    candidates
        .into_iter()
        .map(|(i, kind)| InflectionMarker {
            timestamp: points[i].timestamp,
            capped_vpm: points[i].capped_vpm,
            kind,
            phase: points[i].phase,
        })
        .collect()
}

/// Straight-line extension of the last slope when an expanding video is likely to break out
fn project(
    points: &[LifecyclePoint],
    latest: &HypeComputation,
    active_phase: Phase,
) -> Option<LifecycleProjection> {
    if latest.confidence < PROJECTION_MIN_CONFIDENCE
        || latest.breakout_probability < PROJECTION_MIN_BREAKOUT
        || active_phase != Phase::Expanding
    {
        return None;
    }

    let last = points.last()?;
    let slope_per_min = match points.len().checked_sub(2).map(|i| &points[i]) {
        Some(prev) => {
            let dt = minutes_between(prev.timestamp, last.timestamp).max(MIN_INTERVAL_MINUTES);
            (last.capped_vpm - prev.capped_vpm) / dt
        }
        None => 0.0,
    };

    let end_vpm = (last.capped_vpm + slope_per_min * PROJECTION_HORIZON_MIN as f64).max(0.0);

    Some(LifecycleProjection {
        start: ProjectedPoint {
            timestamp: last.timestamp,
            capped_vpm: last.capped_vpm,
        },
        end: ProjectedPoint {
            timestamp: last.timestamp + Duration::minutes(PROJECTION_HORIZON_MIN),
            capped_vpm: end_vpm,
        },
    })
}
