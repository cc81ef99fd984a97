//! Service configuration
//!
//! Limits and windows the orchestration layer uses when talking to the stores.
//! Scoring formulas and thresholds are fixed and not configurable.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::baseline::{DEFAULT_BASELINE_LOOKBACK_DAYS, MAX_BASELINE_LOOKBACK_DAYS};
use crate::drivers::DEFAULT_TREND_WINDOW;
use crate::error::ComputeError;
use crate::overall::DEFAULT_OVERALL_WINDOW;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Most recent videos considered when rebuilding a baseline
    pub baseline_candidate_limit: usize,
    /// Videos first observed longer ago than this are left out of baselines
    pub baseline_lookback_days: i64,
    /// Prior scores of a video fetched as phase history
    pub video_history_limit: usize,
    /// Most recent scores folded into the account aggregate
    pub overall_window: usize,
    /// Score records fetched when drawing a lifecycle curve
    pub lifecycle_history_limit: usize,
    /// Rate samples compared when labelling driver trends
    pub driver_trend_window: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            baseline_candidate_limit: 50,
            baseline_lookback_days: DEFAULT_BASELINE_LOOKBACK_DAYS,
            video_history_limit: 3,
            overall_window: DEFAULT_OVERALL_WINDOW,
            lifecycle_history_limit: 500,
            driver_trend_window: DEFAULT_TREND_WINDOW,
        }
    }
}

impl ServiceConfig {
    /// Load from a JSON file (defaults when absent), then apply `MOMENTUM_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ComputeError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    ComputeError::InvalidConfig(format!(
                        "failed to read {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                serde_json::from_str(&contents).map_err(|e| {
                    ComputeError::InvalidConfig(format!(
                        "failed to parse {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
            _ => ServiceConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: ServiceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject limits that would make every lookup empty and out-of-range lookbacks
    pub fn validate(&self) -> Result<(), ComputeError> {
        let limits = [
            ("baseline_candidate_limit", self.baseline_candidate_limit),
            ("video_history_limit", self.video_history_limit),
            ("overall_window", self.overall_window),
            ("lifecycle_history_limit", self.lifecycle_history_limit),
            ("driver_trend_window", self.driver_trend_window),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ComputeError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if !(1..=MAX_BASELINE_LOOKBACK_DAYS).contains(&self.baseline_lookback_days) {
            return Err(ComputeError::InvalidConfig(format!(
                "baseline_lookback_days must be between 1 and {MAX_BASELINE_LOOKBACK_DAYS}"
            )));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        override_from_env(
            "MOMENTUM_BASELINE_CANDIDATE_LIMIT",
            &mut self.baseline_candidate_limit,
        );
        override_from_env(
            "MOMENTUM_BASELINE_LOOKBACK_DAYS",
            &mut self.baseline_lookback_days,
        );
        override_from_env("MOMENTUM_VIDEO_HISTORY_LIMIT", &mut self.video_history_limit);
        override_from_env("MOMENTUM_OVERALL_WINDOW", &mut self.overall_window);
        override_from_env(
            "MOMENTUM_LIFECYCLE_HISTORY_LIMIT",
            &mut self.lifecycle_history_limit,
        );
        override_from_env("MOMENTUM_DRIVER_TREND_WINDOW", &mut self.driver_trend_window);
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, slot: &mut T) {
    let Ok(raw) = env::var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable config override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.baseline_candidate_limit, 50);
        assert_eq!(config.baseline_lookback_days, 60);
        assert_eq!(config.video_history_limit, 3);
        assert_eq!(config.overall_window, 10);
        assert_eq!(config.lifecycle_history_limit, 500);
        assert_eq!(config.driver_trend_window, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ServiceConfig::from_json(r#"{"overall_window": 5}"#).unwrap();
        assert_eq!(
            config,
            ServiceConfig {
                overall_window: 5,
                ..ServiceConfig::default()
            }
        );
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(ServiceConfig::from_json(r#"{"video_history_limit": 0}"#).is_err());
        let config = ServiceConfig {
            baseline_lookback_days: 0,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lookback_upper_bound() {
        let huge = r#"{"baseline_lookback_days": 200000000000000}"#;
        assert!(matches!(
            ServiceConfig::from_json(huge),
            Err(ComputeError::InvalidConfig(_))
        ));
        let longest = ServiceConfig {
            baseline_lookback_days: MAX_BASELINE_LOOKBACK_DAYS,
            ..ServiceConfig::default()
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("momentum-flux-config-does-not-exist.json");
        let config = ServiceConfig::load(Some(&path)).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_parsing() {
        let mut slot: usize = 7;
        std::env::set_var("MOMENTUM_TEST_SLOT_OK", "12");
        override_from_env("MOMENTUM_TEST_SLOT_OK", &mut slot);
        assert_eq!(slot, 12);

        std::env::set_var("MOMENTUM_TEST_SLOT_BAD", "twelve");
        override_from_env("MOMENTUM_TEST_SLOT_BAD", &mut slot);
        assert_eq!(slot, 12);
    }
}
