use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{GroupBy, SortKey};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
}

/// Viewer tunables. Every field has a default, so an empty TOML document is
/// a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Height of the filled part of a lane, in pixels.
    pub lane_height: f64,
    /// Empty space below each lane, in pixels.
    pub lane_gap: f64,
    /// Continuous pan speed in viewports per second.
    pub pan_speed: f64,
    /// Continuous zoom speed in doublings of the time window per second.
    pub zoom_speed: f64,
    /// Minimum horizontal distance between labelled axis ticks.
    pub min_tick_spacing: f64,
    /// Base URL of the batch endpoint (without `/goroutines.json`).
    pub endpoint: String,
    pub group_by: GroupBy,
    pub sort_by: SortKey,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            lane_height: 9.0,
            lane_gap: 1.0,
            pan_speed: 0.5,
            zoom_speed: 1.0,
            min_tick_spacing: 80.0,
            endpoint: "http://localhost:8080".into(),
            group_by: GroupBy::default(),
            sort_by: SortKey::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Row pitch: lane plus gap.
    pub fn full_lane_height(&self) -> f64 {
        self.lane_height + self.lane_gap
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("lane_height", self.lane_height),
            ("pan_speed", self.pan_speed),
            ("zoom_speed", self.zoom_speed),
            ("min_tick_spacing", self.min_tick_spacing),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        if !(self.lane_gap.is_finite() && self.lane_gap >= 0.0) {
            return Err(ConfigError::NotPositive {
                field: "lane_gap",
                value: self.lane_gap,
            });
        }
        Ok(())
    }
}
