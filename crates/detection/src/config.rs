//! Detector configuration

use crate::DetectionError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Detection pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Frames classified per inference batch
    pub batch_size: usize,

    /// Continuous drowsiness required before an alert fires (seconds)
    pub alert_threshold_secs: f32,

    /// Minimum gap between consecutive alerts (seconds)
    pub cooldown_secs: f32,

    /// How long the UI-facing alert flag stays raised after a fire (seconds)
    pub display_hold_secs: f32,

    /// Drowsy ratio above which the suspect timer arms (strict >)
    pub arm_ratio: f32,

    /// Drowsy ratio at or below which the suspect timer disarms
    pub disarm_ratio: f32,

    /// Minimum window samples before any ratio decision
    pub min_samples: usize,

    /// Expected ingestion rate; sizes the rolling window together with
    /// `alert_threshold_secs`
    pub samples_per_sec: u32,

    /// Ingestion queue capacity (drop-newest)
    pub ingest_capacity: usize,

    /// Result queue capacity (drop-oldest)
    pub result_capacity: usize,

    /// Evidence ring capacity (drop-oldest)
    pub evidence_capacity: usize,

    /// Worker sleep when the ingestion queue is empty (milliseconds)
    pub worker_idle_ms: u64,

    /// Directory evidence images are persisted under
    pub evidence_dir: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            alert_threshold_secs: 3.0,
            cooldown_secs: 3.0,
            display_hold_secs: 2.0,
            arm_ratio: 0.7,
            disarm_ratio: 0.5,
            min_samples: 30,
            samples_per_sec: 30,
            ingest_capacity: 30,
            result_capacity: 30,
            evidence_capacity: 90,
            worker_idle_ms: 10,
            evidence_dir: "drowsy_images".to_string(),
        }
    }
}

impl DetectorConfig {
    /// Create strict config (faster alerting)
    pub fn strict() -> Self {
        Self {
            alert_threshold_secs: 2.0,
            arm_ratio: 0.6,
            ..Default::default()
        }
    }

    /// Create lenient config (slower alerting)
    pub fn lenient() -> Self {
        Self {
            alert_threshold_secs: 5.0,
            cooldown_secs: 5.0,
            arm_ratio: 0.8,
            disarm_ratio: 0.4,
            ..Default::default()
        }
    }

    /// Load configuration from a TOML/JSON/YAML file, falling back to
    /// defaults for missing keys.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let defaults = config::Config::try_from(&DetectorConfig::default())
            .map_err(|e| DetectionError::Config(e.to_string()))?;

        config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(path.as_ref()))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DetectionError::Config(e.to_string()))
    }

    /// Rolling window capacity: ingestion rate times the sustain threshold
    pub fn window_capacity(&self) -> usize {
        ((self.samples_per_sec as f32 * self.alert_threshold_secs) as usize).max(1)
    }

    pub fn alert_threshold(&self) -> Duration {
        Duration::from_secs_f32(self.alert_threshold_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.cooldown_secs)
    }

    pub fn display_hold(&self) -> Duration {
        Duration::from_secs_f32(self.display_hold_secs)
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_capacity() {
        let config = DetectorConfig::default();
        // 30 samples/sec over a 3 s threshold
        assert_eq!(config.window_capacity(), 90);
    }

    #[test]
    fn test_window_capacity_never_zero() {
        let config = DetectorConfig {
            alert_threshold_secs: 0.0,
            ..Default::default()
        };
        assert_eq!(config.window_capacity(), 1);
    }

    #[test]
    fn test_presets_keep_hysteresis_ordering() {
        for config in [DetectorConfig::strict(), DetectorConfig::lenient()] {
            assert!(config.arm_ratio > config.disarm_ratio);
        }
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!(
            "detector_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "batch_size = 8\ncooldown_secs = 1.5\n").unwrap();

        let config = DetectorConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.batch_size, 8);
        assert!((config.cooldown_secs - 1.5).abs() < f32::EPSILON);
        // Untouched keys keep their defaults
        assert_eq!(config.min_samples, 30);
    }
}
