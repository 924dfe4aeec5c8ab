// Configuration system for cytotrack analyses

use crate::error::{Error, Result};
use crate::types::{FrameRange, ThresholdPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Which part of the decoded array enters the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Channel index for (F, C, H, W) input; ignored for (F, H, W)
    pub channel: Option<usize>,
    /// Optional sub-range of frames to analyze
    pub frame_range: Option<FrameRange>,
}

/// Foreground segmentation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub policy: ThresholdPolicy,
    /// Percentile-normalize every frame before thresholding
    pub scale_frames: bool,
}

/// Region extraction and patch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Components smaller than this many pixels are discarded
    pub min_area: usize,
    /// Pixels added on every side of a box before cropping
    pub padding: usize,
    /// Cut image/mask patches for every detection
    pub crop_patches: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_area: 200,
            padding: 0,
            crop_patches: true,
        }
    }
}

/// Frame-to-frame association settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Minimum IoU for a track/detection pair to match, in (0, 1]
    pub match_threshold: f64,
    /// Frames a track may go unmatched before it is finished
    pub max_missed: usize,
    /// Minimum `min(a1, a2) / max(a1, a2)` area similarity, in [0, 1]
    pub min_area_ratio: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.3,
            max_missed: 2,
            min_area_ratio: 0.5,
        }
    }
}

/// Complete analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub input: InputConfig,
    pub segmentation: SegmentationConfig,
    pub detection: DetectionConfig,
    pub tracking: TrackingConfig,
    /// Segment and extract frames on the rayon pool
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            segmentation: SegmentationConfig::default(),
            detection: DetectionConfig::default(),
            tracking: TrackingConfig::default(),
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a JSON, TOML or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!("Loaded analysis configuration from {:?}", path);
        Self::from_str(&content)
    }

    /// Load configuration from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        // Try JSON first
        if let Ok(config) = serde_json::from_str::<AnalysisConfig>(content) {
            return Ok(config);
        }

        // Try TOML
        if let Ok(config) = toml::from_str::<AnalysisConfig>(content) {
            return Ok(config);
        }

        // Try YAML
        match serde_yaml::from_str::<AnalysisConfig>(content) {
            Ok(config) => Ok(config),
            Err(e) => Err(Error::ConfigParse(format!(
                "not valid JSON, TOML or YAML analysis config: {}",
                e
            ))),
        }
    }

    /// Defaults overridden by `CYTOTRACK_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `CYTOTRACK_*` environment overrides on top of this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_var("CYTOTRACK_MIN_AREA") {
            self.detection.min_area = parse_env("CYTOTRACK_MIN_AREA", &v)?;
        }
        if let Some(v) = env_var("CYTOTRACK_PADDING") {
            self.detection.padding = parse_env("CYTOTRACK_PADDING", &v)?;
        }
        if let Some(v) = env_var("CYTOTRACK_THRESHOLD_POLICY") {
            self.segmentation.policy = v.parse()?;
        }
        if let Some(v) = env_var("CYTOTRACK_MATCH_THRESHOLD") {
            self.tracking.match_threshold = parse_env("CYTOTRACK_MATCH_THRESHOLD", &v)?;
        }
        if let Some(v) = env_var("CYTOTRACK_MAX_MISSED") {
            self.tracking.max_missed = parse_env("CYTOTRACK_MAX_MISSED", &v)?;
        }
        if let Some(v) = env_var("CYTOTRACK_CHANNEL") {
            self.input.channel = Some(parse_env("CYTOTRACK_CHANNEL", &v)?);
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let tracking = &self.tracking;
        if !tracking.match_threshold.is_finite()
            || tracking.match_threshold <= 0.0
            || tracking.match_threshold > 1.0
        {
            return Err(Error::InvalidConfiguration(format!(
                "tracking.match_threshold must be in (0, 1], got {}",
                tracking.match_threshold
            )));
        }

        if !tracking.min_area_ratio.is_finite()
            || !(0.0..=1.0).contains(&tracking.min_area_ratio)
        {
            return Err(Error::InvalidConfiguration(format!(
                "tracking.min_area_ratio must be in [0, 1], got {}",
                tracking.min_area_ratio
            )));
        }

        if let Some(range) = self.input.frame_range {
            if let Some(end) = range.end {
                if end <= range.start {
                    return Err(Error::InvalidConfiguration(format!(
                        "input.frame_range is empty ({}..{})",
                        range.start, end
                    )));
                }
            }
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        Error::InvalidConfiguration(format!("{} has invalid value '{}'", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = AnalysisConfig::default();
        assert_eq!(config.detection.min_area, 200);
        assert_eq!(config.detection.padding, 0);
        assert!(config.detection.crop_patches);
        assert_eq!(config.segmentation.policy, ThresholdPolicy::PerFrame);
        assert!(!config.segmentation.scale_frames);
        assert_eq!(config.tracking.match_threshold, 0.3);
        assert_eq!(config.tracking.max_missed, 2);
        assert!(config.parallel);
        assert!(config.input.channel.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_match_threshold() {
        let mut config = AnalysisConfig::default();
        config.tracking.match_threshold = 0.0;
        assert!(config.validate().is_err());

        config.tracking.match_threshold = 1.01;
        assert!(config.validate().is_err());

        config.tracking.match_threshold = f64::NAN;
        assert!(config.validate().is_err());

        config.tracking.match_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_area_ratio() {
        let mut config = AnalysisConfig::default();
        config.tracking.min_area_ratio = -0.1;
        assert!(config.validate().is_err());

        config.tracking.min_area_ratio = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_frame_range() {
        let mut config = AnalysisConfig::default();
        config.input.frame_range = Some(FrameRange::new(4, Some(4)));
        match config.validate() {
            Err(Error::InvalidConfiguration(msg)) => assert!(msg.contains("frame_range")),
            other => panic!("Expected InvalidConfiguration, got {:?}", other),
        }
    }

    #[test]
    fn test_config_from_json() {
        let config = AnalysisConfig::from_str(
            r#"{"detection": {"min_area": 300}, "segmentation": {"policy": "first_frame_global"}}"#,
        )
        .unwrap();
        assert_eq!(config.detection.min_area, 300);
        assert_eq!(config.segmentation.policy, ThresholdPolicy::FirstFrameGlobal);
        // Unspecified sections keep their defaults
        assert_eq!(config.tracking.max_missed, 2);
    }

    #[test]
    fn test_config_from_toml() {
        let content = r#"
parallel = false

[tracking]
match_threshold = 0.5
max_missed = 4

[input]
channel = 1
"#;
        let config = AnalysisConfig::from_str(content).unwrap();
        assert!(!config.parallel);
        assert_eq!(config.tracking.match_threshold, 0.5);
        assert_eq!(config.tracking.max_missed, 4);
        assert_eq!(config.input.channel, Some(1));
    }

    #[test]
    fn test_config_from_yaml() {
        let content = "detection:\n  padding: 5\n  crop_patches: false\n";
        let config = AnalysisConfig::from_str(content).unwrap();
        assert_eq!(config.detection.padding, 5);
        assert!(!config.detection.crop_patches);
    }

    #[test]
    fn test_config_negative_min_area_rejected() {
        let result = AnalysisConfig::from_str(r#"{"detection": {"min_area": -5}}"#);
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[detection]\nmin_area = 250").unwrap();
        let config = AnalysisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.detection.min_area, 250);
    }

    #[test]
    fn test_config_from_missing_file() {
        let result = AnalysisConfig::from_file("/nonexistent/cytotrack.toml");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_config_roundtrip_json() {
        let mut config = AnalysisConfig::default();
        config.input.frame_range = Some(FrameRange::new(1, Some(9)));
        let json = serde_json::to_string(&config).unwrap();
        let parsed = AnalysisConfig::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
