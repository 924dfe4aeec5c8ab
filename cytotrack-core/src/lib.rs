//! cytotrack-core: shared data model and configuration for cytotrack.
//!
//! Bounding boxes, per-frame detections and the analysis configuration live
//! here so the vision pipeline and its callers agree on one vocabulary.

pub mod types;
pub mod error;
pub mod config;

pub use error::{Error, Result};
pub use types::{BoundingBox, Detection, FrameDetections, FrameRange, ThresholdPolicy};
pub use config::{
    AnalysisConfig, DetectionConfig, InputConfig, SegmentationConfig, TrackingConfig,
};
