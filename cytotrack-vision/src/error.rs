//! Error types for cytotrack-vision

use cytotrack_core::Error as CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage, used to locate per-frame failures and fallbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Transform,
    Scale,
    Segment,
    Label,
    Extract,
    Crop,
    Track,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "input",
            Stage::Transform => "transform",
            Stage::Scale => "scale",
            Stage::Segment => "segment",
            Stage::Label => "label",
            Stage::Extract => "extract",
            Stage::Crop => "crop",
            Stage::Track => "track",
        };
        f.write_str(name)
    }
}

/// A frame that was processed with a fallback instead of failing the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameIssue {
    pub frame_index: usize,
    pub stage: Stage,
    pub reason: String,
}

impl FrameIssue {
    pub fn new(frame_index: usize, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            frame_index,
            stage,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FrameIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {} [{}]: {}", self.frame_index, self.stage, self.reason)
    }
}

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Degenerate intensity range: low percentile {low} equals high percentile {high}")]
    DegenerateRange { low: f64, high: f64 },

    #[error("Empty histogram: frame is constant-valued ({value})")]
    EmptyHistogram { value: f64 },

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Index out of range: {what} index {index} (len {len})")]
    IndexOutOfRange { what: String, index: usize, len: usize },

    #[error("Frame {got} arrived after frame {previous}; frames must be strictly increasing")]
    FrameOrder { previous: usize, got: usize },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Stage '{stage}' failed on frame {frame_index}: {source}")]
    Stage {
        stage: Stage,
        frame_index: usize,
        #[source]
        source: Box<VisionError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl VisionError {
    /// Attach the stage and frame index where this error surfaced
    pub fn in_stage(self, stage: Stage, frame_index: usize) -> Self {
        VisionError::Stage {
            stage,
            frame_index,
            source: Box::new(self),
        }
    }

    /// True for degeneracies the pipeline recovers from with a documented fallback
    pub fn is_recoverable(&self) -> bool {
        match self {
            VisionError::DegenerateRange { .. } | VisionError::EmptyHistogram { .. } => true,
            VisionError::Stage { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Core(inner) => inner,
            VisionError::IndexOutOfRange { what, index, len } => {
                CoreError::IndexOutOfRange { what, index, len }
            }
            other => CoreError::Analysis(format!("Vision error: {}", other)),
        }
    }
}
