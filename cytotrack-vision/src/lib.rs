//! cytotrack-vision: cell detection and tracking for microscopy videos
//!
//! Frames are percentile-scaled (optionally), segmented with Otsu thresholds,
//! labeled into 8-connected components and reduced to area-filtered bounding
//! boxes. Patches are cropped around each box and a greedy IoU tracker links
//! boxes across frames into persistent identities.
//!
//! [`CellAnalyzer`] runs the whole pipeline over a video; the stages in
//! [`processing`] can also be used on their own.

pub mod analyzer;
pub mod error;
pub mod frame;
pub mod processing;

pub use analyzer::{AnalysisReport, CellAnalyzer};
pub use error::{FrameIssue, Stage, VisionError};
pub use frame::{select_video, Frame, FrameTransform, Intensity, LabelMap, Mask};
pub use processing::{Patch, Track, TrackId, TrackRecord, TrackSet, TrackState, Tracker};
