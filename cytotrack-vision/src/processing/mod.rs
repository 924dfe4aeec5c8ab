//! Per-frame processing stages and the tracker

pub mod cropping;
pub mod detection;
pub mod labeling;
pub mod scaler;
pub mod segmentation;
pub mod tracker;

pub use cropping::{crop, crop_frame, Patch};
pub use detection::{detect_video, extract_regions, RegionExtractor, VideoDetections};
pub use labeling::{label, label_video, Connectivity, LabeledVideo};
pub use scaler::{scale, Scaler};
pub use segmentation::{otsu_threshold, segment_video, Segmentation, Segmenter, ThresholdPlan};
pub use tracker::{Track, TrackId, TrackRecord, TrackSet, TrackState, Tracker};
