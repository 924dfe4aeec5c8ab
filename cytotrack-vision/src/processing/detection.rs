//! Region extraction: label maps to per-frame detections

use crate::error::FrameIssue;
use crate::processing::labeling::{label, Connectivity};
use crate::processing::segmentation::Segmenter;
use cytotrack_core::{BoundingBox, Detection, FrameDetections, ThresholdPolicy};
use ndarray::{ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Bounding boxes and areas of every label with at least `min_area` pixels,
/// in ascending label order. Label 0 is background and never reported.
pub fn extract_regions(labels: ArrayView2<'_, u32>, min_area: usize) -> FrameDetections {
    let mut regions: BTreeMap<u32, (BoundingBox, usize)> = BTreeMap::new();

    for ((row, col), &l) in labels.indexed_iter() {
        if l == 0 {
            continue;
        }
        regions
            .entry(l)
            .and_modify(|(bbox, area)| {
                bbox.expand_to_include(row, col);
                *area += 1;
            })
            .or_insert((BoundingBox::from_pixel(row, col), 1));
    }

    regions
        .into_values()
        .filter(|&(_, area)| area >= min_area)
        .map(|(bbox, area)| Detection::new(bbox, area))
        .collect()
}

/// Area-filtered region extraction that remembers the largest per-frame count seen
#[derive(Debug, Clone)]
pub struct RegionExtractor {
    min_area: usize,
    max_count: usize,
}

impl RegionExtractor {
    pub fn new(min_area: usize) -> Self {
        Self { min_area, max_count: 0 }
    }

    pub fn min_area(&self) -> usize {
        self.min_area
    }

    /// Largest detection count over all frames extracted or observed so far
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Extract one frame's detections
    pub fn extract(&mut self, labels: ArrayView2<'_, u32>) -> FrameDetections {
        let detections = extract_regions(labels, self.min_area);
        self.observe(&detections);
        detections
    }

    /// Account for detections extracted elsewhere (e.g. on a worker thread)
    pub fn observe(&mut self, detections: &FrameDetections) {
        self.max_count = self.max_count.max(detections.len());
    }
}

/// Detections for every frame of a video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoDetections {
    pub frames: Vec<FrameDetections>,
    pub max_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<FrameIssue>,
}

impl VideoDetections {
    /// Number of detections per frame
    pub fn counts(&self) -> Vec<usize> {
        self.frames.iter().map(FrameDetections::len).collect()
    }

    /// Pixel areas per frame
    pub fn areas(&self) -> Vec<Vec<usize>> {
        self.frames.iter().map(FrameDetections::areas).collect()
    }

    pub fn total(&self) -> usize {
        self.frames.iter().map(FrameDetections::len).sum()
    }
}

/// Segment, label and extract every frame of `video`
pub fn detect_video(
    video: ArrayView3<'_, f64>,
    policy: ThresholdPolicy,
    min_area: usize,
) -> VideoDetections {
    let segmentation = Segmenter::new(policy).segment(video);
    let mut extractor = RegionExtractor::new(min_area);

    let frames: Vec<FrameDetections> = segmentation
        .masks
        .iter()
        .map(|mask| extractor.extract(label(mask.view(), Connectivity::Eight).view()))
        .collect();

    debug!(
        "Extracted {} detections over {} frames (max {} per frame)",
        frames.iter().map(FrameDetections::len).sum::<usize>(),
        frames.len(),
        extractor.max_count()
    );

    VideoDetections {
        frames,
        max_count: extractor.max_count(),
        issues: segmentation.issues,
    }
}
