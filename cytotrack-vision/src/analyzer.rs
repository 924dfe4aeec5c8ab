//! Whole-video analysis: detection per frame, then tracking

use crate::error::{FrameIssue, Stage, VisionError};
use crate::frame::{frame_to_f64, select_video, Frame, FrameTransform, Intensity};
use crate::processing::cropping::{crop_frame, Patch};
use crate::processing::detection::{extract_regions, RegionExtractor};
use crate::processing::labeling::{label, Connectivity};
use crate::processing::scaler::Scaler;
use crate::processing::segmentation::{segment_frame, ThresholdPlan};
use crate::processing::tracker::{TrackId, TrackSet, Tracker};
use cytotrack_core::{AnalysisConfig, Error, FrameDetections, ThresholdPolicy};
use ndarray::{ArrayView3, ArrayViewD, Axis};
use rayon::prelude::*;
use serde_json::json;
use std::fmt;
use tracing::{debug, info};

/// Everything one frame contributes before tracking
struct FrameOutput<T> {
    detections: FrameDetections,
    patches: Vec<Patch<T>>,
    threshold: Option<f64>,
    issues: Vec<FrameIssue>,
}

/// Results of one analysis run.
///
/// Per-frame vectors are indexed from 0; `first_frame` is the absolute index
/// of entry 0 in the input. Track records carry absolute frame indices.
#[derive(Debug, Clone)]
pub struct AnalysisReport<T = f64> {
    pub first_frame: usize,
    pub detections: Vec<FrameDetections>,
    /// Per-frame patches, aligned with `detections`; empty lists when cropping is off
    pub patches: Vec<Vec<Patch<T>>>,
    /// Threshold used per frame, `None` where the frame fell back to all-background
    pub thresholds: Vec<Option<f64>>,
    pub tracks: TrackSet<T>,
    pub issues: Vec<FrameIssue>,
    pub max_count: usize,
}

impl<T> AnalysisReport<T> {
    pub fn frame_count(&self) -> usize {
        self.detections.len()
    }

    /// Number of detections per frame
    pub fn counts(&self) -> Vec<usize> {
        self.detections.iter().map(FrameDetections::len).collect()
    }

    /// Pixel areas per frame
    pub fn areas(&self) -> Vec<Vec<usize>> {
        self.detections.iter().map(FrameDetections::areas).collect()
    }

    /// Patches along a track's trajectory, in frame order
    pub fn track_patches(&self, id: TrackId) -> Vec<&Patch<T>> {
        let Some(track) = self.tracks.get(id) else {
            return Vec::new();
        };
        track
            .records
            .iter()
            .filter_map(|record| {
                let local = record.frame_index.checked_sub(self.first_frame)?;
                self.patches.get(local)?.get(record.detection_index)
            })
            .collect()
    }

    /// JSON summary: counts, areas, thresholds, issues and tracks (no pixel data)
    pub fn to_json(&self) -> Result<String, VisionError> {
        let summary = json!({
            "first_frame": self.first_frame,
            "frames": self.frame_count(),
            "max_count": self.max_count,
            "counts": self.counts(),
            "areas": self.areas(),
            "thresholds": self.thresholds,
            "issues": self.issues,
            "tracks": self.tracks,
        });
        Ok(serde_json::to_string_pretty(&summary)?)
    }
}

/// Runs scaling, segmentation, labeling, extraction, cropping and tracking
/// over a video under one configuration
#[derive(Clone)]
pub struct CellAnalyzer {
    config: AnalysisConfig,
    scaler: Scaler,
    transform: Option<FrameTransform>,
}

impl fmt::Debug for CellAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellAnalyzer")
            .field("config", &self.config)
            .field("scaler", &self.scaler)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl CellAnalyzer {
    /// Create an analyzer; invalid configuration is rejected here, before any frame is read
    pub fn new(config: AnalysisConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            scaler: Scaler::default(),
            transform: None,
        })
    }

    /// Apply `transform` to every frame (after conversion to `f64`, before scaling)
    pub fn with_transform(mut self, transform: FrameTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze a (F, H, W) or (F, C, H, W) array
    pub fn analyze<T>(&self, array: ArrayViewD<'_, T>) -> Result<AnalysisReport<T>, VisionError>
    where
        T: Intensity + Clone,
    {
        let video = select_video(array, &self.config.input)
            .map_err(|e| e.in_stage(Stage::Input, 0))?;
        let first_frame = self
            .config
            .input
            .frame_range
            .map(|range| range.start)
            .unwrap_or(0);
        self.analyze_video(video, first_frame)
    }

    /// Analyze an already-selected (F, H, W) video whose first frame has absolute index `first_frame`
    pub fn analyze_video<T>(
        &self,
        video: ArrayView3<'_, T>,
        first_frame: usize,
    ) -> Result<AnalysisReport<T>, VisionError>
    where
        T: Intensity + Clone,
    {
        let frames = video.len_of(Axis(0));
        info!(
            "Analyzing {} frames of {}x{} (policy {}, min_area {}, parallel {})",
            frames,
            video.len_of(Axis(1)),
            video.len_of(Axis(2)),
            self.config.segmentation.policy,
            self.config.detection.min_area,
            self.config.parallel
        );

        let plan = self.threshold_plan(video, first_frame)?;

        let process = |local: usize| self.process_frame(video, local, first_frame, &plan);
        let outputs: Vec<FrameOutput<T>> = if self.config.parallel {
            (0..frames).into_par_iter().map(process).collect::<Result<Vec<_>, _>>()?
        } else {
            (0..frames).map(process).collect::<Result<Vec<_>, _>>()?
        };

        let mut tracker: Tracker<T> = Tracker::with_config(self.config.tracking.clone());
        let mut extractor = RegionExtractor::new(self.config.detection.min_area);
        let mut report = AnalysisReport {
            first_frame,
            detections: Vec::with_capacity(frames),
            patches: Vec::with_capacity(frames),
            thresholds: Vec::with_capacity(frames),
            tracks: TrackSet::default(),
            issues: Vec::new(),
            max_count: 0,
        };

        for (local, output) in outputs.into_iter().enumerate() {
            let frame_index = first_frame + local;
            extractor.observe(&output.detections);
            tracker
                .update(frame_index, &output.detections)
                .map_err(|e| e.in_stage(Stage::Track, frame_index))?;

            report.detections.push(output.detections);
            report.patches.push(output.patches);
            report.thresholds.push(output.threshold);
            report.issues.extend(output.issues);
        }

        report.max_count = extractor.max_count();
        report.tracks = tracker.finish();

        info!(
            "Analysis finished: {} detections, {} tracks, {} frame issues",
            report.detections.iter().map(FrameDetections::len).sum::<usize>(),
            report.tracks.len(),
            report.issues.len()
        );
        Ok(report)
    }

    fn threshold_plan<T: Intensity>(
        &self,
        video: ArrayView3<'_, T>,
        first_frame: usize,
    ) -> Result<ThresholdPlan, VisionError> {
        match self.config.segmentation.policy {
            ThresholdPolicy::PerFrame => Ok(ThresholdPlan::PerFrame),
            ThresholdPolicy::FirstFrameGlobal => {
                if video.len_of(Axis(0)) == 0 {
                    return Ok(ThresholdPlan::new(ThresholdPolicy::FirstFrameGlobal, None));
                }
                let (reference, _) = self.prepare_frame(video, 0, first_frame)?;
                Ok(ThresholdPlan::new(
                    ThresholdPolicy::FirstFrameGlobal,
                    Some(reference.view()),
                ))
            }
        }
    }

    /// Convert, transform and optionally scale one frame
    fn prepare_frame<T: Intensity>(
        &self,
        video: ArrayView3<'_, T>,
        local: usize,
        first_frame: usize,
    ) -> Result<(Frame, Option<FrameIssue>), VisionError> {
        let frame_index = first_frame + local;
        let raw = video.index_axis(Axis(0), local);
        let mut frame = frame_to_f64(raw);

        if let Some(transform) = &self.transform {
            let transformed =
                transform(frame.view()).map_err(|e| e.in_stage(Stage::Transform, frame_index))?;
            if transformed.dim() != frame.dim() {
                return Err(VisionError::Shape(format!(
                    "transform changed frame shape from {:?} to {:?}",
                    frame.dim(),
                    transformed.dim()
                ))
                .in_stage(Stage::Transform, frame_index));
            }
            frame = transformed;
        }

        if !self.config.segmentation.scale_frames {
            return Ok((frame, None));
        }
        match self.scaler.scale(frame.view()) {
            Ok(scaled) => Ok((scaled, None)),
            Err(e) if e.is_recoverable() => {
                debug!("Frame {}: {}; segmenting unscaled intensities", frame_index, e);
                let issue = FrameIssue::new(frame_index, Stage::Scale, format!("{}; left unscaled", e));
                Ok((frame, Some(issue)))
            }
            Err(e) => Err(e.in_stage(Stage::Scale, frame_index)),
        }
    }

    fn process_frame<T>(
        &self,
        video: ArrayView3<'_, T>,
        local: usize,
        first_frame: usize,
        plan: &ThresholdPlan,
    ) -> Result<FrameOutput<T>, VisionError>
    where
        T: Intensity + Clone,
    {
        let frame_index = first_frame + local;
        let (frame, scale_issue) = self.prepare_frame(video, local, first_frame)?;
        let mut issues: Vec<FrameIssue> = scale_issue.into_iter().collect();

        let (segmented, segment_issue) = segment_frame(plan, frame_index, frame.view());
        issues.extend(segment_issue);

        let labels = label(segmented.mask.view(), Connectivity::Eight);
        let detections = extract_regions(labels.view(), self.config.detection.min_area);
        drop(labels);

        let patches = if self.config.detection.crop_patches {
            crop_frame(
                video.index_axis(Axis(0), local),
                Some(segmented.mask.view()),
                frame_index,
                &detections,
                self.config.detection.padding,
            )?
        } else {
            Vec::new()
        };

        debug!(
            "Frame {}: {} detections (threshold {:?})",
            frame_index,
            detections.len(),
            segmented.threshold
        );

        Ok(FrameOutput {
            detections,
            patches,
            threshold: segmented.threshold,
            issues,
        })
    }
}
