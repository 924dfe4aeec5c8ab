//! Foreground segmentation with Otsu thresholds

use crate::error::{FrameIssue, Stage, VisionError};
use crate::frame::Mask;
use cytotrack_core::ThresholdPolicy;
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};
use tracing::{debug, warn};

/// Histogram resolution used for threshold estimation
pub const OTSU_BINS: usize = 256;

/// Otsu threshold of a frame.
///
/// Intensities are binned over the frame's own [min, max] range and the split
/// maximizing between-class variance is chosen. The returned value is the lower
/// edge of the first foreground bin, so `value >= threshold` reproduces the
/// histogram split exactly. Non-finite pixels are ignored.
pub fn otsu_threshold(frame: ArrayView2<'_, f64>) -> Result<f64, VisionError> {
    let (min, max) = frame
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if !min.is_finite() {
        return Err(VisionError::EmptyHistogram { value: f64::NAN });
    }
    if min >= max {
        return Err(VisionError::EmptyHistogram { value: min });
    }

    let bin_width = (max - min) / OTSU_BINS as f64;
    let mut counts = [0u64; OTSU_BINS];
    for &v in frame.iter().filter(|v| v.is_finite()) {
        let bin = (((v - min) / bin_width) as usize).min(OTSU_BINS - 1);
        counts[bin] += 1;
    }

    let center = |i: usize| min + (i as f64 + 0.5) * bin_width;
    let total_weight: f64 = counts.iter().map(|&c| c as f64).sum();
    let total_sum: f64 = counts
        .iter()
        .enumerate()
        .map(|(i, &c)| c as f64 * center(i))
        .sum();

    let mut weight_b = 0.0;
    let mut sum_b = 0.0;
    let mut best: Option<(usize, f64)> = None;

    for (i, &count) in counts.iter().enumerate().take(OTSU_BINS - 1) {
        weight_b += count as f64;
        sum_b += count as f64 * center(i);
        let weight_f = total_weight - weight_b;
        if weight_b == 0.0 || weight_f == 0.0 {
            continue;
        }

        let mean_b = sum_b / weight_b;
        let mean_f = (total_sum - sum_b) / weight_f;
        let variance = weight_b * weight_f * (mean_b - mean_f).powi(2);

        if best.map_or(true, |(_, v)| variance > v) {
            best = Some((i, variance));
        }
    }

    // min and max occupy the first and last bins, so a split always exists
    let (split, _) = best.ok_or(VisionError::EmptyHistogram { value: min })?;
    Ok(min + (split + 1) as f64 * bin_width)
}

/// Binary mask of pixels at or above `threshold`
pub fn apply_threshold(frame: ArrayView2<'_, f64>, threshold: f64) -> Mask {
    frame.mapv(|v| v >= threshold)
}

/// Threshold source for a run, fixed before any frame is segmented
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPlan {
    /// Estimate per frame
    PerFrame,
    /// One threshold for the whole video
    Global(f64),
    /// Global policy whose reference frame was constant-valued
    GlobalUndefined { value: f64 },
}

impl ThresholdPlan {
    /// Build the plan for `policy`; `first` is the reference frame for the global policy
    pub fn new(policy: ThresholdPolicy, first: Option<ArrayView2<'_, f64>>) -> Self {
        match policy {
            ThresholdPolicy::PerFrame => ThresholdPlan::PerFrame,
            ThresholdPolicy::FirstFrameGlobal => match first.map(otsu_threshold) {
                Some(Ok(threshold)) => {
                    debug!("Global threshold {:.4} from first frame", threshold);
                    ThresholdPlan::Global(threshold)
                }
                Some(Err(VisionError::EmptyHistogram { value })) => {
                    ThresholdPlan::GlobalUndefined { value }
                }
                Some(Err(_)) | None => ThresholdPlan::GlobalUndefined { value: f64::NAN },
            },
        }
    }

    /// Threshold to use for `frame`
    pub fn threshold_for(&self, frame: ArrayView2<'_, f64>) -> Result<f64, VisionError> {
        match *self {
            ThresholdPlan::PerFrame => otsu_threshold(frame),
            ThresholdPlan::Global(threshold) => Ok(threshold),
            ThresholdPlan::GlobalUndefined { value } => Err(VisionError::EmptyHistogram { value }),
        }
    }
}

/// Mask of one frame plus the threshold that produced it
#[derive(Debug, Clone)]
pub struct SegmentedFrame {
    pub mask: Mask,
    /// `None` when the frame fell back to all-background
    pub threshold: Option<f64>,
}

/// Segment one frame, falling back to an all-background mask on degenerate input
pub fn segment_frame(
    plan: &ThresholdPlan,
    frame_index: usize,
    frame: ArrayView2<'_, f64>,
) -> (SegmentedFrame, Option<FrameIssue>) {
    match plan.threshold_for(frame) {
        Ok(threshold) => (
            SegmentedFrame {
                mask: apply_threshold(frame, threshold),
                threshold: Some(threshold),
            },
            None,
        ),
        Err(e) => {
            warn!("Frame {}: {}; treating frame as all-background", frame_index, e);
            (
                SegmentedFrame {
                    mask: Array2::from_elem(frame.dim(), false),
                    threshold: None,
                },
                Some(FrameIssue::new(
                    frame_index,
                    Stage::Segment,
                    format!("{}; treated as all-background", e),
                )),
            )
        }
    }
}

/// Masks for a whole video
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub masks: Vec<Mask>,
    pub thresholds: Vec<Option<f64>>,
    pub issues: Vec<FrameIssue>,
}

/// Segments videos under a fixed threshold policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Segmenter {
    policy: ThresholdPolicy,
}

impl Segmenter {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ThresholdPolicy {
        self.policy
    }

    /// Threshold plan for `video` under this segmenter's policy
    pub fn plan(&self, video: ArrayView3<'_, f64>) -> ThresholdPlan {
        let first = (video.len_of(Axis(0)) > 0).then(|| video.index_axis(Axis(0), 0));
        ThresholdPlan::new(self.policy, first)
    }

    /// Segment every frame of `video`; degenerate frames become all-background
    pub fn segment(&self, video: ArrayView3<'_, f64>) -> Segmentation {
        let plan = self.plan(video);
        let mut segmentation = Segmentation::default();

        for (frame_index, frame) in video.outer_iter().enumerate() {
            let (segmented, issue) = segment_frame(&plan, frame_index, frame);
            segmentation.masks.push(segmented.mask);
            segmentation.thresholds.push(segmented.threshold);
            segmentation.issues.extend(issue);
        }

        debug!(
            "Segmented {} frames with {} policy ({} fallbacks)",
            segmentation.masks.len(),
            self.policy,
            segmentation.issues.len()
        );
        segmentation
    }
}

/// Segment `video` under `policy`
pub fn segment_video(video: ArrayView3<'_, f64>, policy: ThresholdPolicy) -> Segmentation {
    Segmenter::new(policy).segment(video)
}
