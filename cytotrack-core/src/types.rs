use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Axis-aligned box in pixel coordinates, half-open on the max side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

impl BoundingBox {
    pub const fn new(min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
        Self { min_row, min_col, max_row, max_col }
    }

    /// Single-pixel box at (row, col)
    pub const fn from_pixel(row: usize, col: usize) -> Self {
        Self::new(row, col, row + 1, col + 1)
    }

    pub fn is_valid(&self) -> bool {
        self.min_row < self.max_row && self.min_col < self.max_col
    }

    pub fn height(&self) -> usize {
        self.max_row.saturating_sub(self.min_row)
    }

    pub fn width(&self) -> usize {
        self.max_col.saturating_sub(self.min_col)
    }

    pub fn area(&self) -> usize {
        self.height() * self.width()
    }

    /// Grow the box so it covers (row, col)
    pub fn expand_to_include(&mut self, row: usize, col: usize) {
        self.min_row = self.min_row.min(row);
        self.min_col = self.min_col.min(col);
        self.max_row = self.max_row.max(row + 1);
        self.max_col = self.max_col.max(col + 1);
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let bbox = BoundingBox::new(
            self.min_row.max(other.min_row),
            self.min_col.max(other.min_col),
            self.max_row.min(other.max_row),
            self.max_col.min(other.max_col),
        );
        bbox.is_valid().then_some(bbox)
    }

    /// Intersection over union; 0.0 for disjoint or degenerate boxes
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter_area = match self.intersection(other) {
            Some(inter) => inter.area(),
            None => return 0.0,
        };
        let union_area = self.area() + other.area() - inter_area;
        if union_area == 0 {
            return 0.0;
        }
        inter_area as f64 / union_area as f64
    }

    /// Geometric centre as (row, col)
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.min_row + self.max_row) as f64 / 2.0,
            (self.min_col + self.max_col) as f64 / 2.0,
        )
    }

    pub fn centroid_distance(&self, other: &BoundingBox) -> f64 {
        let (r1, c1) = self.centroid();
        let (r2, c2) = other.centroid();
        ((r1 - r2).powi(2) + (c1 - c2).powi(2)).sqrt()
    }

    /// Expand by `padding` on every side and clamp to a `height` x `width` frame.
    ///
    /// Returns `None` when nothing of the box survives the clamp.
    pub fn padded(&self, padding: usize, height: usize, width: usize) -> Option<BoundingBox> {
        let bbox = BoundingBox::new(
            self.min_row.saturating_sub(padding).min(height),
            self.min_col.saturating_sub(padding).min(width),
            self.max_row.saturating_add(padding).min(height),
            self.max_col.saturating_add(padding).min(width),
        );
        bbox.is_valid().then_some(bbox)
    }

    pub fn as_tuple(&self) -> (usize, usize, usize, usize) {
        (self.min_row, self.min_col, self.max_row, self.max_col)
    }
}

impl From<(usize, usize, usize, usize)> for BoundingBox {
    fn from((min_row, min_col, max_row, max_col): (usize, usize, usize, usize)) -> Self {
        Self::new(min_row, min_col, max_row, max_col)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}, {}:{}]",
            self.min_row, self.max_row, self.min_col, self.max_col
        )
    }
}

/// One detected object: its box and foreground pixel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub area: usize,
}

impl Detection {
    pub const fn new(bbox: BoundingBox, area: usize) -> Self {
        Self { bbox, area }
    }

    /// `min(a1, a2) / max(a1, a2)`, 1.0 for equal areas
    pub fn area_ratio(&self, other_area: usize) -> f64 {
        let (lo, hi) = if self.area <= other_area {
            (self.area, other_area)
        } else {
            (other_area, self.area)
        };
        if hi == 0 {
            return 1.0;
        }
        lo as f64 / hi as f64
    }
}

/// Detections of a single frame, in ascending label order.
///
/// The order carries no identity across frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameDetections {
    detections: Vec<Detection>,
}

impl FrameDetections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, detection: Detection) {
        self.detections.push(detection);
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Detection> {
        self.detections.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.detections.iter().map(|d| d.bbox).collect()
    }

    pub fn areas(&self) -> Vec<usize> {
        self.detections.iter().map(|d| d.area).collect()
    }
}

impl From<Vec<Detection>> for FrameDetections {
    fn from(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl FromIterator<Detection> for FrameDetections {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self { detections: iter.into_iter().collect() }
    }
}

impl IntoIterator for FrameDetections {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.into_iter()
    }
}

impl<'a> IntoIterator for &'a FrameDetections {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

/// How Otsu thresholds are estimated across a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Independent threshold for every frame
    #[default]
    PerFrame,
    /// Threshold of the first frame applied to all frames
    FirstFrameGlobal,
}

impl fmt::Display for ThresholdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdPolicy::PerFrame => write!(f, "per_frame"),
            ThresholdPolicy::FirstFrameGlobal => write!(f, "first_frame_global"),
        }
    }
}

impl FromStr for ThresholdPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_frame" | "perframe" | "all" => Ok(ThresholdPolicy::PerFrame),
            "first_frame_global" | "firstframeglobal" | "first" => {
                Ok(ThresholdPolicy::FirstFrameGlobal)
            }
            other => Err(Error::InvalidConfiguration(format!(
                "unknown threshold policy '{}'",
                other
            ))),
        }
    }
}

/// Half-open frame sub-range; `end: None` runs to the last frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl FrameRange {
    pub fn new(start: usize, end: Option<usize>) -> Self {
        Self { start, end }
    }

    /// Resolve against a video of `len` frames
    pub fn resolve(&self, len: usize) -> Result<Range<usize>> {
        let end = self.end.unwrap_or(len);
        if end > len {
            return Err(Error::IndexOutOfRange {
                what: "frame range end".to_string(),
                index: end,
                len,
            });
        }
        if self.start >= end {
            return Err(Error::IndexOutOfRange {
                what: "frame range start".to_string(),
                index: self.start,
                len: end,
            });
        }
        Ok(self.start..end)
    }
}
