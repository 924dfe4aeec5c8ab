//! Frame-to-frame identity tracking
//!
//! Greedy IoU association: every update scores all (track, detection) pairs,
//! then repeatedly takes the best remaining pair until no pair clears the
//! match threshold. Unmatched tracks accumulate misses and are finished once
//! they exceed `max_missed`; unmatched detections open new tracks.

use crate::error::{Stage, VisionError};
use crate::frame::Mask;
use crate::processing::cropping::{crop_region, Patch};
use cytotrack_core::{BoundingBox, Detection, FrameDetections, TrackingConfig};
use ndarray::{ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

/// Track identifier, unique within one tracker
pub type TrackId = u64;

/// Lifecycle of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Matched in the most recent frame
    Active,
    /// Unmatched for `k` consecutive frames, `0 < k <= max_missed`
    Missing(usize),
    /// Terminal; never matched again
    Finished,
}

impl TrackState {
    /// Whether the track still takes part in matching
    pub fn is_live(&self) -> bool {
        !matches!(self, TrackState::Finished)
    }

    /// Consecutive frames without a match
    pub fn missed_count(&self) -> usize {
        match self {
            TrackState::Missing(k) => *k,
            _ => 0,
        }
    }
}

/// One observation on a trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TrackRecord<T = f64> {
    pub frame_index: usize,
    /// Position of the detection within its frame
    pub detection_index: usize,
    pub detection: Detection,
    #[serde(skip)]
    pub patch: Option<Patch<T>>,
}

impl<T> TrackRecord<T> {
    pub fn bbox(&self) -> BoundingBox {
        self.detection.bbox
    }

    pub fn area(&self) -> usize {
        self.detection.area
    }
}

/// A persistent identity and its trajectory, in frame order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Track<T = f64> {
    pub id: TrackId,
    pub state: TrackState,
    pub records: Vec<TrackRecord<T>>,
}

impl<T> Track<T> {
    fn start(id: TrackId, record: TrackRecord<T>) -> Self {
        Self {
            id,
            state: TrackState::Active,
            records: vec![record],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_frame(&self) -> Option<usize> {
        self.records.first().map(|r| r.frame_index)
    }

    pub fn last_seen_frame(&self) -> Option<usize> {
        self.records.last().map(|r| r.frame_index)
    }

    pub fn last_detection(&self) -> Option<&Detection> {
        self.records.last().map(|r| &r.detection)
    }

    pub fn frames(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.frame_index).collect()
    }

    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.records.iter().map(TrackRecord::bbox).collect()
    }

    pub fn areas(&self) -> Vec<usize> {
        self.records.iter().map(TrackRecord::area).collect()
    }

    /// Patches of the records that carry one
    pub fn patches(&self) -> impl Iterator<Item = &Patch<T>> {
        self.records.iter().filter_map(|r| r.patch.as_ref())
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    iou: f64,
    distance: f64,
    track_id: TrackId,
    detection_index: usize,
}

impl Candidate {
    /// Higher IoU first, then nearer centroid, then lower track id, then lower detection index
    fn priority(&self, other: &Candidate) -> Ordering {
        other
            .iou
            .total_cmp(&self.iou)
            .then_with(|| self.distance.total_cmp(&other.distance))
            .then_with(|| self.track_id.cmp(&other.track_id))
            .then_with(|| self.detection_index.cmp(&other.detection_index))
    }
}

/// Greedy IoU tracker.
///
/// Owns all track state for one analysis run; frames must be fed in strictly
/// increasing order.
#[derive(Debug, Clone)]
pub struct Tracker<T = f64> {
    config: TrackingConfig,
    next_id: TrackId,
    last_frame: Option<usize>,
    live: BTreeMap<TrackId, Track<T>>,
    finished: BTreeMap<TrackId, Track<T>>,
}

impl Tracker {
    /// Tracker over `f64` patches
    pub fn new(config: TrackingConfig) -> Self {
        Self::with_config(config)
    }
}

impl<T> Tracker<T> {
    pub fn with_config(config: TrackingConfig) -> Self {
        Self {
            config,
            next_id: 1,
            last_frame: None,
            live: BTreeMap::new(),
            finished: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Most recent frame index passed to `update`
    pub fn last_frame(&self) -> Option<usize> {
        self.last_frame
    }

    /// Associate one frame's detections.
    ///
    /// Returns the track id assigned to each detection, aligned with `detections`.
    pub fn update(
        &mut self,
        frame_index: usize,
        detections: &FrameDetections,
    ) -> Result<Vec<TrackId>, VisionError> {
        self.step(frame_index, detections, Vec::new())
    }

    /// Like [`Tracker::update`], storing `patches[i]` on the record of detection `i`
    pub fn update_with_patches(
        &mut self,
        frame_index: usize,
        detections: &FrameDetections,
        patches: Vec<Patch<T>>,
    ) -> Result<Vec<TrackId>, VisionError> {
        if patches.len() != detections.len() {
            return Err(VisionError::Shape(format!(
                "{} patches for {} detections",
                patches.len(),
                detections.len()
            ))
            .in_stage(Stage::Track, frame_index));
        }
        self.step(frame_index, detections, patches)
    }

    fn step(
        &mut self,
        frame_index: usize,
        detections: &FrameDetections,
        patches: Vec<Patch<T>>,
    ) -> Result<Vec<TrackId>, VisionError> {
        if let Some(previous) = self.last_frame {
            if frame_index <= previous {
                return Err(VisionError::FrameOrder {
                    previous,
                    got: frame_index,
                });
            }
        }
        self.last_frame = Some(frame_index);

        let mut patches: Vec<Option<Patch<T>>> = patches.into_iter().map(Some).collect();
        let mut assigned: Vec<Option<TrackId>> = vec![None; detections.len()];

        let mut candidates = self.candidates(detections);
        candidates.sort_by(Candidate::priority);

        let mut matched_tracks = HashSet::new();
        for candidate in candidates {
            if assigned[candidate.detection_index].is_some()
                || matched_tracks.contains(&candidate.track_id)
            {
                continue;
            }
            assigned[candidate.detection_index] = Some(candidate.track_id);
            matched_tracks.insert(candidate.track_id);
            trace!(
                "Frame {}: track {} <- detection {} (IoU {:.3})",
                frame_index,
                candidate.track_id,
                candidate.detection_index,
                candidate.iou
            );
        }

        for (detection_index, track_id) in assigned.iter().enumerate() {
            let Some(track_id) = track_id else { continue };
            if let Some(track) = self.live.get_mut(track_id) {
                track.state = TrackState::Active;
                track.records.push(TrackRecord {
                    frame_index,
                    detection_index,
                    detection: detections.as_slice()[detection_index],
                    patch: patches.get_mut(detection_index).and_then(Option::take),
                });
            }
        }

        let max_missed = self.config.max_missed;
        let mut expired = Vec::new();
        for (id, track) in self.live.iter_mut() {
            if matched_tracks.contains(id) {
                continue;
            }
            let missed = track.state.missed_count() + 1;
            if missed > max_missed {
                track.state = TrackState::Finished;
                expired.push(*id);
            } else {
                track.state = TrackState::Missing(missed);
            }
        }
        for id in expired {
            if let Some(track) = self.live.remove(&id) {
                debug!("Track {} finished after frame {}", id, frame_index);
                self.finished.insert(id, track);
            }
        }

        let mut created = 0;
        for (detection_index, slot) in assigned.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            let record = TrackRecord {
                frame_index,
                detection_index,
                detection: detections.as_slice()[detection_index],
                patch: patches.get_mut(detection_index).and_then(Option::take),
            };
            self.live.insert(id, Track::start(id, record));
            *slot = Some(id);
            created += 1;
        }

        debug!(
            "Frame {}: {} detections, {} matched, {} new tracks, {} live",
            frame_index,
            detections.len(),
            matched_tracks.len(),
            created,
            self.live.len()
        );

        Ok(assigned.into_iter().flatten().collect())
    }

    fn candidates(&self, detections: &FrameDetections) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for (&track_id, track) in &self.live {
            let Some(last) = track.last_detection() else { continue };
            for (detection_index, detection) in detections.iter().enumerate() {
                let iou = last.bbox.iou(&detection.bbox);
                if iou < self.config.match_threshold {
                    continue;
                }
                if last.area_ratio(detection.area) < self.config.min_area_ratio {
                    continue;
                }
                candidates.push(Candidate {
                    iou,
                    distance: last.bbox.centroid_distance(&detection.bbox),
                    track_id,
                    detection_index,
                });
            }
        }
        candidates
    }

    /// Tracks still eligible for matching, in id order
    pub fn active_tracks(&self) -> impl Iterator<Item = &Track<T>> {
        self.live.values()
    }

    /// Active tracks, plus `Missing` ones when `include_missing` is set
    pub fn visible_tracks(&self, include_missing: bool) -> Vec<&Track<T>> {
        self.live
            .values()
            .filter(|t| include_missing || t.state == TrackState::Active)
            .collect()
    }

    pub fn finished_tracks(&self) -> impl Iterator<Item = &Track<T>> {
        self.finished.values()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track<T>> {
        self.live.get(&id).or_else(|| self.finished.get(&id))
    }

    /// Total tracks created so far
    pub fn len(&self) -> usize {
        self.live.len() + self.finished.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the tracker; live tracks keep their current state
    pub fn finish(self) -> TrackSet<T> {
        let mut tracks = self.finished;
        tracks.extend(self.live);
        TrackSet { tracks }
    }
}

/// All tracks of a run, keyed by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
#[serde(transparent)]
pub struct TrackSet<T = f64> {
    tracks: BTreeMap<TrackId, Track<T>>,
}

impl<T> Default for TrackSet<T> {
    fn default() -> Self {
        Self { tracks: BTreeMap::new() }
    }
}

impl<T> TrackSet<T> {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track<T>> {
        self.tracks.get(&id)
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track<T>> {
        self.tracks.values()
    }

    /// JSON document of ids, states and records; patches are omitted
    pub fn to_json(&self) -> Result<String, VisionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Crop a padded, clamped patch for every record.
    ///
    /// Record frame indices must index the first axis of `video` (and `masks`).
    pub fn attach_patches(
        &mut self,
        video: ArrayView3<'_, T>,
        masks: Option<&[Mask]>,
        padding: usize,
    ) -> Result<(), VisionError>
    where
        T: Clone,
    {
        let frames = video.len_of(Axis(0));
        for track in self.tracks.values_mut() {
            for record in &mut track.records {
                let frame_index = record.frame_index;
                if frame_index >= frames {
                    return Err(VisionError::IndexOutOfRange {
                        what: format!("frame of track {}", track.id),
                        index: frame_index,
                        len: frames,
                    });
                }
                let mask = match masks {
                    Some(masks) => Some(
                        masks
                            .get(frame_index)
                            .ok_or_else(|| VisionError::IndexOutOfRange {
                                what: "mask frame".to_string(),
                                index: frame_index,
                                len: masks.len(),
                            })?
                            .view(),
                    ),
                    None => None,
                };
                let frame = video.index_axis(Axis(0), frame_index);
                let (bbox, image, mask) = crop_region(frame, mask, &record.detection.bbox, padding)
                    .map_err(|e| e.in_stage(Stage::Crop, frame_index))?;
                record.patch = Some(Patch {
                    frame_index,
                    detection_index: record.detection_index,
                    bbox,
                    image,
                    mask,
                });
            }
        }
        Ok(())
    }
}

impl<T> IntoIterator for TrackSet<T> {
    type Item = Track<T>;
    type IntoIter = std::collections::btree_map::IntoValues<TrackId, Track<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.into_values()
    }
}
