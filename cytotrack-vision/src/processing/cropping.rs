//! Patch cropping around detections

use crate::error::{Stage, VisionError};
use crate::frame::Mask;
use cytotrack_core::{BoundingBox, FrameDetections};
use ndarray::{s, Array2, ArrayView2, ArrayView3, Axis};

/// Image (and optional mask) cut-out around one detection
#[derive(Debug, Clone, PartialEq)]
pub struct Patch<T> {
    pub frame_index: usize,
    pub detection_index: usize,
    /// Padded box after clamping to the frame; the patch covers exactly this region
    pub bbox: BoundingBox,
    pub image: Array2<T>,
    pub mask: Option<Array2<bool>>,
}

impl<T> Patch<T> {
    /// (rows, cols) of the patch
    pub fn dim(&self) -> (usize, usize) {
        self.image.dim()
    }
}

/// Cut the padded, clamped region `bbox` out of `frame` and `mask`
pub fn crop_region<T: Clone>(
    frame: ArrayView2<'_, T>,
    mask: Option<ArrayView2<'_, bool>>,
    bbox: &BoundingBox,
    padding: usize,
) -> Result<(BoundingBox, Array2<T>, Option<Array2<bool>>), VisionError> {
    let (height, width) = frame.dim();
    if let Some(mask) = mask {
        if mask.dim() != (height, width) {
            return Err(VisionError::Shape(format!(
                "mask is {:?} but frame is {:?}",
                mask.dim(),
                (height, width)
            )));
        }
    }

    let region = bbox.padded(padding, height, width).ok_or_else(|| {
        VisionError::IndexOutOfRange {
            what: format!("box {} in {}x{} frame", bbox, height, width),
            index: bbox.min_row.max(bbox.min_col),
            len: height.max(width),
        }
    })?;

    let rows = region.min_row..region.max_row;
    let cols = region.min_col..region.max_col;
    let image = frame.slice(s![rows.clone(), cols.clone()]).to_owned();
    let mask = mask.map(|m| m.slice(s![rows, cols]).to_owned());
    Ok((region, image, mask))
}

/// Patches for every detection of one frame
pub fn crop_frame<T: Clone>(
    frame: ArrayView2<'_, T>,
    mask: Option<ArrayView2<'_, bool>>,
    frame_index: usize,
    detections: &FrameDetections,
    padding: usize,
) -> Result<Vec<Patch<T>>, VisionError> {
    detections
        .iter()
        .enumerate()
        .map(|(detection_index, detection)| {
            let (bbox, image, mask) = crop_region(frame, mask, &detection.bbox, padding)
                .map_err(|e| e.in_stage(Stage::Crop, frame_index))?;
            Ok(Patch {
                frame_index,
                detection_index,
                bbox,
                image,
                mask,
            })
        })
        .collect()
}

/// Patches for every frame, as a ragged list-of-lists.
///
/// `detections[i]` belongs to frame `i` of `video`; `masks`, when given, must
/// hold one mask per frame with the frame's shape.
pub fn crop<T: Clone>(
    video: ArrayView3<'_, T>,
    detections: &[FrameDetections],
    masks: Option<&[Mask]>,
    padding: usize,
) -> Result<Vec<Vec<Patch<T>>>, VisionError> {
    let frames = video.len_of(Axis(0));
    if detections.len() > frames {
        return Err(VisionError::IndexOutOfRange {
            what: "detection frame".to_string(),
            index: detections.len() - 1,
            len: frames,
        });
    }
    if let Some(masks) = masks {
        if masks.len() < detections.len() {
            return Err(VisionError::IndexOutOfRange {
                what: "mask frame".to_string(),
                index: detections.len() - 1,
                len: masks.len(),
            });
        }
    }

    detections
        .iter()
        .enumerate()
        .map(|(frame_index, frame_detections)| {
            let frame = video.index_axis(Axis(0), frame_index);
            let mask = masks.map(|m| m[frame_index].view());
            crop_frame(frame, mask, frame_index, frame_detections, padding)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cytotrack_core::Detection;
    use ndarray::Array3;

    fn numbered_frame(height: usize, width: usize) -> Array2<u32> {
        Array2::from_shape_fn((height, width), |(r, c)| (r * width + c) as u32)
    }

    #[test]
    fn test_crop_without_padding() {
        let frame = numbered_frame(10, 10);
        let (bbox, image, mask) =
            crop_region(frame.view(), None, &BoundingBox::new(2, 3, 5, 7), 0).unwrap();
        assert_eq!(bbox, BoundingBox::new(2, 3, 5, 7));
        assert_eq!(image.dim(), (3, 4));
        assert_eq!(image[[0, 0]], 23);
        assert!(mask.is_none());
    }

    #[test]
    fn test_crop_edge_box_is_clamped() {
        let frame = numbered_frame(50, 40);
        let bbox = BoundingBox::new(0, 30, 10, 40);
        let (region, image, _) = crop_region(frame.view(), None, &bbox, 5).unwrap();
        // Unclamped box would be (-5, 25, 15, 45); intersected with the frame:
        assert_eq!(region, BoundingBox::new(0, 25, 15, 40));
        assert_eq!(image.dim(), (15, 15));
        assert_eq!(image[[0, 0]], 25);
    }

    #[test]
    fn test_crop_with_mask() {
        let frame = numbered_frame(8, 8);
        let mut mask = Array2::from_elem((8, 8), false);
        mask[[3, 3]] = true;
        let (_, image, mask_patch) =
            crop_region(frame.view(), Some(mask.view()), &BoundingBox::new(3, 3, 4, 4), 1).unwrap();
        let mask_patch = mask_patch.unwrap();
        assert_eq!(image.dim(), mask_patch.dim());
        assert!(mask_patch[[1, 1]]);
        assert_eq!(mask_patch.iter().filter(|&&v| v).count(), 1);
    }

    #[test]
    fn test_crop_mask_shape_mismatch() {
        let frame = numbered_frame(8, 8);
        let mask = Array2::from_elem((4, 4), false);
        let result = crop_region(frame.view(), Some(mask.view()), &BoundingBox::new(0, 0, 2, 2), 0);
        assert!(matches!(result, Err(VisionError::Shape(_))));
    }

    #[test]
    fn test_crop_box_outside_frame() {
        let frame = numbered_frame(8, 8);
        let detections: FrameDetections =
            vec![Detection::new(BoundingBox::new(20, 20, 30, 30), 100)].into();
        match crop_frame(frame.view(), None, 4, &detections, 2) {
            Err(VisionError::Stage { stage, frame_index, .. }) => {
                assert_eq!(stage, Stage::Crop);
                assert_eq!(frame_index, 4);
            }
            other => panic!("Expected stage error, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_crop_video_ragged() {
        let video = Array3::<u8>::zeros((3, 20, 20));
        let detections: Vec<FrameDetections> = vec![
            vec![
                Detection::new(BoundingBox::new(0, 0, 5, 5), 25),
                Detection::new(BoundingBox::new(10, 10, 20, 20), 100),
            ]
            .into(),
            FrameDetections::new(),
            vec![Detection::new(BoundingBox::new(15, 15, 20, 20), 25)].into(),
        ];

        let patches = crop(video.view(), &detections, None, 3).unwrap();
        assert_eq!(patches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 0, 1]);
        assert_eq!(patches[0][0].dim(), (8, 8));
        assert_eq!(patches[0][1].dim(), (13, 13));
        assert_eq!(patches[2][0].frame_index, 2);
        assert_eq!(patches[0][1].detection_index, 1);
    }

    #[test]
    fn test_crop_more_detection_frames_than_video() {
        let video = Array3::<u8>::zeros((1, 5, 5));
        let detections = vec![FrameDetections::new(), FrameDetections::new()];
        let result = crop(video.view(), &detections, None, 0);
        assert!(matches!(result, Err(VisionError::IndexOutOfRange { .. })));
    }
}
