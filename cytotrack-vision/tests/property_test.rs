//! Property tests for the scaler, cropper and tracker

use cytotrack_core::{BoundingBox, Detection, FrameDetections, TrackingConfig};
use cytotrack_vision::processing::{crop, extract_regions, label, Connectivity, Scaler};
use cytotrack_vision::Tracker;
use ndarray::{Array2, Array3};
use proptest::prelude::*;

fn frame_strategy() -> impl Strategy<Value = Array2<f64>> {
    (2usize..12, 2usize..12).prop_flat_map(|(h, w)| {
        prop::collection::vec(-1000.0f64..1000.0, h * w)
            .prop_map(move |values| Array2::from_shape_vec((h, w), values).unwrap())
    })
}

fn box_strategy() -> impl Strategy<Value = BoundingBox> {
    (0usize..40, 0usize..40, 1usize..20, 1usize..20)
        .prop_map(|(r, c, h, w)| BoundingBox::new(r, c, r + h, c + w))
}

proptest! {
    #[test]
    fn scaled_values_lie_in_unit_interval(frame in frame_strategy()) {
        if let Ok(scaled) = Scaler::default().scale(frame.view()) {
            prop_assert!(scaled.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn extracted_areas_sum_to_foreground(bits in prop::collection::vec(any::<bool>(), 64)) {
        let mask = Array2::from_shape_vec((8, 8), bits).unwrap();
        let labels = label(mask.view(), Connectivity::Eight);
        let detections = extract_regions(labels.view(), 0);
        let foreground = mask.iter().filter(|&&v| v).count();
        prop_assert_eq!(detections.areas().iter().sum::<usize>(), foreground);
        for detection in detections.iter() {
            prop_assert!(detection.area <= detection.bbox.area());
        }
    }

    #[test]
    fn patches_never_exceed_frame(bbox in box_strategy(), padding in 0usize..30) {
        let video = Array3::<u8>::zeros((1, 32, 32));
        let detections: Vec<FrameDetections> =
            vec![vec![Detection::new(bbox, bbox.area())].into()];
        match crop(video.view(), &detections, None, padding) {
            Ok(patches) => {
                let patch = &patches[0][0];
                prop_assert!(patch.bbox.max_row <= 32 && patch.bbox.max_col <= 32);
                prop_assert_eq!(patch.dim(), (patch.bbox.height(), patch.bbox.width()));
            }
            // Only boxes that lie entirely outside the frame after padding may fail
            Err(_) => prop_assert!(bbox.padded(padding, 32, 32).is_none()),
        }
    }

    #[test]
    fn stationary_objects_keep_their_ids(
        boxes in prop::collection::vec(box_strategy(), 1..6),
        frames in 2usize..8,
    ) {
        // Spread boxes far apart so they never overlap
        let detections: FrameDetections = boxes
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let shifted = BoundingBox::new(b.min_row, b.min_col + i * 100, b.max_row, b.max_col + i * 100);
                Detection::new(shifted, shifted.area())
            })
            .collect();

        let mut tracker = Tracker::new(TrackingConfig::default());
        let first = tracker.update(0, &detections).unwrap();
        for t in 1..frames {
            prop_assert_eq!(tracker.update(t, &detections).unwrap(), first.clone());
        }
        prop_assert_eq!(tracker.len(), boxes.len());
    }
}
