//! Tracker behaviour over multi-frame sequences

use cytotrack_core::{BoundingBox, Detection, FrameDetections, TrackingConfig};
use cytotrack_vision::{TrackState, Tracker};

fn create_detection(min_row: usize, min_col: usize, height: usize, width: usize) -> Detection {
    let bbox = BoundingBox::new(min_row, min_col, min_row + height, min_col + width);
    Detection::new(bbox, bbox.area())
}

fn frame(detections: &[Detection]) -> FrameDetections {
    detections.iter().copied().collect()
}

#[test]
fn test_single_object_moving_one_pixel_per_frame() {
    let mut tracker = Tracker::new(TrackingConfig::default());
    for t in 0..10 {
        tracker
            .update(t, &frame(&[create_detection(40, 40 + t, 15, 15)]))
            .unwrap();
    }
    let tracks = tracker.finish();
    assert_eq!(tracks.len(), 1);
    let track = tracks.iter().next().unwrap();
    assert_eq!(track.len(), 10);
    assert_eq!(track.first_frame(), Some(0));
    assert_eq!(track.last_seen_frame(), Some(9));
    assert!(track.areas().iter().all(|&a| a == 225));
}

#[test]
fn test_two_crossing_paths_keep_identity_until_overlap() {
    // Objects approach each other on the same row without touching
    let mut tracker = Tracker::new(TrackingConfig::default());
    let mut ids = Vec::new();
    for t in 0..6 {
        let detections = frame(&[
            create_detection(20, 10 + 2 * t, 10, 10),
            create_detection(20, 60 - 2 * t, 10, 10),
        ]);
        ids.push(tracker.update(t, &detections).unwrap());
    }
    assert!(ids.iter().all(|frame_ids| frame_ids == &ids[0]));
    assert_eq!(tracker.len(), 2);
}

#[test]
fn test_detection_order_does_not_define_identity() {
    // Label order flips between frames; association must follow geometry
    let mut tracker = Tracker::new(TrackingConfig::default());
    let a = create_detection(5, 5, 12, 12);
    let b = create_detection(50, 50, 12, 12);
    let first = tracker.update(0, &frame(&[a, b])).unwrap();
    let second = tracker.update(1, &frame(&[b, a])).unwrap();
    assert_eq!(second, vec![first[1], first[0]]);
}

#[test]
fn test_gap_equal_to_max_missed_rematches() {
    for max_missed in 0..4 {
        let config = TrackingConfig {
            max_missed,
            ..TrackingConfig::default()
        };
        let mut tracker = Tracker::new(config);
        let cell = create_detection(30, 30, 20, 20);
        let id = tracker.update(0, &frame(&[cell])).unwrap()[0];
        for t in 1..=max_missed {
            tracker.update(t, &FrameDetections::new()).unwrap();
        }
        let ids = tracker.update(max_missed + 1, &frame(&[cell])).unwrap();
        assert_eq!(ids, vec![id], "max_missed = {}", max_missed);
    }
}

#[test]
fn test_gap_longer_than_max_missed_spawns_new_track() {
    for max_missed in 0..4 {
        let config = TrackingConfig {
            max_missed,
            ..TrackingConfig::default()
        };
        let mut tracker = Tracker::new(config);
        let cell = create_detection(30, 30, 20, 20);
        let id = tracker.update(0, &frame(&[cell])).unwrap()[0];
        for t in 1..=max_missed + 1 {
            tracker.update(t, &FrameDetections::new()).unwrap();
        }
        let ids = tracker.update(max_missed + 2, &frame(&[cell])).unwrap();
        assert_ne!(ids, vec![id], "max_missed = {}", max_missed);
        assert_eq!(tracker.track(id).unwrap().state, TrackState::Finished);
    }
}

#[test]
fn test_zero_detections_moves_tracks_to_missing() {
    let mut tracker = Tracker::new(TrackingConfig::default());
    tracker
        .update(0, &frame(&[create_detection(0, 0, 10, 10), create_detection(30, 30, 10, 10)]))
        .unwrap();
    tracker.update(1, &FrameDetections::new()).unwrap();

    assert!(tracker
        .active_tracks()
        .all(|t| t.state == TrackState::Missing(1)));
    assert!(tracker.visible_tracks(false).is_empty());
    assert_eq!(tracker.visible_tracks(true).len(), 2);
}

#[test]
fn test_finished_tracks_are_never_reactivated() {
    let config = TrackingConfig {
        max_missed: 0,
        ..TrackingConfig::default()
    };
    let mut tracker = Tracker::new(config);
    let cell = create_detection(10, 10, 10, 10);
    let id = tracker.update(0, &frame(&[cell])).unwrap()[0];
    tracker.update(1, &FrameDetections::new()).unwrap();

    for t in 2..6 {
        tracker.update(t, &frame(&[cell])).unwrap();
    }
    let finished = tracker.track(id).unwrap();
    assert_eq!(finished.state, TrackState::Finished);
    assert_eq!(finished.frames(), vec![0]);
    assert_eq!(tracker.finished_tracks().count(), 1);
}

#[test]
fn test_tie_break_is_reproducible() {
    let track_box = create_detection(20, 20, 10, 10);
    let above = create_detection(15, 20, 10, 10);
    let below = create_detection(25, 20, 10, 10);

    let mut winners = Vec::new();
    for _ in 0..5 {
        let mut tracker = Tracker::new(TrackingConfig::default());
        let id = tracker.update(0, &frame(&[track_box])).unwrap()[0];
        let ids = tracker.update(1, &frame(&[above, below])).unwrap();
        winners.push(ids.iter().position(|&i| i == id));
    }
    assert!(winners.iter().all(|&w| w == Some(0)));
}

#[test]
fn test_trackset_json_export() {
    let mut tracker = Tracker::new(TrackingConfig::default());
    tracker.update(0, &frame(&[create_detection(0, 0, 10, 10)])).unwrap();
    tracker.update(1, &FrameDetections::new()).unwrap();
    let json = tracker.finish().to_json().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["1"]["state"]["missing"], 1);
    assert_eq!(value["1"]["records"][0]["detection"]["area"], 100);
}
