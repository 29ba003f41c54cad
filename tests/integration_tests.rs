//! Integration tests for redoxi-track.
//!
//! These tests drive complete tracking sessions through the public API.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use redoxi_track::{
    BoundingBox, CloseReason, Detectable, Detection, EventLog, FilterFactoryEnum, HandlerResult,
    ImageSize, TargetAssociation, TargetClosed, TargetId, TargetState, Tracker, TrackerConfig,
    TrackingEventHandler,
};
use redoxi_track::filter::DiagonalKalmanFilterFactory;

fn frame() -> ImageSize {
    ImageSize::new(1280, 720)
}

fn boxed(x: f64, y: f64) -> Detection {
    Detection::new(BoundingBox::new(x, y, 60.0, 120.0))
}

fn tracker_with_log(config: TrackerConfig) -> (Tracker, Arc<Mutex<EventLog>>) {
    let mut tracker = Tracker::new(config).expect("Failed to create tracker");
    let log = EventLog::shared();
    tracker.add_event_handler(log.clone());
    (tracker, log)
}

// =============================================================================
// Test 1: Complete Tracking Pipeline
// =============================================================================

#[test]
fn test_integration_complete_tracking_pipeline() {
    let (mut tracker, log) = tracker_with_log(TrackerConfig::default());

    // Two objects: one static, one moving right at 8 px/frame
    let detections_at = |frame: u64| vec![boxed(100.0, 100.0), boxed(500.0 + 8.0 * frame as f64, 300.0)];

    tracker.begin_track(frame(), &detections_at(0), 0).unwrap();
    for i in 1..30 {
        tracker.track(frame(), &detections_at(i), i).unwrap();

        let targets = tracker.get_all_open_targets();
        assert_eq!(targets.len(), 2, "Frame {}: expected 2 targets", i);
        if i >= 2 {
            assert!(
                targets.values().all(|t| t.state == TargetState::Confirmed),
                "Frame {}: targets not confirmed",
                i
            );
        }
    }

    // Identities never changed
    let ids: Vec<TargetId> = tracker.get_all_open_targets().keys().copied().collect();
    assert_eq!(ids, vec![TargetId::new(1), TargetId::new(2)]);
    assert_eq!(tracker.total_target_count(), 2);

    // The moving target learned its velocity
    let moving = &tracker.get_all_open_targets()[&TargetId::new(2)];
    assert_relative_eq!(moving.velocity[0], 8.0, epsilon = 1.0);
    assert_relative_eq!(moving.velocity[1], 0.0, epsilon = 0.5);

    let log = log.lock().unwrap();
    assert_eq!(log.created.len(), 2);
    assert_eq!(log.associated.len(), 2 * 29);
    assert!(log.closed.is_empty());
    assert!(log.rejected.is_empty());
}

// =============================================================================
// Test 2: Scenarios
// =============================================================================

#[test]
fn test_integration_begin_track_creates_distinct_tentative_targets() {
    let (mut tracker, log) = tracker_with_log(TrackerConfig::default());
    tracker
        .begin_track(frame(), &[boxed(10.0, 10.0), boxed(400.0, 10.0)], 0)
        .unwrap();

    let targets = tracker.get_all_open_targets();
    assert_eq!(targets.len(), 2);
    assert!(targets.values().all(|t| t.state == TargetState::Tentative));

    let ids: HashSet<TargetId> = targets.keys().copied().collect();
    assert_eq!(ids.len(), 2);

    // Creation does not also fire an association
    let log = log.lock().unwrap();
    assert_eq!(log.created.len(), 2);
    assert!(log.associated.is_empty());
}

#[test]
fn test_integration_retirement_after_miss_limit() {
    let config = TrackerConfig {
        max_misses: 3,
        ..Default::default()
    };
    let (mut tracker, log) = tracker_with_log(config);
    tracker.begin_track(frame(), &[boxed(100.0, 100.0)], 0).unwrap();
    let id = TargetId::new(1);

    let empty: Vec<Detection> = Vec::new();
    let mut previous_misses = 0;
    for i in 1..=3 {
        tracker.track(frame(), &empty, i).unwrap();
        let target = tracker.target(id).expect("target should still be open");
        assert_eq!(target.state, TargetState::Lost);
        assert!(target.miss_count > previous_misses);
        previous_misses = target.miss_count;
    }
    assert!(log.lock().unwrap().closed.is_empty());

    // Fourth miss crosses the threshold
    tracker.track(frame(), &empty, 4).unwrap();
    assert!(tracker.target(id).is_none());
    assert!(tracker.get_all_open_targets().is_empty());
    assert_eq!(
        log.lock().unwrap().closed,
        vec![(id, CloseReason::MissLimitExceeded)]
    );

    tracker.track(frame(), &empty, 5).unwrap();
    assert_eq!(log.lock().unwrap().closed.len(), 1);
}

#[test]
fn test_integration_miss_counter_resets_on_match() {
    let (mut tracker, _log) = tracker_with_log(TrackerConfig::default());
    tracker.begin_track(frame(), &[boxed(200.0, 200.0)], 0).unwrap();
    let id = TargetId::new(1);

    let empty: Vec<Detection> = Vec::new();
    tracker.track(frame(), &empty, 1).unwrap();
    tracker.track(frame(), &empty, 2).unwrap();
    assert_eq!(tracker.target(id).unwrap().miss_count, 2);

    tracker.track(frame(), &[boxed(200.0, 200.0)], 3).unwrap();
    let target = tracker.target(id).unwrap();
    assert_eq!(target.miss_count, 0);
    // Never confirmed before the gap, so it starts over
    assert_eq!(target.state, TargetState::Tentative);
    assert_eq!(target.consecutive_hits, 1);
}

#[test]
fn test_integration_lost_confirmed_target_is_reacquired() {
    let (mut tracker, _log) = tracker_with_log(TrackerConfig::default());
    tracker.begin_track(frame(), &[boxed(300.0, 300.0)], 0).unwrap();
    for i in 1..5 {
        tracker.track(frame(), &[boxed(300.0, 300.0)], i).unwrap();
    }
    let id = TargetId::new(1);
    assert_eq!(tracker.target(id).unwrap().state, TargetState::Confirmed);

    let empty: Vec<Detection> = Vec::new();
    tracker.track(frame(), &empty, 5).unwrap();
    assert_eq!(tracker.target(id).unwrap().state, TargetState::Lost);

    tracker.track(frame(), &[boxed(301.0, 300.0)], 6).unwrap();
    assert_eq!(tracker.target(id).unwrap().state, TargetState::Confirmed);
    assert_eq!(tracker.total_target_count(), 1);
}

#[test]
fn test_integration_low_overlap_spawns_new_targets() {
    let (mut tracker, log) = tracker_with_log(TrackerConfig::default());
    tracker.begin_track(frame(), &[boxed(100.0, 100.0)], 0).unwrap();

    // Both far from the existing target
    tracker
        .track(frame(), &[boxed(600.0, 100.0), boxed(900.0, 400.0)], 1)
        .unwrap();

    let targets = tracker.get_all_open_targets();
    assert_eq!(targets.len(), 3);
    assert_eq!(targets[&TargetId::new(1)].state, TargetState::Lost);
    assert_eq!(targets[&TargetId::new(2)].state, TargetState::Tentative);
    assert_eq!(targets[&TargetId::new(3)].state, TargetState::Tentative);

    let log = log.lock().unwrap();
    assert!(log.associated.is_empty());
    assert_eq!(log.created.len(), 3);
}

#[test]
fn test_integration_finish_track_closes_everything() {
    let (mut tracker, log) = tracker_with_log(TrackerConfig::default());
    let detections = vec![boxed(0.0, 0.0), boxed(200.0, 0.0), boxed(400.0, 0.0)];
    tracker.begin_track(frame(), &detections, 0).unwrap();
    tracker.track(frame(), &detections, 1).unwrap();

    assert_eq!(tracker.finish_track().unwrap(), 3);
    assert!(tracker.get_all_open_targets().is_empty());

    let log = log.lock().unwrap();
    assert_eq!(log.closed.len(), 3);
    assert!(log.closed.iter().all(|&(_, reason)| reason == CloseReason::Finished));
}

#[test]
fn test_integration_queries_are_idempotent() {
    let (mut tracker, _log) = tracker_with_log(TrackerConfig::default());
    tracker
        .begin_track(frame(), &[boxed(10.0, 10.0), boxed(500.0, 10.0)], 0)
        .unwrap();
    tracker.track(frame(), &[boxed(12.0, 11.0)], 1).unwrap();

    assert_eq!(tracker.get_all_open_targets(), tracker.get_all_open_targets());
}

// =============================================================================
// Test 3: Association Properties
// =============================================================================

/// Checks every frame that no target or detection is associated twice.
#[derive(Default)]
struct BijectionCheck {
    frame_index: u64,
    targets: HashSet<TargetId>,
    detections: HashSet<usize>,
    violations: usize,
}

impl TrackingEventHandler for BijectionCheck {
    fn on_target_associated(&mut self, event: &TargetAssociation<'_>) -> HandlerResult {
        if event.frame_index != self.frame_index {
            self.frame_index = event.frame_index;
            self.targets.clear();
            self.detections.clear();
        }
        if !self.targets.insert(event.target.id) || !self.detections.insert(event.detection_index) {
            self.violations += 1;
        }
        // The association is already applied when the handler runs
        if event.target.last_seen_frame != event.frame_index || event.target.miss_count != 0 {
            self.violations += 1;
        }
        HandlerResult::None
    }
}

#[test]
fn test_integration_crowded_scene_bijection() {
    let check = Arc::new(Mutex::new(BijectionCheck::default()));
    let mut tracker = Tracker::new(TrackerConfig {
        min_iou: 0.0,
        ..Default::default()
    })
    .unwrap();
    tracker.add_event_handler(check.clone());

    // Heavily overlapping boxes jittering around each other
    let detections_at = |i: u64| -> Vec<Detection> {
        (0..6)
            .map(|k| {
                let phase = (i as f64 * 0.7 + k as f64).sin();
                boxed(100.0 + 20.0 * k as f64 + 5.0 * phase, 100.0 + 3.0 * phase)
            })
            .collect()
    };

    tracker.begin_track(frame(), &detections_at(0), 0).unwrap();
    for i in 1..25 {
        let detections = if i % 5 == 0 {
            detections_at(i)[..3].to_vec()
        } else {
            detections_at(i)
        };
        tracker.track(frame(), &detections, i).unwrap();
        assert!(tracker.open_target_count() >= detections.len().min(6));
    }

    assert_eq!(check.lock().unwrap().violations, 0);
}

// =============================================================================
// Test 4: Capacity and Rejections
// =============================================================================

#[test]
fn test_integration_capacity_limit() {
    let config = TrackerConfig {
        max_targets: Some(2),
        ..Default::default()
    };
    let (mut tracker, log) = tracker_with_log(config);

    let detections = vec![
        boxed(0.0, 0.0).with_confidence(0.3),
        boxed(200.0, 0.0).with_confidence(0.9),
        boxed(400.0, 0.0).with_confidence(0.6),
    ];
    tracker.begin_track(frame(), &detections, 0).unwrap();

    assert_eq!(tracker.open_target_count(), 2);
    let log = log.lock().unwrap();
    let spawned: Vec<usize> = log.created.iter().map(|&(i, _)| i).collect();
    assert_eq!(spawned, vec![1, 2]);
    assert_eq!(log.rejected.len(), 1);
    assert_eq!(log.rejected[0].0, 0);
}

// =============================================================================
// Test 5: Handlers and Configuration
// =============================================================================

struct Consumer;

impl TrackingEventHandler for Consumer {
    fn on_target_closed(&mut self, _event: &TargetClosed<'_>) -> HandlerResult {
        HandlerResult::Handled
    }
}

#[test]
fn test_integration_stop_on_handled() {
    let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
    tracker.add_event_handler(Arc::new(Mutex::new(Consumer)));
    let log = EventLog::shared();
    tracker.add_event_handler(log.clone());
    tracker.set_stop_on_handled(true);

    tracker.begin_track(frame(), &[boxed(0.0, 0.0)], 0).unwrap();
    tracker.finish_track().unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.created.len(), 1);
    assert!(log.closed.is_empty());
}

#[test]
fn test_integration_diagonal_motion_model() {
    let config = TrackerConfig {
        motion_model: FilterFactoryEnum::Diagonal(DiagonalKalmanFilterFactory::default()),
        confirmation_frames: 2,
        ..Default::default()
    };
    let mut tracker = Tracker::new(config).unwrap();
    tracker.begin_track(frame(), &[boxed(50.0, 50.0)], 0).unwrap();
    for i in 1..10 {
        tracker.track(frame(), &[boxed(50.0 + 4.0 * i as f64, 50.0)], i).unwrap();
    }

    let target = tracker.target(TargetId::new(1)).unwrap();
    assert_eq!(target.state, TargetState::Confirmed);
    assert!(target.velocity[0] > 1.0);
}

#[test]
fn test_integration_preferred_image_size() {
    let config = TrackerConfig {
        preferred_image_size: Some(ImageSize::new(640, 480)),
        ..Default::default()
    };
    let mut tracker = Tracker::new(config).unwrap();
    // The reported frame size is ignored in favour of the configured one
    tracker.begin_track(ImageSize::new(1, 1), &[boxed(50.0, 50.0)], 0).unwrap();
    tracker.track(ImageSize::new(1, 1), &[boxed(52.0, 50.0)], 1).unwrap();

    let target = tracker.target(TargetId::new(1)).unwrap();
    assert!(target.bbox.x > 50.0 && target.bbox.x <= 52.0);
    assert_relative_eq!(target.bbox.width, 60.0, epsilon = 1e-6);
}

/// Detector output that carries its own types.
struct PersonBox {
    rect: [f64; 4],
    score: f32,
    embedding: Vec<f64>,
}

impl Detectable for PersonBox {
    fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.rect[0], self.rect[1], self.rect[2], self.rect[3])
    }

    fn confidence(&self) -> Option<f64> {
        Some(f64::from(self.score))
    }

    fn descriptor(&self) -> Option<&[f64]> {
        Some(self.embedding.as_slice())
    }
}

#[test]
fn test_integration_custom_detectable_with_appearance() {
    let config = TrackerConfig {
        appearance_weight: 0.5,
        max_appearance_distance: 0.3,
        min_iou: 0.1,
        ..Default::default()
    };
    let (mut tracker, log) = tracker_with_log(config);

    let a = |x: f64| PersonBox {
        rect: [x, 100.0, 60.0, 120.0],
        score: 0.9,
        embedding: vec![1.0, 0.0, 0.0],
    };
    let b = |x: f64| PersonBox {
        rect: [x, 100.0, 60.0, 120.0],
        score: 0.8,
        embedding: vec![0.0, 1.0, 0.0],
    };

    tracker.begin_track(frame(), &[a(100.0), b(140.0)], 0).unwrap();
    // Boxes overlap heavily; appearance keeps identities apart
    tracker.track(frame(), &[b(110.0), a(130.0)], 1).unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.created, vec![(0, TargetId::new(1)), (1, TargetId::new(2))]);
    let mut associated = log.associated.clone();
    associated.sort();
    assert_eq!(associated, vec![(0, TargetId::new(2)), (1, TargetId::new(1))]);
}
