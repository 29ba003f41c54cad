//! Track synthetic pedestrians walking across a frame.
//!
//! Usage:
//!     cargo run --example track_synthetic [config.json]
//!
//! Set `RUST_LOG=redoxi_track=debug` to see the per-frame summaries.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::sync::{Arc, Mutex};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use redoxi_track::{
    BoundingBox, Detection, HandlerResult, ImageSize, TargetAssociation, TargetClosed, TargetId,
    Tracker, TrackerConfig, TrackingEventHandler,
};

const NUM_FRAMES: u64 = 300;

/// Collects the events of one frame and logs them as they arrive.
#[derive(Default)]
struct FrameEvents {
    created: BTreeMap<u64, TargetId>,
    associated: BTreeMap<u64, TargetId>,
    closed: Vec<TargetId>,
}

impl FrameEvents {
    fn clear(&mut self) {
        self.created.clear();
        self.associated.clear();
        self.closed.clear();
    }
}

impl TrackingEventHandler for FrameEvents {
    fn on_target_associated(&mut self, event: &TargetAssociation<'_>) -> HandlerResult {
        let det = event.detection.detection_id().unwrap_or(event.detection_index as u64);
        self.associated.insert(det, event.target.id);
        info!("Target association: det={}, target={}", det, event.target.id);
        HandlerResult::None
    }

    fn on_target_created(&mut self, event: &TargetAssociation<'_>) -> HandlerResult {
        let det = event.detection.detection_id().unwrap_or(event.detection_index as u64);
        self.created.insert(det, event.target.id);
        info!("Target created: det={}, target={}", det, event.target.id);
        HandlerResult::None
    }

    fn on_target_closed(&mut self, event: &TargetClosed<'_>) -> HandlerResult {
        self.closed.push(event.target.id);
        info!("Target closed: target={} ({:?})", event.target.id, event.reason);
        HandlerResult::None
    }
}

/// A pedestrian moving at constant velocity, hidden during `occluded`.
struct Walker {
    id: u64,
    start: (f64, f64),
    velocity: (f64, f64),
    size: (f64, f64),
    appears: u64,
    occluded: std::ops::Range<u64>,
}

impl Walker {
    fn detect(&self, frame: u64, noise: &mut Noise) -> Option<Detection> {
        if frame < self.appears || self.occluded.contains(&frame) {
            return None;
        }
        let t = (frame - self.appears) as f64;
        let x = self.start.0 + self.velocity.0 * t + noise.next(1.5);
        let y = self.start.1 + self.velocity.1 * t + noise.next(1.5);
        if !(0.0..1920.0).contains(&x) || !(0.0..1080.0).contains(&y) {
            return None;
        }
        Some(
            Detection::new(BoundingBox::new(x, y, self.size.0, self.size.1))
                .with_confidence(0.8 + noise.next(0.1))
                .with_id(self.id)
                .with_frame_index(frame),
        )
    }
}

/// Small xorshift generator for repeatable jitter.
struct Noise(u64);

impl Noise {
    fn next(&mut self, amplitude: f64) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        ((self.0 % 2001) as f64 / 1000.0 - 1.0) * amplitude
    }
}

fn walkers() -> Vec<Walker> {
    vec![
        Walker { id: 0, start: (50.0, 400.0), velocity: (4.0, 0.2), size: (70.0, 180.0), appears: 0, occluded: 80..90 },
        Walker { id: 1, start: (1700.0, 500.0), velocity: (-3.5, -0.3), size: (65.0, 170.0), appears: 0, occluded: 0..0 },
        Walker { id: 2, start: (900.0, 100.0), velocity: (0.5, 2.5), size: (80.0, 200.0), appears: 40, occluded: 150..200 },
        Walker { id: 3, start: (300.0, 800.0), velocity: (2.0, -1.0), size: (60.0, 150.0), appears: 120, occluded: 0..0 },
    ]
}

fn load_config() -> Result<TrackerConfig, Box<dyn std::error::Error>> {
    match env::args().nth(1) {
        Some(path) => {
            info!("Loading tracker config: {}", path);
            let content = fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&content)?)
        }
        None => Ok(TrackerConfig {
            preferred_image_size: Some(ImageSize::new(1920, 1080)),
            ..Default::default()
        }),
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let mut tracker = Tracker::new(config)?;

    let events = Arc::new(Mutex::new(FrameEvents::default()));
    tracker.add_event_handler(events.clone());

    let frame = ImageSize::new(1920, 1080);
    let walkers = walkers();
    let mut noise = Noise(0x9E37_79B9_7F4A_7C15);

    for ith_frame in 0..NUM_FRAMES {
        let detections: Vec<Detection> = walkers
            .iter()
            .filter_map(|w| w.detect(ith_frame, &mut noise))
            .collect();
        info!("Processing frame {}: {} detections", ith_frame, detections.len());

        events.lock().unwrap_or_else(|e| e.into_inner()).clear();
        if ith_frame == 0 {
            tracker.begin_track(frame, &detections, ith_frame)?;
        } else {
            tracker.track(frame, &detections, ith_frame)?;
        }

        for (id, target) in tracker.get_all_open_targets() {
            info!(
                "  {} {:>9} box=({:.0}, {:.0}, {:.0}x{:.0}) v=({:+.1}, {:+.1}) misses={}",
                id,
                target.state,
                target.bbox.x,
                target.bbox.y,
                target.bbox.width,
                target.bbox.height,
                target.velocity[0],
                target.velocity[1],
                target.miss_count
            );
        }
    }

    let closed = tracker.finish_track()?;
    info!(
        "Done: {} targets created, {} closed at finish",
        tracker.total_target_count(),
        closed
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        error!("track_synthetic failed: {}", e);
        std::process::exit(1);
    }
}
