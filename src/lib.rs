//! # RedoxiTrack - Multi-Object Tracking Engine
//!
//! Maintains a set of persistent tracked targets across a stream of per-frame
//! object detections.
//!
//! ## Features
//!
//! - Kalman filter motion model over bounding boxes (full or diagonal covariance)
//! - IoU + appearance-descriptor affinity with hard gating
//! - Optimal (Hungarian) assignment between targets and detections
//! - Tentative / Confirmed / Lost / Closed target lifecycle
//! - Synchronous event dispatch to registered handlers
//!
//! ## Example
//!
//! ```rust,ignore
//! use redoxi_track::{BoundingBox, Detection, ImageSize, Tracker, TrackerConfig};
//!
//! let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
//! let frame = ImageSize::new(640, 480);
//!
//! let detections = vec![Detection::new(BoundingBox::new(10.0, 20.0, 50.0, 80.0))];
//! tracker.begin_track(frame, &detections, 0).unwrap();
//!
//! let detections = vec![Detection::new(BoundingBox::new(12.0, 21.0, 50.0, 80.0))];
//! tracker.track(frame, &detections, 1).unwrap();
//!
//! for (id, target) in tracker.get_all_open_targets() {
//!     println!("{id}: {:?} {:?}", target.state, target.bbox);
//! }
//!
//! tracker.finish_track().unwrap();
//! ```

pub mod bbox;
pub mod detection;
pub mod filter;
pub mod affinity;
pub mod matching;
pub mod target;
pub mod lifecycle;
pub mod events;
pub mod tracker;

// Re-exports for convenience
pub use bbox::{BoundingBox, FrameGeometry, ImageSize};
pub use detection::{Detectable, Detection};
pub use filter::{Filter, FilterEnum, FilterFactoryEnum};
pub use affinity::{AffinityScorer, AppearanceMetric, PROHIBITIVE_COST};
pub use matching::{solve_assignment, AssignmentResult};
pub use target::{TargetId, TargetSnapshot, TargetState, TrackTarget};
pub use events::{
    CloseReason, DetectionRejected, EventDispatcher, EventLog, HandlerId, HandlerResult,
    RejectReason, SharedHandler, TargetAssociation, TargetClosed, TrackingEventHandler,
};
pub use tracker::{Tracker, TrackerConfig, TrackerPhase};

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    use crate::tracker::TrackerPhase;

    /// Errors that can occur in the tracking engine
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Invalid detection: {0}")]
        InvalidDetection(String),

        #[error("Sequencing error: `{operation}` is not allowed while the tracker is {phase}")]
        Sequencing {
            operation: &'static str,
            phase: TrackerPhase,
        },

        #[error("Frame index must increase: previous {previous}, got {got}")]
        NonMonotonicFrame { previous: u64, got: u64 },

        #[error("Unknown appearance metric: {0}")]
        UnknownMetric(String),
    }

    /// Result type for tracking operations
    pub type Result<T> = std::result::Result<T, Error>;
}
