//! Tracked targets and their identifiers.

use std::collections::VecDeque;
use std::fmt;

use nalgebra::Vector4;
use serde::{Deserialize, Serialize};

use crate::bbox::{BoundingBox, FrameGeometry};
use crate::filter::FilterEnum;

/// Identifier of a tracked target.
///
/// Issued in increasing order starting at 1 and never reused within one
/// tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(u64);

impl TargetId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues [`TargetId`]s for one tracker.
#[derive(Debug, Clone, Default)]
pub struct TargetIdFactory {
    issued: u64,
}

impl TargetIdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the next identifier.
    #[inline]
    pub fn next_id(&mut self) -> TargetId {
        self.issued += 1;
        TargetId(self.issued)
    }

    /// Number of identifiers issued so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

/// Lifecycle state of a target.
///
/// ```text
/// Tentative --K consecutive hits--> Confirmed
/// Tentative | Confirmed --miss--> Lost
/// Lost --hit--> Confirmed (if ever confirmed) | Tentative
/// Lost --miss_count > max_misses--> Closed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Tentative,
    Confirmed,
    Lost,
    Closed,
}

impl TargetState {
    /// Everything but `Closed` is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        !matches!(self, TargetState::Closed)
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetState::Tentative => "tentative",
            TargetState::Confirmed => "confirmed",
            TargetState::Lost => "lost",
            TargetState::Closed => "closed",
        };
        f.pad(name)
    }
}

/// A target maintained by the tracker.
pub struct TrackTarget {
    pub id: TargetId,

    pub state: TargetState,

    /// Current estimate in pixel coordinates (the prediction while unmatched).
    pub bbox: BoundingBox,

    /// Estimated `[vcx, vcy, vw, vh]` in pixels per frame.
    pub velocity: Vector4<f64>,

    /// Confidence of the last associated detection.
    pub confidence: Option<f64>,

    /// Consecutive frames without an associated detection.
    pub miss_count: u32,

    /// Total associated detections, including the one that created it.
    pub hits: u32,

    /// Associated detections since the last miss.
    pub consecutive_hits: u32,

    /// Frames since creation.
    pub age: u32,

    pub first_frame: u64,

    pub last_seen_frame: u64,

    /// Most recent appearance descriptors, oldest first.
    pub descriptors: VecDeque<Vec<f64>>,

    pub(crate) filter: FilterEnum,

    descriptor_budget: usize,

    ever_confirmed: bool,
}

impl fmt::Debug for TrackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackTarget")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("bbox", &self.bbox)
            .field("velocity", &self.velocity)
            .field("confidence", &self.confidence)
            .field("miss_count", &self.miss_count)
            .field("hits", &self.hits)
            .field("consecutive_hits", &self.consecutive_hits)
            .field("age", &self.age)
            .field("first_frame", &self.first_frame)
            .field("last_seen_frame", &self.last_seen_frame)
            .field("descriptors", &self.descriptors.len())
            .field("filter", &"<Filter>")
            .finish()
    }
}

impl TrackTarget {
    /// Create a Tentative target from its first detection.
    pub fn new(
        id: TargetId,
        bbox: BoundingBox,
        confidence: Option<f64>,
        descriptor: Option<Vec<f64>>,
        frame_index: u64,
        filter: FilterEnum,
        descriptor_budget: usize,
    ) -> Self {
        let mut target = Self {
            id,
            state: TargetState::Tentative,
            bbox,
            velocity: Vector4::zeros(),
            confidence,
            miss_count: 0,
            hits: 1,
            consecutive_hits: 1,
            age: 0,
            first_frame: frame_index,
            last_seen_frame: frame_index,
            descriptors: VecDeque::with_capacity(descriptor_budget.min(64)),
            filter,
            descriptor_budget,
            ever_confirmed: false,
        };
        if let Some(descriptor) = descriptor {
            target.push_descriptor(descriptor);
        }
        target
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Positional variance of the motion model in normalized coordinates.
    pub fn position_variance(&self) -> Vector4<f64> {
        self.filter.position_variance()
    }

    /// Advance the motion model by one frame.
    pub(crate) fn predict(&mut self, geometry: &FrameGeometry) {
        self.filter.predict();
        self.refresh_estimate(geometry);
        self.age += 1;
    }

    /// Correct the motion model with an associated detection.
    ///
    /// Returns the state before the hit.
    pub(crate) fn mark_hit(
        &mut self,
        bbox: &BoundingBox,
        confidence: Option<f64>,
        descriptor: Option<&[f64]>,
        frame_index: u64,
        geometry: &FrameGeometry,
        confirmation_frames: u32,
    ) -> TargetState {
        let previous = self.state;

        self.filter.update(&geometry.normalize(bbox));
        self.refresh_estimate(geometry);

        self.miss_count = 0;
        self.hits += 1;
        self.consecutive_hits += 1;
        self.last_seen_frame = frame_index;
        if confidence.is_some() {
            self.confidence = confidence;
        }
        if let Some(descriptor) = descriptor {
            self.push_descriptor(descriptor.to_vec());
        }

        if self.ever_confirmed || self.consecutive_hits >= confirmation_frames {
            self.ever_confirmed = true;
            self.state = TargetState::Confirmed;
        } else {
            self.state = TargetState::Tentative;
        }
        previous
    }

    /// Record a frame without an associated detection.
    ///
    /// Returns `true` when the target exceeded `max_misses` and is now Closed.
    pub(crate) fn mark_missed(&mut self, max_misses: u32) -> bool {
        self.miss_count += 1;
        self.consecutive_hits = 0;
        if self.miss_count > max_misses {
            self.state = TargetState::Closed;
            true
        } else {
            self.state = TargetState::Lost;
            false
        }
    }

    pub(crate) fn close(&mut self) {
        self.state = TargetState::Closed;
    }

    /// Owned copy of the caller-facing fields.
    pub fn snapshot(&self) -> TargetSnapshot {
        TargetSnapshot {
            id: self.id,
            state: self.state,
            bbox: self.bbox,
            velocity: [self.velocity[0], self.velocity[1], self.velocity[2], self.velocity[3]],
            confidence: self.confidence,
            miss_count: self.miss_count,
            hits: self.hits,
            age: self.age,
            first_frame: self.first_frame,
            last_seen_frame: self.last_seen_frame,
        }
    }

    fn refresh_estimate(&mut self, geometry: &FrameGeometry) {
        self.bbox = geometry.denormalize(&self.filter.get_state());
        self.velocity = geometry.denormalize_rate(&self.filter.get_velocity());
    }

    fn push_descriptor(&mut self, descriptor: Vec<f64>) {
        if self.descriptor_budget == 0 {
            return;
        }
        while self.descriptors.len() >= self.descriptor_budget {
            self.descriptors.pop_front();
        }
        self.descriptors.push_back(descriptor);
    }
}

/// Read-only view of a target returned by queries.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TargetSnapshot {
    pub id: TargetId,
    pub state: TargetState,
    pub bbox: BoundingBox,
    /// `[vcx, vcy, vw, vh]` in pixels per frame
    pub velocity: [f64; 4],
    pub confidence: Option<f64>,
    pub miss_count: u32,
    pub hits: u32,
    pub age: u32,
    pub first_frame: u64,
    pub last_seen_frame: u64,
}
