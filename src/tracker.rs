//! Main tracker implementation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::affinity::{AffinityScorer, AppearanceMetric};
use crate::bbox::{FrameGeometry, ImageSize};
use crate::detection::Detectable;
use crate::events::{CloseReason, DetectionRejected, EventDispatcher, HandlerId, RejectReason, SharedHandler};
use crate::filter::FilterFactoryEnum;
use crate::lifecycle::{LifecyclePolicy, TrackLifecycle};
use crate::matching::solve_assignment;
use crate::target::{TargetId, TargetSnapshot, TrackTarget};
use crate::{Error, Result};

/// Configuration for the tracker.
///
/// Deserializes from partial documents; missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Frame size the motion model normalizes by. When `None`, the size
    /// passed to `begin_track` is used.
    pub preferred_image_size: Option<ImageSize>,

    /// Pairs with a lower IoU are never associated.
    pub min_iou: f64,

    /// Weight of the appearance term in the association cost, in `[0, 1]`.
    pub appearance_weight: f64,

    /// Pairs with a larger appearance distance are never associated.
    pub max_appearance_distance: f64,

    pub appearance_metric: AppearanceMetric,

    /// Descriptors kept per target for appearance matching.
    pub descriptor_budget: usize,

    /// Consecutive hits before a Tentative target is Confirmed.
    pub confirmation_frames: u32,

    /// A target is closed after more than this many consecutive misses.
    pub max_misses: u32,

    /// Maximum number of open targets.
    pub max_targets: Option<usize>,

    /// Matches costing more than this are discarded.
    pub max_association_cost: f64,

    /// Detections with a lower confidence are rejected.
    pub min_confidence: f64,

    /// Also gate pairs by squared Mahalanobis distance under the motion model.
    pub mahalanobis_gating: bool,

    /// Motion model used for new targets.
    pub motion_model: FilterFactoryEnum,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            preferred_image_size: None,
            min_iou: 0.3,
            appearance_weight: 0.0,
            max_appearance_distance: 0.4,
            appearance_metric: AppearanceMetric::Cosine,
            descriptor_budget: 16,
            confirmation_frames: 3,
            max_misses: 30,
            max_targets: None,
            max_association_cost: 1.0,
            min_confidence: 0.0,
            mahalanobis_gating: false,
            motion_model: FilterFactoryEnum::default(),
        }
    }
}

impl TrackerConfig {
    /// Check every parameter, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.confirmation_frames == 0 {
            return Err(Error::InvalidConfig("confirmation_frames must be at least 1".to_string()));
        }

        if !(0.0..=1.0).contains(&self.min_iou) {
            return Err(Error::InvalidConfig(format!(
                "min_iou must be within [0, 1], got {}",
                self.min_iou
            )));
        }

        if !(0.0..=1.0).contains(&self.appearance_weight) {
            return Err(Error::InvalidConfig(format!(
                "appearance_weight must be within [0, 1], got {}",
                self.appearance_weight
            )));
        }

        if self.max_appearance_distance.is_nan() || self.max_appearance_distance < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "max_appearance_distance must be non-negative, got {}",
                self.max_appearance_distance
            )));
        }

        if self.max_association_cost.is_nan() || self.max_association_cost <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "max_association_cost must be positive, got {}",
                self.max_association_cost
            )));
        }

        if !self.min_confidence.is_finite() {
            return Err(Error::InvalidConfig("min_confidence must be finite".to_string()));
        }

        if self.max_targets == Some(0) {
            return Err(Error::InvalidConfig("max_targets must be at least 1 when set".to_string()));
        }

        if let Some(size) = self.preferred_image_size {
            if size.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "preferred_image_size must be non-zero, got {}x{}",
                    size.width, size.height
                )));
            }
        }

        self.motion_model.validate()
    }

    fn scorer(&self) -> AffinityScorer {
        AffinityScorer {
            min_iou: self.min_iou,
            appearance_weight: self.appearance_weight,
            max_appearance_distance: self.max_appearance_distance,
            metric: self.appearance_metric,
            mahalanobis_gating: self.mahalanobis_gating,
        }
    }

    fn policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            confirmation_frames: self.confirmation_frames,
            max_misses: self.max_misses,
            max_targets: self.max_targets,
            descriptor_budget: self.descriptor_budget,
            motion_model: self.motion_model.clone(),
        }
    }
}

/// Where the tracker is in its `begin_track` / `track` / `finish_track`
/// sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackerPhase {
    /// Created, `begin_track` not called yet.
    Idle,
    /// Accepting frames.
    Tracking,
    /// `finish_track` was called.
    Finished,
}

impl fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackerPhase::Idle => "idle",
            TrackerPhase::Tracking => "tracking",
            TrackerPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Multi-object tracker.
///
/// Maintains a set of targets across frames: each call predicts every open
/// target, associates detections by minimum total cost, updates matched
/// targets, ages unmatched ones and spawns targets for unmatched detections.
/// Registered handlers are notified synchronously during the call.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    phase: TrackerPhase,
    lifecycle: TrackLifecycle,
    scorer: AffinityScorer,
    dispatcher: EventDispatcher,
    geometry: FrameGeometry,
    image_size: Option<ImageSize>,
    last_frame_index: Option<u64>,
}

#[derive(Debug, Default)]
struct FrameSummary {
    rejected: usize,
    matched: usize,
    missed: usize,
    closed: usize,
    created: usize,
}

impl Tracker {
    /// Create a new tracker with the given configuration.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            phase: TrackerPhase::Idle,
            lifecycle: TrackLifecycle::new(config.policy()),
            scorer: config.scorer(),
            dispatcher: EventDispatcher::new(),
            geometry: FrameGeometry::identity(),
            image_size: None,
            last_frame_index: None,
            config,
        })
    }

    /// Replace the configuration before tracking starts.
    pub fn init(&mut self, config: TrackerConfig) -> Result<()> {
        self.require_phase("init", TrackerPhase::Idle)?;
        config.validate()?;

        self.lifecycle.set_policy(config.policy());
        self.scorer = config.scorer();
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    /// Register a handler. It starts receiving events with the next frame.
    pub fn add_event_handler(&mut self, handler: SharedHandler) -> HandlerId {
        self.dispatcher.add_handler(handler)
    }

    /// Unregister a handler. It stops receiving events with the next frame.
    pub fn remove_event_handler(&mut self, id: HandlerId) -> bool {
        self.dispatcher.remove_handler(id)
    }

    /// Enable or disable stopping event delivery at the first handler that
    /// returns `Handled`.
    pub fn set_stop_on_handled(&mut self, stop: bool) {
        self.dispatcher.set_stop_on_handled(stop);
    }

    /// Start tracking with the first frame's detections.
    ///
    /// Every valid detection spawns a Tentative target.
    pub fn begin_track<D: Detectable>(&mut self, frame: ImageSize, detections: &[D], frame_index: u64) -> Result<()> {
        self.require_phase("begin_track", TrackerPhase::Idle)?;

        let size = self.config.preferred_image_size.unwrap_or(frame);
        if size.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "frame size must be non-zero, got {}x{}",
                size.width, size.height
            )));
        }

        self.geometry = FrameGeometry::new(size);
        self.image_size = Some(size);
        self.phase = TrackerPhase::Tracking;
        info!(
            width = size.width,
            height = size.height,
            frame_index,
            detections = detections.len(),
            "tracking started"
        );

        self.process_frame(detections, frame_index);
        Ok(())
    }

    /// Process one subsequent frame.
    ///
    /// `frame_index` must be strictly greater than the previous frame's.
    pub fn track<D: Detectable>(&mut self, frame: ImageSize, detections: &[D], frame_index: u64) -> Result<()> {
        self.require_phase("track", TrackerPhase::Tracking)?;

        if let Some(previous) = self.last_frame_index {
            if frame_index <= previous {
                return Err(Error::NonMonotonicFrame {
                    previous,
                    got: frame_index,
                });
            }
        }

        if self.config.preferred_image_size.is_none() && self.image_size != Some(frame) {
            debug!(
                width = frame.width,
                height = frame.height,
                "frame size differs from the first frame, keeping the original normalization"
            );
        }

        self.process_frame(detections, frame_index);
        Ok(())
    }

    /// Close every open target and end the session.
    ///
    /// Returns the number of targets closed.
    pub fn finish_track(&mut self) -> Result<usize> {
        if self.phase == TrackerPhase::Finished {
            return Err(Error::Sequencing {
                operation: "finish_track",
                phase: self.phase,
            });
        }

        self.dispatcher.apply_pending();
        let frame_index = self.last_frame_index.unwrap_or(0);
        let closed = self
            .lifecycle
            .close_all(frame_index, CloseReason::Finished, &self.dispatcher);
        self.phase = TrackerPhase::Finished;

        info!(
            closed,
            total_targets = self.lifecycle.total_count(),
            "tracking finished"
        );
        Ok(closed)
    }

    /// Snapshot of every open target, keyed by id.
    pub fn get_all_open_targets(&self) -> BTreeMap<TargetId, TargetSnapshot> {
        self.lifecycle.snapshots()
    }

    /// An open target by id.
    pub fn target(&self, id: TargetId) -> Option<&TrackTarget> {
        self.lifecycle.get(id)
    }

    /// Open targets in ascending id order.
    pub fn targets(&self) -> impl Iterator<Item = &TrackTarget> {
        self.lifecycle.iter()
    }

    pub fn open_target_count(&self) -> usize {
        self.lifecycle.len()
    }

    /// Number of identifiers issued since the tracker was created.
    pub fn total_target_count(&self) -> u64 {
        self.lifecycle.total_count()
    }

    pub fn closed_target_count(&self) -> u64 {
        self.lifecycle.closed_count()
    }

    pub fn last_frame_index(&self) -> Option<u64> {
        self.last_frame_index
    }

    fn require_phase(&self, operation: &'static str, expected: TrackerPhase) -> Result<()> {
        if self.phase != expected {
            return Err(Error::Sequencing {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn process_frame<D: Detectable>(&mut self, detections: &[D], frame_index: u64) {
        self.dispatcher.apply_pending();
        let mut summary = FrameSummary::default();

        // Screen detections
        let mut valid: Vec<usize> = Vec::with_capacity(detections.len());
        for (index, detection) in detections.iter().enumerate() {
            match self.screen(detection) {
                None => valid.push(index),
                Some(reason) => {
                    summary.rejected += 1;
                    warn!(
                        frame_index,
                        detection_index = index,
                        reason = ?reason,
                        bbox = ?detection.bbox(),
                        "detection rejected"
                    );
                    self.dispatcher.detection_rejected(&DetectionRejected {
                        frame_index,
                        detection_index: index,
                        detection,
                        reason,
                    });
                }
            }
        }

        // Predict
        self.lifecycle.predict_all(&self.geometry);

        // Score and assign
        let target_ids = self.lifecycle.ids();
        let cost = {
            let targets: Vec<&TrackTarget> = self.lifecycle.iter().collect();
            let candidates: Vec<&D> = valid.iter().map(|&i| &detections[i]).collect();
            self.scorer.cost_matrix(&targets, &candidates, &self.geometry)
        };
        let assignment = solve_assignment(&cost, self.config.max_association_cost);

        // Update matched targets
        for &(row, col) in &assignment.matches {
            let index = valid[col];
            self.lifecycle.associate(
                target_ids[row],
                index,
                &detections[index],
                frame_index,
                &self.geometry,
                &self.dispatcher,
            );
        }
        summary.matched = assignment.matches.len();

        // Age unmatched targets
        for &row in &assignment.unmatched_rows {
            summary.missed += 1;
            if self.lifecycle.mark_missed(target_ids[row], frame_index, &self.dispatcher) {
                summary.closed += 1;
            }
        }

        // Spawn from unmatched detections
        let unmatched: Vec<usize> = assignment.unmatched_cols.iter().map(|&col| valid[col]).collect();
        summary.created = self
            .lifecycle
            .spawn_all(unmatched, detections, frame_index, &self.geometry, &self.dispatcher);

        self.last_frame_index = Some(frame_index);
        debug!(
            frame_index,
            detections = detections.len(),
            rejected = summary.rejected,
            matched = summary.matched,
            missed = summary.missed,
            closed = summary.closed,
            created = summary.created,
            open = self.lifecycle.len(),
            "frame processed"
        );
    }

    fn screen<D: Detectable>(&self, detection: &D) -> Option<RejectReason> {
        let bbox = detection.bbox();
        let confidence = detection.confidence();

        if !bbox.is_finite() || confidence.is_some_and(|c| !c.is_finite()) {
            return Some(RejectReason::NonFinite);
        }
        if bbox.is_degenerate() {
            return Some(RejectReason::DegenerateBox);
        }
        if confidence.is_some_and(|c| c < self.config.min_confidence) {
            return Some(RejectReason::LowConfidence);
        }
        None
    }
}
