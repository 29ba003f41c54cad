//! Track lifecycle management.
//!
//! Owns every open target, keyed by id, and applies the per-frame state
//! transitions (association, misses, creation, retirement). Each transition
//! fires its event on the dispatcher it is given.

use std::collections::BTreeMap;

use tracing::trace;

use crate::bbox::FrameGeometry;
use crate::detection::Detectable;
use crate::events::{
    CloseReason, DetectionRejected, EventDispatcher, RejectReason, TargetAssociation, TargetClosed,
};
use crate::filter::FilterFactoryEnum;
use crate::target::{TargetId, TargetIdFactory, TargetSnapshot, TrackTarget};

/// Parameters governing target transitions.
#[derive(Clone, Debug)]
pub struct LifecyclePolicy {
    /// Consecutive hits needed to confirm a Tentative target.
    pub confirmation_frames: u32,
    /// A target is closed once `miss_count > max_misses`.
    pub max_misses: u32,
    /// Maximum number of open targets (`None` = unlimited).
    pub max_targets: Option<usize>,
    pub descriptor_budget: usize,
    pub motion_model: FilterFactoryEnum,
}

/// Arena of open targets.
#[derive(Debug)]
pub struct TrackLifecycle {
    targets: BTreeMap<TargetId, TrackTarget>,
    ids: TargetIdFactory,
    policy: LifecyclePolicy,
    closed_count: u64,
}

impl TrackLifecycle {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self {
            targets: BTreeMap::new(),
            ids: TargetIdFactory::new(),
            policy,
            closed_count: 0,
        }
    }

    /// Replace the policy. Existing targets keep their state.
    pub fn set_policy(&mut self, policy: LifecyclePolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Number of open targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Identifiers issued so far.
    pub fn total_count(&self) -> u64 {
        self.ids.issued()
    }

    pub fn closed_count(&self) -> u64 {
        self.closed_count
    }

    pub fn get(&self, id: TargetId) -> Option<&TrackTarget> {
        self.targets.get(&id)
    }

    /// Open targets in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackTarget> {
        self.targets.values()
    }

    pub fn ids(&self) -> Vec<TargetId> {
        self.targets.keys().copied().collect()
    }

    pub fn snapshots(&self) -> BTreeMap<TargetId, TargetSnapshot> {
        self.targets.iter().map(|(id, t)| (*id, t.snapshot())).collect()
    }

    /// Advance every open target's motion model by one frame.
    pub fn predict_all(&mut self, geometry: &FrameGeometry) {
        for target in self.targets.values_mut() {
            target.predict(geometry);
        }
    }

    /// Update a target with its matched detection.
    pub fn associate(
        &mut self,
        id: TargetId,
        detection_index: usize,
        detection: &dyn Detectable,
        frame_index: u64,
        geometry: &FrameGeometry,
        dispatcher: &EventDispatcher,
    ) {
        let Some(target) = self.targets.get_mut(&id) else {
            return;
        };

        let previous = target.mark_hit(
            &detection.bbox(),
            detection.confidence(),
            detection.descriptor(),
            frame_index,
            geometry,
            self.policy.confirmation_frames,
        );
        if previous != target.state {
            trace!(target_id = %id, from = %previous, to = %target.state, "target transition");
        }

        dispatcher.target_associated(&TargetAssociation {
            frame_index,
            detection_index,
            detection,
            target,
        });
    }

    /// Record a miss. Returns `true` if the target was closed and removed.
    pub fn mark_missed(&mut self, id: TargetId, frame_index: u64, dispatcher: &EventDispatcher) -> bool {
        let Some(target) = self.targets.get_mut(&id) else {
            return false;
        };

        let previous = target.state;
        if !target.mark_missed(self.policy.max_misses) {
            if previous != target.state {
                trace!(target_id = %id, from = %previous, to = %target.state, "target transition");
            }
            return false;
        }

        if let Some(target) = self.targets.remove(&id) {
            trace!(target_id = %id, misses = target.miss_count, "target closed");
            self.closed_count += 1;
            dispatcher.target_closed(&TargetClosed {
                frame_index,
                target: &target,
                reason: CloseReason::MissLimitExceeded,
            });
        }
        true
    }

    pub fn has_capacity(&self) -> bool {
        self.policy.max_targets.map_or(true, |max| self.targets.len() < max)
    }

    /// Create a target from an unmatched detection, if capacity allows.
    pub fn spawn(
        &mut self,
        detection_index: usize,
        detection: &dyn Detectable,
        frame_index: u64,
        geometry: &FrameGeometry,
        dispatcher: &EventDispatcher,
    ) -> Option<TargetId> {
        if !self.has_capacity() {
            return None;
        }

        let bbox = detection.bbox();
        let id = self.ids.next_id();
        let filter = self.policy.motion_model.create(&geometry.normalize(&bbox));
        let target = TrackTarget::new(
            id,
            bbox,
            detection.confidence(),
            detection.descriptor().map(<[f64]>::to_vec),
            frame_index,
            filter,
            self.policy.descriptor_budget,
        );
        trace!(target_id = %id, detection_index, "target created");

        let target = self.targets.entry(id).or_insert(target);
        dispatcher.target_created(&TargetAssociation {
            frame_index,
            detection_index,
            detection,
            target,
        });
        Some(id)
    }

    /// Spawn targets for the given unmatched detections.
    ///
    /// With a target limit, candidates are taken by descending confidence
    /// (missing confidence last, ties in input order) and the rest are
    /// rejected with [`RejectReason::CapacityExceeded`]. Returns the number
    /// of targets created.
    pub fn spawn_all<D: Detectable>(
        &mut self,
        mut candidates: Vec<usize>,
        detections: &[D],
        frame_index: u64,
        geometry: &FrameGeometry,
        dispatcher: &EventDispatcher,
    ) -> usize {
        if self.policy.max_targets.is_some() {
            let rank = |i: usize| detections[i].confidence().unwrap_or(f64::NEG_INFINITY);
            candidates.sort_by(|&a, &b| rank(b).total_cmp(&rank(a)));
        }

        let mut created = 0;
        for index in candidates {
            let detection = &detections[index];
            if self.spawn(index, detection, frame_index, geometry, dispatcher).is_some() {
                created += 1;
            } else {
                trace!(detection_index = index, "no capacity for new target");
                dispatcher.detection_rejected(&DetectionRejected {
                    frame_index,
                    detection_index: index,
                    detection,
                    reason: RejectReason::CapacityExceeded,
                });
            }
        }
        created
    }

    /// Close every open target. Returns the number closed.
    pub fn close_all(&mut self, frame_index: u64, reason: CloseReason, dispatcher: &EventDispatcher) -> usize {
        let targets = std::mem::take(&mut self.targets);
        let count = targets.len();
        for (_, mut target) in targets {
            target.close();
            self.closed_count += 1;
            dispatcher.target_closed(&TargetClosed {
                frame_index,
                target: &target,
                reason,
            });
        }
        count
    }
}
