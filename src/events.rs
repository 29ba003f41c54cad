//! Event notification for tracking outcomes.
//!
//! Handlers implement [`TrackingEventHandler`] and are registered on the
//! tracker as [`SharedHandler`]s. Events are delivered synchronously, in
//! registration order, while the frame is being processed; payloads borrow
//! tracker state and are only valid for the duration of the call.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::detection::Detectable;
use crate::target::{TargetId, TrackTarget};

/// Value returned by a handler for each event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HandlerResult {
    /// Continue delivering the event to later handlers.
    #[default]
    None,
    /// The event was consumed. Stops delivery when the dispatcher is set to
    /// stop on handled events.
    Handled,
}

/// Why a target was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// More consecutive misses than `max_misses`.
    MissLimitExceeded,
    /// Closed by `finish_track`.
    Finished,
}

/// Why a detection did not take part in association.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Zero or negative width or height.
    DegenerateBox,
    /// NaN or infinite coordinates or confidence.
    NonFinite,
    /// Confidence below `min_confidence`.
    LowConfidence,
    /// Unmatched, but the open-target limit is reached.
    CapacityExceeded,
}

/// A detection paired with a target, on creation or association.
pub struct TargetAssociation<'a> {
    pub frame_index: u64,
    /// Position of the detection in the frame's input slice.
    pub detection_index: usize,
    pub detection: &'a dyn Detectable,
    pub target: &'a TrackTarget,
}

/// A target that reached the Closed state.
pub struct TargetClosed<'a> {
    pub frame_index: u64,
    pub target: &'a TrackTarget,
    pub reason: CloseReason,
}

/// A detection that was skipped.
pub struct DetectionRejected<'a> {
    pub frame_index: u64,
    pub detection_index: usize,
    pub detection: &'a dyn Detectable,
    pub reason: RejectReason,
}

/// Receives tracking events. Every method has a no-op default.
pub trait TrackingEventHandler: Send {
    /// A new target was created from an unmatched detection.
    fn on_target_created(&mut self, _event: &TargetAssociation<'_>) -> HandlerResult {
        HandlerResult::None
    }

    /// An existing target was matched with a detection.
    fn on_target_associated(&mut self, _event: &TargetAssociation<'_>) -> HandlerResult {
        HandlerResult::None
    }

    /// A target was closed and removed from the open set.
    fn on_target_closed(&mut self, _event: &TargetClosed<'_>) -> HandlerResult {
        HandlerResult::None
    }

    /// A detection was rejected before or after association.
    fn on_detection_rejected(&mut self, _event: &DetectionRejected<'_>) -> HandlerResult {
        HandlerResult::None
    }
}

/// A handler shared between the caller and the tracker.
pub type SharedHandler = Arc<Mutex<dyn TrackingEventHandler>>;

/// Registration handle returned by [`EventDispatcher::add_handler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

enum PendingChange {
    Add(HandlerId, SharedHandler),
    Remove(HandlerId),
}

/// Ordered list of handlers with deferred registration.
///
/// `add_handler` and `remove_handler` take effect at the next
/// [`apply_pending`](Self::apply_pending), which the tracker calls at the
/// start of every frame, so the handler set never changes mid-frame.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<(HandlerId, SharedHandler)>,
    pending: Vec<PendingChange>,
    next_id: u64,
    stop_on_handled: bool,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handlers.iter().map(|(id, _)| *id).collect::<Vec<_>>())
            .field("pending", &self.pending.len())
            .field("stop_on_handled", &self.stop_on_handled)
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a handler for registration.
    pub fn add_handler(&mut self, handler: SharedHandler) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.pending.push(PendingChange::Add(id, handler));
        id
    }

    /// Queue a handler for removal.
    ///
    /// Returns `false` if `id` is neither registered nor queued.
    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        let known = self.handlers.iter().any(|(h, _)| *h == id)
            || self
                .pending
                .iter()
                .any(|change| matches!(change, PendingChange::Add(h, _) if *h == id));
        if known {
            self.pending.push(PendingChange::Remove(id));
        }
        known
    }

    /// When set, a handler returning [`HandlerResult::Handled`] hides the
    /// event from the handlers registered after it.
    pub fn set_stop_on_handled(&mut self, stop: bool) {
        self.stop_on_handled = stop;
    }

    pub fn stop_on_handled(&self) -> bool {
        self.stop_on_handled
    }

    /// Number of active (applied) handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Apply queued registrations and removals, in the order they were made.
    pub fn apply_pending(&mut self) {
        for change in self.pending.drain(..) {
            match change {
                PendingChange::Add(id, handler) => self.handlers.push((id, handler)),
                PendingChange::Remove(id) => self.handlers.retain(|(h, _)| *h != id),
            }
        }
    }

    pub fn target_created(&self, event: &TargetAssociation<'_>) {
        self.dispatch(|h| h.on_target_created(event));
    }

    pub fn target_associated(&self, event: &TargetAssociation<'_>) {
        self.dispatch(|h| h.on_target_associated(event));
    }

    pub fn target_closed(&self, event: &TargetClosed<'_>) {
        self.dispatch(|h| h.on_target_closed(event));
    }

    pub fn detection_rejected(&self, event: &DetectionRejected<'_>) {
        self.dispatch(|h| h.on_detection_rejected(event));
    }

    fn dispatch<F>(&self, mut deliver: F)
    where
        F: FnMut(&mut dyn TrackingEventHandler) -> HandlerResult,
    {
        for (_, handler) in &self.handlers {
            // A handler that panicked earlier still receives events
            let mut guard = handler.lock().unwrap_or_else(PoisonError::into_inner);
            if deliver(&mut *guard) == HandlerResult::Handled && self.stop_on_handled {
                break;
            }
        }
    }
}

/// Handler that records every event it sees.
///
/// Entries are `(detection_index, target)` for created and associated events,
/// `(target, reason)` for closed targets and `(detection_index, reason)` for
/// rejected detections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventLog {
    pub created: Vec<(usize, TargetId)>,
    pub associated: Vec<(usize, TargetId)>,
    pub closed: Vec<(TargetId, CloseReason)>,
    pub rejected: Vec<(usize, RejectReason)>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh log wrapped for registration.
    pub fn shared() -> Arc<Mutex<EventLog>> {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn clear(&mut self) {
        self.created.clear();
        self.associated.clear();
        self.closed.clear();
        self.rejected.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.associated.is_empty()
            && self.closed.is_empty()
            && self.rejected.is_empty()
    }
}

impl TrackingEventHandler for EventLog {
    fn on_target_created(&mut self, event: &TargetAssociation<'_>) -> HandlerResult {
        self.created.push((event.detection_index, event.target.id));
        HandlerResult::None
    }

    fn on_target_associated(&mut self, event: &TargetAssociation<'_>) -> HandlerResult {
        self.associated.push((event.detection_index, event.target.id));
        HandlerResult::None
    }

    fn on_target_closed(&mut self, event: &TargetClosed<'_>) -> HandlerResult {
        self.closed.push((event.target.id, event.reason));
        HandlerResult::None
    }

    fn on_detection_rejected(&mut self, event: &DetectionRejected<'_>) -> HandlerResult {
        self.rejected.push((event.detection_index, event.reason));
        HandlerResult::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::{BoundingBox, FrameGeometry};
    use crate::detection::Detection;
    use crate::filter::FilterFactoryEnum;

    struct Consuming {
        seen: usize,
    }

    impl TrackingEventHandler for Consuming {
        fn on_target_created(&mut self, _event: &TargetAssociation<'_>) -> HandlerResult {
            self.seen += 1;
            HandlerResult::Handled
        }
    }

    fn make_target(id: u64) -> TrackTarget {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let filter = FilterFactoryEnum::default().create(&FrameGeometry::identity().normalize(&bbox));
        TrackTarget::new(TargetId::new(id), bbox, None, None, 0, filter, 0)
    }

    fn created_event<'a>(detection: &'a Detection, target: &'a TrackTarget) -> TargetAssociation<'a> {
        TargetAssociation {
            frame_index: 0,
            detection_index: 0,
            detection,
            target,
        }
    }

    #[test]
    fn test_registration_is_deferred() {
        let mut dispatcher = EventDispatcher::new();
        let log = EventLog::shared();
        dispatcher.add_handler(log.clone());
        assert_eq!(dispatcher.handler_count(), 0);

        let detection = Detection::from_xywh([0.0, 0.0, 10.0, 10.0]);
        let target = make_target(1);
        dispatcher.target_created(&created_event(&detection, &target));
        assert!(log.lock().unwrap().is_empty());

        dispatcher.apply_pending();
        dispatcher.target_created(&created_event(&detection, &target));
        assert_eq!(log.lock().unwrap().created, vec![(0, TargetId::new(1))]);
    }

    #[test]
    fn test_remove_handler() {
        let mut dispatcher = EventDispatcher::new();
        let log = EventLog::shared();
        let id = dispatcher.add_handler(log.clone());
        dispatcher.apply_pending();
        assert_eq!(dispatcher.handler_count(), 1);

        assert!(dispatcher.remove_handler(id));
        // Still active until the next frame boundary
        assert_eq!(dispatcher.handler_count(), 1);
        dispatcher.apply_pending();
        assert_eq!(dispatcher.handler_count(), 0);

        assert!(!dispatcher.remove_handler(id));
    }

    #[test]
    fn test_add_then_remove_before_apply() {
        let mut dispatcher = EventDispatcher::new();
        let id = dispatcher.add_handler(EventLog::shared());
        assert!(dispatcher.remove_handler(id));
        dispatcher.apply_pending();
        assert_eq!(dispatcher.handler_count(), 0);
    }

    #[test]
    fn test_delivery_in_registration_order_and_stop_on_handled() {
        let mut dispatcher = EventDispatcher::new();
        let consuming = Arc::new(Mutex::new(Consuming { seen: 0 }));
        let log = EventLog::shared();
        dispatcher.add_handler(consuming.clone());
        dispatcher.add_handler(log.clone());
        dispatcher.apply_pending();

        let detection = Detection::from_xywh([0.0, 0.0, 10.0, 10.0]);
        let target = make_target(3);

        dispatcher.target_created(&created_event(&detection, &target));
        assert_eq!(consuming.lock().unwrap().seen, 1);
        assert_eq!(log.lock().unwrap().created.len(), 1);

        dispatcher.set_stop_on_handled(true);
        dispatcher.target_created(&created_event(&detection, &target));
        assert_eq!(consuming.lock().unwrap().seen, 2);
        assert_eq!(log.lock().unwrap().created.len(), 1);
    }

    #[test]
    fn test_event_log_records_all_kinds() {
        let mut log = EventLog::new();
        let detection = Detection::from_xywh([0.0, 0.0, 10.0, 10.0]);
        let target = make_target(5);

        log.on_target_associated(&created_event(&detection, &target));
        log.on_target_closed(&TargetClosed {
            frame_index: 4,
            target: &target,
            reason: CloseReason::Finished,
        });
        log.on_detection_rejected(&DetectionRejected {
            frame_index: 4,
            detection_index: 2,
            detection: &detection,
            reason: RejectReason::DegenerateBox,
        });

        assert_eq!(log.associated, vec![(0, TargetId::new(5))]);
        assert_eq!(log.closed, vec![(TargetId::new(5), CloseReason::Finished)]);
        assert_eq!(log.rejected, vec![(2, RejectReason::DegenerateBox)]);

        log.clear();
        assert!(log.is_empty());
    }
}
