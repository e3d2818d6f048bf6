//! Shared coordination state for one orchestration session.
//!
//! [`SharedContext`] holds the mission queue, context-level resource
//! requests, the scouting cache, the active-mission registry, the economic
//! state map, and a synchronous in-process event bus. It is owned by the
//! orchestrator for the lifetime of one run and lent to collaborators for
//! the duration of a tick.
//!
//! # Event delivery
//!
//! [`SharedContext::notify`] calls every registered [`EventListener`] in
//! registration order before returning. A listener that returns an error or
//! panics is logged and counted; delivery continues with the next listener
//! and the failure never reaches the publisher.
//!
//! Events the orchestrator itself must act on (crises, opportunities,
//! departures) are also copied into a deferred inbox, drained once the
//! tick's main sequence has finished.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use colonysim_types::{
    ActionKind, ContextRequest, MissionId, MissionRecord, PriorityTier, RequestError, RequestId,
    RequestStatus, ResourceKind, ScoutingResult, SettlementId, SystemEvent,
};

use crate::sequence::IdSequence;

/// Error returned by a listener that could not handle an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// The listener refused or failed to process the event.
    #[error("listener rejected event: {reason}")]
    Rejected {
        /// Explanation from the listener.
        reason: String,
    },
}

/// A subscriber on the shared context's event bus.
pub trait EventListener: Send {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Handle one event. Errors are logged by the bus, never propagated.
    fn handle_event(&mut self, event: &SystemEvent) -> Result<(), ListenerError>;
}

/// Handle returned by [`SharedContext::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Outcome of one [`SharedContext::notify`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Listeners that handled the event.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
}

/// Input for [`SharedContext::queue_mission`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionDraft {
    /// Settlement that chose the mission.
    pub settlement_id: Option<SettlementId>,
    /// Kind of mission.
    pub kind: ActionKind,
    /// Human-readable description.
    pub description: String,
    /// Estimated duration in simulated days.
    pub estimated_duration_days: u32,
    /// Resources the mission consumes.
    pub resource_requirements: BTreeMap<ResourceKind, u64>,
}

/// Process-wide coordination state for one run.
pub struct SharedContext {
    now: DateTime<Utc>,
    ids: IdSequence,
    mission_queue: VecDeque<MissionRecord>,
    resource_requests: BTreeMap<RequestId, ContextRequest>,
    scouting_results: BTreeMap<String, ScoutingResult>,
    active_missions: BTreeMap<MissionId, MissionRecord>,
    economic_state: BTreeMap<String, serde_json::Value>,
    listeners: Vec<(ListenerId, Box<dyn EventListener>)>,
    next_listener: u64,
    inbox: Vec<SystemEvent>,
    listener_failures: u64,
}

impl core::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedContext")
            .field("now", &self.now)
            .field("queued_missions", &self.mission_queue.len())
            .field("resource_requests", &self.resource_requests.len())
            .field("active_missions", &self.active_missions.len())
            .field("listeners", &self.listeners.len())
            .field("inbox", &self.inbox.len())
            .finish_non_exhaustive()
    }
}

impl SharedContext {
    /// Create an empty context starting at simulated time `now`.
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            ids: IdSequence::new(),
            mission_queue: VecDeque::new(),
            resource_requests: BTreeMap::new(),
            scouting_results: BTreeMap::new(),
            active_missions: BTreeMap::new(),
            economic_state: BTreeMap::new(),
            listeners: Vec::new(),
            next_listener: 0,
            inbox: Vec::new(),
            listener_failures: 0,
        }
    }

    /// Simulated time used to stamp new records.
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Move the context's clock. Called by the orchestrator once per tick.
    pub const fn set_time(&mut self, now: DateTime<Utc>) {
        self.now = now;
    }

    /// The run's identifier sequence.
    pub const fn ids_mut(&mut self) -> &mut IdSequence {
        &mut self.ids
    }

    // -----------------------------------------------------------------------
    // Event bus
    // -----------------------------------------------------------------------

    /// Subscribe a listener. Listeners are called in registration order.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) -> ListenerId {
        self.next_listener = self.next_listener.saturating_add(1);
        let id = ListenerId(self.next_listener);
        debug!(listener = listener.name(), "listener added");
        self.listeners.push((id, listener));
        id
    }

    /// Unsubscribe a listener. Returns `false` if `id` is unknown.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Total listener failures caught since the context was created.
    pub const fn listener_failures(&self) -> u64 {
        self.listener_failures
    }

    /// Deliver `event` to every listener, synchronously.
    pub fn notify(&mut self, event: SystemEvent) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for (_, listener) in &mut self.listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.handle_event(&event)));
            match outcome {
                Ok(Ok(())) => report.delivered = report.delivered.saturating_add(1),
                Ok(Err(err)) => {
                    warn!(
                        listener = listener.name(),
                        event = ?event.kind(),
                        error = %err,
                        "listener failed to handle event"
                    );
                    report.failed = report.failed.saturating_add(1);
                }
                Err(_) => {
                    warn!(
                        listener = listener.name(),
                        event = ?event.kind(),
                        "listener panicked while handling event"
                    );
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        self.listener_failures = self
            .listener_failures
            .saturating_add(u64::try_from(report.failed).unwrap_or(u64::MAX));

        if event.is_orchestrator_relevant() {
            self.inbox.push(event);
        }
        report
    }

    /// Take every deferred event, oldest first.
    pub fn drain_inbox(&mut self) -> Vec<SystemEvent> {
        core::mem::take(&mut self.inbox)
    }

    /// Number of deferred events waiting for the orchestrator.
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    // -----------------------------------------------------------------------
    // Mission queue
    // -----------------------------------------------------------------------

    /// Append a mission to the queue and notify `MissionQueued`.
    pub fn queue_mission(&mut self, draft: MissionDraft) -> MissionId {
        let mission = MissionRecord {
            id: self.ids.next_mission(),
            settlement_id: draft.settlement_id,
            kind: draft.kind,
            description: draft.description,
            estimated_duration_days: draft.estimated_duration_days,
            resource_requirements: draft.resource_requirements,
            queued_at: self.now,
        };
        let id = mission.id;
        self.mission_queue.push_back(mission.clone());
        self.notify(SystemEvent::MissionQueued { mission });
        id
    }

    /// Take the oldest queued mission and notify `MissionDequeued`.
    pub fn dequeue_mission(&mut self) -> Option<MissionRecord> {
        let mission = self.mission_queue.pop_front()?;
        self.notify(SystemEvent::MissionDequeued {
            mission: mission.clone(),
        });
        Some(mission)
    }

    /// Queued missions, oldest first.
    pub fn queued_missions(&self) -> impl Iterator<Item = &MissionRecord> {
        self.mission_queue.iter()
    }

    /// A queued or active mission of `kind` already chosen by `settlement`.
    pub fn open_mission(&self, settlement: SettlementId, kind: ActionKind) -> Option<MissionId> {
        self.mission_queue
            .iter()
            .chain(self.active_missions.values())
            .find(|m| m.settlement_id == Some(settlement) && m.kind == kind)
            .map(|m| m.id)
    }

    // -----------------------------------------------------------------------
    // Active missions
    // -----------------------------------------------------------------------

    /// Mark a mission active and notify `MissionStarted`.
    pub fn register_active_mission(&mut self, mission: MissionRecord) {
        let mission_id = mission.id;
        self.active_missions.insert(mission_id, mission);
        self.notify(SystemEvent::MissionStarted { mission_id });
    }

    /// Remove an active mission and notify `MissionCompleted`. Returns `None`
    /// (and publishes nothing) if the mission was not active.
    pub fn unregister_active_mission(&mut self, mission_id: MissionId) -> Option<MissionRecord> {
        let mission = self.active_missions.remove(&mission_id)?;
        self.notify(SystemEvent::MissionCompleted { mission_id });
        Some(mission)
    }

    /// Currently active missions.
    pub fn active_missions(&self) -> impl Iterator<Item = &MissionRecord> {
        self.active_missions.values()
    }

    // -----------------------------------------------------------------------
    // Resource requests
    // -----------------------------------------------------------------------

    /// File a pending resource request and notify `ResourceRequested`.
    pub fn request_resource(
        &mut self,
        requester: Option<SettlementId>,
        resource: ResourceKind,
        quantity: u64,
        priority: PriorityTier,
    ) -> Result<RequestId, RequestError> {
        if quantity == 0 {
            return Err(RequestError::NonPositiveQuantity { quantity: 0 });
        }
        let request = ContextRequest {
            id: self.ids.next_request(),
            requester,
            resource,
            quantity,
            priority,
            status: RequestStatus::Pending,
            requested_at: self.now,
            fulfilled_at: None,
            fulfilled_by: None,
        };
        let id = request.id;
        self.resource_requests.insert(id, request.clone());
        self.notify(SystemEvent::ResourceRequested { request });
        Ok(id)
    }

    /// Mark a pending request fulfilled by `source` and notify
    /// `ResourceFulfilled`. Returns `false` for unknown or already
    /// fulfilled requests.
    pub fn fulfill_resource_request(&mut self, id: RequestId, source: SettlementId) -> bool {
        let now = self.now;
        let Some(request) = self.resource_requests.get_mut(&id) else {
            return false;
        };
        if request.status == RequestStatus::Fulfilled {
            return false;
        }
        request.status = RequestStatus::Fulfilled;
        request.fulfilled_at = Some(now);
        request.fulfilled_by = Some(source);
        let request = request.clone();
        self.notify(SystemEvent::ResourceFulfilled { request });
        true
    }

    /// Look up a context request.
    pub fn resource_request(&self, id: RequestId) -> Option<&ContextRequest> {
        self.resource_requests.get(&id)
    }

    /// A pending request for `resource` already filed by `requester`.
    pub fn pending_request_from(
        &self,
        requester: SettlementId,
        resource: ResourceKind,
    ) -> Option<RequestId> {
        self.pending_requests()
            .find(|r| r.requester == Some(requester) && r.resource == resource)
            .map(|r| r.id)
    }

    /// Requests still waiting for a supplier, oldest first.
    pub fn pending_requests(&self) -> impl Iterator<Item = &ContextRequest> {
        self.resource_requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
    }

    // -----------------------------------------------------------------------
    // Scouting cache
    // -----------------------------------------------------------------------

    /// Store a scouting report and notify `ScoutingCompleted`. A newer
    /// report for the same system replaces the older one.
    pub fn store_scouting_result(&mut self, system_id: impl Into<String>, payload: serde_json::Value) {
        let result = ScoutingResult {
            system_id: system_id.into(),
            payload,
            stored_at: self.now,
        };
        self.scouting_results
            .insert(result.system_id.clone(), result.clone());
        self.notify(SystemEvent::ScoutingCompleted { result });
    }

    /// Cached scouting report for `system_id`.
    pub fn scouting_result(&self, system_id: &str) -> Option<&ScoutingResult> {
        self.scouting_results.get(system_id)
    }

    // -----------------------------------------------------------------------
    // Economic state
    // -----------------------------------------------------------------------

    /// Set an economic state entry.
    pub fn update_economic_state(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.economic_state.insert(key.into(), value);
    }

    /// Read an economic state entry.
    pub fn economic_state(&self, key: &str) -> Option<&serde_json::Value> {
        self.economic_state.get(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use colonysim_types::EventKind;

    use super::*;

    struct Recorder {
        seen: Arc<Mutex<Vec<EventKind>>>,
    }

    impl EventListener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn handle_event(&mut self, event: &SystemEvent) -> Result<(), ListenerError> {
            self.seen.lock().unwrap().push(event.kind());
            Ok(())
        }
    }

    struct Failing;

    impl EventListener for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn handle_event(&mut self, _event: &SystemEvent) -> Result<(), ListenerError> {
            Err(ListenerError::Rejected {
                reason: "always fails".to_owned(),
            })
        }
    }

    struct Panicking;

    impl EventListener for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        #[allow(clippy::panic)]
        fn handle_event(&mut self, _event: &SystemEvent) -> Result<(), ListenerError> {
            panic!("listener bug");
        }
    }

    fn context_with_recorder() -> (SharedContext, Arc<Mutex<Vec<EventKind>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);
        context.add_listener(Box::new(Recorder {
            seen: Arc::clone(&seen),
        }));
        (context, seen)
    }

    fn draft(kind: ActionKind) -> MissionDraft {
        MissionDraft {
            settlement_id: None,
            kind,
            description: "survey".to_owned(),
            estimated_duration_days: 10,
            resource_requirements: BTreeMap::new(),
        }
    }

    #[test]
    fn mission_queue_is_fifo_and_notifies() {
        let (mut context, seen) = context_with_recorder();
        let first = context.queue_mission(draft(ActionKind::SystemScouting));
        let second = context.queue_mission(draft(ActionKind::SettlementExpansion));

        assert_eq!(context.dequeue_mission().map(|m| m.id), Some(first));
        assert_eq!(context.dequeue_mission().map(|m| m.id), Some(second));
        assert!(context.dequeue_mission().is_none());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EventKind::MissionQueued,
                EventKind::MissionQueued,
                EventKind::MissionDequeued,
                EventKind::MissionDequeued,
            ]
        );
    }

    #[test]
    fn request_lifecycle() {
        let (mut context, seen) = context_with_recorder();
        let id = context
            .request_resource(None, ResourceKind::Water, 40, PriorityTier::High)
            .unwrap();
        assert_eq!(context.pending_requests().count(), 1);

        let supplier = SettlementId::from_sequence(2);
        assert!(context.fulfill_resource_request(id, supplier));
        assert!(!context.fulfill_resource_request(id, supplier));
        assert_eq!(context.pending_requests().count(), 0);

        let stored = context.resource_request(id).unwrap();
        assert_eq!(stored.status, RequestStatus::Fulfilled);
        assert_eq!(stored.fulfilled_by, Some(supplier));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::ResourceRequested, EventKind::ResourceFulfilled]
        );
    }

    #[test]
    fn open_work_is_found_per_settlement() {
        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);
        let colony = SettlementId::from_sequence(1);
        let id = context
            .request_resource(Some(colony), ResourceKind::Water, 40, PriorityTier::High)
            .unwrap();
        assert_eq!(context.pending_request_from(colony, ResourceKind::Water), Some(id));
        assert_eq!(context.pending_request_from(colony, ResourceKind::Food), None);
        context.fulfill_resource_request(id, SettlementId::from_sequence(2));
        assert_eq!(context.pending_request_from(colony, ResourceKind::Water), None);

        let mission = context.queue_mission(MissionDraft {
            settlement_id: Some(colony),
            ..draft(ActionKind::SystemScouting)
        });
        assert_eq!(context.open_mission(colony, ActionKind::SystemScouting), Some(mission));
        let record = context.dequeue_mission().unwrap();
        context.register_active_mission(record);
        assert_eq!(context.open_mission(colony, ActionKind::SystemScouting), Some(mission));
        context.unregister_active_mission(mission);
        assert_eq!(context.open_mission(colony, ActionKind::SystemScouting), None);
    }

    #[test]
    fn zero_quantity_request_rejected() {
        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);
        let result = context.request_resource(None, ResourceKind::Food, 0, PriorityTier::Low);
        assert!(result.is_err());
        assert_eq!(context.pending_requests().count(), 0);
    }

    #[test]
    fn scouting_results_are_stamped() {
        let (mut context, seen) = context_with_recorder();
        let later = DateTime::<Utc>::UNIX_EPOCH + chrono::TimeDelta::hours(3);
        context.set_time(later);
        context.store_scouting_result("alpha-centauri", serde_json::json!({"planets": 3}));

        let result = context.scouting_result("alpha-centauri").unwrap();
        assert_eq!(result.stored_at, later);
        assert_eq!(result.payload["planets"], 3);
        assert!(context.scouting_result("sirius").is_none());
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::ScoutingCompleted]);
    }

    #[test]
    fn active_mission_registry() {
        let (mut context, seen) = context_with_recorder();
        let id = context.queue_mission(draft(ActionKind::InfrastructureBuilding));
        let mission = context.dequeue_mission().unwrap();
        context.register_active_mission(mission);
        assert_eq!(context.active_missions().count(), 1);

        assert!(context.unregister_active_mission(id).is_some());
        assert!(context.unregister_active_mission(id).is_none());
        let kinds = seen.lock().unwrap().clone();
        assert_eq!(
            kinds.get(2..),
            Some(&[EventKind::MissionStarted, EventKind::MissionCompleted][..])
        );
    }

    #[test]
    fn economic_state_roundtrip() {
        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);
        context.update_economic_state("gcc_rate", serde_json::json!(1.25));
        assert_eq!(
            context.economic_state("gcc_rate"),
            Some(&serde_json::json!(1.25))
        );
        assert!(context.economic_state("missing").is_none());
    }

    #[test]
    fn failing_listeners_are_isolated() {
        let (mut context, seen) = context_with_recorder();
        context.add_listener(Box::new(Failing));
        context.add_listener(Box::new(Panicking));
        let recorder_after = Arc::new(Mutex::new(Vec::new()));
        context.add_listener(Box::new(Recorder {
            seen: Arc::clone(&recorder_after),
        }));

        let report = context.notify(SystemEvent::SettlementRegistered {
            settlement_id: SettlementId::from_sequence(1),
        });

        assert_eq!(report, DeliveryReport { delivered: 2, failed: 2 });
        assert_eq!(context.listener_failures(), 2);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(recorder_after.lock().unwrap().len(), 1);
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);
        let id = context.add_listener(Box::new(Recorder {
            seen: Arc::clone(&seen),
        }));
        assert!(context.remove_listener(id));
        assert!(!context.remove_listener(id));
        context.notify(SystemEvent::MissionStarted {
            mission_id: MissionId::from_sequence(1),
        });
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(context.listener_count(), 0);
    }

    #[test]
    fn orchestrator_events_are_deferred() {
        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);
        context.notify(SystemEvent::MissionStarted {
            mission_id: MissionId::from_sequence(1),
        });
        context.notify(SystemEvent::ResourceCrisis {
            settlement_id: SettlementId::from_sequence(1),
            resources: vec![ResourceKind::Oxygen],
        });
        assert_eq!(context.inbox_len(), 1);
        let drained = context.drain_inbox();
        assert_eq!(drained.len(), 1);
        assert_eq!(context.inbox_len(), 0);
    }
}
