//! Typed events published on the shared context's event bus.
//!
//! Every notification the core emits is a [`SystemEvent`] variant carrying its
//! own payload. Listeners match on the variant; [`EventKind`] is the
//! payload-free discriminant used for filtering and counting.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::ResourceKind;
use crate::ids::{MissionId, RequestId, SettlementId};
use crate::structs::{ContextRequest, MissionRecord, Opportunity, ScoutingResult};

/// An event published through the shared context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SystemEvent {
    /// A mission was appended to the queue.
    MissionQueued {
        /// The queued mission.
        mission: MissionRecord,
    },
    /// A mission was taken off the queue.
    MissionDequeued {
        /// The dequeued mission.
        mission: MissionRecord,
    },
    /// A resource request was filed through the context.
    ResourceRequested {
        /// The pending request.
        request: ContextRequest,
    },
    /// A context resource request was fulfilled.
    ResourceFulfilled {
        /// The fulfilled request.
        request: ContextRequest,
    },
    /// A scouting report was stored.
    ScoutingCompleted {
        /// The stored report.
        result: ScoutingResult,
    },
    /// A mission became active.
    MissionStarted {
        /// Mission identifier.
        mission_id: MissionId,
    },
    /// An active mission finished.
    MissionCompleted {
        /// Mission identifier.
        mission_id: MissionId,
    },
    /// A settlement joined the orchestrated system.
    SettlementRegistered {
        /// Settlement identifier.
        settlement_id: SettlementId,
    },
    /// A settlement is leaving the orchestrated system.
    SettlementUnregistered {
        /// Settlement identifier.
        settlement_id: SettlementId,
    },
    /// A settlement is running out of life-support resources.
    ResourceCrisis {
        /// Affected settlement.
        settlement_id: SettlementId,
        /// Resources below the crisis threshold.
        resources: Vec<ResourceKind>,
    },
    /// A settlement spotted an opportunity worth system-level attention.
    StrategicOpportunity {
        /// The opportunity.
        opportunity: Opportunity,
    },
}

/// Payload-free discriminant of [`SystemEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// See [`SystemEvent::MissionQueued`].
    MissionQueued,
    /// See [`SystemEvent::MissionDequeued`].
    MissionDequeued,
    /// See [`SystemEvent::ResourceRequested`].
    ResourceRequested,
    /// See [`SystemEvent::ResourceFulfilled`].
    ResourceFulfilled,
    /// See [`SystemEvent::ScoutingCompleted`].
    ScoutingCompleted,
    /// See [`SystemEvent::MissionStarted`].
    MissionStarted,
    /// See [`SystemEvent::MissionCompleted`].
    MissionCompleted,
    /// See [`SystemEvent::SettlementRegistered`].
    SettlementRegistered,
    /// See [`SystemEvent::SettlementUnregistered`].
    SettlementUnregistered,
    /// See [`SystemEvent::ResourceCrisis`].
    ResourceCrisis,
    /// See [`SystemEvent::StrategicOpportunity`].
    StrategicOpportunity,
}

impl SystemEvent {
    /// The event's discriminant.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::MissionQueued { .. } => EventKind::MissionQueued,
            Self::MissionDequeued { .. } => EventKind::MissionDequeued,
            Self::ResourceRequested { .. } => EventKind::ResourceRequested,
            Self::ResourceFulfilled { .. } => EventKind::ResourceFulfilled,
            Self::ScoutingCompleted { .. } => EventKind::ScoutingCompleted,
            Self::MissionStarted { .. } => EventKind::MissionStarted,
            Self::MissionCompleted { .. } => EventKind::MissionCompleted,
            Self::SettlementRegistered { .. } => EventKind::SettlementRegistered,
            Self::SettlementUnregistered { .. } => EventKind::SettlementUnregistered,
            Self::ResourceCrisis { .. } => EventKind::ResourceCrisis,
            Self::StrategicOpportunity { .. } => EventKind::StrategicOpportunity,
        }
    }

    /// Whether the orchestrator acts on this event after the tick's main
    /// sequence.
    pub const fn is_orchestrator_relevant(&self) -> bool {
        matches!(
            self,
            Self::ResourceCrisis { .. }
                | Self::StrategicOpportunity { .. }
                | Self::SettlementUnregistered { .. }
        )
    }

    /// Request identifier carried by request events.
    pub const fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::ResourceRequested { request } | Self::ResourceFulfilled { request } => {
                Some(request.id)
            }
            _ => None,
        }
    }
}
