//! Shared type definitions for the Colonysim settlement economy core.
//!
//! This crate is the single source of truth for the records exchanged between
//! the core, its settlement data providers, and read-only consumers of
//! finished tick snapshots. Types flow downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all identifiers
//! - [`enums`] -- Resources, priority tiers, statuses, health levels
//! - [`structs`] -- Snapshots, requests, allocations, transfers, conflicts
//! - [`events`] -- Typed events published on the shared context bus

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    ActionKind, AllocationSource, ArbitrationOutcome, ConflictResolution, ConflictType,
    DistributionLevel, EconomicLevel, EstimatedValue, InfrastructureKind, LogisticsLevel,
    ObjectiveType, OpportunityKind, PriorityTier, RequestStatus, ResourceKind, RouteClass,
    Severity, Timeline, TransferStatus, UnknownResourceKind, ViabilityLevel,
};
pub use events::{EventKind, SystemEvent};
pub use ids::{ConflictId, MissionId, RequestId, SettlementId, TransferId};
pub use structs::{
    Allocation, BodyKind, Capabilities, CelestialBody, Conflict, ContextRequest, ExpansionPlan,
    MissionRecord, Opportunity, ProductionRate, RequestError, ResourceRequest, ScoutingResult,
    SettlementSnapshot, StrategicObjective, SystemHealth, SystemStatus, SystemSurvey, Transfer,
};
