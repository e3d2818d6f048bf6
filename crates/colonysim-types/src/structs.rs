//! Record types for the Colonysim settlement economy.
//!
//! Covers settlement snapshots supplied by the data provider, the records the
//! core produces each tick (requests, allocations, transfers, conflicts,
//! objectives), and the summary returned to callers after a tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    ActionKind, AllocationSource, ConflictType, DistributionLevel, EconomicLevel, LogisticsLevel,
    ObjectiveType, OpportunityKind, PriorityTier, RequestStatus, ResourceKind, RouteClass,
    Severity, Timeline, TransferStatus, UnknownResourceKind, ViabilityLevel,
};
use crate::ids::{ConflictId, MissionId, RequestId, SettlementId, TransferId};

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// What kind of body a settlement sits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyKind {
    /// A planet.
    Planet,
    /// A moon orbiting the named planet.
    Moon {
        /// Identifier of the parent planet.
        planet: String,
    },
    /// Anything else (asteroid, station, dwarf planet).
    Other,
}

/// A celestial body reference. Bodies are owned by the world model; the core
/// only compares them to classify routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CelestialBody {
    /// Stable body identifier (for example `"mars"`).
    pub id: String,
    /// Body classification.
    pub kind: BodyKind,
}

impl CelestialBody {
    /// Construct a planet.
    pub fn planet(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BodyKind::Planet,
        }
    }

    /// Construct a moon of `planet`.
    pub fn moon(id: impl Into<String>, planet: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BodyKind::Moon {
                planet: planet.into(),
            },
        }
    }

    /// Whether `self` is a moon of `other`.
    fn orbits(&self, other: &Self) -> bool {
        matches!(&self.kind, BodyKind::Moon { planet } if *planet == other.id)
    }

    /// Classify the route between two bodies.
    pub fn route_class(&self, other: &Self) -> RouteClass {
        if self.id == other.id {
            RouteClass::SameBody
        } else if self.orbits(other) || other.orbits(self) {
            RouteClass::PlanetMoon
        } else {
            RouteClass::InterBody
        }
    }
}

// ---------------------------------------------------------------------------
// Settlement snapshot (provider output)
// ---------------------------------------------------------------------------

/// Capability flags reported by a settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Capabilities {
    /// Has probes or ships able to scout other systems.
    pub can_scout: bool,
    /// Has a working construction capability.
    pub can_build: bool,
    /// May found new settlements.
    pub can_expand: bool,
}

/// Per-tick output and consumption of one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProductionRate {
    /// Units produced per tick.
    pub output: f64,
    /// Units consumed per tick.
    pub consumption: f64,
}

/// Survey data for a star system the settlement knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SystemSurvey {
    /// System identifier.
    pub system_id: String,
    /// Habitability index, 0 to 100.
    pub tei_score: f64,
    /// Metal richness, 0 to 1.
    pub metal_richness: f64,
    /// Volatile availability, 0 to 1.
    pub volatile_availability: f64,
    /// Rare earth potential, 0 to 1.
    pub rare_earth_potential: f64,
    /// Strategic value, 0 to 1.
    pub strategic_value: f64,
    /// Number of known wormhole connections.
    pub wormhole_count: u32,
}

/// Everything the settlement data provider reports about one settlement.
///
/// Reads must be idempotent within a tick: two calls without an intervening
/// credit or debit return equal snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SettlementSnapshot {
    /// Settlement identifier.
    pub id: SettlementId,
    /// Display name.
    pub name: String,
    /// Body the settlement sits on.
    pub body: CelestialBody,
    /// Current inventory, whole units.
    pub inventory: BTreeMap<ResourceKind, u64>,
    /// Current population.
    pub population: u64,
    /// Maximum population the habitats support.
    pub population_capacity: u64,
    /// Whether the power grid is online.
    pub power_online: bool,
    /// Production and consumption per resource.
    pub production: BTreeMap<ResourceKind, ProductionRate>,
    /// Capability flags.
    pub capabilities: Capabilities,
    /// Positional advantage of the site, 0 to 1.
    pub location_advantage: f64,
    /// Systems this settlement has survey data for.
    pub known_systems: Vec<SystemSurvey>,
}

impl SettlementSnapshot {
    /// Stock of `resource`, zero if absent.
    pub fn stock(&self, resource: ResourceKind) -> u64 {
        self.inventory.get(&resource).copied().unwrap_or(0)
    }

    /// Production rate of `resource`, zero if absent.
    pub fn rate(&self, resource: ResourceKind) -> ProductionRate {
        self.production.get(&resource).copied().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Requests and allocations
// ---------------------------------------------------------------------------

/// A malformed resource request, rejected before it reaches arbitration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The resource name is not a known kind.
    #[error(transparent)]
    UnknownResource(#[from] UnknownResourceKind),

    /// Quantity must be strictly positive.
    #[error("request quantity must be positive, got {quantity}")]
    NonPositiveQuantity {
        /// The rejected quantity.
        quantity: i64,
    },
}

/// A settlement's demand for a resource in the current tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResourceRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Requesting settlement.
    pub settlement_id: SettlementId,
    /// Requested resource.
    pub resource: ResourceKind,
    /// Requested whole units, always positive.
    pub quantity: u64,
    /// Priority tier.
    pub priority: PriorityTier,
    /// Simulated time the request was filed.
    pub timestamp: DateTime<Utc>,
}

impl ResourceRequest {
    /// Build a request, rejecting a zero quantity.
    pub fn new(
        id: RequestId,
        settlement_id: SettlementId,
        resource: ResourceKind,
        quantity: u64,
        priority: PriorityTier,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, RequestError> {
        if quantity == 0 {
            return Err(RequestError::NonPositiveQuantity { quantity: 0 });
        }
        Ok(Self {
            id,
            settlement_id,
            resource,
            quantity,
            priority,
            timestamp,
        })
    }

    /// Build a request from untyped input (resource name and signed
    /// quantity), as received from external callers.
    pub fn parse(
        id: RequestId,
        settlement_id: SettlementId,
        resource: &str,
        quantity: i64,
        priority: PriorityTier,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, RequestError> {
        let resource: ResourceKind = resource.parse()?;
        let quantity =
            u64::try_from(quantity).map_err(|_| RequestError::NonPositiveQuantity { quantity })?;
        Self::new(id, settlement_id, resource, quantity, priority, timestamp)
    }
}

/// A concrete grant of resources to a settlement. Applied exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Allocation {
    /// Receiving settlement.
    pub settlement_id: SettlementId,
    /// Granted resource.
    pub resource: ResourceKind,
    /// Granted whole units.
    pub quantity: u64,
    /// Priority tier of the originating request.
    pub priority: PriorityTier,
    /// Where the units come from.
    pub source: AllocationSource,
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// A shipment of one or more resources between two settlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Transfer {
    /// Transfer identifier.
    pub id: TransferId,
    /// Shipping settlement.
    pub source: SettlementId,
    /// Receiving settlement.
    pub target: SettlementId,
    /// Quantity per resource.
    pub resources: BTreeMap<ResourceKind, u64>,
    /// Sum of `resources`.
    pub total_quantity: u64,
    /// Highest priority among the merged demands.
    pub priority: PriorityTier,
    /// Route classification.
    pub route_class: RouteClass,
    /// Transport cost in credits.
    #[ts(as = "String")]
    pub transport_cost: Decimal,
    /// Simulated departure time.
    pub scheduled_time: DateTime<Utc>,
    /// Simulated arrival time.
    pub estimated_completion: DateTime<Utc>,
    /// Lifecycle state.
    pub status: TransferStatus,
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// A recorded arbitration conflict or an active crisis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Conflict {
    /// Conflict identifier.
    pub id: ConflictId,
    /// Over-allocation or crisis.
    pub conflict_type: ConflictType,
    /// Resources involved (one for over-allocation, any number for a crisis).
    pub resources: Vec<ResourceKind>,
    /// Settlements involved, in first-seen order.
    pub settlements: Vec<SettlementId>,
    /// Severity.
    pub severity: Severity,
    /// Units requested beyond the limit (zero for a crisis).
    pub shortfall: u64,
    /// Simulated time the conflict was first recorded.
    pub created_at: DateTime<Utc>,
    /// Expiry for crises.
    pub resolution_deadline: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Strategy and planning
// ---------------------------------------------------------------------------

/// A system-wide goal derived from health analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StrategicObjective {
    /// Objective type. At most one objective per type is held.
    pub objective_type: ObjectiveType,
    /// Priority.
    pub priority: PriorityTier,
    /// Human-readable description.
    pub description: String,
}

/// An opportunity reported by a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Opportunity {
    /// Reporting settlement.
    pub settlement_id: SettlementId,
    /// Body the opportunity is located on.
    pub body_id: String,
    /// Kind of opportunity.
    pub kind: OpportunityKind,
    /// Priority.
    pub priority: PriorityTier,
    /// Resources the follow-up work consumes.
    pub resources_required: Vec<ResourceKind>,
    /// When it should start.
    pub timeline: Timeline,
}

/// A coordinated plan handed back to a settlement after conflict filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ExpansionPlan {
    /// Kind of work.
    pub kind: OpportunityKind,
    /// Priority.
    pub priority: PriorityTier,
    /// Resources the work consumes.
    pub resources_required: Vec<ResourceKind>,
    /// When it should start.
    pub timeline: Timeline,
}

// ---------------------------------------------------------------------------
// Shared context records
// ---------------------------------------------------------------------------

/// A unit of work queued for an external executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MissionRecord {
    /// Mission identifier.
    pub id: MissionId,
    /// Settlement that chose the mission, if any.
    pub settlement_id: Option<SettlementId>,
    /// Kind of mission.
    pub kind: ActionKind,
    /// Human-readable description.
    pub description: String,
    /// Estimated duration in simulated days.
    pub estimated_duration_days: u32,
    /// Resources the mission consumes.
    pub resource_requirements: BTreeMap<ResourceKind, u64>,
    /// Simulated time the mission was queued.
    pub queued_at: DateTime<Utc>,
}

/// A resource request filed through the shared context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ContextRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Requesting settlement, if any.
    pub requester: Option<SettlementId>,
    /// Requested resource.
    pub resource: ResourceKind,
    /// Requested whole units.
    pub quantity: u64,
    /// Priority tier.
    pub priority: PriorityTier,
    /// Pending or fulfilled.
    pub status: RequestStatus,
    /// Simulated filing time.
    pub requested_at: DateTime<Utc>,
    /// Simulated fulfillment time.
    pub fulfilled_at: Option<DateTime<Utc>>,
    /// Settlement that supplied the request.
    pub fulfilled_by: Option<SettlementId>,
}

/// A cached scouting report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ScoutingResult {
    /// Scouted system.
    pub system_id: String,
    /// Opaque report payload.
    pub payload: serde_json::Value,
    /// Simulated time the report was stored.
    pub stored_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// System summary
// ---------------------------------------------------------------------------

/// Aggregated health of the whole settlement network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SystemHealth {
    /// Evenness of resource spread.
    pub resource_distribution: DistributionLevel,
    /// Share of viable settlements.
    pub settlement_viability: ViabilityLevel,
    /// Mean economic health.
    pub economic_stability: EconomicLevel,
    /// Route network delay level.
    pub logistical_efficiency: LogisticsLevel,
    /// Mean of the four component scores, 0 to 1.
    pub overall_score: f64,
}

/// Summary returned from one orchestration tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SystemStatus {
    /// Tick that produced this summary.
    pub tick: u64,
    /// Registered settlements.
    pub settlement_count: usize,
    /// Transfers scheduled, delayed, or in transit.
    pub active_transfers: usize,
    /// Unresolved conflicts (including active crises).
    pub conflict_count: usize,
    /// Allocations applied this tick.
    pub allocations_applied: usize,
    /// Transfers newly scheduled this tick.
    pub transfers_scheduled: usize,
    /// Transfers completed this tick.
    pub transfers_completed: usize,
    /// Current strategic objectives.
    pub objectives: Vec<StrategicObjective>,
    /// System health after this tick.
    pub health: SystemHealth,
}
