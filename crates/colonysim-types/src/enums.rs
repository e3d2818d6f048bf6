//! Enumeration types for the Colonysim settlement economy.
//!
//! Resource kinds, priority tiers, route classes, lifecycle statuses, and
//! the health levels reported by the aggregated system state.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A resource kind held in settlement inventories and traded between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    // --- Life support ---
    /// Electrical energy stored or generated by the settlement grid.
    Energy,
    /// Food for the population.
    Food,
    /// Potable water.
    Water,
    /// Breathable oxygen.
    Oxygen,

    // --- Bulk ---
    /// Unrefined mineral ore.
    Minerals,

    // --- Construction materials ---
    /// Structural steel.
    Steel,
    /// Titanium alloy stock.
    Titanium,
    /// Aluminum stock.
    Aluminum,

    // --- Manufactured ---
    /// Electronic components.
    Electronics,
}

impl ResourceKind {
    /// Every resource kind, in canonical order.
    pub const ALL: [Self; 9] = [
        Self::Energy,
        Self::Food,
        Self::Water,
        Self::Oxygen,
        Self::Minerals,
        Self::Steel,
        Self::Titanium,
        Self::Aluminum,
        Self::Electronics,
    ];

    /// Resources whose shortage endangers the population.
    pub const LIFE_SUPPORT: [Self; 4] = [Self::Energy, Self::Food, Self::Water, Self::Oxygen];

    /// Materials consumed by construction and expansion work.
    pub const CONSTRUCTION: [Self; 3] = [Self::Steel, Self::Titanium, Self::Aluminum];

    /// Stable `snake_case` name used in configuration files and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::Food => "food",
            Self::Water => "water",
            Self::Oxygen => "oxygen",
            Self::Minerals => "minerals",
            Self::Steel => "steel",
            Self::Titanium => "titanium",
            Self::Aluminum => "aluminum",
            Self::Electronics => "electronics",
        }
    }

    /// Whether this resource is needed to keep the population alive.
    pub const fn is_life_support(self) -> bool {
        matches!(self, Self::Energy | Self::Food | Self::Water | Self::Oxygen)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known [`ResourceKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource kind: {name}")]
pub struct UnknownResourceKind {
    /// The rejected input.
    pub name: String,
}

impl FromStr for ResourceKind {
    type Err = UnknownResourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| UnknownResourceKind {
                name: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Priorities
// ---------------------------------------------------------------------------

/// Priority tier of a request, allocation, transfer, or objective.
///
/// Tiers are totally ordered: `Critical > High > Medium > Low`. The derived
/// `Ord` follows declaration order, so sorting descending puts critical work
/// first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Nice to have; first to be shrunk under scarcity.
    Low,
    /// Ordinary operating demand.
    #[default]
    Medium,
    /// Important demand; may be delayed but not shrunk below fair share.
    High,
    /// Survival demand; never delayed.
    Critical,
}

impl PriorityTier {
    /// Every tier, highest first.
    pub const DESCENDING: [Self; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    /// Numeric rank (critical = 4, low = 1).
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Stable `snake_case` name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Logistics
// ---------------------------------------------------------------------------

/// Classification of a route by the celestial bodies it connects.
///
/// Route class selects capacity, transit time, and cost multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    /// Both settlements sit on the same body.
    SameBody,
    /// One settlement is on a planet, the other on one of its moons.
    PlanetMoon,
    /// Any other pairing (interplanetary).
    InterBody,
}

/// Lifecycle state of a [`Transfer`](crate::structs::Transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Candidate produced by transfer discovery, nothing reserved yet.
    Proposed,
    /// Reserved at the source and waiting for its start time.
    Scheduled,
    /// Reserved, but queued behind a congested route.
    Delayed,
    /// Departed; in transit to the target.
    InProgress,
    /// Arrived; resources credited at the target.
    Completed,
    /// Cancelled before departure; reservation released.
    Cancelled,
}

impl TransferStatus {
    /// Whether the shipment currently holds reserved resources.
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Scheduled | Self::Delayed | Self::InProgress)
    }

    /// Whether an explicit cancel is still allowed.
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Scheduled | Self::Delayed)
    }
}

// ---------------------------------------------------------------------------
// Arbitration
// ---------------------------------------------------------------------------

/// What the arbitrator did with a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationOutcome {
    /// Admitted at the requested quantity.
    Admitted,
    /// Admitted at a reduced quantity.
    Reduced,
    /// Held back for a later tick.
    Delayed,
    /// Dropped.
    Denied,
}

/// Kind of arbitration conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Aggregate demand for a resource exceeded its system limit.
    ResourceOverAllocation,
    /// A settlement declared a crisis.
    Crisis,
}

/// Severity of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Only low or medium tier demand was cut.
    Medium,
    /// High tier demand was cut.
    High,
    /// Critical tier demand was cut, or a crisis is active.
    Critical,
}

/// How an operator or the system closes a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Resources were reallocated; the conflict is closed.
    Reallocate,
    /// Involved settlements are escalated to crisis priority.
    Escalate,
    /// Deadline pushed back by one crisis window.
    Delay,
}

/// Where an allocation's resources come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum AllocationSource {
    /// Drawn from the system-wide pool.
    System,
    /// Delivered by a settlement-to-settlement transfer.
    Transfer,
}

/// Lifecycle of a request filed through the shared context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting for a supplier.
    Pending,
    /// Supplied.
    Fulfilled,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// The four kinds of autonomous action a settlement can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Acquire resources the settlement is short of.
    ResourceAcquisition,
    /// Scout a nearby star system.
    SystemScouting,
    /// Found a new settlement.
    SettlementExpansion,
    /// Build missing infrastructure.
    InfrastructureBuilding,
}

impl ActionKind {
    /// Every action kind, in candidate generation order.
    pub const ALL: [Self; 4] = [
        Self::ResourceAcquisition,
        Self::SystemScouting,
        Self::SettlementExpansion,
        Self::InfrastructureBuilding,
    ];
}

/// Infrastructure a settlement may need to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum InfrastructureKind {
    /// Power generation and distribution.
    PowerGrid,
    /// Additional living space.
    HabitationExpansion,
}

/// Estimated payoff of scouting a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum EstimatedValue {
    /// Little known upside.
    Low,
    /// Worth a look.
    Medium,
    /// Strong strategic value.
    High,
    /// Exceptional habitability or resources.
    PrizeWorld,
}

/// Type of system-wide strategic objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveType {
    /// Even out uneven resource distribution.
    ResourceBalancing,
    /// Prop up failing settlements.
    SettlementSupport,
    /// Coordinate expansion to new bodies.
    SystemExpansion,
    /// Follow up on a reported strategic opportunity.
    ExploitOpportunity,
}

/// Kind of opportunity a settlement reports to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    /// Export a surplus resource to the rest of the system.
    SurplusExport,
    /// Found a new settlement on the same body.
    SettlementExpansion,
    /// Scout a high-value system.
    SystemScouting,
}

/// When an expansion plan should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Timeline {
    /// This tick.
    Immediate,
    /// Within the next few ticks.
    ShortTerm,
    /// Once prerequisites are met.
    LongTerm,
}

// ---------------------------------------------------------------------------
// System health levels
// ---------------------------------------------------------------------------

/// Evenness of resource distribution across settlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum DistributionLevel {
    /// Mean spread score at least 0.8.
    Excellent,
    /// At least 0.6.
    Good,
    /// At least 0.4.
    Fair,
    /// At least 0.2.
    Poor,
    /// Below 0.2.
    Critical,
    /// No resources tracked yet.
    Unknown,
}

/// Share of settlements that are viable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ViabilityLevel {
    /// More than 70% of settlements are healthy.
    Healthy,
    /// More than half are healthy.
    Concerning,
    /// Half or fewer are healthy.
    Unhealthy,
    /// More than 30% are in critical condition.
    Critical,
    /// No settlements registered.
    Unknown,
}

/// Mean economic health of the settlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum EconomicLevel {
    /// Mean economic health at least 0.8.
    Excellent,
    /// At least 0.5.
    Stable,
    /// At least 0.3.
    Unstable,
    /// Below 0.3.
    Critical,
    /// No settlements registered.
    Unknown,
}

/// How smoothly shipments move through the route network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum LogisticsLevel {
    /// Under 10% of shipments delayed.
    Excellent,
    /// Under 25% delayed, or no shipments yet.
    Efficient,
    /// Under 50% delayed.
    Adequate,
    /// Under 75% delayed.
    Poor,
    /// Most shipments delayed.
    Critical,
    /// Not yet assessed.
    Unknown,
}
