//! Derived metrics for one settlement snapshot.
//!
//! [`StateAnalyzer::analyze`] is a pure function of the snapshot: the same
//! snapshot always yields the same [`StateAnalysis`]. Every score it
//! produces lies in `[0, 1]`.

use std::collections::BTreeMap;

use serde::Serialize;

use colonysim_types::{
    EstimatedValue, InfrastructureKind, ResourceKind, SettlementSnapshot, SystemSurvey,
};

use crate::config::StrategyConfig;
use crate::numeric::{ratio, to_f64, unit_interval};

/// Life-support resources checked for production shortfalls.
const PRODUCED_ESSENTIALS: [ResourceKind; 3] =
    [ResourceKind::Energy, ResourceKind::Food, ResourceKind::Water];

/// Output must exceed consumption by this factor to count as secure.
const PRODUCTION_SAFETY_MARGIN: f64 = 1.2;

/// Energy output above which a settlement counts as having a surplus.
const ENERGY_SURPLUS_OUTPUT: f64 = 2000.0;

/// Stock a construction material needs before it counts toward building.
const BUILDING_STOCK_FLOOR: u64 = 100;

/// Readiness above which habitation becomes the next bottleneck.
const HABITATION_READINESS: f64 = 0.8;

// ---------------------------------------------------------------------------
// Analysis output
// ---------------------------------------------------------------------------

/// Resources the settlement is short of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceNeeds {
    /// Essentials produced at less than the safety margin over consumption.
    pub critical: Vec<ResourceKind>,
    /// Construction materials below the stock threshold.
    pub needed: Vec<ResourceKind>,
}

/// One star system worth scouting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoutingTarget {
    /// Identifier of the system.
    pub system_id: String,
    /// Estimated payoff.
    pub estimated_value: EstimatedValue,
}

/// Known systems worth scouting, split by appeal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoutingOpportunities {
    /// Habitable, resource-rich, or strategically prized systems.
    pub high_value: Vec<ScoutingTarget>,
    /// Systems that matter for future expansion.
    pub strategic: Vec<ScoutingTarget>,
}

impl ScoutingOpportunities {
    /// Whether there is nothing to scout.
    pub fn is_empty(&self) -> bool {
        self.high_value.is_empty() && self.strategic.is_empty()
    }
}

/// Infrastructure the settlement lacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InfrastructureNeeds {
    /// Missing infrastructure that blocks normal operation.
    pub critical: Vec<InfrastructureKind>,
    /// Infrastructure that would unlock further growth.
    pub needed: Vec<InfrastructureKind>,
}

/// Everything the strategy layer knows about one settlement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateAnalysis {
    /// Resource shortfalls.
    pub resource_needs: ResourceNeeds,
    /// Systems worth scouting.
    pub scouting_opportunities: ScoutingOpportunities,
    /// How ready the settlement is to found another, in `[0, 1]`.
    pub expansion_readiness: f64,
    /// Missing infrastructure.
    pub infrastructure_needs: InfrastructureNeeds,
    /// Fitness for acquiring resources.
    pub acquisition_capability: f64,
    /// Fitness for scouting missions.
    pub scouting_capability: f64,
    /// Share of construction materials in stock.
    pub building_capability: f64,
    /// Energy balance and population health.
    pub economic_health: f64,
    /// Location and economy combined.
    pub strategic_position: f64,
    /// Stock on hand, read by mission dependency checks.
    pub reserves: BTreeMap<ResourceKind, u64>,
}

impl StateAnalysis {
    /// Stock of `resource` on hand.
    pub fn reserve(&self, resource: ResourceKind) -> u64 {
        self.reserves.get(&resource).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Turns a settlement snapshot into a [`StateAnalysis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateAnalyzer {
    material_stock_threshold: u64,
}

impl Default for StateAnalyzer {
    fn default() -> Self {
        Self::new(&StrategyConfig::default())
    }
}

impl StateAnalyzer {
    /// Create an analyzer using the strategy thresholds.
    pub const fn new(config: &StrategyConfig) -> Self {
        Self {
            material_stock_threshold: config.material_stock_threshold,
        }
    }

    /// Analyze one snapshot.
    pub fn analyze(&self, snapshot: &SettlementSnapshot) -> StateAnalysis {
        let resource_needs = self.resource_needs(snapshot);
        let economic_health = economic_health(snapshot);
        let expansion_readiness = expansion_readiness(snapshot, economic_health);
        let scouting_opportunities =
            scouting_opportunities(&snapshot.known_systems, economic_health, &resource_needs);

        StateAnalysis {
            infrastructure_needs: infrastructure_needs(snapshot, expansion_readiness),
            acquisition_capability: acquisition_capability(snapshot),
            scouting_capability: scouting_capability(snapshot),
            building_capability: building_capability(snapshot),
            strategic_position: unit_interval(
                (unit_interval(snapshot.location_advantage) + economic_health) / 2.0,
            ),
            reserves: snapshot.inventory.clone(),
            resource_needs,
            scouting_opportunities,
            expansion_readiness,
            economic_health,
        }
    }

    fn resource_needs(&self, snapshot: &SettlementSnapshot) -> ResourceNeeds {
        let critical = PRODUCED_ESSENTIALS
            .into_iter()
            .filter(|&resource| {
                let rate = snapshot.rate(resource);
                rate.consumption > 0.0 && rate.output < rate.consumption * PRODUCTION_SAFETY_MARGIN
            })
            .collect();
        let needed = ResourceKind::CONSTRUCTION
            .into_iter()
            .filter(|&resource| snapshot.stock(resource) < self.material_stock_threshold)
            .collect();
        ResourceNeeds { critical, needed }
    }
}

const fn power_score(snapshot: &SettlementSnapshot) -> f64 {
    if snapshot.power_online { 1.0 } else { 0.0 }
}

fn acquisition_capability(snapshot: &SettlementSnapshot) -> f64 {
    let workforce = (to_f64(snapshot.population) / 100.0).min(1.0);
    unit_interval((power_score(snapshot) + workforce) / 2.0)
}

fn scouting_capability(snapshot: &SettlementSnapshot) -> f64 {
    let crew = (to_f64(snapshot.population) / 50.0).min(1.0);
    unit_interval((crew + power_score(snapshot)) / 2.0)
}

fn building_capability(snapshot: &SettlementSnapshot) -> f64 {
    let stocked = ResourceKind::CONSTRUCTION
        .into_iter()
        .filter(|&resource| snapshot.stock(resource) > BUILDING_STOCK_FLOOR)
        .count();
    let materials = u64::try_from(ResourceKind::CONSTRUCTION.len()).unwrap_or(1);
    ratio(u64::try_from(stocked).unwrap_or(0), materials)
}

/// Energy balance blended with population health.
pub fn economic_health(snapshot: &SettlementSnapshot) -> f64 {
    let energy = snapshot.rate(ResourceKind::Energy);
    let energy_score = if energy.consumption > 0.0 {
        (energy.output / energy.consumption - 1.0).clamp(0.0, 2.0) / 2.0
    } else {
        0.0
    };
    let population_score = (to_f64(snapshot.population) / 200.0).min(1.0);
    unit_interval((energy_score + population_score) / 2.0)
}

/// Expansion readiness from population fill, energy surplus, and economic
/// health.
///
/// ```text
/// readiness = min(pop / capacity * 0.4, 0.4)
///           + 0.3 if energy output > 2000
///           + economic_health * 0.3
/// ```
pub fn expansion_readiness(snapshot: &SettlementSnapshot, economic_health: f64) -> f64 {
    let population = (ratio(snapshot.population, snapshot.population_capacity) * 0.4).min(0.4);
    let energy = if snapshot.rate(ResourceKind::Energy).output > ENERGY_SURPLUS_OUTPUT {
        0.3
    } else {
        0.0
    };
    unit_interval(population + energy + unit_interval(economic_health) * 0.3)
}

fn infrastructure_needs(snapshot: &SettlementSnapshot, readiness: f64) -> InfrastructureNeeds {
    let mut needs = InfrastructureNeeds::default();
    if !snapshot.power_online {
        needs.critical.push(InfrastructureKind::PowerGrid);
    }
    if readiness > HABITATION_READINESS {
        needs.needed.push(InfrastructureKind::HabitationExpansion);
    }
    needs
}

fn scouting_opportunities(
    systems: &[SystemSurvey],
    economic_health: f64,
    needs: &ResourceNeeds,
) -> ScoutingOpportunities {
    let mut opportunities = ScoutingOpportunities::default();
    for system in systems {
        let target = ScoutingTarget {
            system_id: system.system_id.clone(),
            estimated_value: estimated_value(system),
        };
        if is_high_value(system) {
            opportunities.high_value.push(target);
        } else if is_strategic(system, economic_health, needs) {
            opportunities.strategic.push(target);
        }
    }
    opportunities
}

fn is_high_value(system: &SystemSurvey) -> bool {
    let resources =
        system.metal_richness + system.volatile_availability + system.rare_earth_potential;
    system.tei_score > 80.0 || resources > 1.5 || system.strategic_value > 0.7
}

fn is_strategic(system: &SystemSurvey, economic_health: f64, needs: &ResourceNeeds) -> bool {
    (economic_health > 0.6 && system.strategic_value > 0.4)
        || (!needs.critical.is_empty()
            && system.metal_richness + system.volatile_availability > 0.8)
        || system.wormhole_count > 0
}

fn estimated_value(system: &SystemSurvey) -> EstimatedValue {
    if system.tei_score > 80.0 {
        EstimatedValue::PrizeWorld
    } else if system.strategic_value > 0.7 {
        EstimatedValue::High
    } else if system.strategic_value > 0.4 {
        EstimatedValue::Medium
    } else {
        EstimatedValue::Low
    }
}
