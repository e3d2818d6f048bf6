//! System-wide view of the settlement network.
//!
//! [`SystemState`] is recomputed from the registered settlements every tick.
//! Only the strategic objectives and the dependency map survive between
//! recomputes, and both are replaced rather than patched.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use colonysim_types::{
    DistributionLevel, EconomicLevel, ExpansionPlan, LogisticsLevel, ObjectiveType, Opportunity,
    PriorityTier, ResourceKind, SettlementId, StrategicObjective, SystemHealth, ViabilityLevel,
};

use crate::allocation::{InFlight, ResourceAllocator};
use crate::logistics::{LogisticsCoordinator, LogisticsMetrics};
use crate::numeric::{to_f64, unit_interval};
use crate::settlement::SettlementRegistry;

/// Settlement health above this is viable.
const VIABLE_HEALTH: f64 = 0.7;
/// Settlement health below this is critical.
const CRITICAL_HEALTH: f64 = 0.3;
/// Overall score above which expansion becomes an objective.
const EXPANSION_SCORE: f64 = 0.7;

/// Per-settlement figures captured during a recompute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementView {
    /// Settlement.
    pub id: SettlementId,
    /// Display name.
    pub name: String,
    /// Body the settlement sits on.
    pub body_id: String,
    /// Inventory net of reservations.
    pub inventory: BTreeMap<ResourceKind, u64>,
    /// Settlement health, 0 to 1.
    pub health: f64,
    /// Economic health, 0 to 1.
    pub economic_health: f64,
}

/// A gap that other settlements could fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDependency {
    /// Resource in short supply.
    pub resource: ResourceKind,
    /// Settlements with enough surplus to cover it.
    pub providers: Vec<SettlementId>,
}

/// What one settlement currently relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementDependencies {
    /// Gaps with at least one possible provider.
    pub resource: Vec<ResourceDependency>,
    /// Sources of shipments already heading here.
    pub logistical: Vec<SettlementId>,
}

// ---------------------------------------------------------------------------
// Health scoring
// ---------------------------------------------------------------------------

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Evenness of one resource across settlements: `1 − σ / (2μ)`, clamped.
pub fn distribution_score(quantities: &[u64]) -> f64 {
    let values: Vec<f64> = quantities.iter().map(|q| to_f64(*q)).collect();
    let Some(mu) = mean(&values) else {
        return 1.0;
    };
    if mu <= 0.0 {
        return 1.0;
    }
    let variance = mean(&values.iter().map(|v| (v - mu).powi(2)).collect::<Vec<f64>>())
        .unwrap_or(0.0);
    unit_interval(1.0 - variance.sqrt() / (2.0 * mu))
}

const fn distribution_level(score: f64) -> DistributionLevel {
    if score >= 0.8 {
        DistributionLevel::Excellent
    } else if score >= 0.6 {
        DistributionLevel::Good
    } else if score >= 0.4 {
        DistributionLevel::Fair
    } else if score >= 0.2 {
        DistributionLevel::Poor
    } else {
        DistributionLevel::Critical
    }
}

const fn economic_level(health: f64) -> EconomicLevel {
    if health >= 0.8 {
        EconomicLevel::Excellent
    } else if health >= 0.5 {
        EconomicLevel::Stable
    } else if health >= 0.3 {
        EconomicLevel::Unstable
    } else {
        EconomicLevel::Critical
    }
}

/// Logistics level from the share of delayed shipments.
pub const fn logistics_level(metrics: &LogisticsMetrics) -> LogisticsLevel {
    let rate = metrics.delay_rate;
    if metrics.total_transfers == 0 {
        LogisticsLevel::Efficient
    } else if rate < 0.1 {
        LogisticsLevel::Excellent
    } else if rate < 0.25 {
        LogisticsLevel::Efficient
    } else if rate < 0.5 {
        LogisticsLevel::Adequate
    } else if rate < 0.75 {
        LogisticsLevel::Poor
    } else {
        LogisticsLevel::Critical
    }
}

const fn distribution_points(level: DistributionLevel) -> f64 {
    match level {
        DistributionLevel::Excellent => 1.0,
        DistributionLevel::Good => 0.8,
        DistributionLevel::Fair => 0.6,
        DistributionLevel::Poor => 0.4,
        DistributionLevel::Critical => 0.2,
        DistributionLevel::Unknown => 0.5,
    }
}

const fn viability_points(level: ViabilityLevel) -> f64 {
    match level {
        ViabilityLevel::Healthy => 1.0,
        ViabilityLevel::Concerning => 0.7,
        ViabilityLevel::Unhealthy => 0.4,
        ViabilityLevel::Critical => 0.2,
        ViabilityLevel::Unknown => 0.5,
    }
}

const fn economic_points(level: EconomicLevel) -> f64 {
    match level {
        EconomicLevel::Excellent => 1.0,
        EconomicLevel::Stable => 0.8,
        EconomicLevel::Unstable => 0.4,
        EconomicLevel::Critical => 0.2,
        EconomicLevel::Unknown => 0.5,
    }
}

const fn logistics_points(level: LogisticsLevel) -> f64 {
    match level {
        LogisticsLevel::Excellent => 1.0,
        LogisticsLevel::Efficient => 0.8,
        LogisticsLevel::Adequate => 0.6,
        LogisticsLevel::Poor => 0.4,
        LogisticsLevel::Critical => 0.2,
        LogisticsLevel::Unknown => 0.5,
    }
}

fn unknown_health() -> SystemHealth {
    SystemHealth {
        resource_distribution: DistributionLevel::Unknown,
        settlement_viability: ViabilityLevel::Unknown,
        economic_stability: EconomicLevel::Unknown,
        logistical_efficiency: LogisticsLevel::Unknown,
        overall_score: 0.5,
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Aggregated view of all settlements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemState {
    total_resources: BTreeMap<ResourceKind, u64>,
    settlements: Vec<SettlementView>,
    health: SystemHealth,
    dependencies: BTreeMap<SettlementId, SettlementDependencies>,
    objectives: Vec<StrategicObjective>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemState {
    /// An empty state with unknown health.
    pub fn new() -> Self {
        Self {
            total_resources: BTreeMap::new(),
            settlements: Vec::new(),
            health: unknown_health(),
            dependencies: BTreeMap::new(),
            objectives: Vec::new(),
        }
    }

    /// Units held across all settlements, per resource.
    pub const fn total_resources(&self) -> &BTreeMap<ResourceKind, u64> {
        &self.total_resources
    }

    /// Per-settlement views in registration order.
    pub fn settlements(&self) -> &[SettlementView] {
        &self.settlements
    }

    /// Health from the last recompute.
    pub const fn health(&self) -> SystemHealth {
        self.health
    }

    /// Dependency map from the last analysis.
    pub const fn dependencies(&self) -> &BTreeMap<SettlementId, SettlementDependencies> {
        &self.dependencies
    }

    /// Current strategic objectives, one per type.
    pub fn objectives(&self) -> &[StrategicObjective] {
        &self.objectives
    }

    /// Recompute totals, views, and health. Calling this twice without
    /// settlement changes in between yields the same state.
    pub fn update_system_state(
        &mut self,
        registry: &SettlementRegistry,
        logistics: &LogisticsMetrics,
    ) {
        self.settlements = registry
            .iter()
            .map(|manager| SettlementView {
                id: manager.id(),
                name: manager.name().to_owned(),
                body_id: manager.snapshot().body.id.clone(),
                inventory: manager.settlement_resources().clone(),
                health: manager.settlement_health(),
                economic_health: manager.economic_health(),
            })
            .collect();

        let mut totals: BTreeMap<ResourceKind, u64> = BTreeMap::new();
        for view in &self.settlements {
            for (&resource, &quantity) in &view.inventory {
                let total = totals.entry(resource).or_insert(0);
                *total = total.saturating_add(quantity);
            }
        }
        self.total_resources = totals;
        self.health = self.assess_health(logistics);
        debug!(
            settlements = self.settlements.len(),
            overall_score = self.health.overall_score,
            "system state updated"
        );
    }

    fn resource_distribution(&self) -> DistributionLevel {
        let scores: Vec<f64> = self
            .total_resources
            .keys()
            .map(|&resource| {
                let spread: Vec<u64> = self
                    .settlements
                    .iter()
                    .map(|s| s.inventory.get(&resource).copied().unwrap_or(0))
                    .collect();
                distribution_score(&spread)
            })
            .collect();
        mean(&scores).map_or(DistributionLevel::Unknown, distribution_level)
    }

    #[allow(clippy::cast_precision_loss)]
    fn settlement_viability(&self) -> ViabilityLevel {
        if self.settlements.is_empty() {
            return ViabilityLevel::Unknown;
        }
        let count = self.settlements.len() as f64;
        let viable = self.settlements.iter().filter(|s| s.health > VIABLE_HEALTH).count() as f64;
        let critical = self
            .settlements
            .iter()
            .filter(|s| s.health < CRITICAL_HEALTH)
            .count() as f64;
        if critical / count > 0.3 {
            ViabilityLevel::Critical
        } else if viable / count > 0.7 {
            ViabilityLevel::Healthy
        } else if viable / count > 0.5 {
            ViabilityLevel::Concerning
        } else {
            ViabilityLevel::Unhealthy
        }
    }

    fn assess_health(&self, logistics: &LogisticsMetrics) -> SystemHealth {
        let economic: Vec<f64> = self.settlements.iter().map(|s| s.economic_health).collect();

        let resource_distribution = self.resource_distribution();
        let settlement_viability = self.settlement_viability();
        let economic_stability = mean(&economic).map_or(EconomicLevel::Unknown, economic_level);
        let logistical_efficiency = logistics_level(logistics);

        let overall_score = (distribution_points(resource_distribution)
            + viability_points(settlement_viability)
            + economic_points(economic_stability)
            + logistics_points(logistical_efficiency))
            / 4.0;

        SystemHealth {
            resource_distribution,
            settlement_viability,
            economic_stability,
            logistical_efficiency,
            overall_score,
        }
    }

    // -----------------------------------------------------------------------
    // Dependencies
    // -----------------------------------------------------------------------

    /// Rebuild the dependency map: which settlements could cover each gap,
    /// and which are already shipping to each settlement.
    pub fn analyze_dependencies(
        &mut self,
        registry: &SettlementRegistry,
        allocator: &ResourceAllocator,
        logistics: &LogisticsCoordinator,
    ) {
        let in_flight: InFlight = logistics.in_flight_incoming();
        let surpluses: Vec<(SettlementId, BTreeMap<ResourceKind, u64>)> = registry
            .iter()
            .map(|m| (m.id(), allocator.surplus(m.snapshot())))
            .collect();

        let mut dependencies = BTreeMap::new();
        for manager in registry.iter() {
            let resource: Vec<ResourceDependency> = allocator
                .gaps(manager.snapshot(), &in_flight)
                .into_iter()
                .filter_map(|gap| {
                    let providers: Vec<SettlementId> = surpluses
                        .iter()
                        .filter(|(id, surplus)| {
                            *id != manager.id()
                                && surplus.get(&gap.resource).is_some_and(|q| *q >= gap.quantity)
                        })
                        .map(|(id, _)| *id)
                        .collect();
                    (!providers.is_empty()).then_some(ResourceDependency {
                        resource: gap.resource,
                        providers,
                    })
                })
                .collect();

            let mut logistical: Vec<SettlementId> = Vec::new();
            for transfer in logistics.active_transfers() {
                if transfer.target == manager.id() && !logistical.contains(&transfer.source) {
                    logistical.push(transfer.source);
                }
            }

            if !resource.is_empty() || !logistical.is_empty() {
                dependencies.insert(
                    manager.id(),
                    SettlementDependencies {
                        resource,
                        logistical,
                    },
                );
            }
        }
        self.dependencies = dependencies;
    }

    // -----------------------------------------------------------------------
    // Objectives
    // -----------------------------------------------------------------------

    /// Objectives implied by the current health.
    pub fn generate_objectives(&self) -> Vec<StrategicObjective> {
        let mut objectives = Vec::new();
        if matches!(
            self.health.resource_distribution,
            DistributionLevel::Poor | DistributionLevel::Critical
        ) {
            objectives.push(StrategicObjective {
                objective_type: ObjectiveType::ResourceBalancing,
                priority: PriorityTier::High,
                description: "Even out resource stocks across settlements".to_owned(),
            });
        }
        if matches!(
            self.health.settlement_viability,
            ViabilityLevel::Critical | ViabilityLevel::Unhealthy
        ) {
            objectives.push(StrategicObjective {
                objective_type: ObjectiveType::SettlementSupport,
                priority: PriorityTier::Critical,
                description: "Support struggling settlements".to_owned(),
            });
        }
        if self.health.overall_score > EXPANSION_SCORE {
            objectives.push(StrategicObjective {
                objective_type: ObjectiveType::SystemExpansion,
                priority: PriorityTier::Medium,
                description: "Expand the settlement network".to_owned(),
            });
        }
        objectives
    }

    /// Fold objectives in, keeping one per type at the highest priority.
    pub fn merge_objectives(&mut self, objectives: Vec<StrategicObjective>) {
        for objective in objectives {
            match self
                .objectives
                .iter_mut()
                .find(|o| o.objective_type == objective.objective_type)
            {
                Some(existing) if objective.priority > existing.priority => *existing = objective,
                Some(_) => {}
                None => self.objectives.push(objective),
            }
        }
    }

    /// Drop everything recorded about a departed settlement.
    pub fn forget_settlement(&mut self, settlement: SettlementId) {
        self.dependencies.remove(&settlement);
        for deps in self.dependencies.values_mut() {
            deps.logistical.retain(|id| *id != settlement);
            for dependency in &mut deps.resource {
                dependency.providers.retain(|id| *id != settlement);
            }
            deps.resource.retain(|d| !d.providers.is_empty());
        }
    }
}

// ---------------------------------------------------------------------------
// Expansion coordination
// ---------------------------------------------------------------------------

/// Opportunities of the same kind on the same body compete.
fn conflicts_with(a: &Opportunity, b: &Opportunity) -> bool {
    a.kind == b.kind && a.body_id == b.body_id
}

/// Filter competing opportunities and hand each settlement its plans.
///
/// Opportunities are ranked by priority, then by how many others they
/// compete with (fewest first); the first of each competing group wins.
/// Every settlement that reported opportunities gets an entry, possibly
/// empty.
pub fn coordinate_expansion(
    opportunities: &[Opportunity],
) -> BTreeMap<SettlementId, Vec<ExpansionPlan>> {
    let mut ranked: Vec<(usize, &Opportunity)> = opportunities
        .iter()
        .map(|o| {
            let rivals = opportunities
                .iter()
                .filter(|other| conflicts_with(o, other))
                .count()
                .saturating_sub(1);
            (rivals, o)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.priority.cmp(&a.1.priority).then_with(|| a.0.cmp(&b.0)));

    let mut plans: BTreeMap<SettlementId, Vec<ExpansionPlan>> = opportunities
        .iter()
        .map(|o| (o.settlement_id, Vec::new()))
        .collect();
    let mut kept: Vec<&Opportunity> = Vec::new();
    for (_, opportunity) in ranked {
        if kept.iter().any(|k| conflicts_with(k, opportunity)) {
            continue;
        }
        kept.push(opportunity);
        plans
            .entry(opportunity.settlement_id)
            .or_default()
            .push(ExpansionPlan {
                kind: opportunity.kind,
                priority: opportunity.priority,
                resources_required: opportunity.resources_required.clone(),
                timeline: opportunity.timeline,
            });
    }
    plans
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Utc};
    use colonysim_types::{OpportunityKind, RouteClass, Timeline};
    use rust_decimal::Decimal;

    use super::*;
    use crate::allocation::TransferCandidate;
    use crate::analysis::tests::snapshot;
    use crate::config::{EconomyConfig, StrategyConfig};
    use crate::sequence::IdSequence;
    use crate::settlement::{InMemorySettlement, SettlementManager};

    fn quiet() -> LogisticsMetrics {
        LogisticsCoordinator::default().logistics_metrics()
    }

    fn manager(n: u64, inventory: &[(ResourceKind, u64)]) -> SettlementManager {
        let mut state = snapshot();
        state.id = SettlementId::from_sequence(n);
        state.inventory = inventory.iter().copied().collect();
        SettlementManager::new(
            Box::new(InMemorySettlement::new(state)),
            EconomyConfig::default(),
            StrategyConfig::default(),
        )
    }

    fn full() -> Vec<(ResourceKind, u64)> {
        vec![
            (ResourceKind::Energy, 100),
            (ResourceKind::Food, 100),
            (ResourceKind::Water, 100),
            (ResourceKind::Minerals, 100),
            (ResourceKind::Steel, 50),
            (ResourceKind::Electronics, 30),
        ]
    }

    fn registry(managers: Vec<SettlementManager>) -> SettlementRegistry {
        let mut registry = SettlementRegistry::new();
        for m in managers {
            registry.insert(m).unwrap();
        }
        registry
    }

    fn opportunity(
        n: u64,
        body: &str,
        kind: OpportunityKind,
        priority: PriorityTier,
    ) -> Opportunity {
        Opportunity {
            settlement_id: SettlementId::from_sequence(n),
            body_id: body.to_owned(),
            kind,
            priority,
            resources_required: Vec::new(),
            timeline: Timeline::ShortTerm,
        }
    }

    #[test]
    fn distribution_score_rewards_even_spread() {
        assert!((distribution_score(&[100, 100, 100]) - 1.0).abs() < 1e-9);
        assert!((distribution_score(&[0, 0]) - 1.0).abs() < 1e-9);
        // μ = 50, σ = 50
        assert!((distribution_score(&[0, 100]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fresh_state_reports_unknown_health() {
        let health = SystemState::new().health();
        assert_eq!(health.resource_distribution, DistributionLevel::Unknown);
        assert_eq!(health.logistical_efficiency, LogisticsLevel::Unknown);
        assert!((health.overall_score - 0.5).abs() < 1e-9);
        assert!((logistics_points(LogisticsLevel::Unknown) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_system_is_unknown() {
        let mut state = SystemState::new();
        state.update_system_state(&SettlementRegistry::new(), &quiet());
        let health = state.health();
        assert_eq!(health.resource_distribution, DistributionLevel::Unknown);
        assert_eq!(health.settlement_viability, ViabilityLevel::Unknown);
        assert_eq!(health.economic_stability, EconomicLevel::Unknown);
        assert_eq!(health.logistical_efficiency, LogisticsLevel::Efficient);
    }

    #[test]
    fn totals_and_health_follow_settlements() {
        let registry = registry(vec![manager(1, &full()), manager(2, &full())]);
        let mut state = SystemState::new();
        state.update_system_state(&registry, &quiet());

        assert_eq!(state.total_resources().get(&ResourceKind::Steel), Some(&100));
        let health = state.health();
        assert_eq!(health.resource_distribution, DistributionLevel::Excellent);
        assert_eq!(health.settlement_viability, ViabilityLevel::Healthy);
        assert!(health.overall_score > 0.0 && health.overall_score <= 1.0);
    }

    #[test]
    fn recompute_is_idempotent() {
        let registry = registry(vec![
            manager(1, &full()),
            manager(2, &[(ResourceKind::Water, 5)]),
        ]);
        let mut state = SystemState::new();
        state.update_system_state(&registry, &quiet());
        let first = state.clone();
        state.update_system_state(&registry, &quiet());
        assert_eq!(state, first);
    }

    #[test]
    fn poor_spread_and_weak_settlements_raise_objectives() {
        let registry = registry(vec![
            manager(1, &[(ResourceKind::Water, 1000)]),
            manager(2, &[]),
            manager(3, &[]),
            manager(4, &[]),
        ]);
        let mut state = SystemState::new();
        state.update_system_state(&registry, &quiet());
        let kinds: Vec<ObjectiveType> = state
            .generate_objectives()
            .into_iter()
            .map(|o| o.objective_type)
            .collect();
        assert!(kinds.contains(&ObjectiveType::ResourceBalancing));
        assert!(kinds.contains(&ObjectiveType::SettlementSupport));
        assert!(!kinds.contains(&ObjectiveType::SystemExpansion));
    }

    #[test]
    fn merge_keeps_highest_priority_per_type() {
        let mut state = SystemState::new();
        let objective = |priority| StrategicObjective {
            objective_type: ObjectiveType::ExploitOpportunity,
            priority,
            description: String::new(),
        };
        state.merge_objectives(vec![objective(PriorityTier::Medium)]);
        state.merge_objectives(vec![objective(PriorityTier::Critical)]);
        state.merge_objectives(vec![objective(PriorityTier::Low)]);
        assert_eq!(state.objectives().len(), 1);
        assert_eq!(state.objectives()[0].priority, PriorityTier::Critical);
    }

    #[test]
    fn dependencies_name_providers_and_inbound_routes() {
        let mut rich = full();
        rich.retain(|(r, _)| *r != ResourceKind::Water);
        rich.push((ResourceKind::Water, 400));
        let mut needy = full();
        needy.retain(|(r, _)| *r != ResourceKind::Water);
        needy.push((ResourceKind::Water, 10));
        let mut registry = registry(vec![manager(1, &needy), manager(2, &rich)]);

        let allocator = ResourceAllocator::default();
        let mut logistics = LogisticsCoordinator::default();
        let mut state = SystemState::new();
        state.analyze_dependencies(&registry, &allocator, &logistics);
        let deps = state.dependencies().get(&SettlementId::from_sequence(1)).unwrap();
        assert_eq!(deps.resource[0].resource, ResourceKind::Water);
        assert_eq!(deps.resource[0].providers, vec![SettlementId::from_sequence(2)]);
        assert!(deps.logistical.is_empty());

        let candidate = TransferCandidate {
            source: SettlementId::from_sequence(2),
            target: SettlementId::from_sequence(1),
            resource: ResourceKind::Water,
            quantity: 90,
            priority: PriorityTier::Critical,
            route_class: RouteClass::SameBody,
            cost: Decimal::ZERO,
        };
        logistics.optimize_and_schedule(
            vec![candidate],
            DateTime::<Utc>::UNIX_EPOCH,
            &mut registry,
            &mut IdSequence::new(),
        );
        state.analyze_dependencies(&registry, &allocator, &logistics);
        let deps = state.dependencies().get(&SettlementId::from_sequence(1)).unwrap();
        assert!(deps.resource.is_empty());
        assert_eq!(deps.logistical, vec![SettlementId::from_sequence(2)]);
    }

    #[test]
    fn competing_opportunities_keep_the_strongest() {
        let opportunities = vec![
            opportunity(1, "mars", OpportunityKind::SettlementExpansion, PriorityTier::Medium),
            opportunity(2, "mars", OpportunityKind::SettlementExpansion, PriorityTier::High),
            opportunity(1, "mars", OpportunityKind::SurplusExport, PriorityTier::Medium),
            opportunity(3, "luna", OpportunityKind::SettlementExpansion, PriorityTier::Medium),
        ];
        let plans = coordinate_expansion(&opportunities);

        let kinds = |n: u64| -> Vec<OpportunityKind> {
            plans[&SettlementId::from_sequence(n)].iter().map(|p| p.kind).collect()
        };
        assert_eq!(kinds(1), vec![OpportunityKind::SurplusExport]);
        assert_eq!(kinds(2), vec![OpportunityKind::SettlementExpansion]);
        assert_eq!(kinds(3), vec![OpportunityKind::SettlementExpansion]);
    }
}
