//! Multi-factor desirability scoring for candidate actions.
//!
//! ```text
//! score = base(kind)
//!       * priority_multiplier
//!       * strategic_modifier
//!       * risk_modifier
//!       * capability_modifier
//!       * urgency_modifier        clamped to [0, 100]
//! ```
//!
//! Every factor is reported in a [`ScoreBreakdown`] so selection decisions
//! can be logged and tested factor by factor.
//!
//! Alongside the score, [`MissionScorer::analyze`] weighs expected value
//! against cost and risk, predicts the chance of success, and checks the
//! action's prerequisites. A [`DependencyCheck`] with unmet entries means
//! the action cannot run yet.

use std::collections::BTreeMap;

use serde::Serialize;

use colonysim_types::{ActionKind, EstimatedValue, InfrastructureKind, PriorityTier, ResourceKind};

use crate::analysis::StateAnalysis;
use crate::numeric::to_f64;
use crate::strategy::{ActionPlan, CandidateAction};

/// Upper bound of the score range.
pub const MAX_SCORE: f64 = 100.0;

/// Share of `probability * severity` that the risk modifier deducts.
const RISK_WEIGHT: f64 = 0.3;

/// Base desirability of an action kind, before any modifier.
pub const fn base_score(kind: ActionKind) -> f64 {
    match kind {
        ActionKind::ResourceAcquisition => 40.0,
        ActionKind::SystemScouting => 35.0,
        ActionKind::SettlementExpansion => 50.0,
        ActionKind::InfrastructureBuilding => 45.0,
    }
}

/// Multiplier applied for the candidate's priority tier.
pub const fn priority_multiplier(priority: PriorityTier) -> f64 {
    match priority {
        PriorityTier::Critical => 3.0,
        PriorityTier::High => 2.0,
        PriorityTier::Medium => 1.5,
        PriorityTier::Low => 1.0,
    }
}

/// Chance of failure and how bad a failure would be.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskAnalysis {
    /// Probability the action fails, in `[0, 1]`.
    pub failure_probability: f64,
    /// Cost of a failure, in `[0, 1]`.
    pub consequence_severity: f64,
}

impl RiskAnalysis {
    /// Combined risk, `probability * severity`.
    pub fn risk_score(&self) -> f64 {
        self.failure_probability * self.consequence_severity
    }

    /// Score multiplier derived from the risk.
    pub fn modifier(&self) -> f64 {
        1.0 - self.risk_score() * RISK_WEIGHT
    }
}

/// Every factor that went into a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Base value for the action kind.
    pub base: f64,
    /// Priority tier multiplier.
    pub priority_multiplier: f64,
    /// Adjustment for the action's strategic fit.
    pub strategic_modifier: f64,
    /// Deduction for the chance and cost of failure.
    pub risk_modifier: f64,
    /// Adjustment for how capable the settlement is at this action.
    pub capability_modifier: f64,
    /// Boost for pressing needs.
    pub urgency_modifier: f64,
    /// Product of all factors, clamped to `[0, 100]`.
    pub score: f64,
}

/// What a prerequisite measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// A capability score.
    Capability,
    /// A technology level.
    Technology,
    /// A stock of some resource.
    Resource,
}

/// One prerequisite of an action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dependency {
    /// What is measured.
    pub kind: DependencyKind,
    /// Short name for logs.
    pub name: &'static str,
    /// Level or amount required.
    pub required: f64,
    /// Level or amount on hand.
    pub current: f64,
}

impl Dependency {
    const fn level(kind: DependencyKind, name: &'static str, required: f64, current: f64) -> Self {
        Self {
            kind,
            name,
            required,
            current,
        }
    }

    fn stock(resource: ResourceKind, required: u64, analysis: &StateAnalysis) -> Self {
        Self {
            kind: DependencyKind::Resource,
            name: resource.as_str(),
            required: to_f64(required),
            current: to_f64(analysis.reserve(resource)),
        }
    }

    /// Whether the settlement already meets it.
    pub fn is_met(&self) -> bool {
        self.current >= self.required
    }
}

/// Prerequisites of an action and which of them are still open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyCheck {
    /// Every prerequisite.
    pub dependencies: Vec<Dependency>,
    /// Prerequisites not yet met.
    pub unmet: Vec<Dependency>,
}

impl DependencyCheck {
    /// Whether the action can start this tick.
    pub fn can_execute_now(&self) -> bool {
        self.unmet.is_empty()
    }

    /// Unmet capability prerequisites; these need preparation rather than
    /// a delivery.
    pub fn blocking(&self) -> impl Iterator<Item = &Dependency> {
        self.unmet
            .iter()
            .filter(|d| d.kind == DependencyKind::Capability)
    }

    fn satisfaction(&self) -> f64 {
        if self.unmet.is_empty() { 1.0 } else { 0.0 }
    }
}

/// Coarse ranking of an analysed mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Final score at most 10.
    LowPriority,
    /// Final score above 10.
    MediumPriority,
    /// Final score above 25.
    HighPriority,
}

/// Value, cost, and risk of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionAnalysis {
    /// Payoff if the mission succeeds.
    pub value: f64,
    /// Resources and time spent on it.
    pub cost: f64,
    /// Failure probability and severity.
    pub risk: RiskAnalysis,
    /// Predicted chance of success, in `[0.05, 0.95]`.
    pub success_probability: f64,
    /// Prerequisites.
    pub dependencies: DependencyCheck,
    /// Expected value minus risk-weighted cost.
    pub net_benefit: f64,
    /// Net benefit shifted positive, discounted for risk and success, plus
    /// a priority bonus.
    pub final_score: f64,
    /// Ranking derived from the final score.
    pub recommendation: Recommendation,
}

/// A candidate together with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAction {
    /// The candidate that was scored.
    pub candidate: CandidateAction,
    /// How the score was reached.
    pub breakdown: ScoreBreakdown,
    /// Value, cost, risk, and prerequisites.
    pub mission: MissionAnalysis,
}

impl ScoredAction {
    /// The final score.
    pub const fn score(&self) -> f64 {
        self.breakdown.score
    }

    /// Whether every prerequisite is already met.
    pub fn can_execute_now(&self) -> bool {
        self.mission.dependencies.can_execute_now()
    }
}

/// Stateless scorer for candidate actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissionScorer;

impl MissionScorer {
    /// Create a scorer.
    pub const fn new() -> Self {
        Self
    }

    /// Score a candidate, in `[0, 100]`.
    pub fn score(&self, candidate: &CandidateAction, analysis: &StateAnalysis) -> f64 {
        self.breakdown(candidate, analysis).score
    }

    /// Score a candidate and report every factor.
    pub fn breakdown(&self, candidate: &CandidateAction, analysis: &StateAnalysis) -> ScoreBreakdown {
        let kind = candidate.kind();
        let base = base_score(kind);
        let priority_multiplier = priority_multiplier(candidate.priority);
        let strategic_modifier = strategic_modifier(candidate, analysis);
        let risk_modifier = self.risk(kind, analysis).modifier();
        let capability_modifier = capability_modifier(capability_for(kind, analysis));
        let urgency_modifier = urgency_modifier(kind, analysis);

        let raw = base
            * priority_multiplier
            * strategic_modifier
            * risk_modifier
            * capability_modifier
            * urgency_modifier;

        ScoreBreakdown {
            base,
            priority_multiplier,
            strategic_modifier,
            risk_modifier,
            capability_modifier,
            urgency_modifier,
            score: raw.clamp(0.0, MAX_SCORE),
        }
    }

    /// Failure probability and severity for an action kind.
    ///
    /// | Kind | Failure probability | Severity |
    /// |------|---------------------|----------|
    /// | resource acquisition | 0.3 if acquisition < 0.5, else 0.1 | 0.6 |
    /// | system scouting | 0.4 if scouting < 0.6, else 0.15 | 0.4 |
    /// | settlement expansion | 0.5 if readiness < 0.7, else 0.2 | 0.8 |
    /// | infrastructure building | 0.35 if building < 0.6, else 0.1 | 0.7 |
    pub fn risk(&self, kind: ActionKind, analysis: &StateAnalysis) -> RiskAnalysis {
        let (failure_probability, consequence_severity) = match kind {
            ActionKind::ResourceAcquisition => (
                if analysis.acquisition_capability < 0.5 { 0.3 } else { 0.1 },
                0.6,
            ),
            ActionKind::SystemScouting => (
                if analysis.scouting_capability < 0.6 { 0.4 } else { 0.15 },
                0.4,
            ),
            ActionKind::SettlementExpansion => (
                if analysis.expansion_readiness < 0.7 { 0.5 } else { 0.2 },
                0.8,
            ),
            ActionKind::InfrastructureBuilding => (
                if analysis.building_capability < 0.6 { 0.35 } else { 0.1 },
                0.7,
            ),
        };
        RiskAnalysis {
            failure_probability,
            consequence_severity,
        }
    }

    /// Prerequisites of a candidate, checked against the analysis.
    pub fn dependencies(&self, candidate: &CandidateAction, analysis: &StateAnalysis) -> DependencyCheck {
        use DependencyKind::{Capability, Technology};

        let dependencies = match &candidate.plan {
            ActionPlan::ResourceAcquisition { resources } => {
                let mut deps = vec![Dependency::level(
                    Capability,
                    "basic_operations",
                    0.3,
                    analysis.economic_health,
                )];
                if resources.contains(&ResourceKind::Titanium) {
                    deps.push(Dependency::level(
                        Technology,
                        "mining_tech",
                        0.5,
                        analysis.acquisition_capability,
                    ));
                }
                deps
            }
            ActionPlan::SystemScouting { .. } => vec![
                Dependency::level(Capability, "scouting_capability", 0.4, analysis.scouting_capability),
                Dependency::stock(ResourceKind::Energy, 20, analysis),
            ],
            ActionPlan::SettlementExpansion => vec![
                Dependency::level(Capability, "expansion_readiness", 0.6, analysis.expansion_readiness),
                Dependency::stock(ResourceKind::Food, 50, analysis),
                Dependency::stock(ResourceKind::Water, 40, analysis),
            ],
            ActionPlan::InfrastructureBuilding { .. } => vec![
                Dependency::level(Capability, "building_resources", 0.5, analysis.building_capability),
                Dependency::stock(ResourceKind::Steel, 30, analysis),
                Dependency::level(Technology, "construction_tech", 0.6, analysis.building_capability),
            ],
        };
        let unmet = dependencies.iter().filter(|d| !d.is_met()).copied().collect();
        DependencyCheck {
            dependencies,
            unmet,
        }
    }

    /// Payoff of a candidate if it succeeds.
    pub fn value(&self, plan: &ActionPlan, analysis: &StateAnalysis) -> f64 {
        match plan {
            ActionPlan::ResourceAcquisition { resources } => {
                resources.iter().map(|&r| resource_value(r)).sum()
            }
            ActionPlan::SystemScouting { systems } => systems
                .iter()
                .map(|s| match s.estimated_value {
                    EstimatedValue::High | EstimatedValue::PrizeWorld => 150.0,
                    EstimatedValue::Medium => 120.0,
                    EstimatedValue::Low => 50.0,
                })
                .sum(),
            ActionPlan::SettlementExpansion => analysis.expansion_readiness.mul_add(50.0, 200.0),
            ActionPlan::InfrastructureBuilding { infrastructure } => infrastructure
                .iter()
                .map(|i| match i {
                    InfrastructureKind::PowerGrid => 120.0,
                    InfrastructureKind::HabitationExpansion => 100.0,
                })
                .sum(),
        }
    }

    /// Resources and time a candidate consumes, in value units.
    pub fn cost(&self, plan: &ActionPlan) -> f64 {
        let per_item = |each: f64, items: usize| each * to_f64(u64::try_from(items).unwrap_or(u64::MAX));
        match plan {
            ActionPlan::ResourceAcquisition { resources } => per_item(20.0, resources.len()) + 10.0,
            ActionPlan::SystemScouting { systems } => per_item(30.0, systems.len()) + 15.0,
            ActionPlan::SettlementExpansion => 80.0 + 40.0 + 25.0,
            ActionPlan::InfrastructureBuilding { infrastructure } => {
                per_item(50.0 + 30.0, infrastructure.len()) + 20.0
            }
        }
    }

    /// Predicted chance of success: base rate, capability, economic footing,
    /// complexity, and prerequisites multiplied, clamped to `[0.05, 0.95]`.
    pub fn success_probability(
        &self,
        kind: ActionKind,
        analysis: &StateAnalysis,
        dependencies: &DependencyCheck,
    ) -> f64 {
        let (base, complexity, footing) = match kind {
            ActionKind::ResourceAcquisition => {
                (0.85, 0.95, if analysis.economic_health > 0.3 { 1.0 } else { 0.6 })
            }
            ActionKind::SystemScouting => {
                (0.75, 0.90, if analysis.economic_health > 0.4 { 1.0 } else { 0.7 })
            }
            ActionKind::SettlementExpansion => {
                (0.70, 0.85, if analysis.economic_health > 0.6 { 1.0 } else { 0.5 })
            }
            ActionKind::InfrastructureBuilding => {
                (0.80, 0.88, if analysis.building_capability > 0.5 { 1.0 } else { 0.6 })
            }
        };
        let capability = capability_for(kind, analysis).max(0.1);
        (base * capability * footing * complexity * dependencies.satisfaction()).clamp(0.05, 0.95)
    }

    /// Weigh a candidate's value against its cost and risk.
    pub fn analyze(&self, candidate: &CandidateAction, analysis: &StateAnalysis) -> MissionAnalysis {
        let kind = candidate.kind();
        let value = self.value(&candidate.plan, analysis);
        let cost = self.cost(&candidate.plan);
        let risk = self.risk(kind, analysis);
        let dependencies = self.dependencies(candidate, analysis);
        let success_probability = self.success_probability(kind, analysis, &dependencies);

        let net_benefit = value.mul_add(success_probability, -(cost * (1.0 + risk.risk_score())));
        let discounted = (net_benefit + 150.0).max(10.0) * risk.modifier();
        let final_score = discounted.mul_add(success_probability, priority_bonus(candidate.priority));
        let recommendation = if final_score > 25.0 {
            Recommendation::HighPriority
        } else if final_score > 10.0 {
            Recommendation::MediumPriority
        } else {
            Recommendation::LowPriority
        };

        MissionAnalysis {
            value,
            cost,
            risk,
            success_probability,
            dependencies,
            net_benefit,
            final_score,
            recommendation,
        }
    }

    /// Estimated mission length in simulated days.
    pub fn estimate_duration_days(&self, plan: &ActionPlan) -> u32 {
        let per_item = |base: u32, each: u32, items: usize| {
            let items = u32::try_from(items).unwrap_or(u32::MAX);
            base.saturating_add(each.saturating_mul(items))
        };
        match plan {
            ActionPlan::ResourceAcquisition { resources } => per_item(5, 2, resources.len()),
            ActionPlan::SystemScouting { systems } => per_item(10, 5, systems.len()),
            ActionPlan::SettlementExpansion => 30,
            ActionPlan::InfrastructureBuilding { infrastructure } => {
                per_item(15, 10, infrastructure.len())
            }
        }
    }

    /// Resources an action consumes when it is launched.
    pub fn resource_requirements(&self, kind: ActionKind) -> BTreeMap<ResourceKind, u64> {
        match kind {
            ActionKind::ResourceAcquisition => BTreeMap::from([(ResourceKind::Energy, 10)]),
            ActionKind::SystemScouting => BTreeMap::from([(ResourceKind::Energy, 20)]),
            ActionKind::SettlementExpansion => BTreeMap::from([
                (ResourceKind::Energy, 50),
                (ResourceKind::Food, 30),
                (ResourceKind::Water, 25),
                (ResourceKind::Steel, 40),
            ]),
            ActionKind::InfrastructureBuilding => {
                BTreeMap::from([(ResourceKind::Energy, 30), (ResourceKind::Steel, 50)])
            }
        }
    }

    /// Score every candidate and order them best first. Equal scores keep
    /// their generation order.
    pub fn prioritize(
        &self,
        candidates: Vec<CandidateAction>,
        analysis: &StateAnalysis,
    ) -> Vec<ScoredAction> {
        let mut scored: Vec<ScoredAction> = candidates
            .into_iter()
            .map(|candidate| {
                let breakdown = self.breakdown(&candidate, analysis);
                let mission = self.analyze(&candidate, analysis);
                ScoredAction {
                    candidate,
                    breakdown,
                    mission,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score().total_cmp(&a.score()));
        scored
    }
}

/// The capability score that governs an action kind.
pub const fn capability_for(kind: ActionKind, analysis: &StateAnalysis) -> f64 {
    match kind {
        ActionKind::ResourceAcquisition => analysis.acquisition_capability,
        ActionKind::SystemScouting => analysis.scouting_capability,
        ActionKind::SettlementExpansion => analysis.expansion_readiness,
        ActionKind::InfrastructureBuilding => analysis.building_capability,
    }
}

fn strategic_modifier(candidate: &CandidateAction, analysis: &StateAnalysis) -> f64 {
    let priority = candidate.priority;
    match candidate.kind() {
        ActionKind::ResourceAcquisition => {
            let mut modifier = 1.0;
            if priority == PriorityTier::Critical {
                modifier *= 1.5;
            }
            if analysis.economic_health > 0.8 {
                modifier *= 0.8;
            }
            modifier
        }
        ActionKind::SystemScouting => {
            let mut modifier = 1.0;
            if priority == PriorityTier::High {
                modifier *= 1.3;
            }
            if analysis.expansion_readiness > 0.7 {
                modifier *= 1.2;
            }
            modifier
        }
        ActionKind::SettlementExpansion => analysis.expansion_readiness + 0.5,
        ActionKind::InfrastructureBuilding => {
            if priority == PriorityTier::Critical { 1.4 } else { 1.0 }
        }
    }
}

const fn resource_value(resource: ResourceKind) -> f64 {
    match resource {
        ResourceKind::Energy => 100.0,
        ResourceKind::Food | ResourceKind::Water => 80.0,
        ResourceKind::Steel | ResourceKind::Titanium => 60.0,
        _ => 40.0,
    }
}

const fn priority_bonus(priority: PriorityTier) -> f64 {
    match priority {
        PriorityTier::Critical => 50.0,
        PriorityTier::High => 30.0,
        PriorityTier::Medium => 10.0,
        PriorityTier::Low => 0.0,
    }
}

fn capability_modifier(capability: f64) -> f64 {
    if capability > 0.7 {
        1.1
    } else if capability > 0.3 {
        1.0
    } else {
        0.9
    }
}

fn urgency_modifier(kind: ActionKind, analysis: &StateAnalysis) -> f64 {
    let needs = &analysis.resource_needs;
    match kind {
        ActionKind::ResourceAcquisition => {
            if !needs.critical.is_empty() {
                1.3
            } else if !needs.needed.is_empty() {
                1.1
            } else {
                1.0
            }
        }
        ActionKind::InfrastructureBuilding => {
            if analysis.infrastructure_needs.critical.is_empty() { 1.0 } else { 1.4 }
        }
        ActionKind::SystemScouting => {
            if analysis.scouting_opportunities.high_value.is_empty() { 1.0 } else { 1.2 }
        }
        ActionKind::SettlementExpansion => {
            if analysis.expansion_readiness > 0.9 { 1.2 } else { 1.0 }
        }
    }
}

#[cfg(test)]
mod tests {
    use colonysim_types::InfrastructureKind;

    use super::*;
    use crate::analysis::{InfrastructureNeeds, ResourceNeeds, ScoutingOpportunities};

    fn analysis() -> StateAnalysis {
        StateAnalysis {
            resource_needs: ResourceNeeds::default(),
            scouting_opportunities: ScoutingOpportunities::default(),
            expansion_readiness: 0.5,
            infrastructure_needs: InfrastructureNeeds::default(),
            acquisition_capability: 0.5,
            scouting_capability: 0.5,
            building_capability: 0.5,
            economic_health: 0.5,
            strategic_position: 0.5,
            reserves: BTreeMap::from([
                (ResourceKind::Energy, 100),
                (ResourceKind::Food, 100),
                (ResourceKind::Water, 100),
                (ResourceKind::Steel, 100),
            ]),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn candidate(plan: ActionPlan, priority: PriorityTier) -> CandidateAction {
        CandidateAction {
            plan,
            priority,
            rationale: "test".to_owned(),
        }
    }

    #[test]
    fn low_priority_resource_acquisition() {
        let action = candidate(
            ActionPlan::ResourceAcquisition {
                resources: vec![ResourceKind::Steel],
            },
            PriorityTier::Low,
        );
        let breakdown = MissionScorer::new().breakdown(&action, &analysis());
        // 40 * 1.0 * 1.0 * (1 - 0.1 * 0.6 * 0.3) * 1.0 * 1.0
        assert!(close(breakdown.risk_modifier, 0.982));
        assert!(close(breakdown.score, 39.28));
    }

    #[test]
    fn critical_infrastructure_is_boosted() {
        let mut state = analysis();
        state.infrastructure_needs.critical.push(InfrastructureKind::PowerGrid);
        state.building_capability = 0.2;
        let action = candidate(
            ActionPlan::InfrastructureBuilding {
                infrastructure: vec![InfrastructureKind::PowerGrid],
            },
            PriorityTier::Medium,
        );
        let breakdown = MissionScorer::new().breakdown(&action, &state);
        assert!(close(breakdown.strategic_modifier, 1.0));
        assert!(close(breakdown.capability_modifier, 0.9));
        assert!(close(breakdown.urgency_modifier, 1.4));
        let expected = 45.0 * 1.5 * (1.0 - 0.35 * 0.7 * 0.3) * 0.9 * 1.4;
        assert!(close(breakdown.score, expected));
    }

    #[test]
    fn score_is_clamped() {
        let mut state = analysis();
        state.expansion_readiness = 0.95;
        let action = candidate(ActionPlan::SettlementExpansion, PriorityTier::Critical);
        let breakdown = MissionScorer::new().breakdown(&action, &state);
        assert!(close(breakdown.score, MAX_SCORE));
        assert!(close(breakdown.strategic_modifier, 1.45));
    }

    #[test]
    fn risk_table() {
        let scorer = MissionScorer::new();
        let mut state = analysis();
        state.expansion_readiness = 0.6;
        let risk = scorer.risk(ActionKind::SettlementExpansion, &state);
        assert!(close(risk.risk_score(), 0.4));
        state.scouting_capability = 0.8;
        let risk = scorer.risk(ActionKind::SystemScouting, &state);
        assert!(close(risk.failure_probability, 0.15));
    }

    #[test]
    fn acquisition_value_cost_and_risk() {
        let action = candidate(
            ActionPlan::ResourceAcquisition {
                resources: vec![ResourceKind::Steel],
            },
            PriorityTier::Low,
        );
        let mission = MissionScorer::new().analyze(&action, &analysis());
        assert!(close(mission.value, 60.0));
        assert!(close(mission.cost, 30.0));
        // 0.85 * 0.5 * 1.0 * 0.95
        assert!(close(mission.success_probability, 0.40375));
        assert!(close(mission.net_benefit, 60.0 * 0.40375 - 30.0 * 1.06));
        assert!(mission.dependencies.can_execute_now());
        assert_eq!(mission.recommendation, Recommendation::HighPriority);
    }

    #[test]
    fn unmet_prerequisite_floors_success() {
        let action = candidate(ActionPlan::SettlementExpansion, PriorityTier::High);
        let mission = MissionScorer::new().analyze(&action, &analysis());

        assert!(!mission.dependencies.can_execute_now());
        let blocking: Vec<&str> = mission.dependencies.blocking().map(|d| d.name).collect();
        assert_eq!(blocking, vec!["expansion_readiness"]);
        assert!(close(mission.success_probability, 0.05));
        assert!(close(mission.value, 225.0));
        // max(-191.75 + 150, 10) * (1 - 0.4 * 0.3) * 0.05 + 30
        assert!(close(mission.final_score, 30.44));
    }

    #[test]
    fn building_needs_steel_and_tech() {
        let mut state = analysis();
        state.reserves.insert(ResourceKind::Steel, 10);
        let action = candidate(
            ActionPlan::InfrastructureBuilding {
                infrastructure: vec![InfrastructureKind::PowerGrid],
            },
            PriorityTier::Medium,
        );
        let check = MissionScorer::new().dependencies(&action, &state);
        let unmet: Vec<(DependencyKind, &str)> =
            check.unmet.iter().map(|d| (d.kind, d.name)).collect();
        assert_eq!(
            unmet,
            vec![
                (DependencyKind::Resource, "steel"),
                (DependencyKind::Technology, "construction_tech"),
            ]
        );
        assert_eq!(check.blocking().count(), 0);
    }

    #[test]
    fn durations_scale_with_targets() {
        let scorer = MissionScorer::new();
        let plan = ActionPlan::ResourceAcquisition {
            resources: vec![ResourceKind::Energy, ResourceKind::Water],
        };
        assert_eq!(scorer.estimate_duration_days(&plan), 9);
        assert_eq!(
            scorer.estimate_duration_days(&ActionPlan::SettlementExpansion),
            30
        );
        let plan = ActionPlan::InfrastructureBuilding {
            infrastructure: vec![InfrastructureKind::PowerGrid],
        };
        assert_eq!(scorer.estimate_duration_days(&plan), 25);
    }

    #[test]
    fn expansion_requirements() {
        let requirements =
            MissionScorer::new().resource_requirements(ActionKind::SettlementExpansion);
        assert_eq!(requirements.get(&ResourceKind::Steel), Some(&40));
        assert_eq!(requirements.values().sum::<u64>(), 145);
    }

    #[test]
    fn prioritize_is_stable_on_ties() {
        let first = candidate(
            ActionPlan::ResourceAcquisition {
                resources: vec![ResourceKind::Steel],
            },
            PriorityTier::Low,
        );
        let second = candidate(
            ActionPlan::ResourceAcquisition {
                resources: vec![ResourceKind::Titanium],
            },
            PriorityTier::Low,
        );
        let best = candidate(ActionPlan::SettlementExpansion, PriorityTier::High);
        let ranked = MissionScorer::new().prioritize(
            vec![first.clone(), second.clone(), best.clone()],
            &analysis(),
        );
        let order: Vec<&CandidateAction> = ranked.iter().map(|s| &s.candidate).collect();
        assert_eq!(order, vec![&best, &first, &second]);
    }
}
