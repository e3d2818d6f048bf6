//! Per-settlement action selection.
//!
//! The [`StrategySelector`] turns a [`StateAnalysis`] into candidate actions,
//! scores them with the [`MissionScorer`], re-checks each against the
//! viability thresholds, and returns a [`Decision`]. Executing a decision
//! only hands work to external collaborators through the
//! [`SharedContext`]: resource requests for acquisition, queued missions
//! for everything else.

use serde::Serialize;
use tracing::{debug, info};

use colonysim_types::{
    ActionKind, Capabilities, InfrastructureKind, MissionId, PriorityTier, RequestError,
    RequestId, ResourceKind, SettlementId, SettlementSnapshot,
};

use crate::analysis::{ScoutingTarget, StateAnalysis, StateAnalyzer};
use crate::config::StrategyConfig;
use crate::context::{MissionDraft, SharedContext};
use crate::scoring::{MissionScorer, ScoredAction, capability_for};

// ---------------------------------------------------------------------------
// Candidate actions
// ---------------------------------------------------------------------------

/// What a candidate action would do, one variant per action kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPlan {
    /// Acquire the listed resources.
    ResourceAcquisition {
        /// Resources to acquire.
        resources: Vec<ResourceKind>,
    },
    /// Scout the listed systems.
    SystemScouting {
        /// Systems to scout.
        systems: Vec<ScoutingTarget>,
    },
    /// Found a new settlement.
    SettlementExpansion,
    /// Build the listed infrastructure.
    InfrastructureBuilding {
        /// Infrastructure to build.
        infrastructure: Vec<InfrastructureKind>,
    },
}

impl ActionPlan {
    /// The action kind of this plan.
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::ResourceAcquisition { .. } => ActionKind::ResourceAcquisition,
            Self::SystemScouting { .. } => ActionKind::SystemScouting,
            Self::SettlementExpansion => ActionKind::SettlementExpansion,
            Self::InfrastructureBuilding { .. } => ActionKind::InfrastructureBuilding,
        }
    }
}

/// One option a settlement could pursue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateAction {
    /// What the action does.
    pub plan: ActionPlan,
    /// How pressing it is.
    pub priority: PriorityTier,
    /// Why it was proposed.
    pub rationale: String,
}

impl CandidateAction {
    fn new(plan: ActionPlan, priority: PriorityTier, rationale: &str) -> Self {
        Self {
            plan,
            priority,
            rationale: rationale.to_owned(),
        }
    }

    /// The action kind.
    pub const fn kind(&self) -> ActionKind {
        self.plan.kind()
    }
}

/// Outcome of one selection round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The best candidate that passed the viability re-check and whose
    /// prerequisites are all met.
    Selected(ScoredAction),
    /// The best viable candidate; some prerequisite still has to be met.
    NeedsPreparation(ScoredAction),
    /// No candidate was viable; the highest scored one is returned anyway.
    BestAvailable(ScoredAction),
    /// There was nothing to do.
    Wait,
}

impl Decision {
    /// The chosen action, if any.
    pub const fn action(&self) -> Option<&ScoredAction> {
        match self {
            Self::Selected(action)
            | Self::NeedsPreparation(action)
            | Self::BestAvailable(action) => Some(action),
            Self::Wait => None,
        }
    }

    /// Kind of the chosen action, or `None` for [`Decision::Wait`].
    pub fn kind(&self) -> Option<ActionKind> {
        self.action().map(|a| a.candidate.kind())
    }

    /// Score of the chosen action; 0 for [`Decision::Wait`].
    pub fn score(&self) -> f64 {
        self.action().map_or(0.0, ScoredAction::score)
    }

    /// Short label used in logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Selected(_) => "selected",
            Self::NeedsPreparation(_) => "needs_preparation",
            Self::BestAvailable(_) => "best_available",
            Self::Wait => "wait",
        }
    }
}

/// Work handed to external collaborators by [`StrategySelector::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReceipt {
    /// Context resource requests were filed.
    Requested(Vec<RequestId>),
    /// A mission was queued.
    Queued(MissionId),
    /// Nothing was handed off.
    Idle,
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Chooses the next action for one settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySelector {
    analyzer: StateAnalyzer,
    scorer: MissionScorer,
    config: StrategyConfig,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(StrategyConfig::default())
    }
}

impl StrategySelector {
    /// Create a selector with the given thresholds.
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            analyzer: StateAnalyzer::new(&config),
            scorer: MissionScorer::new(),
            config,
        }
    }

    /// The analyzer used by this selector.
    pub const fn analyzer(&self) -> &StateAnalyzer {
        &self.analyzer
    }

    /// The thresholds used by this selector.
    pub const fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// The scorer used by this selector.
    pub const fn scorer(&self) -> &MissionScorer {
        &self.scorer
    }

    /// Analyze `snapshot` and choose its next action.
    pub fn evaluate_next_action(&self, snapshot: &SettlementSnapshot) -> Decision {
        let analysis = self.analyzer.analyze(snapshot);
        let decision = self.select(snapshot.capabilities, &analysis);
        info!(
            settlement_id = %snapshot.id,
            decision = decision.label(),
            action = ?decision.kind(),
            score = decision.score(),
            "action selected"
        );
        decision
    }

    /// Enumerate candidate actions. Capability flags gate which kinds may
    /// appear at all.
    pub fn candidates(
        &self,
        capabilities: Capabilities,
        analysis: &StateAnalysis,
    ) -> Vec<CandidateAction> {
        let mut candidates = Vec::new();
        let needs = &analysis.resource_needs;

        if !needs.critical.is_empty() {
            candidates.push(CandidateAction::new(
                ActionPlan::ResourceAcquisition {
                    resources: needs.critical.clone(),
                },
                PriorityTier::Critical,
                "critical resource shortage",
            ));
        }
        if !needs.needed.is_empty() {
            candidates.push(CandidateAction::new(
                ActionPlan::ResourceAcquisition {
                    resources: needs.needed.clone(),
                },
                PriorityTier::High,
                "resource optimization",
            ));
        }

        let scouting = &analysis.scouting_opportunities;
        if capabilities.can_scout && !scouting.high_value.is_empty() {
            candidates.push(CandidateAction::new(
                ActionPlan::SystemScouting {
                    systems: scouting.high_value.clone(),
                },
                PriorityTier::High,
                "high-value exploration opportunity",
            ));
        }
        if capabilities.can_scout && !scouting.strategic.is_empty() {
            candidates.push(CandidateAction::new(
                ActionPlan::SystemScouting {
                    systems: scouting.strategic.clone(),
                },
                PriorityTier::Medium,
                "strategic expansion planning",
            ));
        }

        if capabilities.can_expand
            && analysis.expansion_readiness >= self.config.expansion_candidate_readiness
        {
            candidates.push(CandidateAction::new(
                ActionPlan::SettlementExpansion,
                PriorityTier::High,
                "settlement ready for expansion",
            ));
        }

        let infrastructure = &analysis.infrastructure_needs;
        if capabilities.can_build && !infrastructure.critical.is_empty() {
            candidates.push(CandidateAction::new(
                ActionPlan::InfrastructureBuilding {
                    infrastructure: infrastructure.critical.clone(),
                },
                PriorityTier::Critical,
                "critical infrastructure required",
            ));
        }
        if capabilities.can_build && !infrastructure.needed.is_empty() {
            candidates.push(CandidateAction::new(
                ActionPlan::InfrastructureBuilding {
                    infrastructure: infrastructure.needed.clone(),
                },
                PriorityTier::Medium,
                "infrastructure for growth",
            ));
        }

        candidates
    }

    /// Whether the settlement can realistically carry out `kind`.
    pub fn is_viable(&self, kind: ActionKind, analysis: &StateAnalysis) -> bool {
        let threshold = match kind {
            ActionKind::ResourceAcquisition => self.config.acquisition_threshold,
            ActionKind::SystemScouting => self.config.scouting_threshold,
            ActionKind::SettlementExpansion => self.config.expansion_threshold,
            ActionKind::InfrastructureBuilding => self.config.building_threshold,
        };
        capability_for(kind, analysis) >= threshold
    }

    /// Score the candidates and pick one: the best viable candidate that can
    /// start now, else the best viable one, else the best of the rest.
    pub fn select(&self, capabilities: Capabilities, analysis: &StateAnalysis) -> Decision {
        let candidates = self.candidates(capabilities, analysis);
        let mut ranked = self.scorer.prioritize(candidates, analysis);
        for scored in &ranked {
            debug!(
                action = ?scored.candidate.kind(),
                priority = %scored.candidate.priority,
                score = scored.score(),
                net_benefit = scored.mission.net_benefit,
                ready = scored.can_execute_now(),
                "candidate scored"
            );
        }

        if let Some(index) = ranked
            .iter()
            .position(|s| s.can_execute_now() && self.is_viable(s.candidate.kind(), analysis))
        {
            return Decision::Selected(ranked.swap_remove(index));
        }
        if let Some(index) = ranked
            .iter()
            .position(|s| self.is_viable(s.candidate.kind(), analysis))
        {
            let viable = ranked.swap_remove(index);
            let unmet: Vec<&str> = viable.mission.dependencies.unmet.iter().map(|d| d.name).collect();
            debug!(
                action = ?viable.candidate.kind(),
                unmet = ?unmet,
                "viable action needs preparation"
            );
            return Decision::NeedsPreparation(viable);
        }
        ranked
            .into_iter()
            .next()
            .map_or(Decision::Wait, Decision::BestAvailable)
    }

    /// Hand the chosen action to external collaborators. Work the settlement
    /// already has open (a pending request for the same resource, a queued or
    /// active mission of the same kind) is reused rather than filed again.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] if a resource request is rejected, which
    /// only happens when the acquisition quantity is configured as zero.
    pub fn execute(
        &self,
        decision: &Decision,
        settlement: SettlementId,
        context: &mut SharedContext,
    ) -> Result<ActionReceipt, RequestError> {
        let Some(action) = decision.action() else {
            return Ok(ActionReceipt::Idle);
        };
        let candidate = &action.candidate;

        if let ActionPlan::ResourceAcquisition { resources } = &candidate.plan {
            let mut ids = Vec::with_capacity(resources.len());
            for &resource in resources {
                let id = match context.pending_request_from(settlement, resource) {
                    Some(open) => open,
                    None => context.request_resource(
                        Some(settlement),
                        resource,
                        self.config.acquisition_quantity,
                        candidate.priority,
                    )?,
                };
                ids.push(id);
            }
            return Ok(ActionReceipt::Requested(ids));
        }

        if let Some(open) = context.open_mission(settlement, candidate.kind()) {
            debug!(settlement_id = %settlement, mission_id = %open, "mission already open");
            return Ok(ActionReceipt::Queued(open));
        }

        let draft = MissionDraft {
            settlement_id: Some(settlement),
            kind: candidate.kind(),
            description: describe(&candidate.plan),
            estimated_duration_days: self.scorer.estimate_duration_days(&candidate.plan),
            resource_requirements: self.scorer.resource_requirements(candidate.kind()),
        };
        Ok(ActionReceipt::Queued(context.queue_mission(draft)))
    }
}

fn describe(plan: &ActionPlan) -> String {
    match plan {
        ActionPlan::ResourceAcquisition { resources } => {
            let names: Vec<&str> = resources.iter().map(|r| r.as_str()).collect();
            format!("acquire {}", names.join(", "))
        }
        ActionPlan::SystemScouting { systems } => {
            let names: Vec<&str> = systems.iter().map(|s| s.system_id.as_str()).collect();
            format!("scout {}", names.join(", "))
        }
        ActionPlan::SettlementExpansion => "found a new settlement".to_owned(),
        ActionPlan::InfrastructureBuilding { infrastructure } => {
            format!("build {infrastructure:?}")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use colonysim_types::EstimatedValue;

    use super::*;
    use crate::analysis::{InfrastructureNeeds, ResourceNeeds, ScoutingOpportunities};

    fn all_capabilities() -> Capabilities {
        Capabilities {
            can_scout: true,
            can_build: true,
            can_expand: true,
        }
    }

    fn quiet_analysis() -> StateAnalysis {
        StateAnalysis {
            resource_needs: ResourceNeeds::default(),
            scouting_opportunities: ScoutingOpportunities::default(),
            expansion_readiness: 0.2,
            infrastructure_needs: InfrastructureNeeds::default(),
            acquisition_capability: 0.8,
            scouting_capability: 0.8,
            building_capability: 0.8,
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

    /// Population 95/100, energy output above 2000, economic health 0.8.
    fn ready_to_expand() -> StateAnalysis {
        StateAnalysis {
            expansion_readiness: 0.95f64.mul_add(0.4, 0.3 + 0.8 * 0.3),
            economic_health: 0.8,
            ..quiet_analysis()
        }
    }

    #[test]
    fn nothing_to_do_waits() {
        let decision = StrategySelector::default().select(all_capabilities(), &quiet_analysis());
        assert_eq!(decision, Decision::Wait);
        assert!(decision.score().abs() < f64::EPSILON);
    }

    #[test]
    fn ready_settlement_selects_expansion() {
        let selector = StrategySelector::default();
        let analysis = ready_to_expand();
        assert!(analysis.expansion_readiness >= 0.8);

        let candidates = selector.candidates(all_capabilities(), &analysis);
        assert!(
            candidates
                .iter()
                .any(|c| c.kind() == ActionKind::SettlementExpansion)
        );
        let decision = selector.select(all_capabilities(), &analysis);
        assert!(matches!(decision, Decision::Selected(_)));
        assert_eq!(decision.kind(), Some(ActionKind::SettlementExpansion));
    }

    #[test]
    fn capability_flags_gate_candidates() {
        let selector = StrategySelector::default();
        let analysis = ready_to_expand();
        let candidates = selector.candidates(Capabilities::default(), &analysis);
        assert!(candidates.is_empty());
    }

    #[test]
    fn non_viable_top_falls_back_to_viable() {
        let selector = StrategySelector::default();
        let mut analysis = quiet_analysis();
        analysis.resource_needs.critical.push(ResourceKind::Water);
        analysis.acquisition_capability = 0.1;
        analysis.scouting_opportunities.strategic.push(ScoutingTarget {
            system_id: "gate".to_owned(),
            estimated_value: EstimatedValue::Low,
        });

        let decision = selector.select(all_capabilities(), &analysis);
        assert!(matches!(decision, Decision::Selected(_)));
        assert_eq!(decision.kind(), Some(ActionKind::SystemScouting));
    }

    #[test]
    fn nothing_viable_returns_best_available() {
        let selector = StrategySelector::default();
        let mut analysis = quiet_analysis();
        analysis.resource_needs.critical.push(ResourceKind::Water);
        analysis.acquisition_capability = 0.1;

        let decision = selector.select(all_capabilities(), &analysis);
        assert!(matches!(decision, Decision::BestAvailable(_)));
        assert_eq!(decision.kind(), Some(ActionKind::ResourceAcquisition));
    }

    #[test]
    fn ready_action_beats_unready_higher_score() {
        let selector = StrategySelector::default();
        let mut analysis = ready_to_expand();
        analysis.reserves.remove(&ResourceKind::Food);
        analysis.resource_needs.needed.push(ResourceKind::Steel);

        let ranked = selector
            .scorer()
            .prioritize(selector.candidates(all_capabilities(), &analysis), &analysis);
        assert_eq!(ranked.len(), 2);
        let top = ranked.first().unwrap();
        assert_eq!(top.candidate.kind(), ActionKind::SettlementExpansion);
        assert!(!top.can_execute_now());

        let decision = selector.select(all_capabilities(), &analysis);
        assert!(matches!(decision, Decision::Selected(_)));
        assert_eq!(decision.kind(), Some(ActionKind::ResourceAcquisition));
    }

    #[test]
    fn viable_but_unready_needs_preparation() {
        let selector = StrategySelector::default();
        let mut analysis = ready_to_expand();
        analysis.reserves.insert(ResourceKind::Water, 10);

        let decision = selector.select(all_capabilities(), &analysis);
        assert!(matches!(decision, Decision::NeedsPreparation(_)));
        assert_eq!(decision.label(), "needs_preparation");
        let unmet: Vec<&str> = decision
            .action()
            .unwrap()
            .mission
            .dependencies
            .unmet
            .iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(unmet, vec!["water"]);
    }

    #[test]
    fn acquisition_files_context_requests() {
        let selector = StrategySelector::default();
        let mut analysis = quiet_analysis();
        analysis.resource_needs.needed = vec![ResourceKind::Steel, ResourceKind::Titanium];
        let decision = selector.select(all_capabilities(), &analysis);

        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);
        let colony = SettlementId::from_sequence(1);
        let receipt = selector.execute(&decision, colony, &mut context).unwrap();
        assert!(matches!(receipt, ActionReceipt::Requested(ref ids) if ids.len() == 2));
        assert!(
            context
                .pending_requests()
                .all(|r| r.quantity == 100 && r.requester == Some(colony))
        );
    }

    #[test]
    fn expansion_queues_mission() {
        let selector = StrategySelector::default();
        let decision = selector.select(all_capabilities(), &ready_to_expand());
        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);
        let receipt = selector
            .execute(&decision, SettlementId::from_sequence(1), &mut context)
            .unwrap();
        assert!(matches!(receipt, ActionReceipt::Queued(_)));
        let mission = context.dequeue_mission().unwrap();
        assert_eq!(mission.kind, ActionKind::SettlementExpansion);
        assert_eq!(mission.estimated_duration_days, 30);
    }

    #[test]
    fn repeated_execution_reuses_open_work() {
        let selector = StrategySelector::default();
        let colony = SettlementId::from_sequence(1);
        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);

        let mut analysis = quiet_analysis();
        analysis.resource_needs.needed = vec![ResourceKind::Steel];
        let acquire = selector.select(all_capabilities(), &analysis);
        let first = selector.execute(&acquire, colony, &mut context).unwrap();
        let second = selector.execute(&acquire, colony, &mut context).unwrap();
        assert_eq!(first, second);
        assert_eq!(context.pending_requests().count(), 1);

        let expand = selector.select(all_capabilities(), &ready_to_expand());
        let first = selector.execute(&expand, colony, &mut context).unwrap();
        let second = selector.execute(&expand, colony, &mut context).unwrap();
        assert_eq!(first, second);
        assert_eq!(context.queued_missions().count(), 1);

        let other = SettlementId::from_sequence(2);
        selector.execute(&expand, other, &mut context).unwrap();
        assert_eq!(context.queued_missions().count(), 2);
    }

    #[test]
    fn wait_executes_nothing() {
        let mut context = SharedContext::new(DateTime::<Utc>::UNIX_EPOCH);
        let receipt = StrategySelector::default()
            .execute(&Decision::Wait, SettlementId::from_sequence(1), &mut context)
            .unwrap();
        assert_eq!(receipt, ActionReceipt::Idle);
        assert_eq!(context.queued_missions().count(), 0);
    }
}
