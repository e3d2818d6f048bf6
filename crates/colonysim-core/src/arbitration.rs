//! Priority arbitration of competing resource requests.
//!
//! Requests are grouped by resource and admitted against a per-resource
//! system limit, highest tier first. When a request does not fit:
//!
//! | Tier | Resolution |
//! |------|------------|
//! | low, medium | shrink to `remaining / requests_left`; delay if that is 0 |
//! | high | shrink to the remaining limit; delay if it is exhausted |
//! | critical | shrink to `remaining / criticals_left`; deny if that is 0 |
//!
//! Whenever the aggregate demand for a resource exceeds its limit a
//! `resource_over_allocation` [`Conflict`] is recorded (or refreshed, if one
//! is still open). Arbitration itself never fails.
//!
//! A settlement in crisis is treated as critical for the resources named in
//! the crisis until its deadline passes or the crisis is resolved.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use colonysim_types::{
    ArbitrationOutcome, Conflict, ConflictId, ConflictResolution, ConflictType, PriorityTier,
    ResourceKind, ResourceRequest, SettlementId, Severity,
};

use crate::config::ArbitrationConfig;
use crate::numeric::{floor_units, to_f64};
use crate::sequence::IdSequence;

/// One request after arbitration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArbitratedRequest {
    /// The request as submitted.
    pub request: ResourceRequest,
    /// Tier used for ordering, raised to critical during a crisis.
    pub effective_priority: PriorityTier,
    /// Units admitted; 0 unless admitted or reduced.
    pub granted: u64,
    /// What happened to the request.
    pub outcome: ArbitrationOutcome,
}

impl ArbitratedRequest {
    /// Whether any quantity was admitted.
    pub const fn is_admitted(&self) -> bool {
        matches!(
            self.outcome,
            ArbitrationOutcome::Admitted | ArbitrationOutcome::Reduced
        )
    }
}

/// Result of one arbitration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArbitrationReport {
    /// Every request considered, grouped by resource in priority order.
    pub decisions: Vec<ArbitratedRequest>,
    /// Conflicts created or refreshed by this pass.
    pub conflicts_recorded: Vec<ConflictId>,
    /// Over-allocation conflicts closed because demand now fits.
    pub conflicts_resolved: Vec<ConflictId>,
}

impl ArbitrationReport {
    /// Requests that were admitted in full or in part.
    pub fn admitted(&self) -> impl Iterator<Item = &ArbitratedRequest> {
        self.decisions.iter().filter(|d| d.is_admitted())
    }

    /// Admitted requests rewritten to their granted quantity and effective
    /// tier, ready for allocation.
    pub fn admitted_requests(&self) -> Vec<ResourceRequest> {
        self.admitted()
            .map(|d| ResourceRequest {
                quantity: d.granted,
                priority: d.effective_priority,
                ..d.request.clone()
            })
            .collect()
    }

    /// Requests with the given outcome.
    pub fn with_outcome(
        &self,
        outcome: ArbitrationOutcome,
    ) -> impl Iterator<Item = &ArbitratedRequest> {
        self.decisions.iter().filter(move |d| d.outcome == outcome)
    }

    /// Granted quantity per resource.
    pub fn granted_totals(&self) -> BTreeMap<ResourceKind, u64> {
        let mut totals: BTreeMap<ResourceKind, u64> = BTreeMap::new();
        for decision in self.admitted() {
            let total = totals.entry(decision.request.resource).or_insert(0);
            *total = total.saturating_add(decision.granted);
        }
        totals
    }
}

/// Share of system availability each tier may draw on in
/// [`PriorityArbitrator::can_grant_request`].
pub const fn availability_multiplier(priority: PriorityTier) -> f64 {
    match priority {
        PriorityTier::Critical => 1.0,
        PriorityTier::High => 0.9,
        PriorityTier::Medium => 0.7,
        PriorityTier::Low => 0.5,
    }
}

const fn severity_for(tier: PriorityTier) -> Severity {
    match tier {
        PriorityTier::Critical => Severity::Critical,
        PriorityTier::High => Severity::High,
        PriorityTier::Medium => Severity::Medium,
        PriorityTier::Low => Severity::Low,
    }
}

/// Resolves scarcity between requests and tracks conflicts and crises.
#[derive(Debug, Clone, Default)]
pub struct PriorityArbitrator {
    config: ArbitrationConfig,
    conflicts: BTreeMap<ConflictId, Conflict>,
    deferred: Vec<ResourceRequest>,
}

impl PriorityArbitrator {
    /// Create an arbitrator with the given limits.
    pub const fn new(config: ArbitrationConfig) -> Self {
        Self {
            config,
            conflicts: BTreeMap::new(),
            deferred: Vec::new(),
        }
    }

    /// Admission limit for `resource`.
    pub fn limit_for(&self, resource: ResourceKind) -> u64 {
        self.config.limit_for(resource)
    }

    /// Open conflicts, oldest first.
    pub fn conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values()
    }

    /// Number of open conflicts.
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Look up a conflict.
    pub fn conflict(&self, id: ConflictId) -> Option<&Conflict> {
        self.conflicts.get(&id)
    }

    /// Whether an open over-allocation conflict names `resource`.
    pub fn has_active_conflict(&self, resource: ResourceKind) -> bool {
        self.over_allocation_for(resource).is_some()
    }

    /// Requests delayed by the last pass, waiting to re-enter the next one.
    pub fn deferred(&self) -> &[ResourceRequest] {
        &self.deferred
    }

    fn over_allocation_for(&self, resource: ResourceKind) -> Option<ConflictId> {
        self.conflicts
            .values()
            .find(|c| {
                c.conflict_type == ConflictType::ResourceOverAllocation
                    && c.resources.contains(&resource)
            })
            .map(|c| c.id)
    }

    fn active_crisis(&self, settlement: SettlementId, now: DateTime<Utc>) -> Option<&Conflict> {
        self.conflicts.values().find(|c| {
            c.conflict_type == ConflictType::Crisis
                && c.settlements.contains(&settlement)
                && c.resolution_deadline.is_some_and(|deadline| now < deadline)
        })
    }

    // -----------------------------------------------------------------------
    // Crises
    // -----------------------------------------------------------------------

    /// Raise `settlement` to critical for `resources` until
    /// `now + crisis_window`. An open crisis for the same settlement is
    /// widened and its deadline pushed out instead of opening a second one.
    pub fn escalate_crisis(
        &mut self,
        settlement: SettlementId,
        resources: &[ResourceKind],
        now: DateTime<Utc>,
        ids: &mut IdSequence,
    ) -> ConflictId {
        let deadline = now
            .checked_add_signed(self.config.crisis_window())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let existing = self
            .conflicts
            .values_mut()
            .find(|c| c.conflict_type == ConflictType::Crisis && c.settlements.contains(&settlement));
        let id = if let Some(crisis) = existing {
            for resource in resources {
                if !crisis.resources.contains(resource) {
                    crisis.resources.push(*resource);
                }
            }
            crisis.resources.sort();
            crisis.resolution_deadline = Some(deadline);
            crisis.id
        } else {
            let mut crisis_resources = resources.to_vec();
            crisis_resources.sort();
            crisis_resources.dedup();
            let crisis = Conflict {
                id: ids.next_conflict(),
                conflict_type: ConflictType::Crisis,
                resources: crisis_resources,
                settlements: vec![settlement],
                severity: Severity::Critical,
                shortfall: 0,
                created_at: now,
                resolution_deadline: Some(deadline),
            };
            let id = crisis.id;
            self.conflicts.insert(id, crisis);
            id
        };

        warn!(
            settlement_id = %settlement,
            resources = ?resources,
            conflict_id = %id,
            deadline = %deadline,
            "crisis escalated"
        );
        id
    }

    /// Priority level of a settlement: critical while it has an open crisis
    /// whose deadline has not passed, medium otherwise.
    pub fn settlement_priority_level(
        &self,
        settlement: SettlementId,
        now: DateTime<Utc>,
    ) -> PriorityTier {
        if self.active_crisis(settlement, now).is_some() {
            PriorityTier::Critical
        } else {
            PriorityTier::Medium
        }
    }

    /// Tier a request is arbitrated at. Every request from a settlement in
    /// crisis counts as critical, whatever resource it asks for.
    pub fn effective_priority(&self, request: &ResourceRequest, now: DateTime<Utc>) -> PriorityTier {
        if self.active_crisis(request.settlement_id, now).is_some() {
            PriorityTier::Critical
        } else {
            request.priority
        }
    }

    /// Drop crises whose deadline has passed. Returns the expired IDs.
    pub fn expire_crises(&mut self, now: DateTime<Utc>) -> Vec<ConflictId> {
        let expired: Vec<ConflictId> = self
            .conflicts
            .values()
            .filter(|c| {
                c.conflict_type == ConflictType::Crisis
                    && c.resolution_deadline.is_some_and(|deadline| now >= deadline)
            })
            .map(|c| c.id)
            .collect();
        for id in &expired {
            self.conflicts.remove(id);
            info!(conflict_id = %id, "crisis expired");
        }
        expired
    }

    /// Close a conflict. Returns `false` if it is not open.
    pub fn resolve_conflict(&mut self, id: ConflictId, resolution: ConflictResolution) -> bool {
        let Some(conflict) = self.conflicts.remove(&id) else {
            return false;
        };
        match resolution {
            ConflictResolution::Reallocate => info!(
                conflict_id = %id,
                resources = ?conflict.resources,
                "conflict resolved by reallocation"
            ),
            ConflictResolution::Escalate => warn!(
                conflict_id = %id,
                resources = ?conflict.resources,
                "conflict escalated to the orchestrator"
            ),
            ConflictResolution::Delay => info!(
                conflict_id = %id,
                resources = ?conflict.resources,
                "conflicting requests delayed"
            ),
        }
        true
    }

    /// Whether `request` fits the share of `available` its tier may use.
    pub fn can_grant_request(&self, request: &ResourceRequest, available: u64) -> bool {
        let adjusted = floor_units(to_f64(available) * availability_multiplier(request.priority));
        request.quantity <= adjusted
    }

    /// Forget everything queued for a departed settlement.
    pub fn forget_settlement(&mut self, settlement: SettlementId) {
        self.deferred.retain(|r| r.settlement_id != settlement);
        self.conflicts.retain(|_, c| {
            !(c.conflict_type == ConflictType::Crisis && c.settlements == [settlement])
        });
    }

    // -----------------------------------------------------------------------
    // Arbitration
    // -----------------------------------------------------------------------

    /// Arbitrate this tick's requests together with last tick's delayed ones.
    ///
    /// A delayed request re-enters unless a fresh request for the same
    /// settlement and resource supersedes it. Requests delayed by this pass
    /// are kept for the next one.
    pub fn arbitrate(
        &mut self,
        requests: Vec<ResourceRequest>,
        now: DateTime<Utc>,
        ids: &mut IdSequence,
    ) -> ArbitrationReport {
        self.expire_crises(now);

        let deferred = core::mem::take(&mut self.deferred);
        let mut pending: Vec<ResourceRequest> = deferred
            .into_iter()
            .filter(|old| {
                !requests
                    .iter()
                    .any(|new| new.settlement_id == old.settlement_id && new.resource == old.resource)
            })
            .collect();
        pending.extend(requests);

        let mut by_resource: BTreeMap<ResourceKind, Vec<ResourceRequest>> = BTreeMap::new();
        for request in pending {
            by_resource.entry(request.resource).or_default().push(request);
        }

        let mut report = ArbitrationReport::default();
        for (resource, group) in by_resource {
            self.arbitrate_resource(resource, group, now, ids, &mut report);
        }

        self.deferred = report
            .with_outcome(ArbitrationOutcome::Delayed)
            .map(|d| d.request.clone())
            .collect();

        debug!(
            considered = report.decisions.len(),
            admitted = report.admitted().count(),
            delayed = self.deferred.len(),
            "arbitration complete"
        );
        report
    }

    fn arbitrate_resource(
        &mut self,
        resource: ResourceKind,
        group: Vec<ResourceRequest>,
        now: DateTime<Utc>,
        ids: &mut IdSequence,
        report: &mut ArbitrationReport,
    ) {
        let limit = self.limit_for(resource);

        let mut ranked: Vec<(PriorityTier, PriorityTier, ResourceRequest)> = group
            .into_iter()
            .map(|request| {
                let tier = self.effective_priority(&request, now);
                let level = self.settlement_priority_level(request.settlement_id, now);
                (tier, level, request)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        let demand = ranked
            .iter()
            .fold(0_u64, |acc, (_, _, r)| acc.saturating_add(r.quantity));
        let mut criticals_left = ranked
            .iter()
            .filter(|(tier, _, _)| *tier == PriorityTier::Critical)
            .count();
        let mut requests_left = ranked.len();
        let mut remaining = limit;
        let mut highest_cut: Option<PriorityTier> = None;

        for (tier, _, request) in ranked {
            let (granted, outcome) = if request.quantity <= remaining {
                (request.quantity, ArbitrationOutcome::Admitted)
            } else {
                highest_cut = highest_cut.max(Some(tier));
                shrink(tier, request.quantity, remaining, requests_left, criticals_left)
            };
            remaining = remaining.saturating_sub(granted);
            requests_left = requests_left.saturating_sub(1);
            if tier == PriorityTier::Critical {
                criticals_left = criticals_left.saturating_sub(1);
            }

            debug!(
                settlement_id = %request.settlement_id,
                resource = %resource,
                requested = request.quantity,
                granted,
                outcome = ?outcome,
                "request arbitrated"
            );
            report.decisions.push(ArbitratedRequest {
                request,
                effective_priority: tier,
                granted,
                outcome,
            });
        }

        let existing = self.over_allocation_for(resource);
        if demand > limit {
            let settlements = involved_settlements(&report.decisions, resource);
            let severity = severity_for(highest_cut.unwrap_or(PriorityTier::Low));
            let shortfall = demand.saturating_sub(limit);
            let id = if let Some(conflict) = existing.and_then(|id| self.conflicts.get_mut(&id)) {
                conflict.settlements = settlements;
                conflict.severity = severity;
                conflict.shortfall = shortfall;
                conflict.id
            } else {
                let conflict = Conflict {
                    id: ids.next_conflict(),
                    conflict_type: ConflictType::ResourceOverAllocation,
                    resources: vec![resource],
                    settlements,
                    severity,
                    shortfall,
                    created_at: now,
                    resolution_deadline: None,
                };
                let id = conflict.id;
                self.conflicts.insert(id, conflict);
                id
            };
            warn!(
                conflict_id = %id,
                resource = %resource,
                demand,
                limit,
                severity = ?severity,
                "resource over-allocation conflict recorded"
            );
            report.conflicts_recorded.push(id);
        } else if let Some(id) = existing {
            self.conflicts.remove(&id);
            info!(conflict_id = %id, resource = %resource, "over-allocation conflict resolved");
            report.conflicts_resolved.push(id);
        }
    }
}

/// Resolution for a request that does not fit the remaining limit.
fn shrink(
    tier: PriorityTier,
    requested: u64,
    remaining: u64,
    requests_left: usize,
    criticals_left: usize,
) -> (u64, ArbitrationOutcome) {
    let share_of = |count: usize| {
        let count = u64::try_from(count.max(1)).unwrap_or(u64::MAX);
        remaining.checked_div(count).unwrap_or(0).min(requested)
    };
    match tier {
        PriorityTier::Low | PriorityTier::Medium => match share_of(requests_left) {
            0 => (0, ArbitrationOutcome::Delayed),
            share => (share, ArbitrationOutcome::Reduced),
        },
        PriorityTier::High => match remaining.min(requested) {
            0 => (0, ArbitrationOutcome::Delayed),
            share => (share, ArbitrationOutcome::Reduced),
        },
        PriorityTier::Critical => match share_of(criticals_left) {
            0 => (0, ArbitrationOutcome::Denied),
            share => (share, ArbitrationOutcome::Reduced),
        },
    }
}

fn involved_settlements(
    decisions: &[ArbitratedRequest],
    resource: ResourceKind,
) -> Vec<SettlementId> {
    let mut settlements: Vec<SettlementId> = Vec::new();
    for decision in decisions.iter().filter(|d| d.request.resource == resource) {
        if !settlements.contains(&decision.request.settlement_id) {
            settlements.push(decision.request.settlement_id);
        }
    }
    settlements
}
