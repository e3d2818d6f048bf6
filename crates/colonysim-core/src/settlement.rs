//! Per-settlement facade over an external data provider.
//!
//! A [`SettlementProvider`] is the seam to whatever owns the settlement's
//! real state (a database, a game world, a test fixture). The core reads it
//! through [`SettlementProvider::snapshot`] and mutates it only through
//! [`SettlementProvider::credit`] and [`SettlementProvider::debit`].
//!
//! [`SettlementManager`] caches one snapshot per tick so every reader within
//! a tick sees the same values, and layers the settlement-level economics on
//! top: health, gap-driven resource requests, crisis detection, transfer
//! reservations, opportunity evaluation, and action selection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use colonysim_types::{
    ActionKind, Allocation, Capabilities, ExpansionPlan, Opportunity, OpportunityKind,
    PriorityTier, RequestError, ResourceKind, ResourceRequest, SettlementId, SettlementSnapshot,
    Timeline, TransferId,
};

use crate::analysis::{StateAnalysis, economic_health};
use crate::config::{EconomyConfig, SettlementSeed, StrategyConfig};
use crate::context::SharedContext;
use crate::numeric::{floor_units, ratio, to_f64, unit_interval};
use crate::sequence::IdSequence;
use crate::strategy::{ActionReceipt, Decision, StrategySelector};

/// Errors raised when a settlement's inventory cannot absorb a change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    /// The settlement holds less than the requested quantity.
    #[error("settlement {settlement} has {available} {resource}, needs {requested}")]
    Insufficient {
        /// Settlement whose stock fell short.
        settlement: SettlementId,
        /// Resource that fell short.
        resource: ResourceKind,
        /// Units asked for.
        requested: u64,
        /// Units actually held.
        available: u64,
    },

    /// Crediting would overflow the stock counter.
    #[error("settlement {settlement} cannot hold more {resource}")]
    Overflow {
        /// Settlement whose stock would overflow.
        settlement: SettlementId,
        /// Resource that would overflow.
        resource: ResourceKind,
    },
}

// ---------------------------------------------------------------------------
// Provider seam
// ---------------------------------------------------------------------------

/// Source of truth for one settlement's state.
///
/// `snapshot` must return identical data when called repeatedly without an
/// intervening `credit` or `debit`.
pub trait SettlementProvider: Send {
    /// Current state of the settlement.
    fn snapshot(&self) -> SettlementSnapshot;

    /// Add `quantity` units of `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Overflow`] if the stock cannot grow.
    fn credit(&mut self, resource: ResourceKind, quantity: u64) -> Result<(), InventoryError>;

    /// Remove `quantity` units of `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Insufficient`] if the stock is too small.
    fn debit(&mut self, resource: ResourceKind, quantity: u64) -> Result<(), InventoryError>;
}

/// A provider that keeps the settlement entirely in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemorySettlement {
    state: SettlementSnapshot,
}

impl InMemorySettlement {
    /// Wrap a snapshot.
    pub const fn new(state: SettlementSnapshot) -> Self {
        Self { state }
    }

    /// Build a settlement from a configuration seed.
    pub fn from_seed(id: SettlementId, seed: &SettlementSeed) -> Self {
        Self::new(SettlementSnapshot {
            id,
            name: seed.name.clone(),
            body: seed.body.clone(),
            inventory: seed.inventory.clone(),
            population: seed.population,
            population_capacity: seed.population_capacity,
            power_online: seed.power_online,
            production: seed.production.clone(),
            capabilities: seed.capabilities,
            location_advantage: seed.location_advantage,
            known_systems: seed.known_systems.clone(),
        })
    }

    /// Overwrite the stock of one resource, as an external event would.
    pub fn set_stock(&mut self, resource: ResourceKind, quantity: u64) {
        self.state.inventory.insert(resource, quantity);
    }
}

impl SettlementProvider for InMemorySettlement {
    fn snapshot(&self) -> SettlementSnapshot {
        self.state.clone()
    }

    fn credit(&mut self, resource: ResourceKind, quantity: u64) -> Result<(), InventoryError> {
        let settlement = self.state.id;
        let stock = self.state.inventory.entry(resource).or_insert(0);
        *stock = stock
            .checked_add(quantity)
            .ok_or(InventoryError::Overflow {
                settlement,
                resource,
            })?;
        Ok(())
    }

    fn debit(&mut self, resource: ResourceKind, quantity: u64) -> Result<(), InventoryError> {
        let available = self.state.stock(resource);
        let remaining = available
            .checked_sub(quantity)
            .ok_or(InventoryError::Insufficient {
                settlement: self.state.id,
                resource,
                requested: quantity,
                available,
            })?;
        self.state.inventory.insert(resource, remaining);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// The orchestrator's handle on one settlement.
pub struct SettlementManager {
    provider: Box<dyn SettlementProvider>,
    snapshot: SettlementSnapshot,
    economy: EconomyConfig,
    strategy: StrategySelector,
    reservations: BTreeMap<TransferId, BTreeMap<ResourceKind, u64>>,
    expansion_plans: Vec<ExpansionPlan>,
}

impl core::fmt::Debug for SettlementManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SettlementManager")
            .field("id", &self.snapshot.id)
            .field("name", &self.snapshot.name)
            .field("reservations", &self.reservations.len())
            .field("expansion_plans", &self.expansion_plans.len())
            .finish_non_exhaustive()
    }
}

impl SettlementManager {
    /// Wrap a provider. The first snapshot is taken immediately.
    pub fn new(
        provider: Box<dyn SettlementProvider>,
        economy: EconomyConfig,
        strategy: StrategyConfig,
    ) -> Self {
        let snapshot = provider.snapshot();
        Self {
            provider,
            snapshot,
            economy,
            strategy: StrategySelector::new(strategy),
            reservations: BTreeMap::new(),
            expansion_plans: Vec::new(),
        }
    }

    /// Settlement identifier.
    pub const fn id(&self) -> SettlementId {
        self.snapshot.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.snapshot.name
    }

    /// Cached snapshot for the current tick.
    pub const fn snapshot(&self) -> &SettlementSnapshot {
        &self.snapshot
    }

    /// Re-read the provider. Called once at the start of each tick and
    /// after every inventory change the manager makes.
    pub fn refresh(&mut self) {
        self.snapshot = self.provider.snapshot();
    }

    /// Current inventory, net of reserved transfer stock.
    pub const fn settlement_resources(&self) -> &BTreeMap<ResourceKind, u64> {
        &self.snapshot.inventory
    }

    /// Capability flags.
    pub const fn capabilities(&self) -> Capabilities {
        self.snapshot.capabilities
    }

    /// Health in `[0, 1]`: the mean of habitat pressure and resource
    /// sufficiency.
    ///
    /// Habitat pressure is 1 while the population fits its capacity and
    /// falls as the settlement overcrowds; an empty settlement scores 0.
    /// Resource sufficiency is the mean of `min(stock / optimal, 1)` over
    /// every tracked resource.
    pub fn settlement_health(&self) -> f64 {
        let habitat = if self.snapshot.population == 0 {
            0.0
        } else {
            ratio(self.snapshot.population_capacity, self.snapshot.population).min(1.0)
        };
        let levels = &self.economy.optimal_levels;
        let sufficiency = if levels.is_empty() {
            1.0
        } else {
            let total: f64 = levels
                .iter()
                .map(|(&resource, &optimal)| {
                    if optimal == 0 {
                        1.0
                    } else {
                        ratio(self.snapshot.stock(resource), optimal).min(1.0)
                    }
                })
                .sum();
            total / to_f64(u64::try_from(levels.len()).unwrap_or(u64::MAX))
        };
        unit_interval((habitat + sufficiency) / 2.0)
    }

    /// Energy balance and population health, as the analyzer computes it.
    pub fn economic_health(&self) -> f64 {
        economic_health(&self.snapshot)
    }

    /// Full strategic analysis of the cached snapshot.
    pub fn analysis(&self) -> StateAnalysis {
        self.strategy.analyzer().analyze(&self.snapshot)
    }

    /// Tier and shortfall for every tracked resource below its optimal
    /// level, most urgent first.
    ///
    /// Below `critical_ratio` of optimal is critical, below `gap_ratio` high,
    /// and anything else under optimal medium.
    pub fn current_priorities(&self) -> Vec<(ResourceKind, PriorityTier, u64)> {
        let mut priorities: Vec<(ResourceKind, PriorityTier, u64)> = self
            .economy
            .optimal_levels
            .iter()
            .filter_map(|(&resource, &optimal)| {
                let stock = self.snapshot.stock(resource);
                let shortfall = optimal.checked_sub(stock).filter(|s| *s > 0)?;
                let fill = ratio(stock, optimal);
                let tier = if fill < self.economy.critical_ratio {
                    PriorityTier::Critical
                } else if fill < self.economy.gap_ratio {
                    PriorityTier::High
                } else {
                    PriorityTier::Medium
                };
                Some((resource, tier, shortfall))
            })
            .collect();
        priorities.sort_by(|a, b| b.1.cmp(&a.1));
        priorities
    }

    /// Requests for this tick: one per tracked resource under its optimal
    /// level, plus low-tier stockpile requests up to the surplus line when
    /// the settlement is able to expand.
    pub fn collect_resource_requests(
        &self,
        ids: &mut IdSequence,
        now: DateTime<Utc>,
    ) -> Vec<ResourceRequest> {
        let mut wanted: Vec<(ResourceKind, PriorityTier, u64)> = self.current_priorities();

        if self.snapshot.capabilities.can_expand {
            for (&resource, &optimal) in &self.economy.optimal_levels {
                let stock = self.snapshot.stock(resource);
                if stock < optimal {
                    continue;
                }
                let ceiling = floor_units(to_f64(optimal) * self.economy.surplus_ratio);
                if let Some(extra) = ceiling.checked_sub(stock).filter(|e| *e > 0) {
                    wanted.push((resource, PriorityTier::Low, extra));
                }
            }
        }

        wanted
            .into_iter()
            .filter_map(|(resource, priority, quantity)| {
                self.file_request(ids, now, resource, priority, quantity)
            })
            .collect()
    }

    fn file_request(
        &self,
        ids: &mut IdSequence,
        now: DateTime<Utc>,
        resource: ResourceKind,
        priority: PriorityTier,
        quantity: u64,
    ) -> Option<ResourceRequest> {
        match ResourceRequest::new(ids.next_request(), self.id(), resource, quantity, priority, now) {
            Ok(request) => Some(request),
            Err(err) => {
                warn!(
                    settlement_id = %self.id(),
                    resource = %resource,
                    quantity,
                    error = %err,
                    "resource request rejected"
                );
                None
            }
        }
    }

    /// Life-support resources whose stock has fallen below the crisis line.
    pub fn detect_crisis(&self) -> Vec<ResourceKind> {
        ResourceKind::LIFE_SUPPORT
            .into_iter()
            .filter(|&resource| {
                self.economy.optimal_level(resource).is_some_and(|optimal| {
                    to_f64(self.snapshot.stock(resource))
                        < to_f64(optimal) * self.economy.crisis_ratio
                })
            })
            .collect()
    }

    /// Credit an allocation to the settlement.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] if the provider rejects the credit.
    pub fn execute_resource_allocation(
        &mut self,
        allocation: &Allocation,
    ) -> Result<(), InventoryError> {
        self.provider
            .credit(allocation.resource, allocation.quantity)?;
        self.refresh();
        debug!(
            settlement_id = %self.id(),
            resource = %allocation.resource,
            quantity = allocation.quantity,
            "allocation applied"
        );
        Ok(())
    }

    /// Credit a delivered shipment.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] if the provider rejects a credit; earlier
    /// resources of the shipment stay credited.
    pub fn receive_resources(
        &mut self,
        resources: &BTreeMap<ResourceKind, u64>,
    ) -> Result<(), InventoryError> {
        let outcome = resources
            .iter()
            .try_for_each(|(&resource, &quantity)| self.provider.credit(resource, quantity));
        self.refresh();
        outcome
    }

    /// Take `resources` out of the inventory and hold them for a transfer.
    /// All or nothing: on failure nothing stays debited.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Insufficient`] if the provider's actual
    /// stock cannot cover the reservation.
    pub fn reserve_resources(
        &mut self,
        transfer_id: TransferId,
        resources: &BTreeMap<ResourceKind, u64>,
    ) -> Result<(), InventoryError> {
        let actual = self.provider.snapshot();
        for (&resource, &requested) in resources {
            let available = actual.stock(resource);
            if available < requested {
                return Err(InventoryError::Insufficient {
                    settlement: actual.id,
                    resource,
                    requested,
                    available,
                });
            }
        }

        let mut debited: Vec<(ResourceKind, u64)> = Vec::with_capacity(resources.len());
        for (&resource, &quantity) in resources {
            if let Err(err) = self.provider.debit(resource, quantity) {
                for (resource, quantity) in debited {
                    if let Err(undo) = self.provider.credit(resource, quantity) {
                        warn!(settlement_id = %self.id(), error = %undo, "rollback credit failed");
                    }
                }
                self.refresh();
                return Err(err);
            }
            debited.push((resource, quantity));
        }

        self.reservations.insert(transfer_id, resources.clone());
        self.refresh();
        Ok(())
    }

    /// Return a cancelled transfer's reservation to the inventory.
    pub fn release_resources(
        &mut self,
        transfer_id: TransferId,
    ) -> Option<BTreeMap<ResourceKind, u64>> {
        let held = self.reservations.remove(&transfer_id)?;
        for (&resource, &quantity) in &held {
            if let Err(err) = self.provider.credit(resource, quantity) {
                warn!(settlement_id = %self.id(), error = %err, "release credit failed");
            }
        }
        self.refresh();
        Some(held)
    }

    /// Forget a delivered transfer's reservation; the stock has left.
    pub fn complete_reservation(
        &mut self,
        transfer_id: TransferId,
    ) -> Option<BTreeMap<ResourceKind, u64>> {
        self.reservations.remove(&transfer_id)
    }

    /// Units currently held for outgoing transfers.
    pub fn reserved_total(&self) -> BTreeMap<ResourceKind, u64> {
        let mut totals: BTreeMap<ResourceKind, u64> = BTreeMap::new();
        for held in self.reservations.values() {
            for (&resource, &quantity) in held {
                let total = totals.entry(resource).or_insert(0);
                *total = total.saturating_add(quantity);
            }
        }
        totals
    }

    /// Opportunities this settlement could pursue.
    pub fn evaluate_opportunities(&self) -> Vec<Opportunity> {
        let mut opportunities = Vec::new();
        let body_id = self.snapshot.body.id.clone();

        let surplus: Vec<ResourceKind> = self
            .economy
            .optimal_levels
            .iter()
            .filter(|&(&resource, &optimal)| {
                to_f64(self.snapshot.stock(resource)) > to_f64(optimal) * self.economy.surplus_ratio
            })
            .map(|(&resource, _)| resource)
            .collect();
        if !surplus.is_empty() {
            opportunities.push(Opportunity {
                settlement_id: self.id(),
                body_id: body_id.clone(),
                kind: OpportunityKind::SurplusExport,
                priority: PriorityTier::Medium,
                resources_required: surplus,
                timeline: Timeline::Immediate,
            });
        }

        let analysis = self.analysis();
        let capabilities = self.snapshot.capabilities;
        if capabilities.can_expand
            && self
                .strategy
                .is_viable(ActionKind::SettlementExpansion, &analysis)
            && analysis.expansion_readiness >= self.expansion_candidate_readiness()
        {
            let requirements = self
                .strategy
                .scorer()
                .resource_requirements(ActionKind::SettlementExpansion);
            opportunities.push(Opportunity {
                settlement_id: self.id(),
                body_id: body_id.clone(),
                kind: OpportunityKind::SettlementExpansion,
                priority: PriorityTier::High,
                resources_required: requirements.into_keys().collect(),
                timeline: Timeline::ShortTerm,
            });
        }

        if capabilities.can_scout && !analysis.scouting_opportunities.high_value.is_empty() {
            opportunities.push(Opportunity {
                settlement_id: self.id(),
                body_id,
                kind: OpportunityKind::SystemScouting,
                priority: PriorityTier::Medium,
                resources_required: vec![ResourceKind::Energy],
                timeline: Timeline::LongTerm,
            });
        }

        opportunities
    }

    fn expansion_candidate_readiness(&self) -> f64 {
        self.strategy.config().expansion_candidate_readiness
    }

    /// Replace the settlement's expansion plans.
    pub fn update_expansion_plans(&mut self, plans: Vec<ExpansionPlan>) {
        debug!(settlement_id = %self.id(), plans = plans.len(), "expansion plans updated");
        self.expansion_plans = plans;
    }

    /// Current expansion plans.
    pub fn expansion_plans(&self) -> &[ExpansionPlan] {
        &self.expansion_plans
    }

    /// Choose the settlement's next action.
    pub fn evaluate_next_action(&self) -> Decision {
        self.strategy.evaluate_next_action(&self.snapshot)
    }

    /// Hand a chosen action to external collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] if a resource request is rejected.
    pub fn execute_action(
        &self,
        decision: &Decision,
        context: &mut SharedContext,
    ) -> Result<ActionReceipt, RequestError> {
        self.strategy.execute(decision, self.id(), context)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Settlement managers in registration order.
#[derive(Debug, Default)]
pub struct SettlementRegistry {
    managers: Vec<SettlementManager>,
}

impl SettlementRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            managers: Vec::new(),
        }
    }

    /// Add a manager. Returns the manager back if its ID is already taken.
    ///
    /// # Errors
    ///
    /// Returns the rejected manager when a settlement with the same ID is
    /// already registered.
    pub fn insert(&mut self, manager: SettlementManager) -> Result<(), Box<SettlementManager>> {
        if self.contains(manager.id()) {
            return Err(Box::new(manager));
        }
        self.managers.push(manager);
        Ok(())
    }

    /// Remove a manager, keeping the order of the rest.
    pub fn remove(&mut self, id: SettlementId) -> Option<SettlementManager> {
        let index = self.managers.iter().position(|m| m.id() == id)?;
        Some(self.managers.remove(index))
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: SettlementId) -> bool {
        self.managers.iter().any(|m| m.id() == id)
    }

    /// Look up a manager.
    pub fn get(&self, id: SettlementId) -> Option<&SettlementManager> {
        self.managers.iter().find(|m| m.id() == id)
    }

    /// Look up a manager mutably.
    pub fn get_mut(&mut self, id: SettlementId) -> Option<&mut SettlementManager> {
        self.managers.iter_mut().find(|m| m.id() == id)
    }

    /// Managers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SettlementManager> {
        self.managers.iter()
    }

    /// Managers in registration order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SettlementManager> {
        self.managers.iter_mut()
    }

    /// Registered IDs in registration order.
    pub fn ids(&self) -> Vec<SettlementId> {
        self.managers.iter().map(SettlementManager::id).collect()
    }

    /// Number of registered settlements.
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Whether no settlement is registered.
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}
