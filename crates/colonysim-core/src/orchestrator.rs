//! Top-level tick driver.
//!
//! One [`SystemOrchestrator::orchestrate_system`] call is one tick. Each
//! phase finishes before the next one reads its output:
//!
//! 1. Advance the clock and move shipments along
//! 2. Refresh settlements and recompute the system state
//! 3. Analyze dependencies
//! 4. Collect requests and detect crises
//! 5. Arbitrate, allocate, and apply allocations
//! 6. Discover and schedule transfers
//! 7. Recompute state, merge objectives, coordinate expansion
//! 8. Let each settlement choose and hand off its next action
//! 9. Process deferred events (crises, opportunities, departures)
//! 10. Verify allocation conservation
//!
//! Settlements are always visited in registration order, and every ID and
//! timestamp comes from the simulated clock and the context's ID sequence,
//! so identical input produces identical output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use colonysim_ledger::{AuditLedger, ConservationResult, LedgerError};
use colonysim_types::{
    ConflictId, ConflictResolution, ObjectiveType, Opportunity, PriorityTier, ResourceKind,
    SettlementId, StrategicObjective, SystemEvent, SystemStatus, Transfer, TransferId,
};

use crate::allocation::ResourceAllocator;
use crate::arbitration::PriorityArbitrator;
use crate::clock::{ClockError, SimClock};
use crate::config::{EconomyConfig, SimulationConfig, StrategyConfig};
use crate::context::{EventListener, ListenerId, SharedContext};
use crate::logistics::{LogisticsCoordinator, LogisticsError, TransferProgress};
use crate::settlement::{SettlementManager, SettlementProvider, SettlementRegistry};
use crate::strategy::Decision;
use crate::system_state::{SystemState, coordinate_expansion};

/// Errors raised by orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The simulated clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// An audit record was rejected.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// A transfer operation was rejected.
    #[error("logistics error: {source}")]
    Logistics {
        /// The underlying logistics error.
        #[from]
        source: LogisticsError,
    },

    /// A settlement with this ID is already registered.
    #[error("settlement {id} is already registered")]
    DuplicateSettlement {
        /// The rejected settlement.
        id: SettlementId,
    },

    /// No settlement with this ID is registered.
    #[error("settlement {id} is not registered")]
    UnknownSettlement {
        /// The requested settlement.
        id: SettlementId,
    },
}

/// Drives arbitration, allocation, logistics, and planning once per tick.
#[derive(Debug)]
pub struct SystemOrchestrator {
    clock: SimClock,
    context: SharedContext,
    registry: SettlementRegistry,
    arbitrator: PriorityArbitrator,
    allocator: ResourceAllocator,
    logistics: LogisticsCoordinator,
    state: SystemState,
    ledger: AuditLedger,
    economy: EconomyConfig,
    strategy: StrategyConfig,
}

impl SystemOrchestrator {
    /// Build an orchestrator with no settlements.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Clock`] if the run settings do not
    /// describe a valid clock.
    pub fn new(config: &SimulationConfig) -> Result<Self, OrchestratorError> {
        let clock = SimClock::new(&config.simulation)?;
        Ok(Self {
            context: SharedContext::new(clock.now()),
            clock,
            registry: SettlementRegistry::new(),
            arbitrator: PriorityArbitrator::new(config.arbitration.clone()),
            allocator: ResourceAllocator::new(config.economy.clone()),
            logistics: LogisticsCoordinator::new(config.logistics.clone()),
            state: SystemState::new(),
            ledger: AuditLedger::new(),
            economy: config.economy.clone(),
            strategy: config.strategy.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Last completed tick (0 before the first).
    pub const fn tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Current simulated time.
    pub const fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Shared coordination state.
    pub const fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Shared coordination state, for external collaborators between ticks.
    pub const fn context_mut(&mut self) -> &mut SharedContext {
        &mut self.context
    }

    /// System state from the last tick.
    pub const fn state(&self) -> &SystemState {
        &self.state
    }

    /// Arbitrator, with its conflicts and deferred requests.
    pub const fn arbitrator(&self) -> &PriorityArbitrator {
        &self.arbitrator
    }

    /// Shipment tracker.
    pub const fn logistics(&self) -> &LogisticsCoordinator {
        &self.logistics
    }

    /// Audit ledger.
    pub const fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    /// Registered settlements.
    pub const fn settlements(&self) -> &SettlementRegistry {
        &self.registry
    }

    /// One registered settlement.
    pub fn settlement(&self, id: SettlementId) -> Option<&SettlementManager> {
        self.registry.get(id)
    }

    // -----------------------------------------------------------------------
    // Registration and external operations
    // -----------------------------------------------------------------------

    /// Add a settlement. It takes part from the next tick on.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::DuplicateSettlement`] if the provider
    /// reports an ID that is already registered.
    pub fn register_settlement(
        &mut self,
        provider: Box<dyn SettlementProvider>,
    ) -> Result<SettlementId, OrchestratorError> {
        let manager = SettlementManager::new(provider, self.economy.clone(), self.strategy.clone());
        let id = manager.id();
        let name = manager.name().to_owned();
        self.registry
            .insert(manager)
            .map_err(|_| OrchestratorError::DuplicateSettlement { id })?;
        info!(settlement_id = %id, name = %name, "settlement registered");
        self.context
            .notify(SystemEvent::SettlementRegistered { settlement_id: id });
        Ok(id)
    }

    /// Remove a settlement. Shipments to or from it that have not departed
    /// are cancelled first, returning their reservations.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownSettlement`] if it is not
    /// registered, or [`OrchestratorError::Ledger`] if a release cannot be
    /// recorded.
    pub fn unregister_settlement(&mut self, id: SettlementId) -> Result<(), OrchestratorError> {
        if !self.registry.contains(id) {
            return Err(OrchestratorError::UnknownSettlement { id });
        }
        let tick = self.clock.tick();
        for transfer in self.logistics.cancel_involving(id, &mut self.registry) {
            self.ledger.record_release(tick, &transfer)?;
        }
        self.arbitrator.forget_settlement(id);
        self.state.forget_settlement(id);
        self.registry.remove(id);
        info!(settlement_id = %id, "settlement unregistered");
        self.context
            .notify(SystemEvent::SettlementUnregistered { settlement_id: id });
        Ok(())
    }

    /// Ask a settlement's selector for its next action without executing it.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownSettlement`] if it is not
    /// registered.
    pub fn evaluate_next_action(&self, id: SettlementId) -> Result<Decision, OrchestratorError> {
        self.registry
            .get(id)
            .map(SettlementManager::evaluate_next_action)
            .ok_or(OrchestratorError::UnknownSettlement { id })
    }

    /// Raise a settlement to critical priority for `resources` until the
    /// crisis window passes.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownSettlement`] if it is not
    /// registered.
    pub fn escalate_crisis(
        &mut self,
        id: SettlementId,
        resources: &[ResourceKind],
    ) -> Result<ConflictId, OrchestratorError> {
        if !self.registry.contains(id) {
            return Err(OrchestratorError::UnknownSettlement { id });
        }
        let now = self.clock.now();
        Ok(self
            .arbitrator
            .escalate_crisis(id, resources, now, self.context.ids_mut()))
    }

    /// Current priority level of a settlement.
    pub fn settlement_priority_level(&self, id: SettlementId) -> PriorityTier {
        self.arbitrator.settlement_priority_level(id, self.clock.now())
    }

    /// Close a conflict or crisis. Returns `false` if it was not open.
    pub fn resolve_conflict(&mut self, id: ConflictId, resolution: ConflictResolution) -> bool {
        self.arbitrator.resolve_conflict(id, resolution)
    }

    /// Cancel a shipment that has not departed.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Logistics`] if the shipment is unknown or
    /// under way.
    pub fn cancel_transfer(&mut self, id: TransferId) -> Result<Transfer, OrchestratorError> {
        let transfer = self.logistics.cancel_transfer(id, &mut self.registry)?;
        self.ledger.record_release(self.clock.tick(), &transfer)?;
        Ok(transfer)
    }

    /// Status and progress of a shipment.
    pub fn transfer_status(&self, id: TransferId) -> Option<TransferProgress> {
        self.logistics.transfer_status(id, self.clock.now())
    }

    /// Subscribe to context events.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) -> ListenerId {
        self.context.add_listener(listener)
    }

    /// Unsubscribe a listener.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.context.remove_listener(id)
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Clock`] if simulated time cannot advance
    /// and [`OrchestratorError::Ledger`] if an audit record is rejected.
    /// Scarcity, failed reservations, and listener failures are not errors.
    pub fn orchestrate_system(&mut self) -> Result<SystemStatus, OrchestratorError> {
        let tick = self.clock.advance()?;
        let now = self.clock.now();
        self.context.set_time(now);
        info!(tick, settlements = self.registry.len(), "tick started");

        // --- Shipments ---
        let arrivals = self.logistics.advance(now, &mut self.registry);
        for transfer in &arrivals.completed {
            self.ledger.record_delivery(tick, transfer)?;
        }

        // --- System state ---
        for manager in self.registry.iter_mut() {
            manager.refresh();
        }
        self.state
            .update_system_state(&self.registry, &self.logistics.logistics_metrics());
        self.state
            .analyze_dependencies(&self.registry, &self.allocator, &self.logistics);

        // --- Requests ---
        let mut requests = Vec::new();
        for manager in self.registry.iter() {
            requests.extend(manager.collect_resource_requests(self.context.ids_mut(), now));
            let crisis = manager.detect_crisis();
            if !crisis.is_empty() {
                warn!(settlement_id = %manager.id(), resources = ?crisis, "resource crisis detected");
                self.context.notify(SystemEvent::ResourceCrisis {
                    settlement_id: manager.id(),
                    resources: crisis,
                });
            }
        }

        // --- Arbitration and allocation ---
        let arbitration = self
            .arbitrator
            .arbitrate(requests, now, self.context.ids_mut());
        let available: BTreeMap<ResourceKind, u64> = self.state.total_resources().clone();
        let allocations = self.allocator.allocate(
            &arbitration.admitted_requests(),
            &available,
            &self.arbitrator,
        );

        let mut allocations_applied: usize = 0;
        for allocation in &allocations {
            let Some(manager) = self.registry.get_mut(allocation.settlement_id) else {
                continue;
            };
            match manager.execute_resource_allocation(allocation) {
                Ok(()) => {
                    self.ledger.record_allocation(
                        tick,
                        allocation.settlement_id,
                        allocation.resource,
                        allocation.quantity,
                    )?;
                    allocations_applied = allocations_applied.saturating_add(1);
                }
                Err(err) => warn!(
                    settlement_id = %allocation.settlement_id,
                    error = %err,
                    "allocation could not be applied"
                ),
            }
        }

        // --- Transfers ---
        let candidates = {
            let in_flight = self.logistics.in_flight_incoming();
            let snapshots: Vec<_> = self.registry.iter().map(SettlementManager::snapshot).collect();
            self.allocator.discover_transfers(&snapshots, &in_flight)
        };
        let schedule = self.logistics.optimize_and_schedule(
            candidates,
            now,
            &mut self.registry,
            self.context.ids_mut(),
        );
        for transfer in &schedule.scheduled {
            self.ledger.record_reservation(tick, transfer)?;
        }

        // --- Planning ---
        self.state
            .update_system_state(&self.registry, &self.logistics.logistics_metrics());
        let objectives = self.state.generate_objectives();
        self.state.merge_objectives(objectives);
        self.coordinate_opportunities();

        for manager in self.registry.iter() {
            let decision = manager.evaluate_next_action();
            if let Err(err) = manager.execute_action(&decision, &mut self.context) {
                warn!(settlement_id = %manager.id(), error = %err, "action could not be handed off");
            }
        }

        // --- Deferred events ---
        self.process_inbox(now);

        // --- Conservation ---
        match self.ledger.verify_allocations(tick, &available) {
            ConservationResult::Balanced => debug!(tick, "allocations balanced"),
            ConservationResult::Anomaly(anomaly) => {
                error!(tick, excesses = ?anomaly.excesses, "{anomaly}");
            }
        }

        let status = SystemStatus {
            tick,
            settlement_count: self.registry.len(),
            active_transfers: self.logistics.active_transfers().count(),
            conflict_count: self.arbitrator.conflict_count(),
            allocations_applied,
            transfers_scheduled: schedule.scheduled.len(),
            transfers_completed: arrivals.completed.len(),
            objectives: self.state.objectives().to_vec(),
            health: self.state.health(),
        };
        info!(
            tick,
            allocations = status.allocations_applied,
            scheduled = status.transfers_scheduled,
            completed = status.transfers_completed,
            conflicts = status.conflict_count,
            overall_score = status.health.overall_score,
            "tick complete"
        );
        Ok(status)
    }

    /// Publish notable opportunities and hand out coordinated plans.
    fn coordinate_opportunities(&mut self) {
        let opportunities: Vec<Opportunity> = self
            .registry
            .iter()
            .flat_map(SettlementManager::evaluate_opportunities)
            .collect();
        for opportunity in &opportunities {
            if opportunity.priority >= PriorityTier::High {
                self.context.notify(SystemEvent::StrategicOpportunity {
                    opportunity: opportunity.clone(),
                });
            }
        }
        let mut plans = coordinate_expansion(&opportunities);
        for manager in self.registry.iter_mut() {
            manager.update_expansion_plans(plans.remove(&manager.id()).unwrap_or_default());
        }
    }

    /// Act on events deferred during the tick.
    fn process_inbox(&mut self, now: DateTime<Utc>) {
        for event in self.context.drain_inbox() {
            match event {
                SystemEvent::ResourceCrisis {
                    settlement_id,
                    resources,
                } => {
                    if self.registry.contains(settlement_id) {
                        self.arbitrator.escalate_crisis(
                            settlement_id,
                            &resources,
                            now,
                            self.context.ids_mut(),
                        );
                    }
                }
                SystemEvent::StrategicOpportunity { opportunity } => {
                    self.state.merge_objectives(vec![StrategicObjective {
                        objective_type: ObjectiveType::ExploitOpportunity,
                        priority: opportunity.priority,
                        description: format!(
                            "Pursue {:?} reported by {} on {}",
                            opportunity.kind, opportunity.settlement_id, opportunity.body_id
                        ),
                    }]);
                }
                SystemEvent::SettlementUnregistered { settlement_id } => {
                    debug!(settlement_id = %settlement_id, "departure processed");
                }
                other => debug!(event = ?other.kind(), "inbox event ignored"),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colonysim_types::{CelestialBody, EventKind, TransferStatus};

    use super::*;
    use crate::analysis::tests::snapshot;
    use crate::context::ListenerError;
    use crate::settlement::InMemorySettlement;

    struct Recorder(std::sync::Arc<std::sync::Mutex<Vec<EventKind>>>);

    impl EventListener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn handle_event(&mut self, event: &SystemEvent) -> Result<(), ListenerError> {
            self.0.lock().unwrap().push(event.kind());
            Ok(())
        }
    }

    struct Broken;

    impl EventListener for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn handle_event(&mut self, _event: &SystemEvent) -> Result<(), ListenerError> {
            Err(ListenerError::Rejected {
                reason: "always fails".to_owned(),
            })
        }
    }

    fn colony(n: u64, inventory: &[(ResourceKind, u64)]) -> Box<InMemorySettlement> {
        let mut state = snapshot();
        state.id = SettlementId::from_sequence(n);
        state.name = format!("Colony {n}");
        state.body = CelestialBody::planet("mars");
        state.inventory = inventory.iter().copied().collect();
        Box::new(InMemorySettlement::new(state))
    }

    fn stocked() -> Vec<(ResourceKind, u64)> {
        vec![
            (ResourceKind::Energy, 100),
            (ResourceKind::Food, 100),
            (ResourceKind::Water, 100),
            (ResourceKind::Minerals, 100),
            (ResourceKind::Steel, 50),
            (ResourceKind::Electronics, 30),
        ]
    }

    fn orchestrator() -> SystemOrchestrator {
        SystemOrchestrator::new(&SimulationConfig::default()).unwrap()
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut orchestrator = orchestrator();
        orchestrator.register_settlement(colony(1, &stocked())).unwrap();
        let err = orchestrator.register_settlement(colony(1, &stocked()));
        assert!(matches!(err, Err(OrchestratorError::DuplicateSettlement { .. })));
        assert_eq!(orchestrator.settlements().len(), 1);
    }

    #[test]
    fn unknown_settlement_operations_fail() {
        let mut orchestrator = orchestrator();
        let ghost = SettlementId::from_sequence(9);
        assert!(matches!(
            orchestrator.unregister_settlement(ghost),
            Err(OrchestratorError::UnknownSettlement { .. })
        ));
        assert!(orchestrator.evaluate_next_action(ghost).is_err());
        assert!(orchestrator.escalate_crisis(ghost, &[ResourceKind::Oxygen]).is_err());
    }

    #[test]
    fn tick_reports_status() {
        let mut orchestrator = orchestrator();
        orchestrator.register_settlement(colony(1, &stocked())).unwrap();
        orchestrator.register_settlement(colony(2, &stocked())).unwrap();

        let status = orchestrator.orchestrate_system().unwrap();
        assert_eq!(status.tick, 1);
        assert_eq!(status.settlement_count, 2);
        assert_eq!(orchestrator.tick(), 1);
        assert!(status.health.overall_score > 0.0);
    }

    #[test]
    fn withheld_shortage_ships_from_neighbour() {
        let mut config = SimulationConfig::default();
        config.arbitration.system_limits.insert(ResourceKind::Water, 0);
        let mut orchestrator = SystemOrchestrator::new(&config).unwrap();
        let mut dry = stocked();
        dry.retain(|(r, _)| *r != ResourceKind::Water);
        dry.push((ResourceKind::Water, 40));
        let mut wet = stocked();
        wet.retain(|(r, _)| *r != ResourceKind::Water);
        wet.push((ResourceKind::Water, 600));
        orchestrator.register_settlement(colony(1, &dry)).unwrap();
        orchestrator.register_settlement(colony(2, &wet)).unwrap();

        let status = orchestrator.orchestrate_system().unwrap();
        assert_eq!(status.transfers_scheduled, 1);
        let transfer = orchestrator.logistics().active_transfers().next().unwrap();
        assert_eq!(transfer.source, SettlementId::from_sequence(2));
        assert_eq!(transfer.target, SettlementId::from_sequence(1));
        assert_eq!(transfer.total_quantity, 60);

        // Same-body transit is shorter than a tick.
        let status = orchestrator.orchestrate_system().unwrap();
        assert_eq!(status.transfers_completed, 1);
        let dry = orchestrator.settlement(SettlementId::from_sequence(1)).unwrap();
        assert_eq!(dry.snapshot().stock(ResourceKind::Water), 100);
        assert!(orchestrator.ledger().in_transit().values().all(|q| *q == 0));
    }

    #[test]
    fn pool_allocation_fills_gap_before_shipping() {
        let mut orchestrator = orchestrator();
        let mut dry = stocked();
        dry.retain(|(r, _)| *r != ResourceKind::Water);
        dry.push((ResourceKind::Water, 40));
        let mut wet = stocked();
        wet.retain(|(r, _)| *r != ResourceKind::Water);
        wet.push((ResourceKind::Water, 600));
        orchestrator.register_settlement(colony(1, &dry)).unwrap();
        orchestrator.register_settlement(colony(2, &wet)).unwrap();

        let status = orchestrator.orchestrate_system().unwrap();
        assert!(status.allocations_applied >= 1);
        assert_eq!(status.transfers_scheduled, 0);
        let dry = orchestrator.settlement(SettlementId::from_sequence(1)).unwrap();
        assert!(dry.snapshot().stock(ResourceKind::Water) >= 100);
    }

    #[test]
    fn detected_crisis_is_escalated_after_the_tick() {
        let mut orchestrator = orchestrator();
        let mut starving = stocked();
        starving.retain(|(r, _)| *r != ResourceKind::Food);
        starving.push((ResourceKind::Food, 2));
        let id = orchestrator.register_settlement(colony(1, &starving)).unwrap();

        orchestrator.orchestrate_system().unwrap();
        assert_eq!(orchestrator.settlement_priority_level(id), PriorityTier::Critical);
        assert!(orchestrator.arbitrator().conflict_count() >= 1);
    }

    #[test]
    fn failing_listener_does_not_abort_tick() {
        let mut orchestrator = orchestrator();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        orchestrator.add_listener(Box::new(Broken));
        orchestrator.add_listener(Box::new(Recorder(seen.clone())));

        orchestrator.register_settlement(colony(1, &stocked())).unwrap();
        orchestrator.orchestrate_system().unwrap();

        assert!(seen.lock().unwrap().contains(&EventKind::SettlementRegistered));
        assert!(orchestrator.context().listener_failures() >= 1);
    }

    #[test]
    fn unregister_cancels_pending_shipments() {
        let mut config = SimulationConfig::default();
        config.arbitration.system_limits.insert(ResourceKind::Steel, 0);
        let mut orchestrator = SystemOrchestrator::new(&config).unwrap();
        let mut bare = stocked();
        bare.retain(|(r, _)| *r != ResourceKind::Steel);
        let mut rich = stocked();
        rich.retain(|(r, _)| *r != ResourceKind::Steel);
        rich.push((ResourceKind::Steel, 500));
        let mut far = snapshot();
        far.id = SettlementId::from_sequence(2);
        far.body = CelestialBody::planet("venus");
        far.inventory = rich.into_iter().collect();

        let target = orchestrator.register_settlement(colony(1, &bare)).unwrap();
        let source = orchestrator
            .register_settlement(Box::new(InMemorySettlement::new(far)))
            .unwrap();
        orchestrator.orchestrate_system().unwrap();

        let transfer_id = orchestrator.logistics().active_transfers().next().unwrap().id;
        let held = orchestrator.settlement(source).unwrap().snapshot().stock(ResourceKind::Steel);
        assert_eq!(held, 450);

        orchestrator.unregister_settlement(target).unwrap();
        let progress = orchestrator.transfer_status(transfer_id).unwrap();
        assert_eq!(progress.status, TransferStatus::Cancelled);
        let restored = orchestrator.settlement(source).unwrap().snapshot().stock(ResourceKind::Steel);
        assert_eq!(restored, 500);
        assert_eq!(orchestrator.ledger().open_reservation(transfer_id), 0);
        assert!(orchestrator.settlement(target).is_none());
    }
}
