//! End-to-end scenarios exercised through the public API.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;

use colonysim_core::allocation::{ResourceAllocator, TransferCandidate};
use colonysim_core::analysis::StateAnalyzer;
use colonysim_core::arbitration::PriorityArbitrator;
use colonysim_core::config::{EconomyConfig, StrategyConfig};
use colonysim_core::logistics::{LogisticsCoordinator, split_shipment};
use colonysim_core::sequence::IdSequence;
use colonysim_core::settlement::{SettlementManager, SettlementRegistry};
use colonysim_core::strategy::StrategySelector;
use colonysim_core::{
    EventListener, InMemorySettlement, ListenerError, SimulationConfig, SystemOrchestrator,
};
use colonysim_ledger::{AuditEntryKind, ConservationResult};
use colonysim_types::{
    ActionKind, ArbitrationOutcome, Capabilities, CelestialBody, ConflictResolution, ConflictType,
    EventKind, PriorityTier, ProductionRate, RequestId, ResourceKind, ResourceRequest, RouteClass,
    SettlementId, SettlementSnapshot, SystemEvent, TransferStatus,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn settlement(n: u64, body: CelestialBody, inventory: &[(ResourceKind, u64)]) -> SettlementSnapshot {
    SettlementSnapshot {
        id: SettlementId::from_sequence(n),
        name: format!("Outpost {n}"),
        body,
        inventory: inventory.iter().copied().collect(),
        population: 40,
        population_capacity: 100,
        power_online: true,
        production: BTreeMap::new(),
        capabilities: Capabilities::default(),
        location_advantage: 0.5,
        known_systems: Vec::new(),
    }
}

fn request(n: u64, settlement: u64, quantity: u64, priority: PriorityTier) -> ResourceRequest {
    ResourceRequest::new(
        RequestId::from_sequence(n),
        SettlementId::from_sequence(settlement),
        ResourceKind::Energy,
        quantity,
        priority,
        epoch(),
    )
    .unwrap()
}

const NETWORK: &str = r"
simulation:
  name: determinism
  epoch: '2150-01-01T00:00:00Z'
  tick_minutes: 60
settlements:
  - name: Olympus Base
    body: { id: mars, kind: { type: planet } }
    inventory: { energy: 900, food: 40, water: 300, minerals: 20, steel: 10 }
    population: 95
    population_capacity: 100
    production:
      energy: { output: 3000.0, consumption: 1000.0 }
    capabilities: { can_scout: true, can_build: true, can_expand: true }
    location_advantage: 0.8
  - name: Phobos Yard
    body: { id: phobos, kind: { type: moon, planet: mars } }
    inventory: { energy: 5, food: 400, water: 8, minerals: 700, steel: 300 }
    population: 20
    population_capacity: 60
    capabilities: { can_scout: false, can_build: true, can_expand: false }
  - name: Ishtar Camp
    body: { id: venus, kind: { type: planet } }
    inventory: { energy: 50, food: 60, water: 60, electronics: 400 }
    population: 10
    population_capacity: 40
    capabilities: { can_scout: true, can_build: false, can_expand: false }
";

fn network() -> SystemOrchestrator {
    let config = SimulationConfig::parse(NETWORK).unwrap();
    let mut orchestrator = SystemOrchestrator::new(&config).unwrap();
    for (index, seed) in config.settlements.iter().enumerate() {
        let id = SettlementId::from_sequence(u64::try_from(index).unwrap() + 1);
        orchestrator
            .register_settlement(Box::new(InMemorySettlement::from_seed(id, seed)))
            .unwrap();
    }
    orchestrator
}

fn inventory_totals(orchestrator: &SystemOrchestrator) -> BTreeMap<ResourceKind, u64> {
    let mut totals = BTreeMap::new();
    for manager in orchestrator.settlements().iter() {
        for (&resource, &quantity) in &manager.snapshot().inventory {
            *totals.entry(resource).or_insert(0) += quantity;
        }
    }
    totals
}

// ---------------------------------------------------------------------------
// Worked scenarios
// ---------------------------------------------------------------------------

#[test]
fn scarce_energy_admits_critical_then_high() {
    let mut arbitrator = PriorityArbitrator::default();
    let report = arbitrator.arbitrate(
        vec![
            request(1, 1, 600, PriorityTier::Critical),
            request(2, 2, 500, PriorityTier::High),
            request(3, 3, 400, PriorityTier::Low),
        ],
        epoch(),
        &mut IdSequence::new(),
    );

    let granted: Vec<(u64, ArbitrationOutcome)> = (1..=3)
        .map(|n| {
            let decision = report
                .decisions
                .iter()
                .find(|d| d.request.settlement_id == SettlementId::from_sequence(n))
                .unwrap();
            (decision.granted, decision.outcome)
        })
        .collect();
    assert_eq!(
        granted,
        vec![
            (600, ArbitrationOutcome::Admitted),
            (400, ArbitrationOutcome::Reduced),
            (0, ArbitrationOutcome::Delayed),
        ]
    );
    let conflict = arbitrator.conflicts().next().unwrap();
    assert_eq!(conflict.conflict_type, ConflictType::ResourceOverAllocation);
    assert_eq!(conflict.resources, vec![ResourceKind::Energy]);
}

#[test]
fn long_shipment_splits_into_equal_chunks() {
    let chunks = split_shipment(&BTreeMap::from([(ResourceKind::Minerals, 1200)]), 500);
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.get(&ResourceKind::Minerals) == Some(&400)));
}

#[test]
fn crowded_settlement_with_energy_surplus_expands() {
    let mut state = settlement(
        1,
        CelestialBody::planet("mars"),
        &[
            (ResourceKind::Energy, 100),
            (ResourceKind::Food, 100),
            (ResourceKind::Water, 100),
            (ResourceKind::Minerals, 100),
            (ResourceKind::Steel, 50),
            (ResourceKind::Electronics, 30),
        ],
    );
    state.population = 95;
    state.production.insert(
        ResourceKind::Energy,
        ProductionRate {
            output: 3000.0,
            consumption: 1000.0,
        },
    );
    state.capabilities = Capabilities {
        can_scout: true,
        can_build: true,
        can_expand: true,
    };

    let selector = StrategySelector::default();
    let analysis = StateAnalyzer::new(&StrategyConfig::default()).analyze(&state);
    assert!(analysis.expansion_readiness >= 0.8);

    let candidates = selector.candidates(state.capabilities, &analysis);
    assert!(
        candidates
            .iter()
            .any(|c| c.kind() == ActionKind::SettlementExpansion)
    );

    let ranked = selector.scorer().prioritize(candidates, &analysis);
    let decision = selector.evaluate_next_action(&state);
    let top = ranked.first().unwrap().candidate.kind();
    if top == ActionKind::SettlementExpansion {
        assert_eq!(decision.kind(), Some(ActionKind::SettlementExpansion));
    }
}

#[test]
fn full_route_delays_next_shipment() {
    let mut registry = SettlementRegistry::new();
    for (n, stock) in [(1, 10_000), (2, 0)] {
        let state = settlement(n, CelestialBody::planet("mars"), &[(ResourceKind::Food, stock)]);
        registry
            .insert(SettlementManager::new(
                Box::new(InMemorySettlement::new(state)),
                EconomyConfig::default(),
                StrategyConfig::default(),
            ))
            .unwrap();
    }

    let candidate = TransferCandidate {
        source: SettlementId::from_sequence(1),
        target: SettlementId::from_sequence(2),
        resource: ResourceKind::Food,
        quantity: 10,
        priority: PriorityTier::Medium,
        route_class: RouteClass::SameBody,
        cost: Decimal::ZERO,
    };
    let mut logistics = LogisticsCoordinator::default();
    let mut ids = IdSequence::new();
    for _ in 0..5 {
        let report =
            logistics.optimize_and_schedule(vec![candidate.clone()], epoch(), &mut registry, &mut ids);
        assert_eq!(report.scheduled.len(), 1);
    }

    let report =
        logistics.optimize_and_schedule(vec![candidate], epoch(), &mut registry, &mut ids);
    let delayed = report.scheduled.first().unwrap();
    assert_eq!(delayed.status, TransferStatus::Delayed);
    // Earliest arrival is 10 minutes out, plus one hour of congestion.
    assert_eq!(delayed.scheduled_time, epoch() + TimeDelta::minutes(70));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn allocations_never_exceed_availability_across_ticks() {
    let mut orchestrator = network();
    for _ in 0..8 {
        let mut available = inventory_totals(&orchestrator);
        let status = orchestrator.orchestrate_system().unwrap();

        for entry in orchestrator.ledger().entries_for_tick(status.tick) {
            if entry.kind == AuditEntryKind::Delivery {
                *available.entry(entry.resource).or_insert(0) += entry.quantity;
            }
        }
        assert_eq!(
            orchestrator.ledger().verify_allocations(status.tick, &available),
            ConservationResult::Balanced,
            "tick {}",
            status.tick
        );
    }
}

#[test]
fn higher_priority_never_receives_less() {
    let allocator = ResourceAllocator::default();
    let arbitrator = PriorityArbitrator::default();
    let tiers = PriorityTier::DESCENDING;

    for (i, &higher) in tiers.iter().enumerate() {
        for &lower in tiers.iter().skip(i + 1) {
            for quantity in [1_u64, 37, 100, 250] {
                for available in [quantity, quantity + 1, quantity * 2, quantity * 3] {
                    let requests = vec![
                        request(1, 1, quantity, lower),
                        request(2, 2, quantity, higher),
                    ];
                    let allocations = allocator.allocate(
                        &requests,
                        &BTreeMap::from([(ResourceKind::Energy, available)]),
                        &arbitrator,
                    );
                    let granted = |n: u64| {
                        allocations
                            .iter()
                            .filter(|a| a.settlement_id == SettlementId::from_sequence(n))
                            .map(|a| a.quantity)
                            .sum::<u64>()
                    };
                    assert!(
                        granted(2) >= granted(1),
                        "{higher:?} vs {lower:?}, quantity {quantity}, available {available}"
                    );
                    assert!(granted(1) + granted(2) <= available);
                }
            }
        }
    }
}

#[test]
fn split_chunks_sum_exactly_within_capacity() {
    for quantity in [1_u64, 199, 200, 201, 999, 1200, 4321] {
        for capacity in [1_u64, 3, 200, 500, 1000] {
            let resources = BTreeMap::from([
                (ResourceKind::Water, quantity),
                (ResourceKind::Food, quantity / 3),
            ]);
            let chunks = split_shipment(&resources, capacity);
            for chunk in &chunks {
                assert!(chunk.values().sum::<u64>() <= capacity);
            }
            for (resource, expected) in &resources {
                let shipped: u64 = chunks.iter().filter_map(|c| c.get(resource)).sum();
                assert_eq!(shipped, *expected, "quantity {quantity}, capacity {capacity}");
            }
        }
    }
}

#[test]
fn recomputing_state_twice_is_stable() {
    let mut orchestrator = network();
    orchestrator.orchestrate_system().unwrap();
    orchestrator.orchestrate_system().unwrap();

    let metrics = orchestrator.logistics().logistics_metrics();
    let mut state = orchestrator.state().clone();
    state.update_system_state(orchestrator.settlements(), &metrics);
    let first = state.clone();
    state.update_system_state(orchestrator.settlements(), &metrics);
    assert_eq!(first, state);
}

#[test]
fn crisis_holds_critical_until_deadline() {
    let config = SimulationConfig::default();
    let mut orchestrator = SystemOrchestrator::new(&config).unwrap();
    let stocked = [
        (ResourceKind::Energy, 100),
        (ResourceKind::Food, 100),
        (ResourceKind::Water, 100),
    ];
    let id = orchestrator
        .register_settlement(Box::new(InMemorySettlement::new(settlement(
            1,
            CelestialBody::planet("mars"),
            &stocked,
        ))))
        .unwrap();

    orchestrator.escalate_crisis(id, &[ResourceKind::Oxygen]).unwrap();
    assert_eq!(orchestrator.settlement_priority_level(id), PriorityTier::Critical);

    // One tick is exactly the crisis window.
    orchestrator.orchestrate_system().unwrap();
    assert_ne!(orchestrator.settlement_priority_level(id), PriorityTier::Critical);
}

#[test]
fn resolving_crisis_drops_critical_level() {
    let mut orchestrator = SystemOrchestrator::new(&SimulationConfig::default()).unwrap();
    let id = orchestrator
        .register_settlement(Box::new(InMemorySettlement::new(settlement(
            1,
            CelestialBody::planet("mars"),
            &[(ResourceKind::Water, 100)],
        ))))
        .unwrap();

    let conflict = orchestrator.escalate_crisis(id, &[ResourceKind::Oxygen]).unwrap();
    assert!(orchestrator.resolve_conflict(conflict, ConflictResolution::Reallocate));
    assert_ne!(orchestrator.settlement_priority_level(id), PriorityTier::Critical);
}

#[test]
fn oxygen_crisis_outranks_high_energy_request() {
    let mut arbitrator = PriorityArbitrator::default();
    let mut ids = IdSequence::new();
    arbitrator.escalate_crisis(
        SettlementId::from_sequence(1),
        &[ResourceKind::Oxygen],
        epoch(),
        &mut ids,
    );

    // Energy limit is 1000.
    let report = arbitrator.arbitrate(
        vec![
            request(1, 2, 700, PriorityTier::High),
            request(2, 1, 700, PriorityTier::Low),
        ],
        epoch(),
        &mut ids,
    );
    let outcome = |n: u64| {
        report
            .decisions
            .iter()
            .find(|d| d.request.settlement_id == SettlementId::from_sequence(n))
            .map(|d| (d.effective_priority, d.granted, d.outcome))
            .unwrap()
    };
    assert_eq!(
        outcome(1),
        (PriorityTier::Critical, 700, ArbitrationOutcome::Admitted)
    );
    assert_eq!(outcome(2), (PriorityTier::High, 300, ArbitrationOutcome::Reduced));
}

#[test]
fn handed_off_work_stays_bounded_across_ticks() {
    let mut orchestrator = network();
    let mut counts = Vec::new();
    for _ in 0..10 {
        orchestrator.orchestrate_system().unwrap();
        let context = orchestrator.context();

        let mut requests: Vec<_> = context
            .pending_requests()
            .map(|r| (r.requester, r.resource))
            .collect();
        let filed = requests.len();
        requests.sort();
        requests.dedup();
        assert_eq!(requests.len(), filed, "duplicate pending request");

        let mut missions: Vec<_> = context
            .queued_missions()
            .map(|m| (m.settlement_id, m.kind))
            .collect();
        let queued = missions.len();
        missions.sort();
        missions.dedup();
        assert_eq!(missions.len(), queued, "duplicate queued mission");

        counts.push((filed, queued));
    }
    let settlements = orchestrator.settlements().len();
    assert!(counts.iter().all(|&(filed, queued)| {
        filed <= settlements * ResourceKind::ALL.len() && queued <= settlements * 4
    }));
}

#[test]
fn identical_runs_produce_identical_output() {
    let mut first = network();
    let mut second = network();

    for _ in 0..6 {
        let a = first.orchestrate_system().unwrap();
        let b = second.orchestrate_system().unwrap();
        assert_eq!(a, b);
    }
    let transfers_a: Vec<_> = first.logistics().transfers().cloned().collect();
    let transfers_b: Vec<_> = second.logistics().transfers().cloned().collect();
    assert_eq!(transfers_a, transfers_b);
    assert_eq!(first.ledger().entries(), second.ledger().entries());
}

// ---------------------------------------------------------------------------
// Event bus
// ---------------------------------------------------------------------------

struct Panicking;

impl EventListener for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    #[allow(clippy::panic)]
    fn handle_event(&mut self, _event: &SystemEvent) -> Result<(), ListenerError> {
        panic!("listener bug");
    }
}

struct Rejecting;

impl EventListener for Rejecting {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn handle_event(&mut self, _event: &SystemEvent) -> Result<(), ListenerError> {
        Err(ListenerError::Rejected {
            reason: "not interested".to_owned(),
        })
    }
}

struct Recording(Arc<Mutex<Vec<EventKind>>>);

impl EventListener for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    fn handle_event(&mut self, event: &SystemEvent) -> Result<(), ListenerError> {
        self.0.lock().unwrap().push(event.kind());
        Ok(())
    }
}

#[test]
fn misbehaving_listeners_do_not_stop_the_tick() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut orchestrator = SystemOrchestrator::new(&SimulationConfig::default()).unwrap();
    orchestrator.add_listener(Box::new(Panicking));
    orchestrator.add_listener(Box::new(Rejecting));
    orchestrator.add_listener(Box::new(Recording(Arc::clone(&seen))));

    let id = orchestrator
        .register_settlement(Box::new(InMemorySettlement::new(settlement(
            1,
            CelestialBody::planet("mars"),
            &[(ResourceKind::Food, 2)],
        ))))
        .unwrap();

    let status = orchestrator.orchestrate_system().unwrap();
    assert_eq!(status.tick, 1);

    let seen = seen.lock().unwrap();
    assert!(seen.contains(&EventKind::SettlementRegistered));
    assert!(seen.contains(&EventKind::ResourceCrisis));
    assert!(orchestrator.context().listener_failures() >= 4);
    // The crisis still reached the orchestrator.
    assert_eq!(orchestrator.settlement_priority_level(id), PriorityTier::Critical);
}
