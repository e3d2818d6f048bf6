//! Fair-share allocation and transfer discovery.
//!
//! [`ResourceAllocator::allocate`] turns admitted requests into concrete
//! [`Allocation`]s that never exceed the system-wide availability of a
//! resource. [`ResourceAllocator::discover_transfers`] looks for settlements
//! whose surplus can cover another settlement's gap.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use colonysim_types::{
    Allocation, AllocationSource, PriorityTier, ResourceKind, ResourceRequest, RouteClass,
    SettlementId, SettlementSnapshot,
};

use crate::arbitration::PriorityArbitrator;
use crate::config::EconomyConfig;
use crate::numeric::{floor_units, to_f64};

/// Units already shipping towards a settlement, per resource.
pub type InFlight = BTreeMap<(SettlementId, ResourceKind), u64>;

/// Multiplier on the requested quantity when computing a grant.
pub const fn allocation_multiplier(priority: PriorityTier) -> f64 {
    match priority {
        PriorityTier::Critical => 1.5,
        PriorityTier::High => 1.2,
        PriorityTier::Medium => 1.0,
        PriorityTier::Low => 0.8,
    }
}

/// Distance factor for transfer candidate pricing.
pub const fn distance_factor(class: RouteClass) -> Decimal {
    match class {
        RouteClass::SameBody => Decimal::ONE,
        RouteClass::PlanetMoon => Decimal::from_parts(12, 0, 0, false, 1),
        RouteClass::InterBody => Decimal::TWO,
    }
}

/// Handling factor per resource for transfer candidate pricing.
pub const fn resource_factor(resource: ResourceKind) -> Decimal {
    match resource {
        ResourceKind::Energy => Decimal::from_parts(8, 0, 0, false, 1),
        ResourceKind::Food | ResourceKind::Water => Decimal::from_parts(12, 0, 0, false, 1),
        ResourceKind::Electronics => Decimal::from_parts(15, 0, 0, false, 1),
        _ => Decimal::ONE,
    }
}

/// A tracked resource a settlement is short of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceGap {
    /// Resource.
    pub resource: ResourceKind,
    /// Units needed to reach the optimal level.
    pub quantity: u64,
    /// Critical below the critical ratio, high otherwise.
    pub priority: PriorityTier,
}

/// A proposed single-resource shipment, before logistics planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferCandidate {
    /// Shipping settlement.
    pub source: SettlementId,
    /// Receiving settlement.
    pub target: SettlementId,
    /// Resource.
    pub resource: ResourceKind,
    /// Units to ship.
    pub quantity: u64,
    /// Priority of the gap being filled.
    pub priority: PriorityTier,
    /// Route classification.
    pub route_class: RouteClass,
    /// Estimated cost in credits.
    pub cost: Decimal,
}

/// Converts arbitrated requests into allocations and proposes transfers.
#[derive(Debug, Clone, Default)]
pub struct ResourceAllocator {
    economy: EconomyConfig,
}

impl ResourceAllocator {
    /// Create an allocator.
    pub const fn new(economy: EconomyConfig) -> Self {
        Self { economy }
    }

    /// Economy settings in use.
    pub const fn economy(&self) -> &EconomyConfig {
        &self.economy
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    /// Distribute `available` among `requests`, one resource at a time.
    ///
    /// Duplicate requests for the same settlement and resource are merged
    /// first (quantities summed, highest tier kept). Within a resource the
    /// requests are served in tier order; each receives
    /// `min(quantity × multiplier, fair_share)` rounded down, where the fair
    /// share is the remaining availability divided by the requests still
    /// waiting, rounded up. A request larger than the whole system total is
    /// skipped while an over-allocation conflict for its resource is open.
    pub fn allocate(
        &self,
        requests: &[ResourceRequest],
        available: &BTreeMap<ResourceKind, u64>,
        arbitrator: &PriorityArbitrator,
    ) -> Vec<Allocation> {
        let mut by_resource: BTreeMap<ResourceKind, Vec<ResourceRequest>> = BTreeMap::new();
        for request in requests {
            let group = by_resource.entry(request.resource).or_default();
            if let Some(existing) = group
                .iter_mut()
                .find(|r| r.settlement_id == request.settlement_id)
            {
                existing.quantity = existing.quantity.saturating_add(request.quantity);
                existing.priority = existing.priority.max(request.priority);
            } else {
                group.push(request.clone());
            }
        }

        let mut allocations = Vec::new();
        for (resource, mut group) in by_resource {
            let total = available.get(&resource).copied().unwrap_or(0);
            if total == 0 {
                debug!(
                    resource = %resource,
                    requests = group.len(),
                    "nothing available to allocate"
                );
                continue;
            }
            group.sort_by(|a, b| b.priority.cmp(&a.priority));

            let conflicted = arbitrator.has_active_conflict(resource);
            let count = group.len();
            let mut allocated: u64 = 0;
            for (index, request) in group.into_iter().enumerate() {
                if allocated >= total {
                    break;
                }
                if request.quantity > total && conflicted {
                    debug!(
                        settlement_id = %request.settlement_id,
                        resource = %resource,
                        requested = request.quantity,
                        total,
                        "request exceeds system total under conflict, skipped"
                    );
                    continue;
                }
                let remaining = total.saturating_sub(allocated);
                let waiting =
                    u64::try_from(count.saturating_sub(index).max(1)).unwrap_or(u64::MAX);
                let fair_share = remaining.div_ceil(waiting);
                let weighted =
                    floor_units(to_f64(request.quantity) * allocation_multiplier(request.priority));
                let grant = weighted.min(fair_share).min(remaining);
                if grant == 0 {
                    continue;
                }
                allocated = allocated.saturating_add(grant);
                allocations.push(Allocation {
                    settlement_id: request.settlement_id,
                    resource,
                    quantity: grant,
                    priority: request.priority,
                    source: AllocationSource::System,
                });
            }
            debug!(resource = %resource, total, allocated, "resource allocated");
        }
        allocations
    }

    // -----------------------------------------------------------------------
    // Gap and surplus analysis
    // -----------------------------------------------------------------------

    /// Tracked resources where stock plus incoming shipments sits below the
    /// gap line.
    pub fn gaps(&self, snapshot: &SettlementSnapshot, in_flight: &InFlight) -> Vec<ResourceGap> {
        self.economy
            .optimal_levels
            .iter()
            .filter_map(|(&resource, &optimal)| {
                let incoming = in_flight.get(&(snapshot.id, resource)).copied().unwrap_or(0);
                let effective = snapshot.stock(resource).saturating_add(incoming);
                let optimal_f = to_f64(optimal);
                if to_f64(effective) >= optimal_f * self.economy.gap_ratio {
                    return None;
                }
                let priority = if to_f64(effective) < optimal_f * self.economy.critical_ratio {
                    PriorityTier::Critical
                } else {
                    PriorityTier::High
                };
                let quantity = optimal.saturating_sub(effective);
                (quantity > 0).then_some(ResourceGap {
                    resource,
                    quantity,
                    priority,
                })
            })
            .collect()
    }

    /// Units above optimal for every tracked resource past the surplus line.
    pub fn surplus(&self, snapshot: &SettlementSnapshot) -> BTreeMap<ResourceKind, u64> {
        self.economy
            .optimal_levels
            .iter()
            .filter_map(|(&resource, &optimal)| {
                let stock = snapshot.stock(resource);
                (to_f64(stock) > to_f64(optimal) * self.economy.surplus_ratio)
                    .then(|| (resource, stock.saturating_sub(optimal)))
            })
            .collect()
    }

    /// Cost estimate for moving `quantity` of `resource` over a route.
    pub fn transport_cost(
        &self,
        class: RouteClass,
        resource: ResourceKind,
        quantity: u64,
    ) -> Decimal {
        let volume = Decimal::from(quantity)
            .checked_div(Decimal::ONE_HUNDRED)
            .unwrap_or(Decimal::ONE)
            .min(Decimal::ONE);
        let variable = distance_factor(class)
            .checked_mul(resource_factor(resource))
            .and_then(|d| d.checked_mul(volume))
            .and_then(|d| d.checked_mul(self.economy.quantity_scaling))
            .unwrap_or(Decimal::MAX);
        self.economy
            .base_cost
            .checked_add(variable)
            .unwrap_or(Decimal::MAX)
    }

    /// Surplus-to-gap transfer candidates.
    ///
    /// Targets are visited in the given order and their gaps most urgent
    /// first. Each gap is proposed against the first other settlement whose
    /// remaining surplus covers it in full, and that surplus is drawn down
    /// so one source is never promised twice.
    pub fn discover_transfers(
        &self,
        settlements: &[&SettlementSnapshot],
        in_flight: &InFlight,
    ) -> Vec<TransferCandidate> {
        let mut surpluses: Vec<BTreeMap<ResourceKind, u64>> =
            settlements.iter().map(|s| self.surplus(s)).collect();

        let mut candidates = Vec::new();
        for target in settlements {
            let mut gaps = self.gaps(target, in_flight);
            gaps.sort_by(|a, b| b.priority.cmp(&a.priority));
            for gap in gaps {
                let source = settlements
                    .iter()
                    .zip(surpluses.iter_mut())
                    .filter(|(source, _)| source.id != target.id)
                    .find_map(|(source, surplus)| {
                        surplus
                            .get_mut(&gap.resource)
                            .filter(|available| **available >= gap.quantity)
                            .map(|available| (source, available))
                    });
                let Some((source, available)) = source else {
                    continue;
                };
                *available = available.saturating_sub(gap.quantity);

                let route_class = source.body.route_class(&target.body);
                let candidate = TransferCandidate {
                    source: source.id,
                    target: target.id,
                    resource: gap.resource,
                    quantity: gap.quantity,
                    priority: gap.priority,
                    route_class,
                    cost: self.transport_cost(route_class, gap.resource, gap.quantity),
                };
                debug!(
                    source = %candidate.source,
                    target = %candidate.target,
                    resource = %candidate.resource,
                    quantity = candidate.quantity,
                    "transfer candidate proposed"
                );
                candidates.push(candidate);
            }
        }
        candidates
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Utc};
    use colonysim_types::{CelestialBody, RequestId};

    use super::*;
    use crate::analysis::tests::snapshot;
    use crate::sequence::IdSequence;

    fn request(
        settlement: u64,
        resource: ResourceKind,
        quantity: u64,
        priority: PriorityTier,
    ) -> ResourceRequest {
        ResourceRequest::new(
            RequestId::from_sequence(settlement),
            SettlementId::from_sequence(settlement),
            resource,
            quantity,
            priority,
            DateTime::<Utc>::UNIX_EPOCH,
        )
        .unwrap()
    }

    fn available(resource: ResourceKind, quantity: u64) -> BTreeMap<ResourceKind, u64> {
        BTreeMap::from([(resource, quantity)])
    }

    fn granted(allocations: &[Allocation], settlement: u64) -> u64 {
        allocations
            .iter()
            .filter(|a| a.settlement_id == SettlementId::from_sequence(settlement))
            .map(|a| a.quantity)
            .sum()
    }

    fn colony(n: u64, body: CelestialBody, stock: &[(ResourceKind, u64)]) -> SettlementSnapshot {
        let mut state = snapshot();
        state.id = SettlementId::from_sequence(n);
        state.body = body;
        state.inventory = stock.iter().copied().collect();
        state
    }

    #[test]
    fn fair_share_favours_higher_tiers() {
        let allocator = ResourceAllocator::default();
        let allocations = allocator.allocate(
            &[
                request(1, ResourceKind::Energy, 400, PriorityTier::Low),
                request(2, ResourceKind::Energy, 400, PriorityTier::Critical),
            ],
            &available(ResourceKind::Energy, 1000),
            &PriorityArbitrator::default(),
        );
        // Critical: min(600, 500). Low: min(320, 500).
        assert_eq!(granted(&allocations, 2), 500);
        assert_eq!(granted(&allocations, 1), 320);
    }

    #[test]
    fn odd_remainder_goes_to_the_higher_tier() {
        let allocator = ResourceAllocator::default();
        let allocations = allocator.allocate(
            &[
                request(1, ResourceKind::Water, 100, PriorityTier::Low),
                request(2, ResourceKind::Water, 100, PriorityTier::Critical),
            ],
            &available(ResourceKind::Water, 101),
            &PriorityArbitrator::default(),
        );
        assert_eq!(granted(&allocations, 2), 51);
        assert_eq!(granted(&allocations, 1), 50);
    }

    #[test]
    fn never_exceeds_availability() {
        let allocator = ResourceAllocator::default();
        let requests: Vec<ResourceRequest> = (1..=7)
            .zip(PriorityTier::DESCENDING.into_iter().cycle())
            .map(|(n, tier)| request(n, ResourceKind::Steel, 33, tier))
            .collect();
        let allocations = allocator.allocate(
            &requests,
            &available(ResourceKind::Steel, 97),
            &PriorityArbitrator::default(),
        );
        let total: u64 = allocations.iter().map(|a| a.quantity).sum();
        assert!(total <= 97);
    }

    #[test]
    fn zero_availability_allocates_nothing() {
        let allocator = ResourceAllocator::default();
        let allocations = allocator.allocate(
            &[request(1, ResourceKind::Food, 10, PriorityTier::Critical)],
            &BTreeMap::new(),
            &PriorityArbitrator::default(),
        );
        assert!(allocations.is_empty());
    }

    #[test]
    fn duplicate_requests_are_merged() {
        let allocator = ResourceAllocator::default();
        let allocations = allocator.allocate(
            &[
                request(1, ResourceKind::Food, 10, PriorityTier::Low),
                request(1, ResourceKind::Food, 10, PriorityTier::High),
            ],
            &available(ResourceKind::Food, 1000),
            &PriorityArbitrator::default(),
        );
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].quantity, 24);
        assert_eq!(allocations[0].priority, PriorityTier::High);
    }

    #[test]
    fn oversized_request_is_capped_or_skipped_under_conflict() {
        let allocator = ResourceAllocator::default();
        let huge = [request(1, ResourceKind::Food, 5000, PriorityTier::Medium)];
        let calm = allocator.allocate(
            &huge,
            &available(ResourceKind::Food, 300),
            &PriorityArbitrator::default(),
        );
        assert_eq!(granted(&calm, 1), 300);

        let mut arbitrator = PriorityArbitrator::default();
        let _ = arbitrator.arbitrate(
            huge.to_vec(),
            DateTime::<Utc>::UNIX_EPOCH,
            &mut IdSequence::new(),
        );
        assert!(arbitrator.has_active_conflict(ResourceKind::Food));
        let skipped = allocator.allocate(&huge, &available(ResourceKind::Food, 300), &arbitrator);
        assert!(skipped.is_empty());
    }

    #[test]
    fn gaps_count_incoming_shipments() {
        let allocator = ResourceAllocator::default();
        let target = colony(1, CelestialBody::planet("mars"), &[(ResourceKind::Water, 20)]);
        let gaps = allocator.gaps(&target, &InFlight::new());
        let water = gaps.iter().find(|g| g.resource == ResourceKind::Water).unwrap();
        assert_eq!((water.quantity, water.priority), (80, PriorityTier::Critical));

        let incoming = InFlight::from([((target.id, ResourceKind::Water), 60)]);
        let gaps = allocator.gaps(&target, &incoming);
        assert!(gaps.iter().all(|g| g.resource != ResourceKind::Water));
    }

    #[test]
    fn moon_surplus_covers_planet_gap() {
        let allocator = ResourceAllocator::default();
        let stocked = [
            (ResourceKind::Energy, 100),
            (ResourceKind::Food, 100),
            (ResourceKind::Minerals, 100),
            (ResourceKind::Steel, 50),
            (ResourceKind::Electronics, 30),
        ];
        let needy = colony(
            1,
            CelestialBody::planet("mars"),
            &[stocked.as_slice(), &[(ResourceKind::Water, 50)]].concat(),
        );
        let rich = colony(
            2,
            CelestialBody::moon("phobos", "mars"),
            &[stocked.as_slice(), &[(ResourceKind::Water, 200)]].concat(),
        );

        let candidates = allocator.discover_transfers(&[&needy, &rich], &InFlight::new());
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.source, rich.id);
        assert_eq!(candidate.target, needy.id);
        assert_eq!(candidate.quantity, 50);
        assert_eq!(candidate.priority, PriorityTier::High);
        assert_eq!(candidate.route_class, RouteClass::PlanetMoon);
        // 10 + 1.2 × 1.2 × 0.5 × 10
        assert_eq!(candidate.cost, Decimal::new(1720, 2));
    }

    #[test]
    fn source_surplus_is_not_promised_twice() {
        let allocator = ResourceAllocator::default();
        let first = colony(1, CelestialBody::planet("mars"), &[(ResourceKind::Steel, 10)]);
        let second = colony(2, CelestialBody::planet("mars"), &[(ResourceKind::Steel, 10)]);
        let rich = colony(3, CelestialBody::planet("mars"), &[(ResourceKind::Steel, 110)]);

        let candidates = allocator.discover_transfers(&[&first, &second, &rich], &InFlight::new());
        let steel: Vec<&TransferCandidate> = candidates
            .iter()
            .filter(|c| c.resource == ResourceKind::Steel)
            .collect();
        assert_eq!(steel.len(), 1);
        assert_eq!(steel[0].target, first.id);
    }

    #[test]
    fn transport_cost_scales_with_distance() {
        let allocator = ResourceAllocator::default();
        let near = allocator.transport_cost(RouteClass::SameBody, ResourceKind::Steel, 300);
        let far = allocator.transport_cost(RouteClass::InterBody, ResourceKind::Steel, 300);
        assert_eq!(near, Decimal::from(20));
        assert_eq!(far, Decimal::from(30));
    }
}
