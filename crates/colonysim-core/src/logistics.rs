//! Shipment planning and tracking.
//!
//! The [`LogisticsCoordinator`] merges transfer candidates per route, splits
//! anything larger than the route's capacity, queues shipments FIFO behind
//! a per-route concurrency cap, reserves stock at the source, and moves
//! shipments through their lifecycle as simulated time passes:
//!
//! ```text
//! scheduled / delayed --(start time)--> in_progress --(arrival)--> completed
//! scheduled / delayed --(cancel)--> cancelled
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use colonysim_types::{
    PriorityTier, ResourceKind, RouteClass, SettlementId, Transfer, TransferId, TransferStatus,
};

use crate::allocation::{InFlight, TransferCandidate, distance_factor};
use crate::config::LogisticsConfig;
use crate::numeric::{ratio, to_f64, unit_interval};
use crate::sequence::IdSequence;
use crate::settlement::SettlementRegistry;

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

/// Errors returned by explicit transfer operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogisticsError {
    /// No transfer with this ID is known.
    #[error("unknown transfer {id}")]
    UnknownTransfer {
        /// The requested transfer.
        id: TransferId,
    },

    /// The transfer has already departed or finished.
    #[error("transfer {id} cannot be cancelled while {status:?}")]
    NotCancellable {
        /// The requested transfer.
        id: TransferId,
        /// Its current status.
        status: TransferStatus,
    },
}

/// Outcome of one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    /// Shipments created, with their reservations in place.
    pub scheduled: Vec<Transfer>,
    /// Candidates whose shipment failed to reserve; retried next pass.
    pub requeued: Vec<TransferCandidate>,
}

/// Shipments that changed state during [`LogisticsCoordinator::advance`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdvanceReport {
    /// Shipments that departed.
    pub departed: Vec<TransferId>,
    /// Shipments that arrived and were credited.
    pub completed: Vec<Transfer>,
}

/// Status of one shipment with its transit progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransferProgress {
    /// Shipment.
    pub id: TransferId,
    /// Lifecycle state.
    pub status: TransferStatus,
    /// Fraction of transit elapsed, 0 to 1.
    pub progress: f64,
    /// Scheduled arrival.
    pub estimated_completion: DateTime<Utc>,
}

/// Aggregate logistics figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogisticsMetrics {
    /// Shipments scheduled, delayed, or in transit.
    pub active_transfers: usize,
    /// Shipments ever created.
    pub total_transfers: usize,
    /// Share of shipments completed.
    pub completion_rate: f64,
    /// Share of shipments that had to queue behind a busy route.
    pub delay_rate: f64,
    /// Mean transport cost over all shipments.
    pub average_cost: Decimal,
    /// Mean load of active shipments relative to route capacity.
    pub utilisation: f64,
}

/// Candidates merged onto one source/target pair.
#[derive(Debug, Clone)]
struct Route {
    source: SettlementId,
    target: SettlementId,
    route_class: RouteClass,
    priority: PriorityTier,
    resources: BTreeMap<ResourceKind, u64>,
}

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

fn total_of(resources: &BTreeMap<ResourceKind, u64>) -> u64 {
    resources.values().fold(0_u64, |acc, q| acc.saturating_add(*q))
}

/// `floor(quantity × numerator / denominator)` without overflow.
fn scaled(quantity: u64, numerator: u64, denominator: u64) -> u64 {
    let product = u128::from(quantity).saturating_mul(u128::from(numerator));
    let value = product.checked_div(u128::from(denominator)).unwrap_or(0);
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Split a shipment into `count` chunks of near-equal size.
///
/// The first `total % count` chunks carry one unit more. Each resource is
/// apportioned by the running chunk boundary, so per-resource quantities
/// sum back to the original exactly.
fn proportional_chunks(
    resources: &BTreeMap<ResourceKind, u64>,
    total: u64,
    count: u64,
) -> Vec<BTreeMap<ResourceKind, u64>> {
    let base = total.checked_div(count).unwrap_or(0);
    let extra = total.checked_rem(count).unwrap_or(0);

    let mut chunks = Vec::new();
    let mut boundary: u64 = 0;
    for k in 0..count {
        let size = if k < extra { base.saturating_add(1) } else { base };
        let next = boundary.saturating_add(size);
        let chunk: BTreeMap<ResourceKind, u64> = resources
            .iter()
            .filter_map(|(&resource, &quantity)| {
                let share = scaled(quantity, next, total)
                    .saturating_sub(scaled(quantity, boundary, total));
                (share > 0).then_some((resource, share))
            })
            .collect();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        boundary = next;
    }
    chunks
}

/// Fill capacity-sized chunks resource by resource, in key order.
fn sequential_chunks(
    resources: &BTreeMap<ResourceKind, u64>,
    capacity: u64,
) -> Vec<BTreeMap<ResourceKind, u64>> {
    let mut chunks = Vec::new();
    let mut current: BTreeMap<ResourceKind, u64> = BTreeMap::new();
    let mut room = capacity;
    for (&resource, &quantity) in resources {
        let mut left = quantity;
        while left > 0 {
            let take = left.min(room);
            let slot = current.entry(resource).or_insert(0);
            *slot = slot.saturating_add(take);
            left = left.saturating_sub(take);
            room = room.saturating_sub(take);
            if room == 0 {
                chunks.push(core::mem::take(&mut current));
                room = capacity;
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split `resources` into chunks no larger than `capacity` whose per-resource
/// quantities sum to the input exactly.
///
/// Tries `ceil(total / capacity)` proportional chunks first, adding one more
/// chunk whenever rounding pushes a chunk over capacity, and falls back to
/// filling chunks sequentially if that never settles.
pub fn split_shipment(
    resources: &BTreeMap<ResourceKind, u64>,
    capacity: u64,
) -> Vec<BTreeMap<ResourceKind, u64>> {
    let capacity = capacity.max(1);
    let total = total_of(resources);
    if total == 0 {
        return Vec::new();
    }
    if total <= capacity {
        return vec![resources.clone()];
    }

    let first = total.div_ceil(capacity);
    let attempts = u64::try_from(resources.len()).unwrap_or(u64::MAX);
    for count in first..=first.saturating_add(attempts) {
        let chunks = proportional_chunks(resources, total, count);
        if chunks.iter().all(|chunk| total_of(chunk) <= capacity) {
            return chunks;
        }
    }
    sequential_chunks(resources, capacity)
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Plans, reserves, and tracks inter-settlement shipments.
#[derive(Debug, Clone, Default)]
pub struct LogisticsCoordinator {
    config: LogisticsConfig,
    transfers: BTreeMap<TransferId, Transfer>,
    queued_behind_route: BTreeSet<TransferId>,
    requeued: Vec<TransferCandidate>,
}

impl LogisticsCoordinator {
    /// Create a coordinator.
    pub const fn new(config: LogisticsConfig) -> Self {
        Self {
            config,
            transfers: BTreeMap::new(),
            queued_behind_route: BTreeSet::new(),
            requeued: Vec::new(),
        }
    }

    /// Look up a shipment.
    pub fn transfer(&self, id: TransferId) -> Option<&Transfer> {
        self.transfers.get(&id)
    }

    /// Every shipment ever created, by ID.
    pub fn transfers(&self) -> impl Iterator<Item = &Transfer> {
        self.transfers.values()
    }

    /// Shipments still scheduled, delayed, or in transit.
    pub fn active_transfers(&self) -> impl Iterator<Item = &Transfer> {
        self.transfers.values().filter(|t| t.status.is_in_flight())
    }

    /// Candidates waiting to be retried after a failed reservation.
    pub fn requeued(&self) -> &[TransferCandidate] {
        &self.requeued
    }

    /// Units heading to each settlement, per resource.
    pub fn in_flight_incoming(&self) -> InFlight {
        let mut incoming = InFlight::new();
        for transfer in self.active_transfers() {
            for (&resource, &quantity) in &transfer.resources {
                let total = incoming.entry((transfer.target, resource)).or_insert(0);
                *total = total.saturating_add(quantity);
            }
        }
        incoming
    }

    /// Shipment cost: `(base + per_unit × total) × distance factor`.
    pub fn shipment_cost(&self, class: RouteClass, total: u64) -> Decimal {
        self.config
            .per_unit_cost
            .checked_mul(Decimal::from(total))
            .and_then(|variable| self.config.base_cost.checked_add(variable))
            .and_then(|cost| cost.checked_mul(distance_factor(class)))
            .unwrap_or(Decimal::MAX)
    }

    /// Start time and status for the next shipment on a route.
    ///
    /// With fewer than `max_concurrent_transfers` in flight the shipment
    /// leaves now. Otherwise it waits for the in-flight arrival that frees
    /// its place in the queue, plus the congestion delay.
    fn next_slot(
        &self,
        source: SettlementId,
        target: SettlementId,
        now: DateTime<Utc>,
    ) -> (DateTime<Utc>, TransferStatus) {
        let mut arrivals: Vec<DateTime<Utc>> = self
            .active_transfers()
            .filter(|t| t.source == source && t.target == target)
            .map(|t| t.estimated_completion)
            .collect();
        let limit = self.config.max_concurrent_transfers;
        if arrivals.len() < limit {
            return (now, TransferStatus::Scheduled);
        }
        arrivals.sort();
        let freed = arrivals
            .get(arrivals.len().saturating_sub(limit))
            .copied()
            .unwrap_or(now);
        let start = freed
            .checked_add_signed(self.config.congestion_delay())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .max(now);
        (start, TransferStatus::Delayed)
    }

    /// Merge candidates per route, keeping first-seen route order.
    fn merge_routes(candidates: Vec<TransferCandidate>) -> Vec<Route> {
        let mut routes: Vec<Route> = Vec::new();
        for candidate in candidates {
            let position = routes
                .iter()
                .position(|r| r.source == candidate.source && r.target == candidate.target);
            let index = position.unwrap_or(routes.len());
            if position.is_none() {
                routes.push(Route {
                    source: candidate.source,
                    target: candidate.target,
                    route_class: candidate.route_class,
                    priority: candidate.priority,
                    resources: BTreeMap::new(),
                });
            }
            if let Some(route) = routes.get_mut(index) {
                route.priority = route.priority.max(candidate.priority);
                let slot = route.resources.entry(candidate.resource).or_insert(0);
                *slot = slot.saturating_add(candidate.quantity);
            }
        }
        routes
    }

    /// Turn candidates (plus last pass's failed ones) into reserved
    /// shipments.
    ///
    /// A retried candidate is dropped when a fresh candidate targets the
    /// same settlement and resource. A shipment whose source cannot cover
    /// the reservation is abandoned and its candidates kept for the next
    /// pass.
    pub fn optimize_and_schedule(
        &mut self,
        candidates: Vec<TransferCandidate>,
        now: DateTime<Utc>,
        registry: &mut SettlementRegistry,
        ids: &mut IdSequence,
    ) -> ScheduleReport {
        let retried = core::mem::take(&mut self.requeued);
        let mut pending: Vec<TransferCandidate> = retried
            .into_iter()
            .filter(|old| {
                !candidates
                    .iter()
                    .any(|new| new.target == old.target && new.resource == old.resource)
            })
            .collect();
        pending.extend(candidates);

        let mut report = ScheduleReport::default();
        for route in Self::merge_routes(pending) {
            let capacity = self.config.capacity(route.route_class);
            for chunk in split_shipment(&route.resources, capacity) {
                self.schedule_chunk(&route, chunk, now, registry, ids, &mut report);
            }
        }
        self.requeued.clone_from(&report.requeued);
        report
    }

    fn schedule_chunk(
        &mut self,
        route: &Route,
        chunk: BTreeMap<ResourceKind, u64>,
        now: DateTime<Utc>,
        registry: &mut SettlementRegistry,
        ids: &mut IdSequence,
        report: &mut ScheduleReport,
    ) {
        let id = ids.next_transfer();
        let Some(source) = registry.get_mut(route.source) else {
            warn!(
                transfer_id = %id,
                source = %route.source,
                "shipment source not registered, abandoned"
            );
            return;
        };
        if let Err(err) = source.reserve_resources(id, &chunk) {
            warn!(
                transfer_id = %id,
                source = %route.source,
                target = %route.target,
                error = %err,
                "reservation failed, shipment abandoned"
            );
            report
                .requeued
                .extend(chunk.into_iter().map(|(resource, quantity)| TransferCandidate {
                    source: route.source,
                    target: route.target,
                    resource,
                    quantity,
                    priority: route.priority,
                    route_class: route.route_class,
                    cost: Decimal::ZERO,
                }));
            return;
        }

        let (scheduled_time, status) = self.next_slot(route.source, route.target, now);
        let estimated_completion = scheduled_time
            .checked_add_signed(self.config.transit(route.route_class))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let total_quantity = total_of(&chunk);
        let transfer = Transfer {
            id,
            source: route.source,
            target: route.target,
            resources: chunk,
            total_quantity,
            priority: route.priority,
            route_class: route.route_class,
            transport_cost: self.shipment_cost(route.route_class, total_quantity),
            scheduled_time,
            estimated_completion,
            status,
        };
        if status == TransferStatus::Delayed {
            self.queued_behind_route.insert(id);
        }
        info!(
            transfer_id = %id,
            source = %transfer.source,
            target = %transfer.target,
            total_quantity,
            status = ?status,
            scheduled_time = %scheduled_time,
            "transfer scheduled"
        );
        self.transfers.insert(id, transfer.clone());
        report.scheduled.push(transfer);
    }

    /// Move shipments along as simulated time reaches their start and
    /// arrival times. Arrivals are credited to the target and settle the
    /// source reservation.
    pub fn advance(
        &mut self,
        now: DateTime<Utc>,
        registry: &mut SettlementRegistry,
    ) -> AdvanceReport {
        let mut report = AdvanceReport::default();
        for transfer in self.transfers.values_mut() {
            if transfer.status.is_cancellable() && now >= transfer.scheduled_time {
                transfer.status = TransferStatus::InProgress;
                debug!(transfer_id = %transfer.id, "transfer departed");
                report.departed.push(transfer.id);
            }
            if transfer.status != TransferStatus::InProgress
                || now < transfer.estimated_completion
            {
                continue;
            }

            match registry.get_mut(transfer.target) {
                Some(target) => {
                    if let Err(err) = target.receive_resources(&transfer.resources) {
                        warn!(transfer_id = %transfer.id, error = %err, "delivery credit failed");
                    }
                }
                None => warn!(
                    transfer_id = %transfer.id,
                    target = %transfer.target,
                    "delivery target no longer registered"
                ),
            }
            if let Some(source) = registry.get_mut(transfer.source) {
                source.complete_reservation(transfer.id);
            }
            transfer.status = TransferStatus::Completed;
            info!(
                transfer_id = %transfer.id,
                target = %transfer.target,
                total_quantity = transfer.total_quantity,
                "transfer completed"
            );
            report.completed.push(transfer.clone());
        }
        report
    }

    /// Cancel a shipment that has not departed and return its reservation
    /// to the source.
    ///
    /// # Errors
    ///
    /// Returns [`LogisticsError`] if the shipment is unknown or already
    /// under way.
    pub fn cancel_transfer(
        &mut self,
        id: TransferId,
        registry: &mut SettlementRegistry,
    ) -> Result<Transfer, LogisticsError> {
        let transfer = self
            .transfers
            .get_mut(&id)
            .ok_or(LogisticsError::UnknownTransfer { id })?;
        if !transfer.status.is_cancellable() {
            return Err(LogisticsError::NotCancellable {
                id,
                status: transfer.status,
            });
        }
        transfer.status = TransferStatus::Cancelled;
        if let Some(source) = registry.get_mut(transfer.source) {
            source.release_resources(id);
        }
        info!(transfer_id = %id, source = %transfer.source, "transfer cancelled");
        Ok(transfer.clone())
    }

    /// Cancel every shipment to or from `settlement` that has not departed.
    pub fn cancel_involving(
        &mut self,
        settlement: SettlementId,
        registry: &mut SettlementRegistry,
    ) -> Vec<Transfer> {
        let ids: Vec<TransferId> = self
            .transfers
            .values()
            .filter(|t| {
                t.status.is_cancellable() && (t.source == settlement || t.target == settlement)
            })
            .map(|t| t.id)
            .collect();
        self.requeued
            .retain(|c| c.source != settlement && c.target != settlement);
        ids.into_iter()
            .filter_map(|id| self.cancel_transfer(id, registry).ok())
            .collect()
    }

    /// Status and transit progress of a shipment.
    pub fn transfer_status(
        &self,
        id: TransferId,
        now: DateTime<Utc>,
    ) -> Option<TransferProgress> {
        let transfer = self.transfers.get(&id)?;
        let progress = match transfer.status {
            TransferStatus::Completed => 1.0,
            TransferStatus::InProgress => {
                let total = transfer
                    .estimated_completion
                    .signed_duration_since(transfer.scheduled_time)
                    .num_seconds();
                let elapsed = now.signed_duration_since(transfer.scheduled_time).num_seconds();
                if total <= 0 {
                    1.0
                } else {
                    unit_interval(ratio(
                        u64::try_from(elapsed).unwrap_or(0),
                        u64::try_from(total).unwrap_or(1),
                    ))
                }
            }
            TransferStatus::Proposed
            | TransferStatus::Scheduled
            | TransferStatus::Delayed
            | TransferStatus::Cancelled => 0.0,
        };
        Some(TransferProgress {
            id,
            status: transfer.status,
            progress,
            estimated_completion: transfer.estimated_completion,
        })
    }

    /// Aggregate figures over every shipment.
    pub fn logistics_metrics(&self) -> LogisticsMetrics {
        let total = self.transfers.len();
        let total_units = u64::try_from(total).unwrap_or(u64::MAX);
        let completed = self
            .transfers
            .values()
            .filter(|t| t.status == TransferStatus::Completed)
            .count();
        let delayed = self.queued_behind_route.len();
        let cost_sum = self
            .transfers
            .values()
            .fold(Decimal::ZERO, |acc, t| acc.saturating_add(t.transport_cost));
        let average_cost = cost_sum
            .checked_div(Decimal::from(total_units))
            .unwrap_or(Decimal::ZERO);

        let loads: Vec<f64> = self
            .active_transfers()
            .map(|t| ratio(t.total_quantity, self.config.capacity(t.route_class)))
            .collect();
        let utilisation = if loads.is_empty() {
            0.0
        } else {
            loads.iter().sum::<f64>() / to_f64(u64::try_from(loads.len()).unwrap_or(u64::MAX))
        };

        LogisticsMetrics {
            active_transfers: loads.len(),
            total_transfers: total,
            completion_rate: ratio(u64::try_from(completed).unwrap_or(0), total_units),
            delay_rate: ratio(u64::try_from(delayed).unwrap_or(0), total_units),
            average_cost,
            utilisation,
        }
    }
}
