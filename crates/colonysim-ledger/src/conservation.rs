//! Allocation conservation verification.
//!
//! The allocator must never hand out more of a resource in one tick than the
//! whole system held at the start of that tick. For each resource R in tick T:
//!
//! ```text
//! sum(SystemAllocation entries for R in T) <= available(R)
//! ```
//!
//! Reservations, releases, and deliveries move units between settlements
//! and do not count against the pool.

use std::collections::BTreeMap;

use colonysim_types::ResourceKind;

use crate::LedgerAnomaly;
use crate::entry::{AuditEntry, AuditEntryKind};

/// The result of a conservation check for a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationResult {
    /// Allocations fit within availability for every resource.
    Balanced,
    /// One or more resources were over-allocated.
    Anomaly(LedgerAnomaly),
}

/// Verify the allocation conservation law for a single tick.
///
/// `available` holds the system-wide totals used for the tick's allocation
/// pass. A resource absent from `available` counts as zero available.
pub fn verify_allocations(
    tick: u64,
    entries: &[AuditEntry],
    available: &BTreeMap<ResourceKind, u64>,
) -> ConservationResult {
    let mut allocated: BTreeMap<ResourceKind, u64> = BTreeMap::new();

    for entry in entries {
        if entry.tick != tick || entry.kind != AuditEntryKind::SystemAllocation {
            continue;
        }
        let total = allocated.entry(entry.resource).or_insert(0);
        *total = match total.checked_add(entry.quantity) {
            Some(val) => val,
            None => return overflow_anomaly(tick, entry.resource),
        };
    }

    let excesses: BTreeMap<ResourceKind, (u64, u64)> = allocated
        .into_iter()
        .filter_map(|(resource, granted)| {
            let pool = available.get(&resource).copied().unwrap_or(0);
            (granted > pool).then_some((resource, (granted, pool)))
        })
        .collect();

    if excesses.is_empty() {
        ConservationResult::Balanced
    } else {
        let count = excesses.len();
        ConservationResult::Anomaly(LedgerAnomaly {
            tick,
            excesses,
            message: format!(
                "LEDGER_ANOMALY at tick {tick}: allocations exceed availability for {count} resource(s)",
            ),
        })
    }
}

/// Construct an anomaly result for arithmetic overflow during summation.
fn overflow_anomaly(tick: u64, resource: ResourceKind) -> ConservationResult {
    let mut excesses = BTreeMap::new();
    excesses.insert(resource, (u64::MAX, 0));
    ConservationResult::Anomaly(LedgerAnomaly {
        tick,
        excesses,
        message: format!(
            "LEDGER_ANOMALY at tick {tick}: arithmetic overflow while summing {resource}",
        ),
    })
}
