//! The audit ledger: an append-only log of every quantity the core moves.
//!
//! # Design
//!
//! - **Append-only**: entries are never modified or deleted.
//! - **Whole units**: quantities are `u64`; fractional units never exist.
//! - **Conservation**: system allocations never exceed availability per tick.

use std::collections::BTreeMap;

use tracing::debug;

use colonysim_types::{ResourceKind, SettlementId, Transfer, TransferId};

use crate::conservation::{ConservationResult, verify_allocations};
use crate::entry::{AuditEntry, AuditEntryKind, EntryBuilder};
use crate::LedgerError;

/// The audit ledger for one simulation run.
#[derive(Debug, Default)]
pub struct AuditLedger {
    /// All entries, in insertion order.
    entries: Vec<AuditEntry>,
}

impl AuditLedger {
    /// Create a new empty ledger.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Return the number of entries in the ledger.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether the ledger has no entries.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries recorded during `tick`.
    pub fn entries_for_tick(&self, tick: u64) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().filter(move |e| e.tick == tick)
    }

    /// Validate and append an entry.
    fn push(&mut self, builder: EntryBuilder) -> Result<&AuditEntry, LedgerError> {
        let sequence = u64::try_from(self.entries.len()).unwrap_or(u64::MAX);
        let entry = builder.build(sequence)?;
        debug!(
            tick = entry.tick,
            kind = ?entry.kind,
            resource = %entry.resource,
            quantity = entry.quantity,
            settlement_id = %entry.settlement,
            "ledger entry recorded"
        );
        self.entries.push(entry);
        self.entries
            .last()
            .ok_or(LedgerError::MissingField("entry"))
    }

    /// Record a grant drawn from the system pool.
    pub fn record_allocation(
        &mut self,
        tick: u64,
        settlement: SettlementId,
        resource: ResourceKind,
        quantity: u64,
    ) -> Result<&AuditEntry, LedgerError> {
        self.push(
            EntryBuilder::new(tick, AuditEntryKind::SystemAllocation, resource)
                .settlement(settlement)
                .quantity(quantity),
        )
    }

    /// Record one transfer-side movement for every resource on the transfer.
    fn record_transfer_movement(
        &mut self,
        tick: u64,
        kind: AuditEntryKind,
        transfer: &Transfer,
    ) -> Result<usize, LedgerError> {
        let (settlement, counterparty) = match kind {
            AuditEntryKind::Delivery => (transfer.target, transfer.source),
            AuditEntryKind::SystemAllocation
            | AuditEntryKind::Reservation
            | AuditEntryKind::Release => (transfer.source, transfer.target),
        };
        let mut recorded: usize = 0;
        for (&resource, &quantity) in &transfer.resources {
            if quantity == 0 {
                continue;
            }
            self.push(
                EntryBuilder::new(tick, kind, resource)
                    .settlement(settlement)
                    .counterparty(counterparty)
                    .transfer(transfer.id)
                    .quantity(quantity),
            )?;
            recorded = recorded.saturating_add(1);
        }
        Ok(recorded)
    }

    /// Record the reservation taken when a transfer is scheduled.
    pub fn record_reservation(
        &mut self,
        tick: u64,
        transfer: &Transfer,
    ) -> Result<usize, LedgerError> {
        self.record_transfer_movement(tick, AuditEntryKind::Reservation, transfer)
    }

    /// Record the release of a cancelled transfer's reservation.
    pub fn record_release(&mut self, tick: u64, transfer: &Transfer) -> Result<usize, LedgerError> {
        self.record_transfer_movement(tick, AuditEntryKind::Release, transfer)
    }

    /// Record a completed transfer's delivery at its target.
    pub fn record_delivery(
        &mut self,
        tick: u64,
        transfer: &Transfer,
    ) -> Result<usize, LedgerError> {
        self.record_transfer_movement(tick, AuditEntryKind::Delivery, transfer)
    }

    /// Check the allocation conservation law for `tick`.
    pub fn verify_allocations(
        &self,
        tick: u64,
        available: &BTreeMap<ResourceKind, u64>,
    ) -> ConservationResult {
        verify_allocations(tick, &self.entries, available)
    }

    /// Units currently reserved and not yet released or delivered, per
    /// resource.
    pub fn in_transit(&self) -> BTreeMap<ResourceKind, u64> {
        let mut reserved: BTreeMap<ResourceKind, u64> = BTreeMap::new();
        let mut settled: BTreeMap<ResourceKind, u64> = BTreeMap::new();

        for entry in &self.entries {
            let bucket = match entry.kind {
                AuditEntryKind::Reservation => &mut reserved,
                AuditEntryKind::Release | AuditEntryKind::Delivery => &mut settled,
                AuditEntryKind::SystemAllocation => continue,
            };
            let total = bucket.entry(entry.resource).or_insert(0);
            *total = total.saturating_add(entry.quantity);
        }

        reserved
            .into_iter()
            .filter_map(|(resource, qty)| {
                let done = settled.get(&resource).copied().unwrap_or(0);
                let open = qty.saturating_sub(done);
                (open > 0).then_some((resource, open))
            })
            .collect()
    }

    /// Reserved units still open for a single transfer.
    pub fn open_reservation(&self, transfer_id: TransferId) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.transfer_id == Some(transfer_id))
            .fold(0_u64, |acc, e| match e.kind {
                AuditEntryKind::Reservation => acc.saturating_add(e.quantity),
                AuditEntryKind::Release | AuditEntryKind::Delivery => {
                    acc.saturating_sub(e.quantity)
                }
                AuditEntryKind::SystemAllocation => acc,
            })
    }
}
