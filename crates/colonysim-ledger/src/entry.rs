//! Audit entry records and their validating builder.
//!
//! [`EntryBuilder`] enforces that every entry has a positive quantity and
//! exactly the references its [`AuditEntryKind`] requires.

use serde::{Deserialize, Serialize};

use colonysim_types::{ResourceKind, SettlementId, TransferId};

use crate::LedgerError;

/// What kind of movement an [`AuditEntry`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntryKind {
    /// Units drawn from the system pool and granted to a settlement.
    SystemAllocation,
    /// Units set aside at a transfer's source.
    Reservation,
    /// Reserved units returned to the source after a cancel.
    Release,
    /// Units credited at a transfer's target on arrival.
    Delivery,
}

/// A single immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Zero-based position in the ledger.
    pub sequence: u64,
    /// Tick in which the movement happened.
    pub tick: u64,
    /// Kind of movement.
    pub kind: AuditEntryKind,
    /// Resource moved.
    pub resource: ResourceKind,
    /// Whole units moved, always positive.
    pub quantity: u64,
    /// Primary settlement (see the crate-level table).
    pub settlement: SettlementId,
    /// Other side of a transfer movement.
    pub counterparty: Option<SettlementId>,
    /// Transfer the movement belongs to.
    pub transfer_id: Option<TransferId>,
}

/// Builder for constructing validated [`AuditEntry`] values.
///
/// # Examples
///
/// ```
/// use colonysim_ledger::{AuditEntryKind, EntryBuilder};
/// use colonysim_types::{ResourceKind, SettlementId, TransferId};
///
/// let entry = EntryBuilder::new(3, AuditEntryKind::Reservation, ResourceKind::Water)
///     .settlement(SettlementId::from_sequence(1))
///     .counterparty(SettlementId::from_sequence(2))
///     .transfer(TransferId::from_sequence(1))
///     .quantity(120)
///     .build(0);
///
/// assert!(entry.is_ok());
/// ```
#[derive(Debug)]
pub struct EntryBuilder {
    tick: u64,
    kind: AuditEntryKind,
    resource: ResourceKind,
    settlement: Option<SettlementId>,
    counterparty: Option<SettlementId>,
    transfer_id: Option<TransferId>,
    quantity: Option<u64>,
}

impl EntryBuilder {
    /// Start building an entry for the given tick, kind, and resource.
    pub const fn new(tick: u64, kind: AuditEntryKind, resource: ResourceKind) -> Self {
        Self {
            tick,
            kind,
            resource,
            settlement: None,
            counterparty: None,
            transfer_id: None,
            quantity: None,
        }
    }

    /// Set the primary settlement.
    #[must_use]
    pub const fn settlement(mut self, id: SettlementId) -> Self {
        self.settlement = Some(id);
        self
    }

    /// Set the other side of a transfer movement.
    #[must_use]
    pub const fn counterparty(mut self, id: SettlementId) -> Self {
        self.counterparty = Some(id);
        self
    }

    /// Link the entry to a transfer.
    #[must_use]
    pub const fn transfer(mut self, id: TransferId) -> Self {
        self.transfer_id = Some(id);
        self
    }

    /// Set the quantity moved.
    #[must_use]
    pub const fn quantity(mut self, qty: u64) -> Self {
        self.quantity = Some(qty);
        self
    }

    /// Validate inputs and produce an [`AuditEntry`] at position `sequence`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ZeroQuantity`] if the quantity is zero,
    /// [`LedgerError::MissingField`] if a required field is not set, and
    /// [`LedgerError::UnexpectedField`] if a system allocation carries
    /// transfer references.
    pub fn build(self, sequence: u64) -> Result<AuditEntry, LedgerError> {
        let quantity = self.quantity.ok_or(LedgerError::MissingField("quantity"))?;
        let settlement = self
            .settlement
            .ok_or(LedgerError::MissingField("settlement"))?;

        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }

        match self.kind {
            AuditEntryKind::SystemAllocation => {
                if self.transfer_id.is_some() {
                    return Err(LedgerError::UnexpectedField {
                        kind: self.kind,
                        field: "transfer",
                    });
                }
                if self.counterparty.is_some() {
                    return Err(LedgerError::UnexpectedField {
                        kind: self.kind,
                        field: "counterparty",
                    });
                }
            }
            AuditEntryKind::Reservation | AuditEntryKind::Release | AuditEntryKind::Delivery => {
                if self.transfer_id.is_none() {
                    return Err(LedgerError::MissingField("transfer"));
                }
                if self.counterparty.is_none() {
                    return Err(LedgerError::MissingField("counterparty"));
                }
            }
        }

        Ok(AuditEntry {
            sequence,
            tick: self.tick,
            kind: self.kind,
            resource: self.resource,
            quantity,
            settlement,
            counterparty: self.counterparty,
            transfer_id: self.transfer_id,
        })
    }
}
