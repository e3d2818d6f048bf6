//! Append-only audit ledger for the Colonysim settlement economy.
//!
//! Every quantity the core moves is recorded here: grants drawn from the
//! system pool, reservations taken at a transfer's source, releases of
//! cancelled reservations, and deliveries credited at a transfer's target.
//! The orchestrator checks the allocation conservation law against this log
//! at the end of every tick.
//!
//! # Architecture
//!
//! - [`ledger`] -- The [`AuditLedger`] struct: append-only log with recording methods.
//! - [`entry`] -- The [`EntryBuilder`] for validated entry construction.
//! - [`conservation`] -- Allocation conservation verification.
//!
//! # Conservation Law
//!
//! For every tick T and every resource R:
//!
//! ```text
//! sum(system allocations of R in T) <= total available R at the start of T
//! ```
//!
//! A violation produces a [`LedgerAnomaly`]. The ledger never panics; it
//! returns errors.
//!
//! # Entry kinds
//!
//! | Kind | Settlement | Counterparty | Transfer |
//! |------|------------|--------------|----------|
//! | `SystemAllocation` | receiver | none | none |
//! | `Reservation` | source | target | required |
//! | `Release` | source | target | required |
//! | `Delivery` | target | source | required |
//!
//! # Usage
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use colonysim_ledger::{AuditLedger, ConservationResult};
//! use colonysim_types::{ResourceKind, SettlementId};
//!
//! let mut ledger = AuditLedger::new();
//! let colony = SettlementId::from_sequence(1);
//!
//! ledger
//!     .record_allocation(1, colony, ResourceKind::Energy, 400)
//!     .ok();
//!
//! let available = BTreeMap::from([(ResourceKind::Energy, 1000)]);
//! assert_eq!(ledger.verify_allocations(1, &available), ConservationResult::Balanced);
//! ```

pub mod conservation;
pub mod entry;
pub mod ledger;

// Re-export primary types at crate root.
pub use conservation::ConservationResult;
pub use entry::{AuditEntry, AuditEntryKind, EntryBuilder};
pub use ledger::AuditLedger;

use std::collections::BTreeMap;

use colonysim_types::ResourceKind;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when recording ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Quantity must be strictly positive.
    #[error("ledger entry quantity must be non-zero")]
    ZeroQuantity,

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field was set that the entry kind does not allow.
    #[error("{kind:?} entries must not carry a {field}")]
    UnexpectedField {
        /// The entry kind being validated.
        kind: AuditEntryKind,
        /// The offending field.
        field: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// An allocation conservation violation detected during tick verification.
///
/// Captures, for every resource whose allocations exceeded what was
/// available, the pair `(allocated, available)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAnomaly {
    /// The tick where the anomaly was detected.
    pub tick: u64,
    /// Per-resource excess: (`allocated`, `available`).
    pub excesses: BTreeMap<ResourceKind, (u64, u64)>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for LedgerAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
