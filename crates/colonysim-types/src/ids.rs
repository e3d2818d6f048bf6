//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every record in the core has a strongly-typed ID so that a settlement ID
//! can never be passed where a transfer ID is expected. Settlement IDs come
//! from the settlement data provider and normally use UUID v7. IDs minted by
//! the core itself (transfers, conflicts, requests, missions) are built from
//! a per-run counter via [`from_sequence`] so that two runs over identical
//! input produce identical output.
//!
//! [`from_sequence`]: SettlementId::from_sequence

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// High half of every sequence-derived UUID. Keeps them visually distinct
/// from v7 IDs in logs.
const SEQUENCE_PREFIX: u64 = 0x636f_6c6f_6e79_0000;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create a deterministic identifier from a sequence number.
            pub const fn from_sequence(seq: u64) -> Self {
                Self(Uuid::from_u64_pair(SEQUENCE_PREFIX, seq))
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a settlement (colony) registered with the core.
    SettlementId
}

define_id! {
    /// Unique identifier for a scheduled inter-settlement shipment.
    TransferId
}

define_id! {
    /// Unique identifier for an arbitration conflict or declared crisis.
    ConflictId
}

define_id! {
    /// Unique identifier for a resource request filed through the shared context.
    RequestId
}

define_id! {
    /// Unique identifier for a mission handed to an external executor.
    MissionId
}
