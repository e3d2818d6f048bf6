//! Deterministic identifier minting.
//!
//! Every ID the core creates comes from one [`IdSequence`] owned by the
//! shared context. Counters start at 1 and advance by one per ID, so two
//! runs over identical input mint identical IDs.

use colonysim_types::{ConflictId, MissionId, RequestId, TransferId};

/// Per-run counters for core-minted identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSequence {
    transfers: u64,
    conflicts: u64,
    requests: u64,
    missions: u64,
}

/// Advance `counter` and return its new value.
const fn bump(counter: &mut u64) -> u64 {
    *counter = counter.saturating_add(1);
    *counter
}

impl IdSequence {
    /// Create a sequence with all counters at zero.
    pub const fn new() -> Self {
        Self {
            transfers: 0,
            conflicts: 0,
            requests: 0,
            missions: 0,
        }
    }

    /// Mint the next transfer ID.
    pub const fn next_transfer(&mut self) -> TransferId {
        TransferId::from_sequence(bump(&mut self.transfers))
    }

    /// Mint the next conflict ID.
    pub const fn next_conflict(&mut self) -> ConflictId {
        ConflictId::from_sequence(bump(&mut self.conflicts))
    }

    /// Mint the next request ID.
    pub const fn next_request(&mut self) -> RequestId {
        RequestId::from_sequence(bump(&mut self.requests))
    }

    /// Mint the next mission ID.
    pub const fn next_mission(&mut self) -> MissionId {
        MissionId::from_sequence(bump(&mut self.missions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_sequences_mint_identical_ids() {
        let mut a = IdSequence::new();
        let mut b = IdSequence::new();
        assert_eq!(a.next_transfer(), b.next_transfer());
        assert_eq!(a.next_conflict(), b.next_conflict());
        assert_ne!(a.next_transfer(), TransferId::from_sequence(1));
    }

    #[test]
    fn counters_are_independent() {
        let mut ids = IdSequence::new();
        let _ = ids.next_transfer();
        let _ = ids.next_transfer();
        assert_eq!(ids.next_request(), RequestId::from_sequence(1));
        assert_eq!(ids.next_transfer(), TransferId::from_sequence(3));
    }
}
