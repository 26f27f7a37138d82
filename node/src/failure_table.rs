use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

use routing::FailureTableOracle;

use crate::peer_table::PeerId;

/// Tracks `(peer, key, htl)` timeouts recorded from downstream
/// `RouteNotFound`/timeout replies, backing `routing::select_peer`'s
/// priority classes 2 and 4 (§4.5).
pub struct FailureTable {
    entries: RwLock<HashMap<(PeerId, [u8; 32], u8), Instant>>,
}

impl FailureTable {
    pub fn new() -> Self {
        FailureTable { entries: RwLock::new(HashMap::new()) }
    }

    pub fn record_timeout(&self, peer: PeerId, key: [u8; 32], htl: u8, until: Instant) {
        self.entries.write().insert((peer, key, htl), until);
    }

    /// Drops every entry whose deadline has already passed, keeping
    /// the table from growing without bound.
    pub fn expire(&self, now: Instant) {
        self.entries.write().retain(|_, until| *until > now);
    }
}

impl Default for FailureTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureTableOracle<PeerId> for FailureTable {
    fn timeout(&self, peer: &PeerId, key: &[u8; 32], htl: u8) -> Option<Instant> {
        self.entries.read().get(&(*peer, *key, htl)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn a_recorded_timeout_is_reported_back_through_the_oracle_trait() {
        let table = FailureTable::new();
        let now = Instant::now();
        table.record_timeout([1u8; 32], [2u8; 32], 10, now + Duration::from_secs(5));
        assert_eq!(table.timeout(&[1u8; 32], &[2u8; 32], 10), Some(now + Duration::from_secs(5)));
        assert_eq!(table.timeout(&[1u8; 32], &[2u8; 32], 11), None);
    }

    #[test]
    fn expire_drops_past_deadlines() {
        let table = FailureTable::new();
        let now = Instant::now();
        table.record_timeout([1u8; 32], [2u8; 32], 10, now - Duration::from_secs(1));
        table.expire(now);
        assert_eq!(table.timeout(&[1u8; 32], &[2u8; 32], 10), None);
    }
}
