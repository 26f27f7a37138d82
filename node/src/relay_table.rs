use std::collections::HashMap;

use parking_lot::RwLock;

use crate::peer_table::PeerId;

/// Correlates a downstream request this node forwarded on a peer's
/// behalf with where the eventual reply must be routed back to: every
/// node is also a relay for its peers' requests, not just an
/// originator for its own client's (§4.5/§4.6).
#[derive(Debug, Clone, Copy)]
pub struct RelayEntry {
    pub origin_peer: PeerId,
    pub origin_uid: u64,
    pub requested_htl: u8,
    pub key: [u8; 32],
}

/// Third rung alongside `PeerTable`/`SessionTable` in §5's lock
/// discipline: keyed by the uid this node minted for the downstream
/// hop, not the uid the upstream peer used.
pub struct RelayTable {
    entries: RwLock<HashMap<u64, RelayEntry>>,
}

impl RelayTable {
    pub fn new() -> Self {
        RelayTable { entries: RwLock::new(HashMap::new()) }
    }

    pub fn insert(&self, downstream_uid: u64, entry: RelayEntry) {
        self.entries.write().insert(downstream_uid, entry);
    }

    pub fn remove(&self, downstream_uid: u64) -> Option<RelayEntry> {
        self.entries.write().remove(&downstream_uid)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RelayTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_inserted_entry_is_removed_exactly_once() {
        let table = RelayTable::new();
        table.insert(7, RelayEntry { origin_peer: [1u8; 32], origin_uid: 3, requested_htl: 18, key: [9u8; 32] });
        assert!(table.remove(7).is_some());
        assert!(table.remove(7).is_none());
    }

    #[test]
    fn an_unknown_uid_is_not_found() {
        let table = RelayTable::new();
        assert!(table.remove(1).is_none());
    }
}
