use std::collections::HashMap;

use parking_lot::RwLock;

use keys::Location;
use routing::PeerCandidate;

use crate::noderef::NodeRef;

/// A peer identity as used as the generic `Id` parameter of
/// `routing::select_peer` and `routing::FailureTableOracle` throughout
/// this crate: the peer's identity hash, which is also the handshake's
/// `initiator_identity_hash`/the key under which sessions are indexed.
pub type PeerId = [u8; 32];

#[derive(Debug, Clone)]
pub struct Peer {
    pub reference: NodeRef,
    pub peer_of_peer_locations: Vec<Location>,
    pub routable: bool,
    pub disconnecting: bool,
    pub mandatory_backoff: bool,
    pub routing_backoff: bool,
}

/// Multiple-reader/single-writer peer table (§5's lock-discipline
/// first rung: peer table → session table → request tracker →
/// datastore).
pub struct PeerTable {
    peers: RwLock<HashMap<PeerId, Peer>>,
}

impl PeerTable {
    pub fn new() -> Self {
        PeerTable { peers: RwLock::new(HashMap::new()) }
    }

    pub fn insert(&self, id: PeerId, peer: Peer) {
        self.peers.write().insert(id, peer);
    }

    pub fn remove(&self, id: &PeerId) -> Option<Peer> {
        self.peers.write().remove(id)
    }

    pub fn mark_disconnecting(&self, id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(id) {
            peer.disconnecting = true;
        }
    }

    pub fn address(&self, id: &PeerId) -> Option<std::net::SocketAddr> {
        self.peers.read().get(id).map(|peer| peer.reference.address)
    }

    pub fn identity_hash_for_address(&self, address: std::net::SocketAddr) -> Option<PeerId> {
        self.peers.read().iter().find(|(_, peer)| peer.reference.address == address).map(|(id, _)| *id)
    }

    /// Snapshots the table as `routing::PeerCandidate`s for a single
    /// selection call, excluding peers already tried for this request.
    pub fn candidates(&self, already_routed: &[u64], id_to_u64: impl Fn(&PeerId) -> u64) -> Vec<PeerCandidate<PeerId>> {
        self.peers
            .read()
            .iter()
            .map(|(id, peer)| PeerCandidate {
                id: *id,
                declared_location: peer.reference.location,
                peer_of_peer_locations: peer.peer_of_peer_locations.clone(),
                routable: peer.routable,
                disconnecting: peer.disconnecting,
                mandatory_backoff: peer.mandatory_backoff,
                already_routed: already_routed.contains(&id_to_u64(id)),
                routing_backoff: peer.routing_backoff,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn peer(location: f64) -> Peer {
        Peer {
            reference: NodeRef {
                identity_hash: [0u8; 32],
                location: Location::from_raw(location),
                address: "127.0.0.1:1".parse::<SocketAddr>().unwrap(),
                build: 1,
            },
            peer_of_peer_locations: Vec::new(),
            routable: true,
            disconnecting: false,
            mandatory_backoff: false,
            routing_backoff: false,
        }
    }

    #[test]
    fn inserted_peers_appear_in_candidate_snapshots() {
        let table = PeerTable::new();
        table.insert([1u8; 32], peer(0.3));
        let candidates = table.candidates(&[], |id| id[0] as u64);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].routable);
    }

    #[test]
    fn a_disconnecting_peer_is_marked_in_its_candidate() {
        let table = PeerTable::new();
        table.insert([2u8; 32], peer(0.6));
        table.mark_disconnecting(&[2u8; 32]);
        let candidates = table.candidates(&[], |id| id[0] as u64);
        assert!(candidates[0].disconnecting);
    }
}
