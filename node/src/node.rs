use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use block::{ChkBlock, SskBlock};
use keys::Location;
use link::{FieldValue, Identity, MessageKind, NpfMessage};
use request::{classify_reply, ForwardOutcome, TerminalStatus};
use routing::{select_peer, should_cache, HtlPolicy, SelectionOutcome};
use store::{FileStore, RamStore, StoredPayload};

use crate::config::Config;
use crate::failure_table::FailureTable;
use crate::peer_table::{PeerId, PeerTable};
use crate::relay_table::{RelayEntry, RelayTable};
use crate::session_table::SessionTable;

/// The outcome of a client-initiated CHK/SSK fetch (§4.6, surfaced to
/// the client protocol as `DataFound`/`GetFailed`).
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(Vec<u8>),
    Failed(TerminalStatus),
    RecentlyFailed(Instant),
}

/// The outcome of a client-initiated CHK insert (§4.6/§6.2, surfaced
/// as `PutSuccessful`/`PutFailed`). Unlike a fetch, a local store
/// failure aside, this always settles `Success` once the block is on
/// this node's own datastore — propagation to peers is attempted but
/// does not gate the client's result (§4.6's forward policy has no
/// "undo" for a local insert that already succeeded).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsertOutcome {
    Success,
    Failed(TerminalStatus),
}

/// One outbound datagram queued for a peer, drained by the sender
/// tick (§5: a periodic ~500ms loop per session).
pub struct OutboundDatagram {
    pub peer: PeerId,
    pub payload: Vec<u8>,
}

/// The running node: datastores, peer/session/failure tables, the
/// request tracker, and the glue that turns a client `ClientGet` into
/// a local lookup or a forwarded request (§4.6).
pub struct Node {
    pub config: Config,
    pub identity: Identity,
    pub own_location: Mutex<Location>,
    pub chk_store: FileStore<ChkBlock>,
    pub ssk_store: FileStore<SskBlock>,
    ram_cache_chk: RamStore<ChkBlock>,
    ram_cache_ssk: RamStore<SskBlock>,
    pub peer_table: PeerTable,
    pub session_table: SessionTable,
    pub failure_table: FailureTable,
    pub relay_table: RelayTable,
    pub htl_policy: HtlPolicy,
    next_uid: AtomicU64,
    pending_replies: Mutex<HashMap<u64, oneshot::Sender<NpfMessage>>>,
    outbound: mpsc::UnboundedSender<OutboundDatagram>,
}

impl Node {
    pub fn new(
        config: Config,
        identity: Identity,
        own_location: Location,
        chk_store: FileStore<ChkBlock>,
        ssk_store: FileStore<SskBlock>,
        outbound: mpsc::UnboundedSender<OutboundDatagram>,
    ) -> Self {
        let htl_policy = if config.routing.deterministic_htl {
            HtlPolicy::deterministic()
        } else {
            HtlPolicy::new(&mut rand::thread_rng())
        };
        let ram_cache_keys = config.datastore.ram_cache_keys;
        Node {
            config,
            identity,
            own_location: Mutex::new(own_location),
            chk_store,
            ssk_store,
            ram_cache_chk: RamStore::new(ram_cache_keys),
            ram_cache_ssk: RamStore::new(ram_cache_keys),
            peer_table: PeerTable::new(),
            session_table: SessionTable::new(),
            failure_table: FailureTable::new(),
            relay_table: RelayTable::new(),
            htl_policy,
            next_uid: AtomicU64::new(1),
            pending_replies: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    pub fn allocate_uid(&self) -> u64 {
        self.next_uid.fetch_add(1, Ordering::Relaxed)
    }

    /// Resolves a `uid`-tagged reply against a waiting `fetch_*`/
    /// `insert_*` call of this node's own. Returns whether one was
    /// actually waiting, so callers can fall back to relay
    /// correlation when it wasn't.
    fn resolve_reply(&self, uid: u64, message: NpfMessage) -> bool {
        match self.pending_replies.lock().remove(&uid) {
            Some(sender) => {
                let _ = sender.send(message);
                true
            }
            None => false,
        }
    }

    /// Entry point for every inbound NPF message once decrypted and
    /// identified as coming from `from_peer` (§4.5/§4.6: a node is not
    /// just an originator for its own client's requests, it is also a
    /// responder and relay for its peers'). Request-kind messages are
    /// answered from the local store or forwarded on the peer's
    /// behalf; anything else is either a reply to one of this node's
    /// own pending requests or a reply to a request this node is
    /// relaying for someone else.
    pub fn handle_inbound(&self, from_peer: PeerId, message: NpfMessage) {
        let Some(uid) = uid_field(&message) else { return };
        match message.kind {
            MessageKind::CHKDataRequest => self.respond_to_fetch_request(from_peer, uid, &message, true),
            MessageKind::SSKDataRequest => self.respond_to_fetch_request(from_peer, uid, &message, false),
            MessageKind::InsertRequest => self.respond_to_insert_request(from_peer, uid, &message),
            _ => {
                if !self.resolve_reply(uid, message.clone()) {
                    if let Some(entry) = self.relay_table.remove(uid) {
                        self.relay_reply_back(entry, message);
                    }
                }
            }
        }
    }

    /// Answers an inbound `CHKDataRequest`/`SSKDataRequest` from a
    /// peer: a local (persistent or relay-cache) hit replies directly,
    /// a miss is forwarded on the peer's behalf exactly as
    /// `forward_fetch` forwards this node's own client requests.
    fn respond_to_fetch_request(&self, from_peer: PeerId, uid: u64, message: &NpfMessage, is_chk: bool) {
        let Some(key) = key_field(message) else { return };
        let htl = u8_field(message, "htl").unwrap_or(0);

        if is_chk {
            if let Ok(Some(block)) = self.chk_store.fetch(&key) {
                self.send_reply(from_peer, uid, MessageKind::CHKDataFound, block.to_slot_bytes_for_client());
                return;
            }
            if let Some(block) = self.ram_cache_chk.fetch(&key) {
                self.send_reply(from_peer, uid, MessageKind::CHKDataFound, block.to_slot_bytes_for_client());
                return;
            }
            self.relay_request(from_peer, uid, &key, htl, MessageKind::CHKDataRequest);
        } else {
            if let Ok(Some(block)) = self.ssk_store.fetch(&key) {
                self.send_reply(from_peer, uid, MessageKind::SSKDataFoundHeaders, block.to_slot_bytes_for_client());
                return;
            }
            if let Some(block) = self.ram_cache_ssk.fetch(&key) {
                self.send_reply(from_peer, uid, MessageKind::SSKDataFoundHeaders, block.to_slot_bytes_for_client());
                return;
            }
            self.relay_request(from_peer, uid, &key, htl, MessageKind::SSKDataRequest);
        }
    }

    /// Forwards a data request this node could not answer locally to
    /// the next peer along §4.5's selection, recording a `RelayTable`
    /// entry so the eventual reply routes back to `from_peer` under
    /// its original `uid` rather than this node's own.
    fn relay_request(&self, from_peer: PeerId, uid: u64, key: &[u8; 32], htl: u8, request_kind: MessageKind) {
        if htl == 0 {
            self.send_reply(from_peer, uid, MessageKind::DataNotFound, Vec::new());
            return;
        }

        let target = Location::derive(key, 0);
        let already_routed = vec![Self::peer_id_as_u64(&from_peer)];
        let candidates = self.peer_table.candidates(&already_routed, Self::peer_id_as_u64);
        let my_location = *self.own_location.lock();
        let outcome = select_peer(my_location, target, &candidates, false, key, htl, Instant::now(), &self.failure_table, false);

        let next_peer = match outcome {
            SelectionOutcome::NoRoute => {
                self.send_reply(from_peer, uid, MessageKind::RouteNotFound, Vec::new());
                return;
            }
            SelectionOutcome::RecentlyFailed { .. } => {
                self.send_reply(from_peer, uid, MessageKind::RecentlyFailed, Vec::new());
                return;
            }
            SelectionOutcome::Peer(id) => id,
        };

        let downstream_htl = self.htl_policy.decrement(htl);
        let downstream_uid = self.allocate_uid();
        let message = NpfMessage::new(request_kind, 0)
            .with_field("uid", FieldValue::U64(downstream_uid))
            .with_field("key", FieldValue::Bytes(key.to_vec()))
            .with_field("htl", FieldValue::U8(downstream_htl));

        match self.session_table.encrypt_for(&next_peer, &message.to_bytes()) {
            Some(encrypted) => {
                self.relay_table.insert(downstream_uid, RelayEntry { origin_peer: from_peer, origin_uid: uid, requested_htl: htl, key: *key });
                let _ = self.outbound.send(OutboundDatagram { peer: next_peer, payload: encrypted });
            }
            None => self.send_reply(from_peer, uid, MessageKind::RouteNotFound, Vec::new()),
        }
    }

    /// Answers an inbound `InsertRequest` from a peer: verifies the
    /// block against its claimed key, caches it locally when §4.5's
    /// write rule allows, and propagates it one more hop unless HTL
    /// has been exhausted.
    fn respond_to_insert_request(&self, from_peer: PeerId, uid: u64, message: &NpfMessage) {
        let Some(key) = key_field(message) else { return };
        let Some(data) = bytes_field(message, "data") else { return };
        let htl = u8_field(message, "htl").unwrap_or(0);

        let Some(block) = ChkBlock::from_slot_bytes(&data) else {
            self.send_reply(from_peer, uid, MessageKind::DataInsertRejected, Vec::new());
            return;
        };
        if block.verify(&key).is_err() {
            self.send_reply(from_peer, uid, MessageKind::DataInsertRejected, Vec::new());
            return;
        }

        if should_cache(htl) {
            let _ = self.chk_store.put(&key, &block, true);
        }

        if htl == 0 {
            self.send_reply(from_peer, uid, MessageKind::InsertReply, Vec::new());
            return;
        }
        self.relay_insert(from_peer, uid, &key, &data, htl);
    }

    fn relay_insert(&self, from_peer: PeerId, uid: u64, key: &[u8; 32], blob: &[u8], htl: u8) {
        let target = Location::derive(key, 0);
        let already_routed = vec![Self::peer_id_as_u64(&from_peer)];
        let candidates = self.peer_table.candidates(&already_routed, Self::peer_id_as_u64);
        let my_location = *self.own_location.lock();
        let outcome = select_peer(my_location, target, &candidates, false, key, htl, Instant::now(), &self.failure_table, false);

        let next_peer = match outcome {
            SelectionOutcome::Peer(id) => id,
            // No further peer to propagate to; this node's own copy
            // (stored above, if the write rule allowed it) is all the
            // propagation this insert gets.
            _ => {
                self.send_reply(from_peer, uid, MessageKind::InsertReply, Vec::new());
                return;
            }
        };

        let downstream_htl = self.htl_policy.decrement(htl);
        let downstream_uid = self.allocate_uid();
        let message = NpfMessage::new(MessageKind::InsertRequest, 0)
            .with_field("uid", FieldValue::U64(downstream_uid))
            .with_field("key", FieldValue::Bytes(key.to_vec()))
            .with_field("htl", FieldValue::U8(downstream_htl))
            .with_field("data", FieldValue::Bytes(blob.to_vec()));

        match self.session_table.encrypt_for(&next_peer, &message.to_bytes()) {
            Some(encrypted) => {
                self.relay_table.insert(downstream_uid, RelayEntry { origin_peer: from_peer, origin_uid: uid, requested_htl: htl, key: *key });
                let _ = self.outbound.send(OutboundDatagram { peer: next_peer, payload: encrypted });
            }
            None => self.send_reply(from_peer, uid, MessageKind::InsertReply, Vec::new()),
        }
    }

    /// Settles a relay this node set up on a peer's behalf: a
    /// successful data reply is cached locally when §4.5's write rule
    /// allows it, then every reply (success or failure) is
    /// re-addressed to the original `uid` and sent back to the peer
    /// that asked.
    fn relay_reply_back(&self, entry: RelayEntry, message: NpfMessage) {
        if should_cache(entry.requested_htl) {
            if let Some(data) = bytes_field(&message, "data") {
                match message.kind {
                    MessageKind::CHKDataFound => {
                        if let Some(block) = ChkBlock::from_slot_bytes(&data) {
                            self.ram_cache_chk.put(entry.key, block);
                        }
                    }
                    MessageKind::SSKDataFoundHeaders => {
                        if let Some(block) = SskBlock::from_slot_bytes(&data) {
                            self.ram_cache_ssk.put(entry.key, block);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut forwarded = NpfMessage::new(message.kind, message.priority);
        for (name, value) in message.fields {
            if name == "uid" {
                forwarded = forwarded.with_field("uid", FieldValue::U64(entry.origin_uid));
            } else {
                forwarded.fields.push((name, value));
            }
        }
        if let Some(encrypted) = self.session_table.encrypt_for(&entry.origin_peer, &forwarded.to_bytes()) {
            let _ = self.outbound.send(OutboundDatagram { peer: entry.origin_peer, payload: encrypted });
        }
    }

    /// Encrypts and queues a reply to `to_peer` for a request it made
    /// of this node, tagged with its original `uid`.
    fn send_reply(&self, to_peer: PeerId, uid: u64, kind: MessageKind, data: Vec<u8>) {
        let mut message = NpfMessage::new(kind, 0).with_field("uid", FieldValue::U64(uid));
        if !data.is_empty() {
            message = message.with_field("data", FieldValue::Bytes(data));
        }
        if let Some(encrypted) = self.session_table.encrypt_for(&to_peer, &message.to_bytes()) {
            let _ = self.outbound.send(OutboundDatagram { peer: to_peer, payload: encrypted });
        }
    }

    fn peer_id_as_u64(id: &PeerId) -> u64 {
        u64::from_be_bytes(id[..8].try_into().unwrap())
    }

    /// Fetches a CHK block: local datastore hit, or forward per §4.5's
    /// peer selection and §4.6's forward policy, decrementing HTL and
    /// re-selecting on a non-fatal downstream failure until the
    /// deadline or peer set is exhausted. `crypto_key` comes from the
    /// requester's URI; a CHK URI always carries one, so the returned
    /// payload is plaintext whenever a key is supplied.
    pub async fn fetch_chk(&self, routing_key: &[u8; 32], crypto_key: Option<[u8; 32]>, htl: u8, deadline: Instant) -> FetchOutcome {
        if let Ok(Some(block)) = self.chk_store.fetch(routing_key) {
            return FetchOutcome::Found(match crypto_key {
                Some(key) => block.decrypt(&key),
                None => block.to_slot_bytes_for_client(),
            });
        }
        match self.forward_fetch(routing_key, htl, deadline, MessageKind::CHKDataRequest).await {
            FetchOutcome::Found(blob) => FetchOutcome::Found(decrypt_chk_blob(&blob, crypto_key)),
            other => other,
        }
    }

    /// SSK payload decryption keys off the requested docname rather
    /// than a single crypto key the way CHK does (§4.2), and this
    /// crate's `SskBlock` exposes no decrypt helper for it; callers
    /// currently receive the block's encrypted payload as-is.
    pub async fn fetch_ssk(&self, routing_key: &[u8; 32], htl: u8, deadline: Instant) -> FetchOutcome {
        if let Ok(Some(block)) = self.ssk_store.fetch(routing_key) {
            return FetchOutcome::Found(block.to_slot_bytes_for_client());
        }
        self.forward_fetch(routing_key, htl, deadline, MessageKind::SSKDataRequest).await
    }

    async fn forward_fetch(&self, routing_key: &[u8; 32], htl: u8, deadline: Instant, request_kind: MessageKind) -> FetchOutcome {
        let mut htl = htl;
        let mut already_routed: Vec<u64> = Vec::new();
        let target = Location::derive(routing_key, 0);

        loop {
            let now = Instant::now();
            if now >= deadline {
                return FetchOutcome::Failed(TerminalStatus::TimedOut);
            }
            if htl == 0 {
                return FetchOutcome::Failed(TerminalStatus::DataNotFound);
            }

            let candidates = self.peer_table.candidates(&already_routed, Self::peer_id_as_u64);
            let my_location = *self.own_location.lock();
            let outcome = select_peer(
                my_location,
                target,
                &candidates,
                false,
                routing_key,
                htl,
                now,
                &self.failure_table,
                false,
            );

            let peer = match outcome {
                SelectionOutcome::NoRoute => return FetchOutcome::Failed(TerminalStatus::RouteNotFound),
                SelectionOutcome::RecentlyFailed { until } => return FetchOutcome::RecentlyFailed(until),
                SelectionOutcome::Peer(id) => id,
            };
            already_routed.push(Self::peer_id_as_u64(&peer));
            htl = self.htl_policy.decrement(htl);

            let uid = self.allocate_uid();
            let message = NpfMessage::new(request_kind, 0)
                .with_field("uid", FieldValue::U64(uid))
                .with_field("key", FieldValue::Bytes(routing_key.to_vec()))
                .with_field("htl", FieldValue::U8(htl));

            let encrypted = match self.session_table.encrypt_for(&peer, &message.to_bytes()) {
                Some(bytes) => bytes,
                None => continue, // no live session with this peer, try the next candidate
            };

            let (tx, rx) = oneshot::channel();
            self.pending_replies.lock().insert(uid, tx);
            let _ = self.outbound.send(OutboundDatagram { peer, payload: encrypted });

            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, rx).await {
                Ok(Ok(reply)) => match classify_reply(&reply, Instant::now()) {
                    ForwardOutcome::Terminal(status) => {
                        return match status {
                            TerminalStatus::Success => FetchOutcome::Found(reply.fields.iter().find(|(n, _)| n == "data").map(|(_, v)| match v {
                                FieldValue::Bytes(b) => b.clone(),
                                _ => Vec::new(),
                            }).unwrap_or_default()),
                            other => FetchOutcome::Failed(other),
                        };
                    }
                    ForwardOutcome::RecentlyFailed(until) => return FetchOutcome::RecentlyFailed(until),
                    ForwardOutcome::Reselect => continue,
                },
                Ok(Err(_)) => continue, // sender dropped without a reply; try another peer
                Err(_) => return FetchOutcome::Failed(TerminalStatus::TimedOut),
            }
        }
    }

    /// Constructs a CHK block from client-supplied plaintext, stores
    /// it locally, and forwards it per §4.6's insert path. The client
    /// result is settled by the local store alone (see `InsertOutcome`
    /// above); propagation failures downstream don't retroactively
    /// fail an insert that already landed on this node.
    pub async fn insert_chk(&self, plaintext: &[u8; block::chk::DATA_LEN], htl: u8, deadline: Instant) -> (keys::Uri, InsertOutcome) {
        let (blk, crypto_key, node_key) = ChkBlock::construct(plaintext, None);
        let uri = keys::Uri {
            key_type: keys::KeyType::Chk,
            routing_key: Some(node_key.routing_key),
            crypto_key: Some(crypto_key),
            extra: Some(keys::Extra {
                reserved_or_version: 0,
                flag_byte: 0,
                algorithm: keys::CryptoAlgorithm::AesCtr256Sha256,
                compression: None,
            }),
            docname: None,
            suggested_edition: None,
            meta: Vec::new(),
        };

        if self.chk_store.put(&node_key.routing_key, &blk, true).is_err() {
            return (uri, InsertOutcome::Failed(TerminalStatus::TransferFailed));
        }

        let blob = blk.to_slot_bytes_for_client();
        let outcome = self.forward_insert(&node_key.routing_key, &blob, htl, deadline).await;
        (uri, outcome)
    }

    async fn forward_insert(&self, routing_key: &[u8; 32], blob: &[u8], htl: u8, deadline: Instant) -> InsertOutcome {
        let mut htl = htl;
        let mut already_routed: Vec<u64> = Vec::new();
        let target = Location::derive(routing_key, 0);

        loop {
            let now = Instant::now();
            if now >= deadline || htl == 0 {
                // Deadline or HTL exhaustion stops further propagation,
                // not the insert itself — this node's own copy already
                // landed above.
                return InsertOutcome::Success;
            }

            let candidates = self.peer_table.candidates(&already_routed, Self::peer_id_as_u64);
            let my_location = *self.own_location.lock();
            let outcome = select_peer(my_location, target, &candidates, false, routing_key, htl, now, &self.failure_table, false);

            let peer = match outcome {
                SelectionOutcome::NoRoute | SelectionOutcome::RecentlyFailed { .. } => return InsertOutcome::Success,
                SelectionOutcome::Peer(id) => id,
            };
            already_routed.push(Self::peer_id_as_u64(&peer));
            htl = self.htl_policy.decrement(htl);

            let uid = self.allocate_uid();
            let message = NpfMessage::new(MessageKind::InsertRequest, 0)
                .with_field("uid", FieldValue::U64(uid))
                .with_field("key", FieldValue::Bytes(routing_key.to_vec()))
                .with_field("htl", FieldValue::U8(htl))
                .with_field("data", FieldValue::Bytes(blob.to_vec()));

            let encrypted = match self.session_table.encrypt_for(&peer, &message.to_bytes()) {
                Some(bytes) => bytes,
                None => continue,
            };

            let (tx, rx) = oneshot::channel();
            self.pending_replies.lock().insert(uid, tx);
            let _ = self.outbound.send(OutboundDatagram { peer, payload: encrypted });

            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, rx).await {
                Ok(Ok(reply)) => match classify_reply(&reply, Instant::now()) {
                    ForwardOutcome::Terminal(TerminalStatus::Success) => return InsertOutcome::Success,
                    ForwardOutcome::Terminal(other) => return InsertOutcome::Failed(other),
                    ForwardOutcome::RecentlyFailed(_) => return InsertOutcome::Success,
                    ForwardOutcome::Reselect => continue,
                },
                Ok(Err(_)) => continue,
                Err(_) => return InsertOutcome::Success,
            }
        }
    }

    pub fn default_deadline(&self) -> Instant {
        Instant::now() + self.config.routing.request_deadline()
    }
}

fn uid_field(message: &NpfMessage) -> Option<u64> {
    message.fields.iter().find_map(|(name, value)| {
        if name == "uid" {
            if let FieldValue::U64(uid) = value { Some(*uid) } else { None }
        } else {
            None
        }
    })
}

fn key_field(message: &NpfMessage) -> Option<[u8; 32]> {
    bytes_field(message, "key").and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
}

fn bytes_field(message: &NpfMessage, name: &str) -> Option<Vec<u8>> {
    message.fields.iter().find_map(|(n, value)| {
        if n == name {
            if let FieldValue::Bytes(b) = value { Some(b.clone()) } else { None }
        } else {
            None
        }
    })
}

fn u8_field(message: &NpfMessage, name: &str) -> Option<u8> {
    message.fields.iter().find_map(|(n, value)| {
        if n == name {
            if let FieldValue::U8(b) = value { Some(*b) } else { None }
        } else {
            None
        }
    })
}

/// Reconstructs a `ChkBlock` from a forwarded `header ∥ data` blob and
/// decrypts it; falls back to returning the blob unchanged if no
/// crypto key was supplied or the blob is the wrong shape.
fn decrypt_chk_blob(blob: &[u8], crypto_key: Option<[u8; 32]>) -> Vec<u8> {
    match crypto_key {
        Some(key) if blob.len() == block::chk::HEADER_LEN + block::chk::DATA_LEN => {
            let mut header = [0u8; block::chk::HEADER_LEN];
            header.copy_from_slice(&blob[..block::chk::HEADER_LEN]);
            let mut data = [0u8; block::chk::DATA_LEN];
            data.copy_from_slice(&blob[block::chk::HEADER_LEN..]);
            ChkBlock { header, data }.decrypt(&key)
        }
        _ => blob.to_vec(),
    }
}

trait ClientPayload {
    fn to_slot_bytes_for_client(&self) -> Vec<u8>;
}

impl ClientPayload for ChkBlock {
    fn to_slot_bytes_for_client(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.len() + self.data.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.data);
        out
    }
}

impl ClientPayload for SskBlock {
    fn to_slot_bytes_for_client(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.len() + self.data.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.data);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_node() -> Node {
        let dir = tempfile::tempdir().unwrap();
        let chk_store = FileStore::open(dir.path().join("chk"), 16).unwrap();
        let ssk_store = FileStore::open(dir.path().join("ssk"), 16).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        Node::new(
            Config::default(),
            Identity::generate(),
            Location::from_raw(0.0),
            chk_store,
            ssk_store,
            tx,
        )
    }

    #[tokio::test]
    async fn a_local_hit_is_decrypted_and_returned_without_any_forwarding() {
        let node = test_node();
        let plaintext = [3u8; block::chk::DATA_LEN];
        let (blk, crypto_key, key) = ChkBlock::construct(&plaintext, None);
        node.chk_store.put(&key.routing_key, &blk, false).unwrap();

        let outcome = node.fetch_chk(&key.routing_key, Some(crypto_key), 18, Instant::now() + Duration::from_secs(5)).await;
        assert_eq!(outcome, FetchOutcome::Found(plaintext.to_vec()));
    }

    #[tokio::test]
    async fn a_local_hit_without_a_crypto_key_returns_the_raw_block() {
        let node = test_node();
        let plaintext = [3u8; block::chk::DATA_LEN];
        let (blk, _crypto_key, key) = ChkBlock::construct(&plaintext, None);
        node.chk_store.put(&key.routing_key, &blk, false).unwrap();

        let outcome = node.fetch_chk(&key.routing_key, None, 18, Instant::now() + Duration::from_secs(5)).await;
        assert_eq!(outcome, FetchOutcome::Found(blk.to_slot_bytes_for_client()));
    }

    #[tokio::test]
    async fn a_miss_with_no_peers_is_route_not_found() {
        let node = test_node();
        let outcome = node.fetch_chk(&[9u8; 32], None, 18, Instant::now() + Duration::from_secs(5)).await;
        assert_eq!(outcome, FetchOutcome::Failed(TerminalStatus::RouteNotFound));
    }

    #[tokio::test]
    async fn a_miss_at_htl_zero_is_data_not_found() {
        let node = test_node();
        let outcome = node.fetch_chk(&[9u8; 32], None, 0, Instant::now() + Duration::from_secs(5)).await;
        assert_eq!(outcome, FetchOutcome::Failed(TerminalStatus::DataNotFound));
    }
}
