use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use link::{NpfPacket, Reassembler};

use crate::node::{Node, OutboundDatagram};
use crate::peer_table::PeerId;

const SENDER_TICK: Duration = Duration::from_millis(500);
const RECV_BUF_LEN: usize = 2048;

/// Runs the UDP link listener and the periodic sender tick
/// concurrently until either task exits (§5: "a single blocking-
/// capable UDP receive loop dispatches inbound packets to a
/// per-session worker; a periodic sender loop (~500ms tick) drains
/// outgoing queues for every session").
pub async fn run(node: Arc<Node>, outbound_rx: mpsc::UnboundedReceiver<OutboundDatagram>) -> std::io::Result<()> {
    let socket = Arc::new(UdpSocket::bind(node.config.link.bind_address).await?);

    let sender = tokio::spawn(run_sender_tick(Arc::clone(&socket), Arc::clone(&node), outbound_rx));
    let receiver = tokio::spawn(run_receive_loop(socket, Arc::clone(&node)));

    tokio::select! {
        result = sender => result.map_err(io_join_error)?,
        result = receiver => result.map_err(io_join_error)?,
    }?;
    Ok(())
}

fn io_join_error(error: tokio::task::JoinError) -> std::io::Error {
    std::io::Error::other(error)
}

/// Every datagram queued via `Node::fetch_*`'s forwarding path is
/// addressed by peer identity, not socket address — this resolves it
/// at send time rather than at queue time so a peer's address change
/// between queueing and sending doesn't stale-route the packet.
async fn run_sender_tick(socket: Arc<UdpSocket>, node: Arc<Node>, mut outbound_rx: mpsc::UnboundedReceiver<OutboundDatagram>) -> std::io::Result<()> {
    let mut pending: Vec<OutboundDatagram> = Vec::new();
    let mut ticker = tokio::time::interval(SENDER_TICK);

    loop {
        tokio::select! {
            datagram = outbound_rx.recv() => {
                match datagram {
                    Some(datagram) => pending.push(datagram),
                    None => return Ok(()),
                }
            }
            _ = ticker.tick() => {
                for datagram in pending.drain(..) {
                    if let Some(address) = node.peer_table.address(&datagram.peer) {
                        let _ = socket.send_to(&datagram.payload, address).await;
                    }
                }
            }
        }
    }
}

async fn run_receive_loop(socket: Arc<UdpSocket>, node: Arc<Node>) -> std::io::Result<()> {
    let reassemblers: Mutex<HashMap<PeerId, Reassembler>> = Mutex::new(HashMap::new());
    let mut buf = vec![0u8; RECV_BUF_LEN];

    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        let peer = match node.peer_table.identity_hash_for_address(from) {
            Some(peer) => peer,
            None => continue, // not a known, handshaken peer; pre-session handshake messages are out of scope here
        };

        let plaintext = match node.session_table.decrypt_from(&peer, &buf[..len]) {
            Some(plaintext) => plaintext,
            None => continue,
        };

        let Ok(packet) = NpfPacket::from_bytes(&plaintext) else { continue };

        for message in &packet.lossy {
            node.handle_inbound(peer, message.clone());
        }

        let mut reassemblers = reassemblers.lock();
        let reassembler = reassemblers.entry(peer).or_insert_with(Reassembler::new);
        for fragment in &packet.fragments {
            if let Ok(Some(complete)) = reassembler.feed(fragment) {
                if let Some((message, _)) = link::NpfMessage::from_bytes(&complete) {
                    node.handle_inbound(peer, message);
                }
            }
        }
    }
}
