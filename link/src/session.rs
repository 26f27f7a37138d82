use std::time::{Duration, Instant};

use crate::cipher::CipherState;
use crate::error::SessionError;

const REPLAY_WINDOW: u32 = 100;
const REKEY_SEQ_THRESHOLD: u32 = 1 << 30;
const REKEY_AGE: Duration = Duration::from_secs(3600);

/// A live, post-handshake session between two peers: a send and a
/// receive direction, a strictly-monotone outgoing sequence counter,
/// and a sliding-window replay filter on the receive side (§4.4.2).
pub struct Session {
    send: CipherState,
    recv: CipherState,
    next_send_seq: u32,
    last_recv_seq: u32,
    recent_recv_seqs: Vec<u32>,
    established_at: Instant,
}

impl Session {
    pub fn new(send_key: [u8; 32], send_mac_key: [u8; 32], recv_key: [u8; 32], recv_mac_key: [u8; 32]) -> Self {
        Session {
            send: CipherState::new(send_key, send_mac_key),
            recv: CipherState::new(recv_key, recv_mac_key),
            next_send_seq: 1,
            last_recv_seq: 0,
            recent_recv_seqs: Vec::new(),
            established_at: Instant::now(),
        }
    }

    pub fn needs_rekey(&self) -> bool {
        self.next_send_seq > REKEY_SEQ_THRESHOLD || self.established_at.elapsed() > REKEY_AGE
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        if self.needs_rekey() {
            return Err(SessionError::RekeyRequired);
        }
        let packet = self.send.seal(self.next_send_seq, plaintext);
        self.next_send_seq += 1;
        Ok(packet)
    }

    pub fn decrypt(&mut self, packet: &[u8]) -> Result<Vec<u8>, SessionError> {
        let (seq, plaintext) = self.recv.open(packet).ok_or(SessionError::HmacMismatch)?;
        self.accept_sequence(seq)?;
        Ok(plaintext)
    }

    fn accept_sequence(&mut self, seq: u32) -> Result<(), SessionError> {
        if seq > self.last_recv_seq {
            self.last_recv_seq = seq;
            self.recent_recv_seqs.push(seq);
            self.recent_recv_seqs.retain(|&s| self.last_recv_seq.saturating_sub(s) <= REPLAY_WINDOW);
            return Ok(());
        }
        if self.last_recv_seq.saturating_sub(seq) > REPLAY_WINDOW {
            return Err(SessionError::SequenceTooOld);
        }
        if self.recent_recv_seqs.contains(&seq) {
            return Err(SessionError::SequenceReplayed);
        }
        self.recent_recv_seqs.push(seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired_sessions() -> (Session, Session) {
        let out = [1u8; 32];
        let inn = [2u8; 32];
        let out_mac = [3u8; 32];
        let in_mac = [4u8; 32];
        let initiator = Session::new(out, out_mac, inn, in_mac);
        let responder = Session::new(inn, in_mac, out, out_mac);
        (initiator, responder)
    }

    #[test]
    fn encrypted_packet_decrypts_on_the_peer_session() {
        let (mut initiator, mut responder) = paired_sessions();
        let packet = initiator.encrypt(b"ping").unwrap();
        assert_eq!(responder.decrypt(&packet).unwrap(), b"ping");
    }

    #[test]
    fn replayed_packet_is_rejected() {
        let (mut initiator, mut responder) = paired_sessions();
        let packet = initiator.encrypt(b"ping").unwrap();
        assert!(responder.decrypt(&packet).is_ok());
        assert!(matches!(responder.decrypt(&packet), Err(SessionError::SequenceReplayed)));
    }

    #[test]
    fn out_of_order_packet_within_window_is_accepted() {
        let (mut initiator, mut responder) = paired_sessions();
        let p1 = initiator.encrypt(b"one").unwrap();
        let p2 = initiator.encrypt(b"two").unwrap();
        responder.decrypt(&p2).unwrap();
        assert!(responder.decrypt(&p1).is_ok());
    }
}
