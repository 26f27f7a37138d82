use std::time::Instant;

use crate::error::RequestError;
use crate::state::{RequestState, TerminalStatus};

/// A request's 64-bit identifier, unique process-wide for the
/// request's lifetime (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Cumulative bytes sent/received on behalf of one request, reported
/// on termination (§4.6).
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteCounters {
    pub sent: u64,
    pub received: u64,
}

impl ByteCounters {
    pub fn record_sent(&mut self, n: u64) {
        self.sent += n;
    }

    pub fn record_received(&mut self, n: u64) {
        self.received += n;
    }
}

/// One in-flight request, local or forwarded (§4.6). `htl` is the
/// hops-to-live remaining at this node, already decremented per
/// `routing::HtlPolicy` for a forward.
pub struct Request {
    pub id: RequestId,
    pub key: [u8; 32],
    pub deadline: Instant,
    pub htl: u8,
    pub is_insert: bool,
    state: RequestState,
    byte_counters: ByteCounters,
    peers_tried: Vec<u64>,
}

impl Request {
    pub fn new(id: RequestId, key: [u8; 32], htl: u8, deadline: Instant, is_insert: bool) -> Self {
        Request {
            id,
            key,
            deadline,
            htl,
            is_insert,
            state: RequestState::Pending,
            byte_counters: ByteCounters::default(),
            peers_tried: Vec::new(),
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn byte_counters(&self) -> ByteCounters {
        self.byte_counters
    }

    pub fn record_sent(&mut self, n: u64) {
        self.byte_counters.record_sent(n);
    }

    pub fn record_received(&mut self, n: u64) {
        self.byte_counters.record_received(n);
    }

    pub fn peers_tried(&self) -> &[u64] {
        &self.peers_tried
    }

    pub fn mark_peer_tried(&mut self, peer: u64) {
        self.peers_tried.push(peer);
    }

    /// Attempts a state transition, enforcing §4.6's diagram.
    pub fn transition(&mut self, next: RequestState) -> Result<(), RequestError> {
        if !self.state.can_transition_to(next) {
            return Err(RequestError::InvalidTransition { from: self.state, to: next });
        }
        self.state = next;
        Ok(())
    }

    pub fn is_overdue(&self, now: Instant) -> bool {
        !self.state.is_terminal() && now >= self.deadline
    }

    pub fn terminal_status(&self) -> Option<TerminalStatus> {
        match self.state {
            RequestState::Terminal(status) => Some(status),
            RequestState::Cancelled => Some(TerminalStatus::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn a_fresh_request_starts_pending_and_can_advance() {
        let mut req = Request::new(RequestId(1), [0u8; 32], 18, Instant::now() + Duration::from_secs(30), false);
        assert_eq!(req.state(), RequestState::Pending);
        req.transition(RequestState::Running).unwrap();
        req.transition(RequestState::LocalFound).unwrap();
        req.transition(RequestState::Terminal(TerminalStatus::Success)).unwrap();
        assert_eq!(req.terminal_status(), Some(TerminalStatus::Success));
    }

    #[test]
    fn an_invalid_transition_is_rejected_and_leaves_state_unchanged() {
        let mut req = Request::new(RequestId(2), [0u8; 32], 18, Instant::now() + Duration::from_secs(30), false);
        assert!(req.transition(RequestState::LocalFound).is_err());
        assert_eq!(req.state(), RequestState::Pending);
    }

    #[test]
    fn a_request_past_its_deadline_is_overdue() {
        let req = Request::new(RequestId(3), [0u8; 32], 18, Instant::now() - Duration::from_secs(1), false);
        assert!(req.is_overdue(Instant::now()));
    }
}
