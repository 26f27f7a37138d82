use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

use crate::error::RequestError;
use crate::request::{Request, RequestId};
use crate::state::{RequestState, TerminalStatus};

/// The process-wide request table (§4.6, §5): a multiple-reader/
/// single-writer map from UID to request, bounded in capacity so a
/// flood of inbound forwards can't grow it without limit.
pub struct RequestTracker {
    requests: RwLock<HashMap<RequestId, Request>>,
    capacity: usize,
}

impl RequestTracker {
    pub fn new(capacity: usize) -> Self {
        RequestTracker { requests: RwLock::new(HashMap::new()), capacity }
    }

    pub fn len(&self) -> usize {
        self.requests.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a new request, failing on a UID collision or if the
    /// tracker is already at capacity.
    pub fn register(&self, request: Request) -> Result<(), RequestError> {
        let mut requests = self.requests.write();
        if requests.contains_key(&request.id) {
            return Err(RequestError::Collision(request.id));
        }
        if requests.len() >= self.capacity {
            return Err(RequestError::CapacityExceeded);
        }
        requests.insert(request.id, request);
        Ok(())
    }

    /// Runs `f` against the request registered under `id`, holding
    /// the write lock only for the duration of the closure — callers
    /// must not perform I/O inside `f` (§5's lock discipline).
    pub fn with_request<R>(&self, id: RequestId, f: impl FnOnce(&mut Request) -> R) -> Result<R, RequestError> {
        let mut requests = self.requests.write();
        let request = requests.get_mut(&id).ok_or(RequestError::NotFound(id))?;
        Ok(f(request))
    }

    pub fn remove(&self, id: RequestId) -> Option<Request> {
        self.requests.write().remove(&id)
    }

    /// Transitions every overdue, non-terminal request to `TimedOut`
    /// and returns the UIDs affected, for the caller to notify
    /// upstream with a `RejectedOverload` (§4.6).
    pub fn sweep_timeouts(&self, now: Instant) -> Vec<RequestId> {
        let mut requests = self.requests.write();
        let mut timed_out = Vec::new();
        for (id, request) in requests.iter_mut() {
            if request.is_overdue(now) {
                if request.transition(RequestState::Terminal(TerminalStatus::TimedOut)).is_ok() {
                    timed_out.push(*id);
                }
            }
        }
        timed_out
    }

    /// Drops every request that has reached a terminal state, freeing
    /// tracker capacity for new registrations.
    pub fn reap_terminal(&self) -> usize {
        let mut requests = self.requests.write();
        let before = requests.len();
        requests.retain(|_, request| !request.state().is_terminal());
        before - requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pending(id: u64, deadline: Instant) -> Request {
        Request::new(RequestId(id), [0u8; 32], 18, deadline, false)
    }

    #[test]
    fn registering_the_same_uid_twice_is_a_collision() {
        let tracker = RequestTracker::new(10);
        tracker.register(pending(1, Instant::now() + Duration::from_secs(30))).unwrap();
        let err = tracker.register(pending(1, Instant::now() + Duration::from_secs(30))).unwrap_err();
        assert!(matches!(err, RequestError::Collision(RequestId(1))));
    }

    #[test]
    fn registering_past_capacity_is_rejected() {
        let tracker = RequestTracker::new(1);
        tracker.register(pending(1, Instant::now() + Duration::from_secs(30))).unwrap();
        let err = tracker.register(pending(2, Instant::now() + Duration::from_secs(30))).unwrap_err();
        assert!(matches!(err, RequestError::CapacityExceeded));
    }

    #[test]
    fn sweep_times_out_overdue_requests_only() {
        let tracker = RequestTracker::new(10);
        let now = Instant::now();
        tracker.register(pending(1, now - Duration::from_secs(1))).unwrap();
        tracker.register(pending(2, now + Duration::from_secs(30))).unwrap();
        let timed_out = tracker.sweep_timeouts(now);
        assert_eq!(timed_out, vec![RequestId(1)]);
        tracker
            .with_request(RequestId(1), |r| assert_eq!(r.terminal_status(), Some(TerminalStatus::TimedOut)))
            .unwrap();
    }

    #[test]
    fn reap_terminal_frees_capacity() {
        let tracker = RequestTracker::new(1);
        let now = Instant::now();
        tracker.register(pending(1, now - Duration::from_secs(1))).unwrap();
        tracker.sweep_timeouts(now);
        assert_eq!(tracker.reap_terminal(), 1);
        tracker.register(pending(2, now + Duration::from_secs(30))).unwrap();
    }
}
