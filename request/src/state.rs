use std::time::Instant;

/// The terminal outcomes a request can settle into (§4.6). Each one is
/// final: once reached, no further transition is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Success,
    DataNotFound,
    RouteNotFound,
    TransferFailed,
    VerifyFailure,
    TimedOut,
    RejectedOverload,
    Cancelled,
}

/// `RecentlyFailed` carries a wakeup time and so isn't representable
/// as a unit variant of [`TerminalStatus`]; it's tracked alongside the
/// state rather than folded into the enum so `TerminalStatus` stays
/// `Copy` and `PartialEq` for the common cases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentlyFailedUntil(pub Instant);

/// The request lifecycle (§4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestState {
    Pending,
    Running,
    LocalFound,
    Forwarding,
    WaitingResponse,
    RecentlyFailed(Instant),
    Terminal(TerminalStatus),
    Cancelled,
}

impl RequestState {
    /// Whether `self` may transition to `next` per the diagram in
    /// §4.6. `Cancelled` is reachable from every non-terminal state.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        if matches!(next, Cancelled) {
            return !self.is_terminal();
        }
        match (self, next) {
            (Pending, Running) => true,
            (Running, LocalFound) => true,
            (Running, Forwarding) => true,
            (Running, Terminal(TerminalStatus::DataNotFound)) => true,
            (Forwarding, WaitingResponse) => true,
            (Forwarding, Running) => true, // re-select among remaining peers
            (WaitingResponse, Terminal(_)) => true,
            (WaitingResponse, RecentlyFailed(_)) => true,
            (WaitingResponse, Forwarding) => true, // non-fatal downstream failure, re-select
            (LocalFound, Terminal(TerminalStatus::Success)) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Terminal(_) | RequestState::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_only_advances_to_running() {
        assert!(RequestState::Pending.can_transition_to(RequestState::Running));
        assert!(!RequestState::Pending.can_transition_to(RequestState::LocalFound));
    }

    #[test]
    fn any_non_terminal_state_can_cancel() {
        assert!(RequestState::Forwarding.can_transition_to(RequestState::Cancelled));
        assert!(RequestState::WaitingResponse.can_transition_to(RequestState::Cancelled));
    }

    #[test]
    fn terminal_states_accept_no_further_transition() {
        let done = RequestState::Terminal(TerminalStatus::Success);
        assert!(!done.can_transition_to(RequestState::Cancelled));
        assert!(!done.can_transition_to(RequestState::Running));
    }
}
