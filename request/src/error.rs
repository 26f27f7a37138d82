use std::fmt;

use crate::state::RequestState;
use crate::RequestId;

/// Errors from the request tracker and request state machine (§4.6).
/// Hand-rolled to match the link/store/routing crates' style rather
/// than deriving via `thiserror`.
#[derive(Debug)]
pub enum RequestError {
    /// A second request registered under a UID already in use.
    Collision(RequestId),
    /// The tracker is at its configured capacity.
    CapacityExceeded,
    /// No request is registered under this UID.
    NotFound(RequestId),
    /// An attempted state transition isn't reachable from the current
    /// state (§4.6's state machine).
    InvalidTransition { from: RequestState, to: RequestState },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Collision(id) => write!(f, "request uid {} already registered", id.0),
            RequestError::CapacityExceeded => write!(f, "request tracker is at capacity"),
            RequestError::NotFound(id) => write!(f, "no request registered under uid {}", id.0),
            RequestError::InvalidTransition { from, to } => {
                write!(f, "cannot transition request from {:?} to {:?}", from, to)
            }
        }
    }
}

impl std::error::Error for RequestError {}
