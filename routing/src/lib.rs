//! Small-world keyspace routing (§4.5): circular-distance peer
//! selection with the recently-failed quench, probabilistic HTL
//! decrement, and Metropolis-Hastings location swap.

pub mod htl;
pub mod select;
pub mod swap;

pub use htl::{should_cache, HtlPolicy, MAX_HTL, MIN_HTL};
pub use select::{select_peer, FailureTableOracle, PeerCandidate, SelectionOutcome};
pub use swap::{
    recently_forwarded_retention, swap_decision, RecentlyForwardedSet, SwapCounter, SwapLock,
    SWAP_LOCK_TIMEOUT, SWAP_RERANDOMIZE_INTERVAL,
};
