use std::time::{Duration, Instant};

use keys::Location;

/// Default timeout for [`SwapLock`] (§4.5). A lock that outlives this
/// window without being released is treated as stale and clears
/// itself on the next attempt, so a crashed peer can't wedge swapping
/// forever.
pub const SWAP_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Location re-randomizes every this many successful swaps.
pub const SWAP_RERANDOMIZE_INTERVAL: u64 = 16_000;

/// A recently-forwarded swap request's retention is twice the lock
/// timeout, giving loop detection time to see a duplicate before it
/// ages out.
pub fn recently_forwarded_retention() -> Duration {
    SWAP_LOCK_TIMEOUT * 2
}

/// Computes the Metropolis-Hastings `A` and `B` products for a
/// candidate swap between two peers (§4.5):
/// `A = prod(distance(friend_i, my_loc)) * prod(distance(friend_j, his_loc))`
/// `B = prod(distance(friend_i, his_loc)) * prod(distance(friend_j, my_loc))`.
fn swap_products(my_friends: &[Location], my_loc: Location, his_friends: &[Location], his_loc: Location) -> (f64, f64) {
    let a = my_friends.iter().map(|&f| f.distance(my_loc)).product::<f64>()
        * his_friends.iter().map(|&f| f.distance(his_loc)).product::<f64>();
    let b = my_friends.iter().map(|&f| f.distance(his_loc)).product::<f64>()
        * his_friends.iter().map(|&f| f.distance(my_loc)).product::<f64>();
    (a, b)
}

/// Decides whether a candidate location swap should proceed (§4.5).
/// Unconditional when `A > B`; otherwise accepted with probability
/// `A / B`, driven by `shared_random` (a value in `[0, 1)` both peers
/// derive identically from the handshake transcript, so they reach
/// the same decision without an extra round trip).
pub fn swap_decision(my_friends: &[Location], my_loc: Location, his_friends: &[Location], his_loc: Location, shared_random: f64) -> bool {
    let (a, b) = swap_products(my_friends, my_loc, his_friends, his_loc);
    if b == 0.0 {
        return a > 0.0;
    }
    if a > b {
        return true;
    }
    shared_random < a / b
}

/// Serializes location swaps against concurrent attempts. Self-heals:
/// an acquire past the holder's deadline silently reclaims the lock
/// rather than requiring an explicit unlock from a peer that may have
/// disconnected.
pub struct SwapLock {
    held_until: Option<Instant>,
}

impl SwapLock {
    pub fn new() -> Self {
        SwapLock { held_until: None }
    }

    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(until) = self.held_until {
            if now < until {
                return false;
            }
        }
        self.held_until = Some(now + SWAP_LOCK_TIMEOUT);
        true
    }

    pub fn release(&mut self) {
        self.held_until = None;
    }

    pub fn is_held(&self, now: Instant) -> bool {
        self.held_until.is_some_and(|until| now < until)
    }
}

impl Default for SwapLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks successful swaps and signals when the node should
/// re-randomize its location (§4.5).
pub struct SwapCounter {
    count: u64,
}

impl SwapCounter {
    pub fn new() -> Self {
        SwapCounter { count: 0 }
    }

    /// Records a completed swap, returning `true` once every
    /// [`SWAP_RERANDOMIZE_INTERVAL`] swaps.
    pub fn record_swap(&mut self) -> bool {
        self.count += 1;
        self.count % SWAP_RERANDOMIZE_INTERVAL == 0
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for SwapCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain-of-custody for in-flight swap requests (§4.5): a swap
/// identifier seen again before it ages out indicates the request
/// looped back around the network, and is refused rather than
/// forwarded again.
pub struct RecentlyForwardedSet {
    seen: Vec<(u64, Instant)>,
    retention: Duration,
}

impl RecentlyForwardedSet {
    pub fn new() -> Self {
        RecentlyForwardedSet { seen: Vec::new(), retention: recently_forwarded_retention() }
    }

    /// Returns `true` if `swap_id` is a fresh forward (and records
    /// it), `false` if it's a loop (already seen and not yet expired).
    pub fn record_if_fresh(&mut self, swap_id: u64, now: Instant) -> bool {
        self.expire(now);
        if self.seen.iter().any(|&(id, _)| id == swap_id) {
            return false;
        }
        self.seen.push((swap_id, now));
        true
    }

    fn expire(&mut self, now: Instant) {
        self.seen.retain(|&(_, seen_at)| now.duration_since(seen_at) < self.retention);
    }
}

impl Default for RecentlyForwardedSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_is_unconditional_when_a_exceeds_b() {
        let my_friends = vec![Location::from_raw(0.1), Location::from_raw(0.9)];
        let his_friends = vec![Location::from_raw(0.5)];
        let my_loc = Location::from_raw(0.0);
        let his_loc = Location::from_raw(0.5);
        assert!(swap_decision(&my_friends, my_loc, &his_friends, his_loc, 0.999));
    }

    #[test]
    fn swap_lock_blocks_a_second_acquire_until_it_expires() {
        let mut lock = SwapLock::new();
        let t0 = Instant::now();
        assert!(lock.try_acquire(t0));
        assert!(!lock.try_acquire(t0 + Duration::from_secs(1)));
        assert!(lock.try_acquire(t0 + SWAP_LOCK_TIMEOUT + Duration::from_millis(1)));
    }

    #[test]
    fn swap_lock_release_allows_immediate_reacquire() {
        let mut lock = SwapLock::new();
        let t0 = Instant::now();
        assert!(lock.try_acquire(t0));
        lock.release();
        assert!(lock.try_acquire(t0));
    }

    #[test]
    fn swap_counter_signals_at_the_rerandomize_interval() {
        let mut counter = SwapCounter::new();
        for _ in 0..SWAP_RERANDOMIZE_INTERVAL - 1 {
            assert!(!counter.record_swap());
        }
        assert!(counter.record_swap());
    }

    #[test]
    fn recently_forwarded_set_rejects_a_duplicate_within_retention() {
        let mut set = RecentlyForwardedSet::new();
        let t0 = Instant::now();
        assert!(set.record_if_fresh(42, t0));
        assert!(!set.record_if_fresh(42, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn recently_forwarded_set_accepts_the_same_id_again_after_retention_expires() {
        let mut set = RecentlyForwardedSet::new();
        let t0 = Instant::now();
        assert!(set.record_if_fresh(42, t0));
        assert!(set.record_if_fresh(42, t0 + recently_forwarded_retention() + Duration::from_millis(1)));
    }
}
