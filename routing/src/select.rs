use std::time::Instant;

use keys::Location;

/// A routing candidate as seen by the caller's peer table (§4.5). The
/// peer identity type is left generic so `request`/`node` can plug in
/// their own handle type without this crate depending on them.
#[derive(Debug, Clone)]
pub struct PeerCandidate<Id> {
    pub id: Id,
    pub declared_location: Location,
    pub peer_of_peer_locations: Vec<Location>,
    pub routable: bool,
    pub disconnecting: bool,
    pub mandatory_backoff: bool,
    pub already_routed: bool,
    pub routing_backoff: bool,
}

/// Reports the last-seen timeout deadline for a (peer, key, htl)
/// triple, or `None` if that combination has never timed out.
pub trait FailureTableOracle<Id> {
    fn timeout(&self, peer: &Id, key: &[u8; 32], htl: u8) -> Option<Instant>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome<Id> {
    Peer(Id),
    RecentlyFailed { until: Instant },
    NoRoute,
}

fn effective_location(candidate: &PeerCandidate<impl Clone>, target: Location, foaf_allowed: bool) -> Location {
    if !foaf_allowed || candidate.peer_of_peer_locations.is_empty() {
        return candidate.declared_location;
    }
    candidate
        .peer_of_peer_locations
        .iter()
        .copied()
        .filter(|&loc| loc.distance(target) < candidate.declared_location.distance(target))
        .min_by(|a, b| a.distance(target).partial_cmp(&b.distance(target)).unwrap())
        .unwrap_or(candidate.declared_location)
}

struct Eligible<Id> {
    id: Id,
    effective_location: Location,
    distance_to_target: f64,
    timed_out_at: Option<Instant>,
    backed_off: bool,
}

fn eligible_candidates<Id: Clone>(
    my_location: Location,
    target: Location,
    candidates: &[PeerCandidate<Id>],
    foaf_allowed: bool,
    key: &[u8; 32],
    htl: u8,
    failure_table: &dyn FailureTableOracle<Id>,
) -> Vec<Eligible<Id>> {
    candidates
        .iter()
        .filter(|c| c.routable && !c.disconnecting && !c.mandatory_backoff && !c.already_routed)
        .map(|c| (c, effective_location(c, target, foaf_allowed)))
        .filter(|(_, loc)| loc.distance(target) <= my_location.distance(target))
        .map(|(c, loc)| Eligible {
            id: c.id.clone(),
            effective_location: loc,
            distance_to_target: loc.distance(target),
            timed_out_at: failure_table.timeout(&c.id, key, htl),
            backed_off: c.routing_backoff,
        })
        .collect()
}

/// Selects the next hop for a request (§4.5), first checking whether
/// the recently-failed quench applies.
#[allow(clippy::too_many_arguments)]
pub fn select_peer<Id: Clone>(
    my_location: Location,
    target: Location,
    candidates: &[PeerCandidate<Id>],
    foaf_allowed: bool,
    key: &[u8; 32],
    htl: u8,
    now: Instant,
    failure_table: &dyn FailureTableOracle<Id>,
    offer_pending: bool,
) -> SelectionOutcome<Id> {
    let eligible = eligible_candidates(my_location, target, candidates, foaf_allowed, key, htl, failure_table);

    if let Some(until) = recently_failed_quench(&eligible, now, offer_pending, candidates.len()) {
        return SelectionOutcome::RecentlyFailed { until };
    }

    let is_timed_out = |e: &Eligible<Id>| e.timed_out_at.is_some_and(|t| t > now);

    let class1 = eligible
        .iter()
        .filter(|e| !e.backed_off && !is_timed_out(e))
        .min_by(|a, b| a.distance_to_target.partial_cmp(&b.distance_to_target).unwrap());
    if let Some(chosen) = class1 {
        return SelectionOutcome::Peer(chosen.id.clone());
    }

    let class2 = eligible
        .iter()
        .filter(|e| !e.backed_off && is_timed_out(e))
        .min_by_key(|e| e.timed_out_at.unwrap());
    if let Some(chosen) = class2 {
        return SelectionOutcome::Peer(chosen.id.clone());
    }

    let class3 = eligible
        .iter()
        .filter(|e| e.backed_off && !is_timed_out(e))
        .min_by(|a, b| a.distance_to_target.partial_cmp(&b.distance_to_target).unwrap());
    if let Some(chosen) = class3 {
        return SelectionOutcome::Peer(chosen.id.clone());
    }

    let class4 = eligible.iter().filter(|e| e.backed_off && is_timed_out(e)).min_by_key(|e| e.timed_out_at.unwrap());
    if let Some(chosen) = class4 {
        return SelectionOutcome::Peer(chosen.id.clone());
    }

    SelectionOutcome::NoRoute
}

/// The recently-failed quench (§4.5): ranks candidates purely by
/// distance to the target (ignoring timeout status), and if the
/// closest two are both currently timed out, at least
/// `max(3, peer_count/4)` peers are timed out for this key, and no
/// offer is pending, routing is deferred rather than attempted.
///
/// `eligible`'s `distance_to_target` is precomputed in
/// `eligible_candidates`, so ranking needs no target here.
fn recently_failed_quench<Id>(eligible: &[Eligible<Id>], now: Instant, offer_pending: bool, peer_count: usize) -> Option<Instant> {
    if offer_pending || eligible.len() < 2 {
        return None;
    }

    let mut by_rank: Vec<usize> = (0..eligible.len()).collect();
    by_rank.sort_by(|&a, &b| eligible[a].distance_to_target.partial_cmp(&eligible[b].distance_to_target).unwrap());

    let first = &eligible[by_rank[0]];
    let second = &eligible[by_rank[1]];

    let first_timeout = first.timed_out_at.filter(|&t| t > now)?;
    let second_timeout = second.timed_out_at.filter(|&t| t > now)?;

    let timed_out_count = eligible.iter().filter(|e| e.timed_out_at.is_some_and(|t| t > now)).count();
    let threshold = (peer_count / 4).max(3);
    if timed_out_count < threshold {
        return None;
    }

    Some(first_timeout.min(second_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct NoFailures;
    impl FailureTableOracle<u32> for NoFailures {
        fn timeout(&self, _peer: &u32, _key: &[u8; 32], _htl: u8) -> Option<Instant> {
            None
        }
    }

    fn candidate(id: u32, location: f64) -> PeerCandidate<u32> {
        PeerCandidate {
            id,
            declared_location: Location::from_raw(location),
            peer_of_peer_locations: Vec::new(),
            routable: true,
            disconnecting: false,
            mandatory_backoff: false,
            already_routed: false,
            routing_backoff: false,
        }
    }

    #[test]
    fn picks_the_closest_eligible_peer() {
        let target = Location::from_raw(0.5);
        let my_location = Location::from_raw(0.0);
        let candidates = vec![candidate(1, 0.45), candidate(2, 0.55)];
        let outcome = select_peer(my_location, target, &candidates, false, &[0u8; 32], 10, Instant::now(), &NoFailures, false);
        assert_eq!(outcome, SelectionOutcome::Peer(1));
    }

    #[test]
    fn a_peer_farther_than_self_is_not_eligible() {
        let target = Location::from_raw(0.5);
        let my_location = Location::from_raw(0.45);
        let candidates = vec![candidate(1, 0.0)];
        let outcome = select_peer(my_location, target, &candidates, false, &[0u8; 32], 10, Instant::now(), &NoFailures, false);
        assert_eq!(outcome, SelectionOutcome::NoRoute);
    }

    struct AllTimedOut(Instant);
    impl FailureTableOracle<u32> for AllTimedOut {
        fn timeout(&self, _peer: &u32, _key: &[u8; 32], _htl: u8) -> Option<Instant> {
            Some(self.0)
        }
    }

    #[test]
    fn quench_fires_when_enough_peers_are_timed_out() {
        let target = Location::from_raw(0.5);
        let my_location = Location::from_raw(0.0);
        let candidates = vec![candidate(1, 0.45), candidate(2, 0.46), candidate(3, 0.47)];
        let now = Instant::now();
        let failures = AllTimedOut(now + Duration::from_secs(5));
        let outcome = select_peer(my_location, target, &candidates, false, &[0u8; 32], 10, now, &failures, false);
        assert!(matches!(outcome, SelectionOutcome::RecentlyFailed { .. }));
    }
}
