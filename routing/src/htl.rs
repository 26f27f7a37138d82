pub const MAX_HTL: u8 = 18;
pub const MIN_HTL: u8 = 0;

/// The probabilistic HTL decrement (§4.5): at the maximum and minimum
/// values, a single coin flipped once at startup decides whether the
/// hop actually decrements, obscuring the true hop count near both
/// ends of a request's path. A `deterministic` policy always
/// decrements by one, for tests.
pub struct HtlPolicy {
    coin: bool,
    deterministic: bool,
}

impl HtlPolicy {
    pub fn new<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        HtlPolicy { coin: rng.gen(), deterministic: false }
    }

    pub fn deterministic() -> Self {
        HtlPolicy { coin: false, deterministic: true }
    }

    pub fn decrement(&self, htl: u8) -> u8 {
        let htl = htl.min(MAX_HTL);
        if self.deterministic {
            return htl.saturating_sub(1);
        }
        match htl {
            MAX_HTL => if self.coin { MAX_HTL } else { MAX_HTL - 1 },
            1 => if self.coin { 1 } else { 0 },
            0 => 0,
            h => h - 1,
        }
    }
}

/// A block received at the maximum HTL is never cached locally (§4.5:
/// the "no-cache" zone near the originator).
pub fn should_cache(received_htl: u8) -> bool {
    received_htl < MAX_HTL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_htl_always_decrements() {
        let policy = HtlPolicy::deterministic();
        for htl in 2..=17 {
            assert_eq!(policy.decrement(htl), htl - 1);
        }
    }

    #[test]
    fn deterministic_policy_decrements_at_the_boundaries_too() {
        let policy = HtlPolicy::deterministic();
        assert_eq!(policy.decrement(MAX_HTL), MAX_HTL - 1);
        assert_eq!(policy.decrement(1), 0);
        assert_eq!(policy.decrement(0), 0);
    }

    #[test]
    fn coin_can_hold_htl_steady_at_the_boundaries() {
        let heads = HtlPolicy { coin: true, deterministic: false };
        assert_eq!(heads.decrement(MAX_HTL), MAX_HTL);
        assert_eq!(heads.decrement(1), 1);
    }

    #[test]
    fn write_rule_forbids_caching_at_max_htl() {
        assert!(!should_cache(MAX_HTL));
        assert!(should_cache(MAX_HTL - 1));
    }
}
