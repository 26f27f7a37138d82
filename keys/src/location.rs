use sha2::{Digest, Sha256};

/// A position on the routing keyspace's unit circle, in `[0, 1)`.
///
/// Locations are produced by hashing a routing key together with its
/// key-type prefix (§3), never constructed from an arbitrary `f64`
/// outside this module except by [`Location::from_raw`], which callers
/// use when loading a persisted or wire-carried location.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub struct Location(f64);

impl Location {
    /// Builds a location from an already-normalized value, clamping into
    /// `[0, 1)`. Used when decoding a peer's declared location off the
    /// wire or from disk, where the derivation in [`Location::derive`]
    /// does not apply.
    pub fn from_raw(value: f64) -> Self {
        let value = if value.is_finite() { value } else { 0.0 };
        Location(value.rem_euclid(1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Derives the normalized location of a routing key per §3: take
    /// `SHA-256(routing_key ∥ type_prefix)`, interpret the first 8 bytes
    /// as a big-endian signed integer, map to an unsigned value in
    /// `[0, 2^63)` by clearing the sign bit, then divide by `2^63`.
    pub fn derive(routing_key: &[u8; 32], type_prefix: u16) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(routing_key);
        hasher.update(type_prefix.to_be_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let signed = i64::from_be_bytes(head);
        let unsigned = (signed as u64) & 0x7FFF_FFFF_FFFF_FFFF;
        Location(unsigned as f64 / (1u64 << 63) as f64)
    }

    /// Circular distance: `min(|a-b|, 1-|a-b|)`, always in `[0, 0.5]`.
    pub fn distance(self, other: Location) -> f64 {
        let d = (self.0 - other.0).abs();
        d.min(1.0 - d)
    }

    /// Signed, wrap-aware delta needed to go from `self` to `other`,
    /// in `(-0.5, 0.5]`.
    pub fn change(self, other: Location) -> f64 {
        let mut delta = other.0 - self.0;
        if delta <= -0.5 {
            delta += 1.0;
        } else if delta > 0.5 {
            delta -= 1.0;
        }
        delta
    }
}

impl std::fmt::Debug for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Location({:.6})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric_and_bounded() {
        let a = Location::from_raw(0.1);
        let b = Location::from_raw(0.95);
        let d1 = a.distance(b);
        let d2 = b.distance(a);
        assert!((d1 - d2).abs() < 1e-12);
        assert!(d1 >= 0.0 && d1 <= 0.5);
    }

    #[test]
    fn distance_wraps_around_zero() {
        let a = Location::from_raw(0.01);
        let b = Location::from_raw(0.99);
        assert!((a.distance(b) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn derive_is_deterministic_and_in_range() {
        let key = [7u8; 32];
        let l1 = Location::derive(&key, 0x0102);
        let l2 = Location::derive(&key, 0x0102);
        assert_eq!(l1.value(), l2.value());
        assert!(l1.value() >= 0.0 && l1.value() < 1.0);

        let l3 = Location::derive(&key, 0x0103);
        assert_ne!(l1.value(), l3.value());
    }
}
