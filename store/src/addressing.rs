use sha2::{Digest, Sha256};

/// Digests a routing key with the datastore's salt (§4.3).
pub fn digest_key(salt: &[u8; 16], routing_key: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(routing_key);
    let out = hasher.finalize();
    let mut digested = [0u8; 32];
    digested.copy_from_slice(&out);
    digested
}

/// The low 24 bits of a digested key's first 3 bytes, used by the slot
/// filter for negative-lookup short-circuiting (§4.3).
pub fn filter_fingerprint(digested: &[u8; 32]) -> u32 {
    u32::from_be_bytes([0, digested[0], digested[1], digested[2]])
}

/// Computes the 5 candidate slots for a digested key in a table of
/// `slot_count` slots: `(h + 141*i² + 13*i) mod N`, with collisions
/// between the five candidates resolved by incrementing and re-modding
/// (§4.3).
pub fn candidate_slots(digested: &[u8; 32], slot_count: u64) -> [u64; 5] {
    assert!(slot_count > 0, "datastore must have at least one slot");
    let mut head = [0u8; 8];
    head.copy_from_slice(&digested[..8]);
    let h = u64::from_be_bytes(head);

    let mut slots = [0u64; 5];
    for i in 0..5u64 {
        let mut candidate = h
            .wrapping_add(141u64.wrapping_mul(i).wrapping_mul(i))
            .wrapping_add(13u64.wrapping_mul(i))
            % slot_count;
        while slots[..i as usize].contains(&candidate) {
            candidate = (candidate + 1) % slot_count;
        }
        slots[i as usize] = candidate;
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_distinct_and_in_range() {
        let digested = [42u8; 32];
        let slots = candidate_slots(&digested, 16);
        for s in slots {
            assert!(s < 16);
        }
        let mut sorted = slots.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
    }

    #[test]
    fn candidates_are_deterministic() {
        let digested = [7u8; 32];
        assert_eq!(candidate_slots(&digested, 1000), candidate_slots(&digested, 1000));
    }
}
