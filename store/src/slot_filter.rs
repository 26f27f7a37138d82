use std::sync::atomic::{AtomicU32, Ordering};

use crate::addressing::filter_fingerprint;

const CHECKED_BIT: u32 = 1 << 31;
const OCCUPIED_BIT: u32 = 1 << 30;
const NEW_BLOCK_BIT: u32 = 1 << 29;
const WRONG_STORE_BIT: u32 = 1 << 28;
const FINGERPRINT_MASK: u32 = 0x00FF_FFFF;

/// A lock-free, per-slot summary bitmap (§4.3): one 32-bit word per
/// slot, letting a probe short-circuit without taking the datastore's
/// rw-lock or touching disk.
pub struct SlotFilter {
    words: Vec<AtomicU32>,
}

impl SlotFilter {
    pub fn new(slot_count: usize) -> Self {
        let mut words = Vec::with_capacity(slot_count);
        words.resize_with(slot_count, || AtomicU32::new(0));
        SlotFilter { words }
    }

    pub fn from_words(words: Vec<u32>) -> Self {
        SlotFilter { words: words.into_iter().map(AtomicU32::new).collect() }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn snapshot(&self) -> Vec<u32> {
        self.words.iter().map(|w| w.load(Ordering::Relaxed)).collect()
    }

    /// Returns `true` if this slot is definitely not a match for
    /// `digested` — the filter is checked, marked occupied, and the
    /// fingerprint differs — letting the caller skip the metadata read
    /// entirely.
    pub fn definitely_mismatches(&self, slot: u64, digested: &[u8; 32]) -> bool {
        let word = self.words[slot as usize].load(Ordering::Acquire);
        if word & CHECKED_BIT == 0 {
            return false;
        }
        if word & OCCUPIED_BIT == 0 {
            return true;
        }
        (word & FINGERPRINT_MASK) != filter_fingerprint(digested)
    }

    pub fn mark_occupied(&self, slot: u64, digested: &[u8; 32], new_block: bool, wrong_store: bool) {
        let mut word = CHECKED_BIT | OCCUPIED_BIT | filter_fingerprint(digested);
        if new_block {
            word |= NEW_BLOCK_BIT;
        }
        if wrong_store {
            word |= WRONG_STORE_BIT;
        }
        self.words[slot as usize].store(word, Ordering::Release);
    }

    pub fn mark_empty(&self, slot: u64) {
        self.words[slot as usize].store(CHECKED_BIT, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchecked_slot_never_mismatches() {
        let filter = SlotFilter::new(4);
        assert!(!filter.definitely_mismatches(0, &[1u8; 32]));
    }

    #[test]
    fn occupied_slot_with_wrong_fingerprint_mismatches() {
        let filter = SlotFilter::new(4);
        filter.mark_occupied(0, &[1u8; 32], false, false);
        assert!(filter.definitely_mismatches(0, &[2u8; 32]));
        assert!(!filter.definitely_mismatches(0, &[1u8; 32]));
    }

    #[test]
    fn empty_slot_mismatches_any_key() {
        let filter = SlotFilter::new(4);
        filter.mark_empty(0);
        assert!(filter.definitely_mismatches(0, &[9u8; 32]));
    }
}
