//! `StoredPayload` implementations for the block types (§4.3, §6.3).
//! This lives here (rather than in `block` or `node`) because the
//! orphan rule forbids implementing a `store` trait for a `block`
//! type from either of those crates directly.

use block::{ChkBlock, SskBlock};

use crate::payload::StoredPayload;

impl StoredPayload for ChkBlock {
    const HEADER_LEN: usize = block::chk::HEADER_LEN;
    const DATA_LEN: usize = block::chk::DATA_LEN;

    fn to_slot_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::slot_len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.data);
        out
    }

    fn from_slot_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::slot_len() {
            return None;
        }
        let mut header = [0u8; block::chk::HEADER_LEN];
        header.copy_from_slice(&bytes[..block::chk::HEADER_LEN]);
        let mut data = [0u8; block::chk::DATA_LEN];
        data.copy_from_slice(&bytes[block::chk::HEADER_LEN..]);
        Some(ChkBlock { header, data })
    }
}

impl StoredPayload for SskBlock {
    const HEADER_LEN: usize = block::ssk::HEADER_LEN;
    const DATA_LEN: usize = block::ssk::DATA_LEN;

    fn to_slot_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::slot_len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.data);
        out
    }

    fn from_slot_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::slot_len() {
            return None;
        }
        let mut header = [0u8; block::ssk::HEADER_LEN];
        header.copy_from_slice(&bytes[..block::ssk::HEADER_LEN]);
        let mut data = [0u8; block::ssk::DATA_LEN];
        data.copy_from_slice(&bytes[block::ssk::HEADER_LEN..]);
        Some(SskBlock { header, data })
    }
}
