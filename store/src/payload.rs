/// A fixed-length, type-specific datastore payload (§4.3: "N slots of
/// (header-length + data-length), type-specific"). Implemented by
/// `block::ChkBlock` (32,804 bytes) and `block::SskBlock` (1,160 bytes)
/// at the `node` crate layer, which owns the dependency on both `store`
/// and `block`.
pub trait StoredPayload: Sized + Clone {
    const HEADER_LEN: usize;
    const DATA_LEN: usize;

    fn slot_len() -> usize {
        Self::HEADER_LEN + Self::DATA_LEN
    }

    fn to_slot_bytes(&self) -> Vec<u8>;
    fn from_slot_bytes(bytes: &[u8]) -> Option<Self>;
}
