//! `store::StoredPayload` implementations for the block types (§4.3,
//! §6.3). The impls themselves live in the `store` crate (see
//! `store::block_payload`) because the orphan rule forbids
//! implementing a `store` trait for a `block` type from either of
//! those crates directly.

#[cfg(test)]
mod tests {
    use block::ChkBlock;
    use store::FileStore;

    #[test]
    fn chk_block_round_trips_through_a_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store: FileStore<ChkBlock> = FileStore::open(dir.path(), 16).unwrap();

        let plaintext = [7u8; block::chk::DATA_LEN];
        let (blk, _crypto_key, node_key) = ChkBlock::construct(&plaintext, None);
        store.put(&node_key.routing_key, &blk, false).unwrap();

        let fetched = store.fetch(&node_key.routing_key).unwrap().unwrap();
        assert_eq!(fetched, blk);
    }
}
