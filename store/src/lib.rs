//! Datastore: a salted, encrypted, LRU key/value store addressed by
//! routing key, backed either by RAM or by a pair of fixed-slot files
//! (§4.3, §6.3).

pub mod addressing;
pub mod block_payload;
pub mod error;
pub mod file;
pub mod metadata;
pub mod payload;
pub mod ram;
pub mod slot_filter;
pub mod stats;

pub use error::StoreError;
pub use file::FileStore;
pub use payload::StoredPayload;
pub use ram::RamStore;
pub use slot_filter::SlotFilter;
pub use stats::Stats;
