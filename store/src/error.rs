use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("datastore I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datastore metadata or payload is corrupt at slot {0}")]
    Corrupt(u64),
    #[error("datastore salt file has the wrong length: expected 16, got {0}")]
    BadSalt(usize),
}
