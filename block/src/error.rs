use thiserror::Error;

/// Block verification failures (§4.2, §7). Each variant is a distinct,
/// reportable reason a stored or received block is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockVerifyError {
    #[error("hash identifier mismatch: expected SHA-256 tag")]
    HashIdentifierMismatch,
    #[error("data integrity check failed: routing key does not match header ∥ data")]
    DataIntegrity,
    #[error("encrypted-hashed-docname does not match the key's")]
    EhDocnameMismatch,
    #[error("DSA signature verification failed")]
    SignatureFail,
}
