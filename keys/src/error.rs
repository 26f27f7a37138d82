use thiserror::Error;

/// URI and key parsing failures (§4.1). Each variant names a single
/// distinguishable failure mode so callers (the client protocol server,
/// in particular) can report a precise `ProtocolError` code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriParseError {
    #[error("missing '@' separator in URI")]
    MissingAt,
    #[error("unknown key type {0:?}")]
    UnknownKeyType(String),
    #[error("invalid base64 in field {field}")]
    InvalidBase64 { field: &'static str },
    #[error("field {field} has wrong length: expected {expected}, got {actual}")]
    WrongFieldLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("KSK URI is missing a document name")]
    MissingDocname,
}
