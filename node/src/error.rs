use thiserror::Error;

/// Node-level error kinds (§7), wrapping each lower crate's own error
/// type. Unlike `link`/`store`/`routing`/`request`, this crate uses
/// `thiserror` for its top-level error, matching the teacher's root
/// package style rather than the hand-rolled enums used deeper in the
/// stack.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("datastore error: {0}")]
    Store(#[from] store::StoreError),
    #[error("handshake error: {0}")]
    Handshake(#[from] link::HandshakeError),
    #[error("session error: {0}")]
    Session(#[from] link::SessionError),
    #[error("npf error: {0}")]
    Npf(#[from] link::NpfError),
    #[error("request error: {0}")]
    Request(#[from] request::RequestError),
    #[error("uri parse error: {0}")]
    Uri(#[from] keys::UriParseError),
    #[error("block verify error: {0}")]
    BlockVerify(#[from] block::BlockVerifyError),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}
