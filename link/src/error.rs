use std::{error, fmt, io};

/// Mirrors `brontide::HandshakeError`'s hand-rolled `Display`/`Error`
/// impls: every failure mode of the four-message handshake fails the
/// handshake and marks the peer Failed (§4.4.1).
#[derive(Debug)]
pub enum HandshakeError {
    Io(io::Error),
    Crypto(String),
    NonceHashMismatch,
    SignatureMismatch,
    AuthenticatorMismatch,
    UnexpectedPhase,
    Timeout,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HandshakeError::Io(e) => write!(f, "io error: {}", e),
            HandshakeError::Crypto(msg) => write!(f, "crypto error: {}", msg),
            HandshakeError::NonceHashMismatch => write!(f, "nonce hash does not match"),
            HandshakeError::SignatureMismatch => write!(f, "signature verification failed"),
            HandshakeError::AuthenticatorMismatch => write!(f, "authenticator verification failed"),
            HandshakeError::UnexpectedPhase => write!(f, "message received out of order"),
            HandshakeError::Timeout => write!(f, "handshake timed out"),
        }
    }
}

impl error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            HandshakeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for HandshakeError {
    fn from(e: io::Error) -> Self {
        HandshakeError::Io(e)
    }
}

/// Failure modes of the post-handshake session packet layer (§4.4.2).
#[derive(Debug)]
pub enum SessionError {
    HmacMismatch,
    SequenceReplayed,
    SequenceTooOld,
    RekeyRequired,
    Truncated,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionError::HmacMismatch => write!(f, "packet HMAC does not match"),
            SessionError::SequenceReplayed => write!(f, "sequence number already seen"),
            SessionError::SequenceTooOld => write!(f, "sequence number outside the replay window"),
            SessionError::RekeyRequired => write!(f, "session must be rekeyed before sending further packets"),
            SessionError::Truncated => write!(f, "packet shorter than the minimum session packet length"),
        }
    }
}

impl error::Error for SessionError {}

/// NPF packet parse failures (§4.4.3).
#[derive(Debug)]
pub enum NpfError {
    Truncated,
    TooManyAckRanges,
    NonFirstFragmentBeforeFirst,
}

impl fmt::Display for NpfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NpfError::Truncated => write!(f, "NPF packet truncated"),
            NpfError::TooManyAckRanges => write!(f, "more than 254 ack ranges"),
            NpfError::NonFirstFragmentBeforeFirst => write!(f, "non-first fragment arrived before the first"),
        }
    }
}

impl error::Error for NpfError {}
