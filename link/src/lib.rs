//! Encrypted peer link (§4.4): a JFK-style four-message handshake over
//! P-256, post-handshake session framing with a sliding-window replay
//! filter, and the NPF reliable/priority message layer riding inside
//! it.

pub mod cipher;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod message;
pub mod npf;
pub mod session;

pub use dispatcher::Dispatcher;
pub use error::{HandshakeError, NpfError, SessionError};
pub use handshake::{Identity, IncompleteInitiator, Initiator, Responder};
pub use message::{FieldValue, MessageKind, NpfMessage};
pub use npf::{NpfPacket, PriorityQueues, Reassembler};
pub use session::Session;
