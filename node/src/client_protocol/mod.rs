//! The text-framed client protocol (§6.2): localhost-only TCP, one
//! task per connection plus one task per active client request (§5).

pub mod codec;
pub mod message;
pub mod server;

pub use message::{ProtocolError, ProtocolErrorCode, TextMessage};
pub use server::{serve, serve_on};
