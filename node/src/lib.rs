pub mod block_store;
pub mod client_protocol;
pub mod config;
pub mod error;
pub mod failure_table;
pub mod identity_store;
pub mod location_store;
pub mod node;
pub mod noderef;
pub mod peer_table;
pub mod relay_table;
pub mod session_table;
pub mod udp;

pub use config::Config;
pub use error::NodeError;
pub use node::{FetchOutcome, Node, OutboundDatagram};
pub use noderef::NodeRef;
