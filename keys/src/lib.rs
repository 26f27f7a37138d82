//! URI parsing, node/client key derivation, and keyspace locations
//! (spec §3, §4.1).

pub mod error;
pub mod extra;
pub mod key;
pub mod location;
pub mod uri;

pub use error::UriParseError;
pub use extra::{CryptoAlgorithm, Extra};
pub use key::{BaseKeyType, NodeChk, NodeSsk};
pub use location::Location;
pub use uri::{KeyType, Uri};

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use rand::Rng;

    /// Generates a random 32-byte array, mirroring the teacher's
    /// `#[cfg(any(test, feature = "testing"))] mod rand` helper.
    pub fn random_32<R: Rng + ?Sized>(rng: &mut R) -> [u8; 32] {
        let mut out = [0u8; 32];
        rng.fill(&mut out);
        out
    }
}
