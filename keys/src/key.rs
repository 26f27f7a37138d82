use sha2::{Digest, Sha256};

use crate::extra::CryptoAlgorithm;
use crate::location::Location;

/// High byte of the 2-byte key-type prefix carried on the wire (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BaseKeyType {
    Chk = 1,
    Ssk = 2,
}

fn type_prefix(base: BaseKeyType, algorithm: CryptoAlgorithm) -> u16 {
    ((base as u16) << 8) | algorithm.as_byte() as u16
}

/// The routing (node) form of a CHK key: a 32-byte routing key plus the
/// crypto algorithm used to produce it. Carries no decryption key — see
/// [`crate::uri::Uri`] for the client form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeChk {
    pub routing_key: [u8; 32],
    pub algorithm: CryptoAlgorithm,
}

impl NodeChk {
    /// Derives the routing key as `SHA-256(headers ∥ encrypted_data)`
    /// (§3).
    pub fn derive(headers: &[u8], encrypted_data: &[u8], algorithm: CryptoAlgorithm) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(headers);
        hasher.update(encrypted_data);
        let digest = hasher.finalize();
        let mut routing_key = [0u8; 32];
        routing_key.copy_from_slice(&digest);
        NodeChk { routing_key, algorithm }
    }

    pub fn location(&self) -> Location {
        Location::derive(&self.routing_key, type_prefix(BaseKeyType::Chk, self.algorithm))
    }
}

/// The routing (node) form of an SSK key: `SHA-256(eh-docname ∥
/// pub-key-hash)`, where `pub_key_hash = SHA-256(owner public key)`
/// (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSsk {
    pub pub_key_hash: [u8; 32],
    pub routing_key: [u8; 32],
    pub algorithm: CryptoAlgorithm,
}

impl NodeSsk {
    pub fn derive(owner_public_key: &[u8], encrypted_hashed_docname: &[u8; 32], algorithm: CryptoAlgorithm) -> Self {
        let pub_key_hash = {
            let mut hasher = Sha256::new();
            hasher.update(owner_public_key);
            let digest = hasher.finalize();
            let mut out = [0u8; 32];
            out.copy_from_slice(&digest);
            out
        };

        let routing_key = {
            let mut hasher = Sha256::new();
            hasher.update(encrypted_hashed_docname);
            hasher.update(pub_key_hash);
            let digest = hasher.finalize();
            let mut out = [0u8; 32];
            out.copy_from_slice(&digest);
            out
        };

        NodeSsk { pub_key_hash, routing_key, algorithm }
    }

    pub fn location(&self) -> Location {
        Location::derive(&self.routing_key, type_prefix(BaseKeyType::Ssk, self.algorithm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chk_derivation_is_deterministic() {
        let headers = [1u8; 36];
        let data = [2u8; 32768];
        let a = NodeChk::derive(&headers, &data, CryptoAlgorithm::AesCtr256Sha256);
        let b = NodeChk::derive(&headers, &data, CryptoAlgorithm::AesCtr256Sha256);
        assert_eq!(a, b);

        let mut expect = Sha256::new();
        expect.update(headers);
        expect.update(data);
        assert_eq!(&a.routing_key[..], &expect.finalize()[..]);
    }

    #[test]
    fn ssk_routing_key_uses_docname_and_pubkey_hash() {
        let pk = [9u8; 33];
        let eh_docname = [3u8; 32];
        let ssk = NodeSsk::derive(&pk, &eh_docname, CryptoAlgorithm::AesPcfb256Sha256);

        let mut expect_pkh = Sha256::new();
        expect_pkh.update(pk);
        assert_eq!(&ssk.pub_key_hash[..], &expect_pkh.finalize()[..]);
    }
}
