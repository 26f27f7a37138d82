use aes::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;

use keys::{CryptoAlgorithm, NodeChk};

use crate::error::BlockVerifyError;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

pub const DATA_LEN: usize = 32_768;
pub const HEADER_LEN: usize = 36;

/// A fixed-size, content-addressed CHK block (§3): 36 header bytes plus
/// 32,768 bytes of (already encrypted) payload.
#[derive(Clone, PartialEq, Eq)]
pub struct ChkBlock {
    pub header: [u8; HEADER_LEN],
    pub data: [u8; DATA_LEN],
}

impl std::fmt::Debug for ChkBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "ChkBlock {{ header: {}, data: <{} bytes> }}", hex::encode(self.header), self.data.len())
    }
}

fn encrypt_with_key(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(&mut buf);
    buf
}

/// Builds the 36-byte CHK header: `hash_id(2) ∥ algorithm(2) ∥ iv(16) ∥
/// reserved(16)`. Bytes 0-1 must equal the SHA-256 hash-identifier tag
/// (1) per §3.
fn build_header(algorithm: CryptoAlgorithm, iv: &[u8; 16]) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0..2].copy_from_slice(&1u16.to_be_bytes());
    header[2..4].copy_from_slice(&(algorithm.as_byte() as u16).to_be_bytes());
    header[4..20].copy_from_slice(iv);
    header
}

impl ChkBlock {
    /// Constructs a CHK block from plaintext, generating a fresh random
    /// 32-byte crypto key and, unless the caller supplies one, a zero
    /// IV (§4.2). Returns the block plus the crypto key needed to
    /// reconstruct the client-form URI.
    pub fn construct(plaintext: &[u8; DATA_LEN], iv: Option<[u8; 16]>) -> (Self, [u8; 32], NodeChk) {
        let mut crypto_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut crypto_key);
        let iv = iv.unwrap_or([0u8; 16]);

        let encrypted = encrypt_with_key(&crypto_key, &iv, plaintext);
        let mut data = [0u8; DATA_LEN];
        data.copy_from_slice(&encrypted);

        let header = build_header(CryptoAlgorithm::AesCtr256Sha256, &iv);
        let node_key = NodeChk::derive(&header, &data, CryptoAlgorithm::AesCtr256Sha256);

        (ChkBlock { header, data }, crypto_key, node_key)
    }

    pub fn decrypt(&self, crypto_key: &[u8; 32]) -> Vec<u8> {
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&self.header[4..20]);
        encrypt_with_key(crypto_key, &iv, &self.data)
    }

    /// Verifies invariant (a) of §3: `SHA-256(header ∥ data) ==
    /// routing_key`.
    pub fn verify(&self, expected_routing_key: &[u8; 32]) -> Result<(), BlockVerifyError> {
        if self.header[0..2] != 1u16.to_be_bytes() {
            return Err(BlockVerifyError::HashIdentifierMismatch);
        }
        let algorithm_word = u16::from_be_bytes([self.header[2], self.header[3]]);
        let algorithm = CryptoAlgorithm::from_byte(algorithm_word as u8)
            .map_err(|_| BlockVerifyError::DataIntegrity)?;
        let derived = NodeChk::derive(&self.header, &self.data, algorithm);
        if &derived.routing_key != expected_routing_key {
            return Err(BlockVerifyError::DataIntegrity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_then_verify_succeeds() {
        let plaintext = [7u8; DATA_LEN];
        let (block, crypto_key, node_key) = ChkBlock::construct(&plaintext, None);
        block.verify(&node_key.routing_key).unwrap();

        let decrypted = block.decrypt(&crypto_key);
        assert_eq!(&decrypted[..], &plaintext[..]);
    }

    #[test]
    fn verify_fails_on_tampered_routing_key() {
        let plaintext = [1u8; DATA_LEN];
        let (block, _crypto_key, _node_key) = ChkBlock::construct(&plaintext, None);
        let wrong_key = [0xABu8; 32];
        assert_eq!(block.verify(&wrong_key).unwrap_err(), BlockVerifyError::DataIntegrity);
    }

    #[test]
    fn verify_fails_on_bad_hash_identifier() {
        let plaintext = [1u8; DATA_LEN];
        let (mut block, _crypto_key, node_key) = ChkBlock::construct(&plaintext, None);
        block.header[0] = 0xFF;
        assert_eq!(block.verify(&node_key.routing_key).unwrap_err(), BlockVerifyError::HashIdentifierMismatch);
    }
}
