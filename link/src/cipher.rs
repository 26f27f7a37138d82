use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

pub const HMAC_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const SEQ_LEN: usize = 4;

/// One direction of a session's cipher state: an AES-256-CTR key used
/// with a fresh random IV per packet, and an HMAC-SHA-256 key over
/// `seq ∥ IV ∥ ciphertext` (§4.4.2).
pub struct CipherState {
    key: [u8; 32],
    mac_key: [u8; 32],
}

impl CipherState {
    pub fn new(key: [u8; 32], mac_key: [u8; 32]) -> Self {
        CipherState { key, mac_key }
    }

    pub fn seal(&self, seq: u32, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut ciphertext = plaintext.to_vec();
        let mut cipher = Aes256Ctr::new(&self.key.into(), &iv.into());
        cipher.apply_keystream(&mut ciphertext);

        let mut out = Vec::with_capacity(SEQ_LEN + IV_LEN + ciphertext.len() + HMAC_LEN);
        out.extend_from_slice(&seq.to_be_bytes());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);

        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("hmac accepts any key length");
        mac.update(&out);
        out.extend_from_slice(&mac.finalize().into_bytes());
        out
    }

    /// Verifies the HMAC and decrypts in place. Returns `(seq, plaintext)`.
    /// Sequence-window policy lives in [`crate::session::Session`], not here.
    pub fn open(&self, packet: &[u8]) -> Option<(u32, Vec<u8>)> {
        if packet.len() < SEQ_LEN + IV_LEN + HMAC_LEN {
            return None;
        }
        let (body, tag) = packet.split_at(packet.len() - HMAC_LEN);

        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("hmac accepts any key length");
        mac.update(body);
        mac.verify_slice(tag).ok()?;

        let seq = u32::from_be_bytes(body[0..SEQ_LEN].try_into().unwrap());
        let iv: [u8; IV_LEN] = body[SEQ_LEN..SEQ_LEN + IV_LEN].try_into().unwrap();
        let mut plaintext = body[SEQ_LEN + IV_LEN..].to_vec();

        let mut cipher = Aes256Ctr::new(&self.key.into(), &iv.into());
        cipher.apply_keystream(&mut plaintext);

        Some((seq, plaintext))
    }
}

/// `HMAC-SHA-256(key; data)`, used both for handshake authenticators
/// and session-key derivation (§4.4.1).
pub fn hmac_sha256(key: &[u8], data: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    for chunk in data {
        mac.update(chunk);
    }
    let out = mac.finalize().into_bytes();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&out);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let cipher = CipherState::new([1u8; 32], [2u8; 32]);
        let packet = cipher.seal(7, b"hello world");
        let (seq, plaintext) = cipher.open(&packet).unwrap();
        assert_eq!(seq, 7);
        assert_eq!(plaintext, b"hello world");
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let cipher = CipherState::new([1u8; 32], [2u8; 32]);
        let mut packet = cipher.seal(1, b"payload");
        let last = packet.len() - 1;
        packet[SEQ_LEN + 1] ^= 0xFF;
        let _ = last;
        assert!(cipher.open(&packet).is_none());
    }
}
