use aes::cipher::{BlockEncrypt, KeyInit};
use dsa::{Components, KeySize, SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use signature::{Signer, Verifier};

use keys::{CryptoAlgorithm, NodeSsk};

use crate::error::BlockVerifyError;

pub const DATA_LEN: usize = 1024;
pub const HEADER_LEN: usize = 136;

const SIGNED_PREFIX_LEN: usize = 72;
const R_OFFSET: usize = 72;
const S_OFFSET: usize = 104;

/// A fixed-size, DSA-signed SSK block (§3): a 136-byte header (this
/// implementation's resolution of the spec's approximate "135 header
/// bytes", see DESIGN.md) plus 1024 bytes of encrypted payload.
///
/// Layout: `hash_id(2) ∥ cipher_id(2) ∥ eh_docname(32) ∥
/// encrypted_header_fields(36) ∥ R(32) ∥ S(32)`.
#[derive(Clone, PartialEq, Eq)]
pub struct SskBlock {
    pub header: [u8; HEADER_LEN],
    pub data: [u8; DATA_LEN],
}

impl std::fmt::Debug for SskBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SskBlock {{ header: {}, data: <{} bytes> }}", hex::encode(self.header), self.data.len())
    }
}

/// DSA domain parameters cached per owner identity, resolving the
/// spec's Open Question about regenerating parameters on every
/// sign/verify (§9): a `DsaIdentity` is generated once and persisted,
/// then reused for every SSK the owner ever signs.
pub struct DsaIdentity {
    pub components: Components,
    pub signing_key: SigningKey,
}

impl DsaIdentity {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let components = Components::generate(rng, KeySize::DSA_1024_160);
        let signing_key = SigningKey::generate(rng, components.clone());
        DsaIdentity { components, signing_key }
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }
}

fn aes_ecb_single_block(key: &[u8; 32], block: &[u8; 32]) -> [u8; 32] {
    // eh = AES-256-ECB_C(SHA-256(N)) as a single-block cipher applied
    // to each 16-byte half independently, matching a raw block cipher
    // invocation rather than a stream mode (§4.2).
    let cipher = aes::Aes256::new(key.into());
    let mut out = [0u8; 32];
    for (chunk_in, chunk_out) in block.chunks(16).zip(out.chunks_mut(16)) {
        let mut b = aes::Block::clone_from_slice(chunk_in);
        cipher.encrypt_block(&mut b);
        chunk_out.copy_from_slice(&b);
    }
    out
}

/// Computes `eh = AES-256-ECB_C(SHA-256(docname))` (§4.2).
pub fn encrypted_hashed_docname(docname: &str, crypto_key: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(docname.as_bytes());
    let digest = hasher.finalize();
    let mut n = [0u8; 32];
    n.copy_from_slice(&digest);
    aes_ecb_single_block(crypto_key, &n)
}

fn pad32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    if bytes.len() >= 32 {
        out.copy_from_slice(&bytes[bytes.len() - 32..]);
    } else {
        out[32 - bytes.len()..].copy_from_slice(bytes);
    }
    out
}

impl SskBlock {
    /// Builds and signs an SSK block (§4.2). `header_fields` is the
    /// 36-byte encrypted-header-fields section; its contents are
    /// opaque to this layer (owner-defined metadata).
    #[allow(clippy::too_many_arguments)]
    pub fn construct(
        identity: &DsaIdentity,
        eh_docname: &[u8; 32],
        header_fields: &[u8; 36],
        encrypted_data: &[u8; DATA_LEN],
        cipher: CryptoAlgorithm,
    ) -> Result<Self, signature::Error> {
        let mut header = [0u8; HEADER_LEN];
        header[0..2].copy_from_slice(&1u16.to_be_bytes());
        header[2..4].copy_from_slice(&(cipher.as_byte() as u16).to_be_bytes());
        header[4..36].copy_from_slice(eh_docname);
        header[36..72].copy_from_slice(header_fields);

        let data_hash = Sha256::digest(encrypted_data);
        let mut signed_message = Vec::with_capacity(SIGNED_PREFIX_LEN + 32);
        signed_message.extend_from_slice(&header[..SIGNED_PREFIX_LEN]);
        signed_message.extend_from_slice(&data_hash);
        let message_hash = Sha256::digest(&signed_message);

        let signature: dsa::Signature = identity.signing_key.try_sign(&message_hash)?;
        header[R_OFFSET..R_OFFSET + 32].copy_from_slice(&pad32(&signature.r().to_bytes_be()));
        header[S_OFFSET..S_OFFSET + 32].copy_from_slice(&pad32(&signature.s().to_bytes_be()));

        Ok(SskBlock { header, data: *encrypted_data })
    }

    /// Verifies invariant (b): the eh-docname matches the key's, and
    /// the DSA signature over `SHA-256(header[0:72] ∥ SHA-256(data))`
    /// verifies under the owner's public key (§4.2, §8).
    pub fn verify(&self, key: &NodeSsk, owner_verifying_key: &VerifyingKey) -> Result<(), BlockVerifyError> {
        if self.header[0..2] != 1u16.to_be_bytes() {
            return Err(BlockVerifyError::HashIdentifierMismatch);
        }

        let mut eh_docname = [0u8; 32];
        eh_docname.copy_from_slice(&self.header[4..36]);
        // The routing key folds in both the eh-docname and the
        // owner's public-key hash, so recomputing it from the header's
        // eh-docname and the caller-supplied key's owner hash and
        // comparing against the key's routing key is how this layer
        // checks "the eh-docname equals the key's" (§4.2).
        let recomputed = {
            let mut hasher = Sha256::new();
            hasher.update(eh_docname);
            hasher.update(key.pub_key_hash);
            let digest = hasher.finalize();
            let mut out = [0u8; 32];
            out.copy_from_slice(&digest);
            out
        };
        if recomputed != key.routing_key {
            return Err(BlockVerifyError::EhDocnameMismatch);
        }

        let data_hash = Sha256::digest(self.data);
        let mut signed_message = Vec::with_capacity(SIGNED_PREFIX_LEN + 32);
        signed_message.extend_from_slice(&self.header[..SIGNED_PREFIX_LEN]);
        signed_message.extend_from_slice(&data_hash);
        let message_hash = Sha256::digest(&signed_message);

        let r = dsa::BigUint::from_bytes_be(&self.header[R_OFFSET..R_OFFSET + 32]);
        let s = dsa::BigUint::from_bytes_be(&self.header[S_OFFSET..S_OFFSET + 32]);
        let signature = dsa::Signature::from_components(r, s).map_err(|_| BlockVerifyError::SignatureFail)?;

        owner_verifying_key
            .verify(&message_hash, &signature)
            .map_err(|_| BlockVerifyError::SignatureFail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn construct_then_verify_succeeds() {
        let identity = DsaIdentity::generate(&mut OsRng);
        let crypto_key = [5u8; 32];
        let eh = encrypted_hashed_docname("mydoc", &crypto_key);
        let owner_pub_bytes = b"owner-public-key-placeholder";
        let key = NodeSsk::derive(owner_pub_bytes, &eh, CryptoAlgorithm::AesCtr256Sha256);

        let data = [9u8; DATA_LEN];
        let block = SskBlock::construct(&identity, &eh, &[0u8; 36], &data, CryptoAlgorithm::AesCtr256Sha256).unwrap();
        // NodeSsk::pub_key_hash is derived from the real owner key, not
        // our placeholder bytes above, so rebuild `key` against the
        // identity actually used to sign.
        let _ = key;
        let real_key = NodeSsk::derive(identity.verifying_key().y().to_bytes_be().as_slice(), &eh, CryptoAlgorithm::AesCtr256Sha256);
        block.verify(&real_key, identity.verifying_key()).unwrap();
    }
}
