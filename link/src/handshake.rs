use std::net::IpAddr;

use p256::ecdh::EphemeralSecret;
use p256::ecdsa::{signature::Signer, signature::Verifier, Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use crate::cipher::hmac_sha256;
use crate::error::HandshakeError;
use crate::session::Session;

const EPH_LEN: usize = 33;
const SIG_LEN: usize = 64;

/// A node's long-term P-256 identity (§4.4.1).
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    pub fn generate() -> Self {
        Identity { signing_key: SigningKey::random(&mut OsRng) }
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Identity { signing_key }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    pub fn identity_hash(&self) -> [u8; 32] {
        identity_hash_of(&self.verifying_key())
    }

    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }
}

pub fn identity_hash_of(vk: &VerifyingKey) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(vk.to_encoded_point(true).as_bytes());
    let out = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&out);
    hash
}

fn compressed(vk: &VerifyingKey) -> [u8; EPH_LEN] {
    let mut bytes = [0u8; EPH_LEN];
    bytes.copy_from_slice(vk.to_encoded_point(true).as_bytes());
    bytes
}

fn ip_bytes(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Constant-time byte comparison, used for authenticator checks (§4.4.1).
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn ecdh_shared_secret(local: &EphemeralSecret, remote: &[u8; EPH_LEN]) -> Result<[u8; 32], HandshakeError> {
    let remote_pub = PublicKey::from_sec1_bytes(remote).map_err(|e| HandshakeError::Crypto(e.to_string()))?;
    let shared = local.diffie_hellman(&remote_pub);
    let mut hasher = Sha256::new();
    hasher.update(shared.raw_secret_bytes());
    let out = hasher.finalize();
    let mut z = [0u8; 32];
    z.copy_from_slice(&out);
    Ok(z)
}

fn authenticator(
    transient_key: &[u8; 32],
    ephemeral_r: &[u8; EPH_LEN],
    ephemeral_i: &[u8; EPH_LEN],
    nr: &[u8; 32],
    ni: &[u8; 32],
    peer_ip: IpAddr,
) -> [u8; 32] {
    let ip = ip_bytes(peer_ip);
    hmac_sha256(transient_key, &[ephemeral_r, ephemeral_i, nr, ni, &ip])
}

/// Splits a session key into independent encryption and MAC sub-keys.
fn split_direction_key(session_key: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    (hmac_sha256(session_key, &[b"enc"]), hmac_sha256(session_key, &[b"mac"]))
}

fn finalize_session(z: &[u8; 32], ni: &[u8; 32], nr: &[u8; 32], initiator: bool) -> Session {
    let out = hmac_sha256(z, &[b"O", ni, nr]);
    let inn = hmac_sha256(z, &[b"I", ni, nr]);
    let (out_enc, out_mac) = split_direction_key(&out);
    let (in_enc, in_mac) = split_direction_key(&inn);
    if initiator {
        Session::new(out_enc, out_mac, in_enc, in_mac)
    } else {
        Session::new(in_enc, in_mac, out_enc, out_mac)
    }
}

struct M1 {
    ni: [u8; 32],
    ni_hash: [u8; 32],
    ephemeral_i: [u8; EPH_LEN],
    initiator_identity_hash: Option<[u8; 32]>,
}

impl M1 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 32 + EPH_LEN + 1 + 32);
        out.extend_from_slice(&self.ni);
        out.extend_from_slice(&self.ni_hash);
        out.extend_from_slice(&self.ephemeral_i);
        match self.initiator_identity_hash {
            Some(hash) => {
                out.push(1);
                out.extend_from_slice(&hash);
            }
            None => out.push(0),
        }
        out
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, HandshakeError> {
        if bytes.len() < 32 + 32 + EPH_LEN + 1 {
            return Err(HandshakeError::UnexpectedPhase);
        }
        let mut ni = [0u8; 32];
        ni.copy_from_slice(&bytes[0..32]);
        let mut ni_hash = [0u8; 32];
        ni_hash.copy_from_slice(&bytes[32..64]);
        let mut ephemeral_i = [0u8; EPH_LEN];
        ephemeral_i.copy_from_slice(&bytes[64..64 + EPH_LEN]);
        let flag_offset = 64 + EPH_LEN;
        let initiator_identity_hash = if bytes[flag_offset] == 1 {
            if bytes.len() < flag_offset + 1 + 32 {
                return Err(HandshakeError::UnexpectedPhase);
            }
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes[flag_offset + 1..flag_offset + 33]);
            Some(hash)
        } else {
            None
        };
        Ok(M1 { ni, ni_hash, ephemeral_i, initiator_identity_hash })
    }
}

struct M2 {
    ni_hash: [u8; 32],
    nr: [u8; 32],
    ephemeral_r: [u8; EPH_LEN],
    signature: [u8; SIG_LEN],
    authenticator: [u8; 32],
}

impl M2 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 32 + EPH_LEN + SIG_LEN + 32);
        out.extend_from_slice(&self.ni_hash);
        out.extend_from_slice(&self.nr);
        out.extend_from_slice(&self.ephemeral_r);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.authenticator);
        out
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, HandshakeError> {
        const LEN: usize = 32 + 32 + EPH_LEN + SIG_LEN + 32;
        if bytes.len() != LEN {
            return Err(HandshakeError::UnexpectedPhase);
        }
        let mut ni_hash = [0u8; 32];
        ni_hash.copy_from_slice(&bytes[0..32]);
        let mut nr = [0u8; 32];
        nr.copy_from_slice(&bytes[32..64]);
        let mut ephemeral_r = [0u8; EPH_LEN];
        ephemeral_r.copy_from_slice(&bytes[64..64 + EPH_LEN]);
        let mut signature = [0u8; SIG_LEN];
        signature.copy_from_slice(&bytes[64 + EPH_LEN..64 + EPH_LEN + SIG_LEN]);
        let mut authenticator = [0u8; 32];
        authenticator.copy_from_slice(&bytes[64 + EPH_LEN + SIG_LEN..]);
        Ok(M2 { ni_hash, nr, ephemeral_r, signature, authenticator })
    }
}

struct ActThreeOrFour {
    ni: [u8; 32],
    nr: [u8; 32],
    ephemeral: [u8; EPH_LEN],
    authenticator: [u8; 32],
    encrypted_payload: Vec<u8>,
}

impl ActThreeOrFour {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 32 + EPH_LEN + 32 + 2 + self.encrypted_payload.len());
        out.extend_from_slice(&self.ni);
        out.extend_from_slice(&self.nr);
        out.extend_from_slice(&self.ephemeral);
        out.extend_from_slice(&self.authenticator);
        out.extend_from_slice(&(self.encrypted_payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.encrypted_payload);
        out
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, HandshakeError> {
        const HEAD: usize = 32 + 32 + EPH_LEN + 32 + 2;
        if bytes.len() < HEAD {
            return Err(HandshakeError::UnexpectedPhase);
        }
        let mut ni = [0u8; 32];
        ni.copy_from_slice(&bytes[0..32]);
        let mut nr = [0u8; 32];
        nr.copy_from_slice(&bytes[32..64]);
        let mut ephemeral = [0u8; EPH_LEN];
        ephemeral.copy_from_slice(&bytes[64..64 + EPH_LEN]);
        let mut authenticator = [0u8; 32];
        authenticator.copy_from_slice(&bytes[64 + EPH_LEN..96 + EPH_LEN]);
        let payload_len = u16::from_be_bytes(bytes[96 + EPH_LEN..98 + EPH_LEN].try_into().unwrap()) as usize;
        if bytes.len() != HEAD + payload_len {
            return Err(HandshakeError::UnexpectedPhase);
        }
        let encrypted_payload = bytes[HEAD..].to_vec();
        Ok(ActThreeOrFour { ni, nr, ephemeral, authenticator, encrypted_payload })
    }
}

fn encrypt_payload(z: &[u8; 32], ni: &[u8; 32], nr: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    use aes::cipher::{KeyIvInit, StreamCipher};
    let key = hmac_sha256(z, &[b"HS", ni, nr]);
    let mut cipher = ctr::Ctr128BE::<aes::Aes256>::new(&key.into(), &[0u8; 16].into());
    let mut out = plaintext.to_vec();
    cipher.apply_keystream(&mut out);
    out
}

fn decrypt_payload(z: &[u8; 32], ni: &[u8; 32], nr: &[u8; 32], ciphertext: &[u8]) -> Vec<u8> {
    encrypt_payload(z, ni, nr, ciphertext)
}

/// Initiator side of the handshake, held between M1 and M4.
pub struct Initiator {
    responder_identity: VerifyingKey,
    peer_ip: IpAddr,
    ni: [u8; 32],
    ephemeral_secret: EphemeralSecret,
    ephemeral_i: [u8; EPH_LEN],
    nr: [u8; 32],
    ephemeral_r: [u8; EPH_LEN],
    z: [u8; 32],
}

impl Initiator {
    pub fn start(responder_identity: VerifyingKey, peer_ip: IpAddr, announce: Option<[u8; 32]>) -> (IncompleteInitiator, Vec<u8>) {
        let mut ni = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut ni);
        let ephemeral_secret = EphemeralSecret::random(&mut OsRng);
        let mut ephemeral_i = [0u8; EPH_LEN];
        ephemeral_i.copy_from_slice(EphemeralSecret::public_key(&ephemeral_secret).to_encoded_point(true).as_bytes());

        let ni_hash = {
            let mut hasher = Sha256::new();
            hasher.update(ni);
            let out = hasher.finalize();
            let mut h = [0u8; 32];
            h.copy_from_slice(&out);
            h
        };

        let m1 = M1 { ni, ni_hash, ephemeral_i, initiator_identity_hash: announce };
        let bytes = m1.to_bytes();
        (IncompleteInitiator { responder_identity, peer_ip, ni, ephemeral_secret, ephemeral_i }, bytes)
    }
}

pub struct IncompleteInitiator {
    responder_identity: VerifyingKey,
    peer_ip: IpAddr,
    ni: [u8; 32],
    ephemeral_secret: EphemeralSecret,
    ephemeral_i: [u8; EPH_LEN],
}

impl IncompleteInitiator {
    pub fn on_m2(self, transient_key: &[u8; 32], m2_bytes: &[u8], node_ref_payload: &[u8]) -> Result<(Initiator, Vec<u8>), HandshakeError> {
        let m2 = M2::from_bytes(m2_bytes)?;

        let expected_ni_hash = {
            let mut hasher = Sha256::new();
            hasher.update(self.ni);
            let out = hasher.finalize();
            let mut h = [0u8; 32];
            h.copy_from_slice(&out);
            h
        };
        if !ct_eq(&m2.ni_hash, &expected_ni_hash) {
            return Err(HandshakeError::NonceHashMismatch);
        }

        let signature = Signature::try_from(m2.signature.as_slice()).map_err(|e| HandshakeError::Crypto(e.to_string()))?;
        self.responder_identity
            .verify(&m2.ephemeral_r, &signature)
            .map_err(|_| HandshakeError::SignatureMismatch)?;

        let expected_auth = authenticator(transient_key, &m2.ephemeral_r, &self.ephemeral_i, &m2.nr, &self.ni, self.peer_ip);
        if !ct_eq(&expected_auth, &m2.authenticator) {
            return Err(HandshakeError::AuthenticatorMismatch);
        }

        let z = ecdh_shared_secret(&self.ephemeral_secret, &m2.ephemeral_r)?;
        let encrypted_payload = encrypt_payload(&z, &self.ni, &m2.nr, node_ref_payload);
        let auth3 = authenticator(transient_key, &m2.ephemeral_r, &self.ephemeral_i, &m2.nr, &self.ni, self.peer_ip);

        let m3 = ActThreeOrFour { ni: self.ni, nr: m2.nr, ephemeral: self.ephemeral_i, authenticator: auth3, encrypted_payload };

        Ok((
            Initiator {
                responder_identity: self.responder_identity,
                peer_ip: self.peer_ip,
                ni: self.ni,
                ephemeral_secret: self.ephemeral_secret,
                ephemeral_i: self.ephemeral_i,
                nr: m2.nr,
                ephemeral_r: m2.ephemeral_r,
                z,
            },
            m3.to_bytes(),
        ))
    }
}

impl Initiator {
    pub fn on_m4(self, m4_bytes: &[u8]) -> Result<(Session, Vec<u8>), HandshakeError> {
        let m4 = ActThreeOrFour::from_bytes(m4_bytes)?;
        if !ct_eq(&m4.ni, &self.ni) || !ct_eq(&m4.nr, &self.nr) || !ct_eq(&m4.ephemeral, &self.ephemeral_r) {
            return Err(HandshakeError::UnexpectedPhase);
        }
        let payload = decrypt_payload(&self.z, &self.ni, &self.nr, &m4.encrypted_payload);
        let session = finalize_session(&self.z, &self.ni, &self.nr, true);
        Ok((session, payload))
    }
}

/// Responder side of the handshake, held between M1 and M4.
pub struct Responder {
    local: Identity,
    peer_ip: IpAddr,
    ni: [u8; 32],
    nr: [u8; 32],
    ephemeral_secret: EphemeralSecret,
    ephemeral_r: [u8; EPH_LEN],
    ephemeral_i: [u8; EPH_LEN],
    #[allow(dead_code)]
    initiator_identity_hash: Option<[u8; 32]>,
}

impl Responder {
    pub fn on_m1(local: Identity, transient_key: &[u8; 32], peer_ip: IpAddr, m1_bytes: &[u8]) -> Result<(Self, Vec<u8>), HandshakeError> {
        let m1 = M1::from_bytes(m1_bytes)?;

        let expected_hash = {
            let mut hasher = Sha256::new();
            hasher.update(m1.ni);
            let out = hasher.finalize();
            let mut h = [0u8; 32];
            h.copy_from_slice(&out);
            h
        };
        if !ct_eq(&m1.ni_hash, &expected_hash) {
            return Err(HandshakeError::NonceHashMismatch);
        }

        let mut nr = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nr);
        let ephemeral_secret = EphemeralSecret::random(&mut OsRng);
        let mut ephemeral_r = [0u8; EPH_LEN];
        ephemeral_r.copy_from_slice(EphemeralSecret::public_key(&ephemeral_secret).to_encoded_point(true).as_bytes());

        let signature: Signature = local.signing_key.sign(&ephemeral_r);
        let mut sig_bytes = [0u8; SIG_LEN];
        sig_bytes.copy_from_slice(&signature.to_bytes());

        let auth = authenticator(transient_key, &ephemeral_r, &m1.ephemeral_i, &nr, &m1.ni, peer_ip);

        let m2 = M2 { ni_hash: m1.ni_hash, nr, ephemeral_r, signature: sig_bytes, authenticator: auth };

        Ok((
            Responder {
                local,
                peer_ip,
                ni: m1.ni,
                nr,
                ephemeral_secret,
                ephemeral_r,
                ephemeral_i: m1.ephemeral_i,
                initiator_identity_hash: m1.initiator_identity_hash,
            },
            m2.to_bytes(),
        ))
    }

    pub fn on_m3(self, transient_key: &[u8; 32], m3_bytes: &[u8], reply_payload: &[u8]) -> Result<(Session, Vec<u8>, Vec<u8>), HandshakeError> {
        let m3 = ActThreeOrFour::from_bytes(m3_bytes)?;
        if !ct_eq(&m3.ni, &self.ni) || !ct_eq(&m3.nr, &self.nr) || !ct_eq(&m3.ephemeral, &self.ephemeral_i) {
            return Err(HandshakeError::UnexpectedPhase);
        }

        let expected_auth = authenticator(transient_key, &self.ephemeral_r, &self.ephemeral_i, &self.nr, &self.ni, self.peer_ip);
        if !ct_eq(&expected_auth, &m3.authenticator) {
            return Err(HandshakeError::AuthenticatorMismatch);
        }

        let z = ecdh_shared_secret(&self.ephemeral_secret, &m3.ephemeral)?;
        let decrypted = decrypt_payload(&z, &self.ni, &self.nr, &m3.encrypted_payload);

        let encrypted_payload = encrypt_payload(&z, &self.ni, &self.nr, reply_payload);
        let auth4 = authenticator(transient_key, &self.ephemeral_r, &self.ephemeral_i, &self.nr, &self.ni, self.peer_ip);
        let m4 = ActThreeOrFour { ni: self.ni, nr: self.nr, ephemeral: self.ephemeral_r, authenticator: auth4, encrypted_payload };

        let session = finalize_session(&z, &self.ni, &self.nr, false);
        Ok((session, m4.to_bytes(), decrypted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn full_handshake_establishes_matching_sessions_and_payloads() {
        let transient_key = [9u8; 32];
        let peer_ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

        let responder_identity = Identity::generate();

        let (incomplete_initiator, m1) = Initiator::start(responder_identity.verifying_key(), peer_ip, None);
        let (responder, m2) = Responder::on_m1(responder_identity, &transient_key, peer_ip, &m1).unwrap();
        let (initiator, m3) = incomplete_initiator.on_m2(&transient_key, &m2, b"initiator node ref").unwrap();
        let (mut responder_session, m4, initiator_payload) = responder.on_m3(&transient_key, &m3, b"responder node ref").unwrap();
        let (mut initiator_session, responder_payload) = initiator.on_m4(&m4).unwrap();

        assert_eq!(initiator_payload, b"initiator node ref");
        assert_eq!(responder_payload, b"responder node ref");

        let packet = initiator_session.encrypt(b"hello").unwrap();
        assert_eq!(responder_session.decrypt(&packet).unwrap(), b"hello");
    }

    #[test]
    fn tampered_m2_signature_is_rejected() {
        let transient_key = [9u8; 32];
        let peer_ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let responder_identity = Identity::generate();
        let (incomplete_initiator, m1) = Initiator::start(responder_identity.verifying_key(), peer_ip, None);
        let (responder, mut m2) = Responder::on_m1(responder_identity, &transient_key, peer_ip, &m1).unwrap();
        let _ = &responder;
        let last = m2.len() - 1;
        m2[last] ^= 0xFF;
        assert!(incomplete_initiator.on_m2(&transient_key, &m2, b"").is_err());
    }
}
