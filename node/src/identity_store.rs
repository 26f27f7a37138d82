use std::fs;
use std::path::Path;

use link::Identity;
use p256::ecdsa::SigningKey;

/// Loads the node's long-term identity from `<store>/identity.key`, or
/// generates and persists a fresh one on first start. Losing this file
/// changes the node's identity hash and every peer's reference to it.
pub fn load_or_create(dir: impl AsRef<Path>) -> std::io::Result<Identity> {
    let path = dir.as_ref().join("identity.key");
    match fs::read(&path) {
        Ok(bytes) if bytes.len() == 32 => {
            let signing_key = SigningKey::from_bytes(bytes.as_slice().into()).map_err(std::io::Error::other)?;
            Ok(Identity::from_signing_key(signing_key))
        }
        _ => {
            let identity = Identity::generate();
            persist(&path, &identity)?;
            Ok(identity)
        }
    }
}

fn persist(path: impl AsRef<Path>, identity: &Identity) -> std::io::Result<()> {
    fs::write(path, identity.signing_key_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_directory_gets_a_persisted_identity_that_reloads_to_the_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create(dir.path()).unwrap();
        let second = load_or_create(dir.path()).unwrap();
        assert_eq!(first.identity_hash(), second.identity_hash());
    }
}
