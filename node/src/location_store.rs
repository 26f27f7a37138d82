use std::fs;
use std::path::Path;

use keys::Location;
use rand::Rng;

/// Loads the node's own swapped location from `<store>/location.dat`
/// next to `salt.dat`, or picks a fresh random one on first start and
/// persists it (§4.5, §6.3). Without this a restart would forget every
/// location swap the node ever made, defeating the point of swapping.
pub fn load_or_create(dir: impl AsRef<Path>) -> std::io::Result<Location> {
    let path = dir.as_ref().join("location.dat");
    match fs::read(&path) {
        Ok(bytes) if bytes.len() == 8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes);
            Ok(Location::from_raw(f64::from_be_bytes(buf)))
        }
        _ => {
            let location = Location::from_raw(rand::thread_rng().gen::<f64>());
            persist(&path, location)?;
            Ok(location)
        }
    }
}

pub fn persist(path: impl AsRef<Path>, location: Location) -> std::io::Result<()> {
    fs::write(path, location.value().to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_directory_gets_a_persisted_random_location() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create(dir.path()).unwrap();
        let second = load_or_create(dir.path()).unwrap();
        assert_eq!(first.value(), second.value());
    }
}
