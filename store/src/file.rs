use std::fs::{self, File, OpenOptions};
use std::marker::PhantomData;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use aes::cipher::{KeyIvInit, StreamCipher};
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::addressing::{candidate_slots, digest_key};
use crate::error::StoreError;
use crate::metadata::{SlotMetadata, RECORD_LEN};
use crate::payload::StoredPayload;
use crate::slot_filter::SlotFilter;
use crate::stats::Stats;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

const SALT_LEN: usize = 16;

fn entry_key(routing_key: &[u8; 32], salt: &[u8; 16]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(routing_key);
    hasher.update(salt);
    let out = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&out);
    key
}

fn apply_keystream(key: &[u8; 32], iv: &[u8; 16], data: &mut [u8]) {
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(data);
}

fn load_or_create_salt(dir: &Path) -> Result<[u8; 16], StoreError> {
    let path = dir.join("salt.dat");
    if path.exists() {
        let bytes = fs::read(&path)?;
        if bytes.len() != SALT_LEN {
            return Err(StoreError::BadSalt(bytes.len()));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes);
        Ok(salt)
    } else {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        fs::write(&path, salt)?;
        Ok(salt)
    }
}

fn open_sized(path: &Path, len: u64) -> Result<File, StoreError> {
    let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
    if file.metadata()?.len() != len {
        file.set_len(len)?;
    }
    Ok(file)
}

fn load_slot_filter(path: &Path, slot_count: usize) -> SlotFilter {
    if let Ok(bytes) = fs::read(path) {
        if bytes.len() == slot_count * 4 {
            let words = bytes.chunks_exact(4).map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]])).collect();
            return SlotFilter::from_words(words);
        }
    }
    tracing::debug!(path = %path.display(), "slot filter missing or mismatched, rebuilding lazily");
    SlotFilter::new(slot_count)
}

/// A persistent, salted, encrypted, LRU datastore (§4.3, §6.3). Two
/// parallel files hold fixed-length metadata and payload slots; a
/// lock-free slot filter short-circuits negative lookups.
pub struct FileStore<T: StoredPayload> {
    dir: PathBuf,
    salt: [u8; 16],
    slot_count: u64,
    max_keys: AtomicU64,
    metadata_file: RwLock<File>,
    data_file: RwLock<File>,
    slot_filter: SlotFilter,
    access_order: Mutex<Vec<u64>>,
    stats: Stats,
    _marker: PhantomData<T>,
}

impl<T: StoredPayload> FileStore<T> {
    pub fn open(dir: impl AsRef<Path>, slot_count: u64) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let salt = load_or_create_salt(&dir)?;
        let metadata_file = open_sized(&dir.join("metadata.dat"), slot_count * RECORD_LEN as u64)?;
        let data_file = open_sized(&dir.join("data.dat"), slot_count * T::slot_len() as u64)?;
        let slot_filter = load_slot_filter(&dir.join("slotfilter.dat"), slot_count as usize);

        Ok(FileStore {
            dir,
            salt,
            slot_count,
            max_keys: AtomicU64::new(slot_count),
            metadata_file: RwLock::new(metadata_file),
            data_file: RwLock::new(data_file),
            slot_filter,
            access_order: Mutex::new(Vec::new()),
            stats: Stats::default(),
            _marker: PhantomData,
        })
    }

    /// Persists the slot filter on clean shutdown (§4.3).
    pub fn persist_slot_filter(&self) -> Result<(), StoreError> {
        let mut bytes = Vec::with_capacity(self.slot_filter.len() * 4);
        for word in self.slot_filter.snapshot() {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        fs::write(self.dir.join("slotfilter.dat"), bytes)?;
        Ok(())
    }

    fn read_metadata(&self, slot: u64) -> Result<SlotMetadata, StoreError> {
        let mut buf = [0u8; RECORD_LEN];
        self.metadata_file.read().read_exact_at(&mut buf, slot * RECORD_LEN as u64)?;
        Ok(SlotMetadata::from_bytes(&buf))
    }

    fn write_metadata(&self, slot: u64, meta: &SlotMetadata) -> Result<(), StoreError> {
        self.metadata_file.write().write_all_at(&meta.to_bytes(), slot * RECORD_LEN as u64)?;
        Ok(())
    }

    fn read_payload(&self, slot: u64) -> Result<Vec<u8>, StoreError> {
        let mut buf = vec![0u8; T::slot_len()];
        self.data_file.read().read_exact_at(&mut buf, slot * T::slot_len() as u64)?;
        Ok(buf)
    }

    fn write_payload(&self, slot: u64, bytes: &[u8]) -> Result<(), StoreError> {
        self.data_file.write().write_all_at(bytes, slot * T::slot_len() as u64)?;
        Ok(())
    }

    fn touch(&self, slot: u64) {
        let mut order = self.access_order.lock();
        if let Some(pos) = order.iter().position(|&s| s == slot) {
            order.remove(pos);
        }
        order.push(slot);
    }

    /// Looks up the block addressed by `routing_key`, decrypting and
    /// decoding it. A structurally corrupt slot is evicted and treated
    /// as a miss (§3 invariant (e), §7).
    pub fn fetch(&self, routing_key: &[u8; 32]) -> Result<Option<T>, StoreError> {
        let digested = digest_key(&self.salt, routing_key);
        let slots = candidate_slots(&digested, self.slot_count);

        for slot in slots {
            if self.slot_filter.definitely_mismatches(slot, &digested) {
                continue;
            }
            let meta = self.read_metadata(slot)?;
            if !meta.occupied {
                self.slot_filter.mark_empty(slot);
                continue;
            }
            if meta.digested_key != digested {
                continue;
            }

            let mut payload = self.read_payload(slot)?;
            let key = entry_key(routing_key, &self.salt);
            apply_keystream(&key, &meta.iv, &mut payload);

            match T::from_slot_bytes(&payload) {
                Some(value) => {
                    self.touch(slot);
                    self.stats.record_hit();
                    return Ok(Some(value));
                }
                None => {
                    tracing::warn!(slot, "datastore slot failed to decode, evicting");
                    self.write_metadata(slot, &SlotMetadata::empty())?;
                    self.slot_filter.mark_empty(slot);
                }
            }
        }

        self.stats.record_miss();
        Ok(None)
    }

    pub fn probably_in_store(&self, routing_key: &[u8; 32]) -> bool {
        let digested = digest_key(&self.salt, routing_key);
        let slots = candidate_slots(&digested, self.slot_count);
        slots.iter().any(|&slot| !self.slot_filter.definitely_mismatches(slot, &digested))
    }

    /// Inserts `value` under `routing_key` (§4.3). If the key already
    /// occupies one of its five candidate slots and the stored payload
    /// differs, `overwrite` must be `true` or the insert is rejected.
    pub fn put(&self, routing_key: &[u8; 32], value: &T, overwrite: bool) -> Result<(), StoreError> {
        let digested = digest_key(&self.salt, routing_key);
        let slots = candidate_slots(&digested, self.slot_count);
        let new_bytes = value.to_slot_bytes();

        let mut existing_slot = None;
        let mut first_unoccupied = None;
        for &slot in &slots {
            let meta = self.read_metadata(slot)?;
            if meta.occupied && meta.digested_key == digested {
                existing_slot = Some((slot, meta));
                break;
            }
            if !meta.occupied && first_unoccupied.is_none() {
                first_unoccupied = Some(slot);
            }
        }

        if let Some((slot, mut meta)) = existing_slot {
            let mut existing_payload = self.read_payload(slot)?;
            let key = entry_key(routing_key, &self.salt);
            apply_keystream(&key, &meta.iv, &mut existing_payload);

            if existing_payload == new_bytes {
                if !meta.new_block {
                    meta.new_block = true;
                    self.write_metadata(slot, &meta)?;
                    self.slot_filter.mark_occupied(slot, &digested, meta.new_block, meta.wrong_store);
                }
                self.touch(slot);
                return Ok(());
            }

            if !overwrite {
                return Err(StoreError::Corrupt(slot));
            }
            self.write_entry(slot, routing_key, &digested, &new_bytes, meta.generation.wrapping_add(1))?;
            self.stats.record_write();
            return Ok(());
        }

        let slot = first_unoccupied.unwrap_or(slots[0]);
        self.write_entry(slot, routing_key, &digested, &new_bytes, 0)?;
        self.stats.record_write();
        Ok(())
    }

    fn write_entry(
        &self,
        slot: u64,
        routing_key: &[u8; 32],
        digested: &[u8; 32],
        plain_bytes: &[u8],
        generation: u32,
    ) -> Result<(), StoreError> {
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);

        let key = entry_key(routing_key, &self.salt);
        let mut encrypted = plain_bytes.to_vec();
        apply_keystream(&key, &iv, &mut encrypted);

        let meta = SlotMetadata {
            digested_key: *digested,
            iv,
            occupied: true,
            plain_routing_key: None,
            new_block: true,
            wrong_store: false,
            generation,
        };
        self.write_payload(slot, &encrypted)?;
        self.write_metadata(slot, &meta)?;
        self.slot_filter.mark_occupied(slot, digested, true, false);
        self.touch(slot);
        Ok(())
    }

    /// A resize request takes effect immediately for accounting; the
    /// physical files are only resized by a maintenance compaction
    /// pass (§4.3), which this implementation does not run
    /// automatically.
    pub fn set_max_keys(&self, max_keys: u64) {
        self.max_keys.store(max_keys, Ordering::Relaxed);
    }

    pub fn max_keys(&self) -> u64 {
        self.max_keys.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> Stats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct Dummy(Vec<u8>);

    impl StoredPayload for Dummy {
        const HEADER_LEN: usize = 0;
        const DATA_LEN: usize = 8;
        fn to_slot_bytes(&self) -> Vec<u8> {
            self.0.clone()
        }
        fn from_slot_bytes(bytes: &[u8]) -> Option<Self> {
            Some(Dummy(bytes.to_vec()))
        }
    }

    #[test]
    fn put_then_fetch_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::<Dummy>::open(dir.path(), 32).unwrap();
        let key = [9u8; 32];
        let value = Dummy(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        store.put(&key, &value, false).unwrap();
        assert_eq!(store.fetch(&key).unwrap(), Some(value));
    }

    #[test]
    fn fetch_of_absent_key_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::<Dummy>::open(dir.path(), 32).unwrap();
        assert_eq!(store.fetch(&[1u8; 32]).unwrap(), None);
        assert_eq!(store.stats().misses(), 1);
    }

    #[test]
    fn reopening_reads_back_the_same_salt_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let key = [3u8; 32];
        let value = Dummy(vec![9, 9, 9, 9, 9, 9, 9, 9]);
        {
            let store = FileStore::<Dummy>::open(dir.path(), 32).unwrap();
            store.put(&key, &value, false).unwrap();
            store.persist_slot_filter().unwrap();
        }
        let reopened = FileStore::<Dummy>::open(dir.path(), 32).unwrap();
        assert_eq!(reopened.fetch(&key).unwrap(), Some(value));
    }

    #[test]
    fn overwrite_false_rejects_a_changed_payload_under_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::<Dummy>::open(dir.path(), 32).unwrap();
        let key = [1u8; 32];
        store.put(&key, &Dummy(vec![1; 8]), false).unwrap();
        assert!(store.put(&key, &Dummy(vec![2; 8]), false).is_err());
        assert!(store.put(&key, &Dummy(vec![2; 8]), true).is_ok());
        assert_eq!(store.fetch(&key).unwrap(), Some(Dummy(vec![2; 8])));
    }
}
