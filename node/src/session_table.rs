use std::collections::HashMap;

use parking_lot::RwLock;

use link::Session;

use crate::peer_table::PeerId;

/// Multiple-reader/single-writer session table, the second rung of
/// §5's lock discipline (peer table → session table → request tracker
/// → datastore).
pub struct SessionTable {
    sessions: RwLock<HashMap<PeerId, Session>>,
}

impl SessionTable {
    pub fn new() -> Self {
        SessionTable { sessions: RwLock::new(HashMap::new()) }
    }

    pub fn insert(&self, id: PeerId, session: Session) {
        self.sessions.write().insert(id, session);
    }

    pub fn remove(&self, id: &PeerId) -> Option<Session> {
        self.sessions.write().remove(id)
    }

    pub fn has_session(&self, id: &PeerId) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Encrypts `plaintext` for `id`'s current session, advancing its
    /// send sequence number. Returns `None` if no session is
    /// established or it needs a rekey (§4.4.2).
    pub fn encrypt_for(&self, id: &PeerId, plaintext: &[u8]) -> Option<Vec<u8>> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(id)?;
        session.encrypt(plaintext).ok()
    }

    pub fn decrypt_from(&self, id: &PeerId, packet: &[u8]) -> Option<Vec<u8>> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(id)?;
        session.decrypt(packet).ok()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
