//! Session store
//!
//! The control plane deposits key material and codec identity here; the
//! audio core looks its session up by id when the stream spawns. Injected
//! as a capability rather than living in process-wide state so embedders
//! can scope it however they deploy.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::session::AudioSession;

/// Concurrent map of session id to session record
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<AudioSession>>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session by id.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<AudioSession>> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    /// Look up a session, creating a default record if the id is new.
    #[must_use]
    pub fn get_or_default(&self, session_id: &str) -> Arc<AudioSession> {
        if let Some(session) = self.get(session_id) {
            return session;
        }
        self.sessions
            .write()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Insert or replace the session for `session_id`.
    pub fn upsert(&self, session_id: &str, session: AudioSession) -> Arc<AudioSession> {
        let session = Arc::new(session);
        self.sessions
            .write()
            .unwrap()
            .insert(session_id.to_string(), session.clone());
        session
    }

    /// Remove a session, returning it if present.
    pub fn remove(&self, session_id: &str) -> Option<Arc<AudioSession>> {
        self.sessions.write().unwrap().remove(session_id)
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Is the store empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
