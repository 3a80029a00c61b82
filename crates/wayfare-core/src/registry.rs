//! In-memory session registry
//!
//! Owns the live session map and the active-session pointer. Every mutation is
//! flushed to the backing [`SessionStore`] before the call returns.

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::state::{Message, Role, Session, SessionMap};
use crate::store::{KeyValueStore, SessionStore};

const ID_PREFIX: &str = "session_";
const ID_SUFFIX_LEN: usize = 6;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// `session_` + base-36 milliseconds + six random base-36 characters
fn generate_session_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}{}", ID_PREFIX, to_base36(millis), suffix)
}

/// Sessions of `sessions`, most recently active first
pub fn order_sessions(sessions: &SessionMap) -> Vec<(&str, &Session)> {
    let mut entries: Vec<(&str, &Session)> = sessions
        .iter()
        .map(|(id, session)| (id.as_str(), session))
        .collect();
    // Stable sort keeps map order for ties
    entries.sort_by(|a, b| b.1.last_activity().cmp(&a.1.last_activity()));
    entries
}

pub struct SessionRegistry<S> {
    store: SessionStore<S>,
    sessions: SessionMap,
    active: Option<String>,
}

impl<S: KeyValueStore> SessionRegistry<S> {
    /// Load persisted sessions and pick an active one.
    ///
    /// An empty store gets a fresh session; otherwise the most recently
    /// active session is resumed.
    pub fn open(mut store: SessionStore<S>) -> Self {
        let sessions = store.recover_sessions();
        let mut registry = Self {
            store,
            sessions,
            active: None,
        };

        let most_recent = registry
            .ordered_sessions()
            .first()
            .map(|(id, _)| id.to_string());

        match most_recent {
            Some(id) => {
                info!(sessions = registry.sessions.len(), active = %id, "resumed sessions");
                registry.active = Some(id);
            }
            None => {
                registry.create_session();
            }
        }
        registry
    }

    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore<S> {
        &mut self.store
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.as_ref().and_then(|id| self.sessions.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Insert an empty session, make it active, and persist
    pub fn create_session(&mut self) -> String {
        let mut id = generate_session_id();
        while self.sessions.contains_key(&id) {
            id = generate_session_id();
        }

        self.sessions.insert(id.clone(), Session::default());
        self.active = Some(id.clone());
        self.persist();
        debug!(session = %id, "created session");
        id
    }

    /// Make `id` active. Unknown ids are ignored.
    pub fn select_session(&mut self, id: &str) -> bool {
        if !self.sessions.contains_key(id) {
            debug!(session = %id, "ignoring select of unknown session");
            return false;
        }
        self.active = Some(id.to_string());
        true
    }

    /// Append a message stamped now to the active session
    pub fn append_message(&mut self, role: Role, content: impl Into<String>) -> Option<Message> {
        let id = self.active.clone()?;
        self.append_to(&id, role, content)
    }

    /// Append a message stamped now to session `id`, active or not
    pub fn append_to(&mut self, id: &str, role: Role, content: impl Into<String>) -> Option<Message> {
        let Some(session) = self.sessions.get_mut(id) else {
            warn!(session = %id, "dropping message for unknown session");
            return None;
        };
        let message = Message::new(role, content);
        session.messages.push(message.clone());
        self.persist();
        Some(message)
    }

    /// Remove a session. Deleting the active one activates a fresh session.
    pub fn delete_session(&mut self, id: &str) -> bool {
        if self.sessions.remove(id).is_none() {
            debug!(session = %id, "ignoring delete of unknown session");
            return false;
        }

        if self.active.as_deref() == Some(id) {
            self.active = None;
            self.create_session();
        } else {
            self.persist();
        }
        debug!(session = %id, "deleted session");
        true
    }

    /// Drop every session, then start over with one empty active session
    pub fn clear_all(&mut self) -> String {
        self.sessions.clear();
        self.active = None;
        self.persist();
        info!("cleared all sessions");
        self.create_session()
    }

    /// All sessions, most recently active first
    pub fn ordered_sessions(&self) -> Vec<(&str, &Session)> {
        order_sessions(&self.sessions)
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save_sessions(&self.sessions) {
            warn!(error = %e, "failed to persist sessions");
        }
    }
}
