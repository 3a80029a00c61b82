//! Session manager: the one object a front end talks to
//!
//! Bundles the session registry with the API key state and the in-flight
//! completion flag. Front ends call [`SessionManager::submit`], run the
//! returned [`PendingTurn`] against a completion client however they like, and
//! hand the outcome back through [`SessionManager::complete`].

use thiserror::Error;
use tracing::{info, warn};

use crate::completion::{ChatTurn, CompletionError};
use crate::registry::SessionRegistry;
use crate::state::{Message, Role, Session};
use crate::store::{KeyValueStore, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    /// No key yet; sending is disabled until one is provided
    Awaiting,
    Ready(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("no API key has been provided")]
    MissingCredential,
    #[error("a reply is still pending")]
    Busy,
    #[error("no active session")]
    NoActiveSession,
}

/// Everything needed to run one completion outside the manager
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub session_id: String,
    pub credential: String,
    pub history: Vec<ChatTurn>,
    pub user_turn: String,
}

pub struct SessionManager<S> {
    registry: SessionRegistry<S>,
    credential: CredentialState,
    pending: bool,
}

impl<S: KeyValueStore> SessionManager<S> {
    /// Open the registry and resolve the API key: stored, then `fallback_key`
    pub fn open(store: SessionStore<S>, fallback_key: Option<String>) -> Self {
        let stored = store.load_credential();
        let credential = match stored.or(fallback_key) {
            Some(key) => CredentialState::Ready(key),
            None => CredentialState::Awaiting,
        };
        if credential == CredentialState::Awaiting {
            info!("no API key available, awaiting one");
        }

        Self {
            registry: SessionRegistry::open(store),
            credential,
            pending: false,
        }
    }

    pub fn registry(&self) -> &SessionRegistry<S> {
        &self.registry
    }

    pub fn credential(&self) -> &CredentialState {
        &self.credential
    }

    pub fn awaiting_credential(&self) -> bool {
        self.credential == CredentialState::Awaiting
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn input_enabled(&self) -> bool {
        !self.awaiting_credential() && !self.pending
    }

    pub fn active_id(&self) -> Option<&str> {
        self.registry.active_id()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.registry.active_session()
    }

    /// Store a key typed by the user. Blank input keeps waiting.
    pub fn provide_credential(&mut self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        if let Err(e) = self.registry.store_mut().save_credential(key) {
            warn!(error = %e, "failed to persist API key");
        }
        self.credential = CredentialState::Ready(key.to_string());
        info!("API key set");
        true
    }

    /// Forget the key and go back to waiting for one
    pub fn reset_credential(&mut self) {
        if let Err(e) = self.registry.store_mut().clear_credential() {
            warn!(error = %e, "failed to clear stored API key");
        }
        self.credential = CredentialState::Awaiting;
        info!("API key reset");
    }

    /// Record the user's turn and hand back the request to send
    pub fn submit(&mut self, text: &str) -> Result<PendingTurn, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyMessage);
        }
        let credential = match &self.credential {
            CredentialState::Ready(key) => key.clone(),
            CredentialState::Awaiting => return Err(SubmitError::MissingCredential),
        };
        if self.pending {
            return Err(SubmitError::Busy);
        }

        let (session_id, history) = match (self.registry.active_id(), self.registry.active_session()) {
            (Some(id), Some(session)) => (
                id.to_string(),
                session.messages.iter().map(ChatTurn::from).collect::<Vec<_>>(),
            ),
            _ => return Err(SubmitError::NoActiveSession),
        };

        self.registry.append_message(Role::User, text);
        self.pending = true;

        Ok(PendingTurn {
            session_id,
            credential,
            history,
            user_turn: text.to_string(),
        })
    }

    /// Append the reply, or a description of the failure, to the session the
    /// turn came from and reopen input. Ignored when nothing is pending.
    pub fn complete(
        &mut self,
        session_id: &str,
        outcome: Result<String, CompletionError>,
    ) -> Option<Message> {
        if !self.pending {
            warn!(session = %session_id, "ignoring completion with no request pending");
            return None;
        }
        let content = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "completion failed");
                e.user_message()
            }
        };
        self.pending = false;
        self.registry.append_to(session_id, Role::Assistant, content)
    }

    pub fn new_session(&mut self) -> Option<String> {
        if self.refuse_while_pending("new session") {
            return None;
        }
        Some(self.registry.create_session())
    }

    pub fn select_session(&mut self, id: &str) -> bool {
        !self.refuse_while_pending("select session") && self.registry.select_session(id)
    }

    pub fn delete_session(&mut self, id: &str) -> bool {
        !self.refuse_while_pending("delete session") && self.registry.delete_session(id)
    }

    pub fn clear_history(&mut self) -> Option<String> {
        if self.refuse_while_pending("clear history") {
            return None;
        }
        Some(self.registry.clear_all())
    }

    fn refuse_while_pending(&self, action: &str) -> bool {
        if self.pending {
            warn!(action, "ignored while a reply is pending");
        }
        self.pending
    }
}
