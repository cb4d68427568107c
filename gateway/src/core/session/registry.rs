//! Process-wide table of live sessions.
//!
//! At most one session exists per identity. Creating a session for an
//! identity that already has one terminates the old session first; the new
//! one replaces it rather than being rejected.
//!
//! Every entry carries a unique session id. A relay releases its entry by id
//! on teardown, so a replaced relay that finishes late never removes its
//! successor.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::gate::SendGate;
use super::state::{SessionSnapshot, SharedSnapshot, new_snapshot_cell};

/// No session is registered for the identity.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Session not found: {identity}")]
pub struct NotFound {
    pub identity: String,
}

struct SessionEntry {
    session_id: Uuid,
    snapshot: SharedSnapshot,
    cancel: CancellationToken,
    gate: SendGate,
}

impl SessionEntry {
    /// Close the client transport and cancel the relay.
    fn shut_down(&self) {
        self.gate.close();
        self.cancel.cancel();
    }
}

/// What a relay needs to know about its own registry entry.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    identity: String,
    snapshot: SharedSnapshot,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn snapshot_cell(&self) -> SharedSnapshot {
        self.snapshot.clone()
    }

    /// Cancelled when the session is terminated or replaced.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Registry of live sessions keyed by identity.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for `identity`, replacing any existing one.
    pub fn create(&self, identity: &str, gate: SendGate) -> SessionHandle {
        let handle = SessionHandle {
            session_id: Uuid::new_v4(),
            identity: identity.to_string(),
            snapshot: new_snapshot_cell(identity),
            cancel: CancellationToken::new(),
        };
        let entry = SessionEntry {
            session_id: handle.session_id,
            snapshot: handle.snapshot.clone(),
            cancel: handle.cancel.clone(),
            gate,
        };

        let previous = self.sessions.write().insert(identity.to_string(), entry);
        if let Some(previous) = previous {
            info!(
                user_id = %identity,
                replaced_session = %previous.session_id,
                "Replacing existing session"
            );
            previous.shut_down();
        }

        info!(user_id = %identity, session_id = %handle.session_id, "Session registered");
        handle
    }

    /// Remove the entry for `identity`. Removing an absent identity is a no-op.
    pub fn remove(&self, identity: &str) -> bool {
        self.sessions.write().remove(identity).is_some()
    }

    /// Remove the entry only if it still belongs to `handle`.
    pub fn release(&self, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(&handle.identity) {
            Some(entry) if entry.session_id == handle.session_id => {
                sessions.remove(&handle.identity);
                debug!(user_id = %handle.identity, "Session released");
                true
            }
            _ => false,
        }
    }

    /// Point-in-time copy of one session.
    pub fn get(&self, identity: &str) -> Option<SessionSnapshot> {
        self.sessions
            .read()
            .get(identity)
            .map(|entry| entry.snapshot.read().clone())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.read().contains_key(identity)
    }

    /// Point-in-time copy of every session, oldest first.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions
            .read()
            .values()
            .map(|entry| entry.snapshot.read().clone())
            .collect();
        snapshots.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        snapshots
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Close the session's client transport and remove its entry.
    ///
    /// The relay observes the cancellation and runs its normal teardown.
    pub fn terminate(&self, identity: &str) -> Result<(), NotFound> {
        let entry = self
            .sessions
            .write()
            .remove(identity)
            .ok_or_else(|| NotFound {
                identity: identity.to_string(),
            })?;

        entry.shut_down();
        info!(user_id = %identity, session_id = %entry.session_id, "Session terminated");
        Ok(())
    }
}
