//! Session state.
//!
//! A [`Session`] is owned by exactly one relay. The registry only ever sees a
//! [`SessionSnapshot`], published by the relay through a shared cell whenever
//! the fields it exposes change.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::extraction::ExtractedListState;

/// Lifecycle of one relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Created,
    Handshaking,
    Active,
    Draining,
    Closed,
}

impl RelayState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: RelayState) -> bool {
        use RelayState::*;
        matches!(
            (self, next),
            (Created, Handshaking)
                | (Handshaking, Active)
                | (Handshaking, Closed)
                | (Active, Draining)
                | (Draining, Closed)
        )
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Created => "created",
            RelayState::Handshaking => "handshaking",
            RelayState::Active => "active",
            RelayState::Draining => "draining",
            RelayState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Read-only view of a session exposed to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user_id: String,
    pub is_connected: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

/// Shared cell holding the latest published snapshot.
pub type SharedSnapshot = Arc<RwLock<SessionSnapshot>>;

/// Create a fresh snapshot cell for a newly accepted connection.
pub fn new_snapshot_cell(user_id: &str) -> SharedSnapshot {
    let now = OffsetDateTime::now_utc();
    Arc::new(RwLock::new(SessionSnapshot {
        user_id: user_id.to_string(),
        is_connected: true,
        created_at: now,
        last_activity: now,
    }))
}

/// Mutable state of one client session.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: String,
    pub connected: bool,
    pub created_at: OffsetDateTime,
    pub last_activity: OffsetDateTime,
    /// Replaced wholesale on every update
    pub last_extracted_list: Option<ExtractedListState>,
    published: SharedSnapshot,
}

impl Session {
    /// Build a session seeded from its snapshot cell.
    pub fn new(published: SharedSnapshot) -> Self {
        let snapshot = published.read().clone();
        Self {
            identity: snapshot.user_id,
            connected: snapshot.is_connected,
            created_at: snapshot.created_at,
            last_activity: snapshot.last_activity,
            last_extracted_list: None,
            published,
        }
    }

    /// Record inbound client activity.
    pub fn touch(&mut self) {
        self.last_activity = OffsetDateTime::now_utc();
        self.publish();
    }

    /// Replace the current list.
    pub fn replace_list(&mut self, list: ExtractedListState) {
        self.last_extracted_list = Some(list);
    }

    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        self.publish();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.identity.clone(),
            is_connected: self.connected,
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }

    fn publish(&self) {
        *self.published.write() = self.snapshot();
    }
}
