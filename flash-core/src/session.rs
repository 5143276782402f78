//! Per-session build configuration.
//!
//! Each client session owns a [`SessionConfig`] holding the selected target
//! board and the destination path. Records are keyed by [`SessionId`] and
//! expire after a period of inactivity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Opaque session identifier carried by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Settings a session must establish before a build can succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub target: Option<String>,
    pub destination: Option<String>,
}

struct SessionEntry {
    config: SessionConfig,
    last_seen: Instant,
}

/// In-memory session store with idle expiry.
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Store the target board. Any string is accepted.
    ///
    /// Returns a confirmation for the client.
    pub async fn set_target(&self, id: SessionId, target: &str) -> String {
        self.update(id, |config| config.target = Some(target.to_string()))
            .await;
        format!("Board selected: {}", target)
    }

    /// Store the destination path verbatim; existence is checked at deploy time.
    ///
    /// Returns a confirmation for the client.
    pub async fn set_destination(&self, id: SessionId, path: &str) -> String {
        self.update(id, |config| config.destination = Some(path.to_string()))
            .await;
        format!("Destination set: {}", path)
    }

    pub async fn target(&self, id: SessionId) -> Option<String> {
        self.config(id).await.target
    }

    pub async fn destination(&self, id: SessionId) -> Option<String> {
        self.config(id).await.destination
    }

    /// Snapshot of the session's configuration; empty for unknown or expired sessions.
    pub async fn config(&self, id: SessionId) -> SessionConfig {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(entry) if now.duration_since(entry.last_seen) <= self.ttl => {
                entry.last_seen = now;
                entry.config.clone()
            }
            Some(_) => {
                debug!("Session {} expired", id);
                sessions.remove(&id);
                SessionConfig::default()
            }
            None => SessionConfig::default(),
        }
    }

    /// Whether the session has a live record.
    pub async fn contains(&self, id: SessionId) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .is_some_and(|entry| entry.last_seen.elapsed() <= self.ttl)
    }

    /// Drop every session idle for longer than the TTL. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= self.ttl);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn update(&self, id: SessionId, apply: impl FnOnce(&mut SessionConfig)) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(id).or_insert_with(|| SessionEntry {
            config: SessionConfig::default(),
            last_seen: now,
        });
        if now.duration_since(entry.last_seen) > self.ttl {
            entry.config = SessionConfig::default();
        }
        entry.last_seen = now;
        apply(&mut entry.config);
    }
}
