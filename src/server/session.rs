use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Represents one accepted connection for the connection's lifetime.
///
/// The handler task exclusively owns the socket and both halves of its
/// stream; the registry only records identity, for status queries and
/// shutdown accounting. Authentication is re-evaluated on every request
/// line and deliberately not recorded here.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier for the session.
    pub id: Uuid,
    /// Socket address of the peer, resolved once at session start.
    pub addr: SocketAddr,
    /// When the connection was accepted.
    pub connected_at: Instant,
}

impl Session {
    /// Creates a new `Session` for a connection accepted from `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Session {
            id: Uuid::new_v4(),
            addr,
            connected_at: Instant::now(),
        }
    }
}

/// Tracks the sessions currently served by handler tasks.
pub struct SessionManager {
    /// A concurrent map storing active sessions.
    sessions: Arc<DashMap<Uuid, Session>>,
}

// Manual Clone implementation
impl Clone for SessionManager {
    fn clone(&self) -> Self {
        SessionManager {
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl SessionManager {
    /// Creates a new `SessionManager` instance.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Registers a session at connection start.
    pub fn add(&self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    /// Removes a session when its connection ends.
    pub fn remove(&self, id: &Uuid) {
        self.sessions.remove(id);
    }

    /// The number of currently registered sessions.
    pub fn active(&self) -> usize {
        self.sessions.len()
    }

    /// Drops every registered session record, used on server stop.
    pub fn clear(&self) {
        let dropped = self.sessions.len();
        self.sessions.clear();
        if dropped > 0 {
            debug!("Dropped {} session records on shutdown", dropped);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
