//! Per-peer request memory for empty-line replay.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// What the server remembers about one peer.
#[derive(Debug, Clone)]
pub struct Session {
    /// Last command line executed for this peer.
    pub last_command: String,
    /// When the peer last sent anything.
    pub last_seen: Instant,
}

impl Session {
    fn is_active(&self, now: Instant, idle: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) < idle
    }
}

/// Sessions keyed by peer address.
///
/// Owned by the server loop; no locking.
#[derive(Debug)]
pub struct SessionTable {
    sessions: HashMap<SocketAddr, Session>,
    idle_timeout: Duration,
}

impl SessionTable {
    /// Table forgetting peers silent for longer than `idle_timeout`.
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            idle_timeout,
        }
    }

    /// Resolve the command line to execute for `line` from `peer`.
    ///
    /// An empty line repeats the peer's previous command; with nothing to repeat it
    /// stays empty. The resolved line becomes the peer's new last command.
    pub fn resolve(&mut self, peer: SocketAddr, line: String, now: Instant) -> String {
        let idle = self.idle_timeout;
        let previous = self
            .sessions
            .get(&peer)
            .filter(|s| s.is_active(now, idle))
            .map(|s| s.last_command.clone());

        let command = match (line.is_empty(), previous) {
            (true, Some(previous)) => previous,
            _ => line,
        };

        self.sessions.insert(
            peer,
            Session {
                last_command: command.clone(),
                last_seen: now,
            },
        );
        command
    }

    /// Drop sessions idle for longer than the timeout. Returns how many were dropped.
    pub fn expire(&mut self, now: Instant) -> usize {
        let idle = self.idle_timeout;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.is_active(now, idle));
        before - self.sessions.len()
    }

    /// Session of `peer`, if any.
    pub fn get(&self, peer: &SocketAddr) -> Option<&Session> {
        self.sessions.get(peer)
    }

    /// Number of tracked peers.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// `true` if no peer is tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
