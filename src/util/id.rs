//! ID utilities.

use ulid::Ulid;

/// Identifies one live websocket connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Ulid);

impl ConnectionId {
    pub fn new() -> Self { ConnectionId(Ulid::new()) }
}

impl Default for ConnectionId {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
