//! Server lifecycle state.
//!
//! # State Transitions
//!
//! ```text
//!          start()                    (bootstrap dialed,
//!          bind ok                     receive loop spawned)
//! Idle ──────────────→ Listening ──────────────→ Running
//!                                                   │
//!                                            stop() │
//!                                                   ↓
//!                                                Stopped   (terminal)
//! ```
//!
//! `Stopped` is terminal: a second `stop()` fails with `AlreadyStopped`
//! and `start()` cannot revive a stopped server.

/// State of the replication server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, nothing bound.
    Idle,
    /// Listening socket bound; bootstrap dials in flight.
    Listening,
    /// Receive loop consuming envelopes.
    Running,
    /// Shut down. Terminal.
    Stopped,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerState::Idle => write!(f, "Idle"),
            ServerState::Listening => write!(f, "Listening"),
            ServerState::Running => write!(f, "Running"),
            ServerState::Stopped => write!(f, "Stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        assert_eq!(ServerState::Idle.to_string(), "Idle");
        assert_eq!(ServerState::Listening.to_string(), "Listening");
        assert_eq!(ServerState::Running.to_string(), "Running");
        assert_eq!(ServerState::Stopped.to_string(), "Stopped");
    }

    #[test]
    fn test_equality() {
        assert_eq!(ServerState::Idle, ServerState::Idle);
        assert_ne!(ServerState::Running, ServerState::Stopped);
    }
}
