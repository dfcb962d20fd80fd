//! Session lifecycle types for chatrelay.
//!
//! A connection moves through exactly two logical states: unjoined, then
//! joined once the first successful JOIN binds a username. There is no
//! transition back; disconnecting destroys the session.

use crate::registry::ConnectionId;
use crate::router::RouterError;
use thiserror::Error;

/// Per-connection session state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    username: Option<String>,
}

impl Session {
    /// Create a fresh, unjoined session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the bound username, if the connection has joined.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Check whether a username has been bound.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.username.is_some()
    }

    /// Bind the username. The first binding wins; later calls are no-ops.
    ///
    /// Returns `true` if this call performed the binding.
    pub(crate) fn bind(&mut self, username: &str) -> bool {
        if self.username.is_some() {
            return false;
        }
        self.username = Some(username.to_string());
        true
    }
}

/// Errors returned by [`Relay::join`](crate::Relay::join).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Username is empty after trimming.
    #[error("Username cannot be empty")]
    EmptyUsername,

    /// The connection is not registered.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection already joined under a different name.
    #[error("Connection already joined as '{0}'")]
    AlreadyJoined(String),

    /// Subscription failed at the channel router.
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Acknowledgment of a successful JOIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAck {
    /// The bound username (trimmed).
    pub username: String,
    /// The channel that was joined, after default-channel resolution.
    pub channel: String,
    /// `true` when this was an idempotent re-JOIN with the bound name.
    pub rejoined: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_starts_unjoined() {
        let session = Session::new();
        assert!(!session.is_joined());
        assert!(session.username().is_none());
    }

    #[test]
    fn test_bind_is_first_wins() {
        let mut session = Session::new();

        assert!(session.bind("alice"));
        assert!(session.is_joined());
        assert_eq!(session.username(), Some("alice"));

        assert!(!session.bind("bob"));
        assert_eq!(session.username(), Some("alice"));
    }
}
