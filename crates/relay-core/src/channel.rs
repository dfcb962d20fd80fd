//! Channel abstraction for chatrelay.
//!
//! A channel is a named broadcast group: publishing to it delivers to its
//! current subscribers only, in subscription order.

use crate::registry::ConnectionId;
use tracing::debug;

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 64;

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Channel name contains control characters");
    }
    Ok(())
}

/// A channel and its subscriber list.
///
/// Subscribers are kept in subscription order; `publish` iterates them in
/// that order. The list is expected to stay small (a chat room), so
/// membership checks are linear scans.
#[derive(Debug)]
pub struct Channel {
    name: String,
    subscribers: Vec<ConnectionId>,
}

impl Channel {
    /// Create a new, empty channel.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Vec::new(),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if a connection is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, id: ConnectionId) -> bool {
        self.subscribers.contains(&id)
    }

    /// Add a connection to the subscriber list.
    ///
    /// Idempotent; returns `true` if the connection was newly added.
    pub fn subscribe(&mut self, id: ConnectionId) -> bool {
        if self.subscribers.contains(&id) {
            return false;
        }
        self.subscribers.push(id);
        debug!(channel = %self.name, connection = %id, "Connection subscribed");
        true
    }

    /// Remove a connection from the subscriber list.
    ///
    /// Returns `true` if the connection was subscribed.
    pub fn unsubscribe(&mut self, id: ConnectionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| *s != id);
        let removed = self.subscribers.len() != before;
        if removed {
            debug!(channel = %self.name, connection = %id, "Connection unsubscribed");
        }
        removed
    }

    /// Snapshot the subscriber list in subscription order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConnectionId> {
        self.subscribers.clone()
    }

    /// Check if the channel has no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;

    fn two_ids() -> (ConnectionId, ConnectionId) {
        let registry = ConnectionRegistry::new();
        let (a, _) = registry.register();
        let (b, _) = registry.register();
        (a, b)
    }

    #[test]
    fn test_channel_creation() {
        let channel = Channel::new("public");
        assert_eq!(channel.name(), "public");
        assert_eq!(channel.subscriber_count(), 0);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let (a, b) = two_ids();
        let mut channel = Channel::new("public");

        assert!(channel.subscribe(a));
        assert_eq!(channel.subscriber_count(), 1);
        assert!(channel.is_subscribed(a));

        // Idempotent
        assert!(!channel.subscribe(a));
        assert_eq!(channel.subscriber_count(), 1);

        assert!(channel.subscribe(b));
        assert_eq!(channel.subscriber_count(), 2);

        assert!(channel.unsubscribe(a));
        assert!(!channel.is_subscribed(a));

        // Unsubscribing a non-member
        assert!(!channel.unsubscribe(a));
    }

    #[test]
    fn test_snapshot_preserves_subscription_order() {
        let (a, b) = two_ids();
        let mut channel = Channel::new("public");

        channel.subscribe(b);
        channel.subscribe(a);

        assert_eq!(channel.snapshot(), vec![b, a]);
    }

    #[test]
    fn test_channel_name_validation() {
        assert!(validate_channel_name("public").is_ok());
        assert!(validate_channel_name("room 7").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("bad\nname").is_err());

        let long_name = "a".repeat(MAX_CHANNEL_NAME_LENGTH + 1);
        assert!(validate_channel_name(&long_name).is_err());
    }
}
