//! Channel router for chatrelay.
//!
//! The router maps channel names to subscriber sets and fans published
//! messages out to each subscriber's outbound queue. Contention is scoped
//! per channel by the sharded map; operations on independent channels do
//! not block each other.

use crate::channel::{validate_channel_name, Channel};
use crate::registry::{ConnectionId, ConnectionRegistry};
use chatrelay_protocol::Envelope;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Invalid channel name.
    #[error("Invalid channel name: {0}")]
    InvalidChannel(&'static str),

    /// Maximum number of channels reached.
    #[error("Maximum number of channels reached")]
    MaxChannelsReached,

    /// Maximum subscriptions per connection reached.
    #[error("Maximum subscriptions reached")]
    MaxSubscriptionsReached,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum number of channels.
    pub max_channels: usize,
    /// Maximum subscriptions per connection.
    pub max_subscriptions_per_connection: usize,
    /// Whether to delete channels whose subscriber list becomes empty.
    pub auto_delete_empty_channels: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_channels: 1_000,
            max_subscriptions_per_connection: 32,
            auto_delete_empty_channels: true,
        }
    }
}

/// The channel router.
///
/// Channels are created lazily on first subscribe. With
/// `auto_delete_empty_channels` (the default) a channel is pruned as soon
/// as its last subscriber leaves, so the channel map never accumulates
/// empty entries.
pub struct ChannelRouter {
    /// Channels indexed by name.
    channels: DashMap<String, Channel>,
    /// Connection subscriptions (connection -> set of channel names).
    subscriptions: DashMap<ConnectionId, DashSet<String>>,
    /// Configuration.
    config: RouterConfig,
}

impl ChannelRouter {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            channels: DashMap::new(),
            subscriptions: DashMap::new(),
            config,
        }
    }

    /// Subscribe a connection to a channel, creating the channel if absent.
    ///
    /// Idempotent: subscribing twice is a no-op. Returns `true` if the
    /// subscription was newly added.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel name is invalid or a limit is hit.
    pub fn subscribe(&self, id: ConnectionId, channel_name: &str) -> Result<bool, RouterError> {
        validate_channel_name(channel_name).map_err(RouterError::InvalidChannel)?;

        let conn_subs = self.subscriptions.entry(id).or_default();

        if conn_subs.contains(channel_name) {
            return Ok(false);
        }

        if conn_subs.len() >= self.config.max_subscriptions_per_connection {
            return Err(RouterError::MaxSubscriptionsReached);
        }

        if !self.channels.contains_key(channel_name)
            && self.channels.len() >= self.config.max_channels
        {
            return Err(RouterError::MaxChannelsReached);
        }

        let mut entry = self
            .channels
            .entry(channel_name.to_string())
            .or_insert_with(|| {
                debug!(channel = %channel_name, "Creating channel");
                Channel::new(channel_name)
            });

        entry.subscribe(id);
        conn_subs.insert(channel_name.to_string());

        debug!(
            channel = %channel_name,
            connection = %id,
            subscribers = entry.subscriber_count(),
            "Subscribed"
        );

        Ok(true)
    }

    /// Unsubscribe a connection from a channel.
    ///
    /// Returns `true` if the connection was subscribed. Empty channels are
    /// pruned when `auto_delete_empty_channels` is set.
    pub fn unsubscribe(&self, id: ConnectionId, channel_name: &str) -> bool {
        let was_subscribed = match self.subscriptions.get(&id) {
            Some(conn_subs) => conn_subs.remove(channel_name).is_some(),
            None => false,
        };

        if !was_subscribed {
            return false;
        }

        self.remove_subscriber(id, channel_name);
        true
    }

    /// Unsubscribe a connection from all channels.
    ///
    /// Returns the channels the connection was subscribed to, in no
    /// particular order.
    pub fn unsubscribe_all(&self, id: ConnectionId) -> Vec<String> {
        let Some((_, channels)) = self.subscriptions.remove(&id) else {
            return Vec::new();
        };

        let names: Vec<String> = channels.into_iter().collect();
        for name in &names {
            self.remove_subscriber(id, name);
        }

        debug!(connection = %id, channels = names.len(), "Unsubscribed from all channels");
        names
    }

    fn remove_subscriber(&self, id: ConnectionId, channel_name: &str) {
        if let Some(mut entry) = self.channels.get_mut(channel_name) {
            entry.unsubscribe(id);

            if self.config.auto_delete_empty_channels && entry.is_empty() {
                drop(entry);
                self.channels.remove_if(channel_name, |_, c| c.is_empty());
                debug!(channel = %channel_name, "Deleted empty channel");
            }
        }
    }

    /// Publish a message to every subscriber of a channel.
    ///
    /// Delivery iterates a snapshot of the subscriber list taken at call
    /// time, in subscription order, pushing the same shared envelope into
    /// each subscriber's outbound queue. Subscribers whose inbox is gone
    /// are skipped. Returns the number of deliveries; 0 for an empty or
    /// nonexistent channel is a valid, non-error result.
    pub fn publish(
        &self,
        registry: &ConnectionRegistry,
        channel_name: &str,
        envelope: Arc<Envelope>,
    ) -> usize {
        let targets = match self.channels.get(channel_name) {
            Some(entry) => entry.snapshot(),
            None => {
                debug!(channel = %channel_name, "Publish to nonexistent channel");
                return 0;
            }
        };

        let mut delivered = 0;
        for id in targets {
            if registry.deliver(id, Arc::clone(&envelope)) {
                delivered += 1;
            }
        }

        trace!(channel = %channel_name, recipients = delivered, "Published message");
        delivered
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn channel_exists(&self, channel_name: &str) -> bool {
        self.channels.contains_key(channel_name)
    }

    /// Get the subscriber count for a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel_name: &str) -> usize {
        self.channels
            .get(channel_name)
            .map(|c| c.subscriber_count())
            .unwrap_or(0)
    }

    /// Get all channel names.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of active channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total number of subscriptions across all connections.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.iter().map(|s| s.len()).sum()
    }

    /// Get the channels a connection is subscribed to.
    #[must_use]
    pub fn channels_for(&self, id: ConnectionId) -> Vec<String> {
        self.subscriptions
            .get(&id)
            .map(|s| s.iter().map(|c| c.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(n: usize) -> (ConnectionRegistry, Vec<(ConnectionId, crate::Inbox)>) {
        let registry = ConnectionRegistry::new();
        let conns = (0..n).map(|_| registry.register()).collect();
        (registry, conns)
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let (_registry, conns) = registry_with(1);
        let id = conns[0].0;
        let router = ChannelRouter::new();

        assert!(router.subscribe(id, "public").unwrap());
        assert!(router.channel_exists("public"));
        assert_eq!(router.subscriber_count("public"), 1);

        // Idempotent re-subscribe
        assert!(!router.subscribe(id, "public").unwrap());
        assert_eq!(router.subscriber_count("public"), 1);

        assert!(router.unsubscribe(id, "public"));
        // Channel is pruned once empty
        assert!(!router.channel_exists("public"));

        assert!(!router.unsubscribe(id, "public"));
    }

    #[test]
    fn test_invalid_channel_name() {
        let (_registry, conns) = registry_with(1);
        let id = conns[0].0;
        let router = ChannelRouter::new();

        assert!(matches!(
            router.subscribe(id, ""),
            Err(RouterError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_subscription_limit() {
        let (_registry, conns) = registry_with(1);
        let id = conns[0].0;
        let router = ChannelRouter::with_config(RouterConfig {
            max_subscriptions_per_connection: 2,
            ..RouterConfig::default()
        });

        router.subscribe(id, "a").unwrap();
        router.subscribe(id, "b").unwrap();
        assert!(matches!(
            router.subscribe(id, "c"),
            Err(RouterError::MaxSubscriptionsReached)
        ));
    }

    #[test]
    fn test_channel_limit() {
        let (_registry, conns) = registry_with(2);
        let router = ChannelRouter::with_config(RouterConfig {
            max_channels: 1,
            ..RouterConfig::default()
        });

        router.subscribe(conns[0].0, "a").unwrap();
        assert!(matches!(
            router.subscribe(conns[1].0, "b"),
            Err(RouterError::MaxChannelsReached)
        ));

        // An existing channel is still joinable at the limit
        assert!(router.subscribe(conns[1].0, "a").unwrap());
    }

    #[test]
    fn test_publish_reaches_subscribers_only() {
        let (registry, mut conns) = registry_with(3);
        let router = ChannelRouter::new();

        router.subscribe(conns[0].0, "public").unwrap();
        router.subscribe(conns[1].0, "public").unwrap();
        router.subscribe(conns[2].0, "other").unwrap();

        let envelope = Arc::new(Envelope::chat("alice", "public", "hi"));
        let count = router.publish(&registry, "public", envelope);
        assert_eq!(count, 2);

        assert!(conns[0].1.try_recv().is_some());
        assert!(conns[1].1.try_recv().is_some());
        assert!(conns[2].1.try_recv().is_none());
    }

    #[test]
    fn test_publish_nonexistent_channel() {
        let (registry, _conns) = registry_with(1);
        let router = ChannelRouter::new();

        let envelope = Arc::new(Envelope::chat("alice", "ghost", "hi"));
        assert_eq!(router.publish(&registry, "ghost", envelope), 0);
    }

    #[test]
    fn test_publish_skips_dropped_inbox() {
        let (registry, mut conns) = registry_with(2);
        let router = ChannelRouter::new();

        router.subscribe(conns[0].0, "public").unwrap();
        router.subscribe(conns[1].0, "public").unwrap();

        // Simulate a subscriber whose transport already went away
        let (_, inbox) = conns.remove(1);
        drop(inbox);

        let envelope = Arc::new(Envelope::chat("alice", "public", "hi"));
        assert_eq!(router.publish(&registry, "public", envelope), 1);
    }

    #[test]
    fn test_unsubscribe_all() {
        let (_registry, conns) = registry_with(2);
        let router = ChannelRouter::new();

        router.subscribe(conns[0].0, "a").unwrap();
        router.subscribe(conns[0].0, "b").unwrap();
        router.subscribe(conns[1].0, "a").unwrap();

        let mut channels = router.unsubscribe_all(conns[0].0);
        channels.sort();
        assert_eq!(channels, vec!["a".to_string(), "b".to_string()]);

        // "a" still has a subscriber, "b" is pruned
        assert!(router.channel_exists("a"));
        assert!(!router.channel_exists("b"));
        assert_eq!(router.subscriber_count("a"), 1);

        assert!(router.unsubscribe_all(conns[0].0).is_empty());
    }

    #[test]
    fn test_counts() {
        let (_registry, conns) = registry_with(2);
        let router = ChannelRouter::new();

        router.subscribe(conns[0].0, "a").unwrap();
        router.subscribe(conns[0].0, "b").unwrap();
        router.subscribe(conns[1].0, "a").unwrap();

        assert_eq!(router.channel_count(), 2);
        assert_eq!(router.subscription_count(), 3);
        assert_eq!(router.channels_for(conns[0].0).len(), 2);
    }
}
