//! The chat relay facade.
//!
//! A [`Relay`] owns the connection registry and the channel router and
//! enforces the session rules: one username per connection, bound by the
//! first successful JOIN; CHAT fan-out only for joined connections;
//! synthetic JOIN/LEAVE broadcasts on lifecycle transitions.
//!
//! The relay is an explicitly owned instance, constructed at server start
//! and passed by reference; there is no ambient global state.

use crate::registry::{ConnectionId, ConnectionRegistry, Inbox};
use crate::router::{ChannelRouter, RouterConfig};
use crate::session::{JoinAck, SessionError};
use chatrelay_protocol::{codec, Envelope, EventKind, ProtocolError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned by [`Relay::send`].
#[derive(Debug, Error)]
pub enum RelayError {
    /// The connection has no bound username (or is not registered).
    #[error("Connection has not joined")]
    NotJoined,

    /// Message content is empty after trimming.
    #[error("Message content cannot be empty")]
    EmptyContent,

    /// Clients may only send CHAT directly; JOIN goes through `join` and
    /// LEAVE is always synthesized by the relay.
    #[error("Unexpected {0} message from client")]
    UnexpectedKind(EventKind),

    /// The payload could not be decoded into an envelope.
    #[error(transparent)]
    Malformed(#[from] ProtocolError),
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Channel router limits and pruning policy.
    pub router: RouterConfig,
    /// Channel used when a JOIN or CHAT names none.
    pub default_channel: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            default_channel: "public".to_string(),
        }
    }
}

/// Relay statistics.
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// Number of live connections.
    pub connections: usize,
    /// Number of active channels.
    pub channels: usize,
    /// Total number of subscriptions.
    pub subscriptions: usize,
}

/// The pub/sub chat relay.
pub struct Relay {
    registry: ConnectionRegistry,
    router: ChannelRouter,
    config: RelayConfig,
}

impl Relay {
    /// Create a relay with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a relay with custom configuration.
    #[must_use]
    pub fn with_config(config: RelayConfig) -> Self {
        info!(default_channel = %config.default_channel, "Creating relay");
        Self {
            registry: ConnectionRegistry::new(),
            router: ChannelRouter::with_config(config.router.clone()),
            config,
        }
    }

    /// Register a new connection.
    ///
    /// Returns the connection's ID and the inbox of messages the transport
    /// adapter delivers to the client.
    pub fn connect(&self) -> (ConnectionId, Inbox) {
        self.registry.register()
    }

    /// Join a channel, binding the username on first success.
    ///
    /// The username binds at most once: a JOIN under a different name is
    /// rejected. A bound user may join further channels; a repeated JOIN
    /// for a channel the connection is already in is an idempotent no-op
    /// and produces no broadcast. Subscription happens before the JOIN
    /// broadcast, so the joiner receives its own JOIN event.
    ///
    /// # Errors
    ///
    /// Fails if the username trims to empty, the connection is unknown,
    /// the connection already joined under a different name, or the
    /// channel router rejects the subscription.
    pub fn join(
        &self,
        id: ConnectionId,
        username: &str,
        channel: &str,
    ) -> Result<JoinAck, SessionError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        if !self.registry.contains(id) {
            return Err(SessionError::UnknownConnection(id));
        }

        let channel = self.resolve_channel(channel);

        let already_bound = match self.registry.username(id) {
            Some(bound) if bound != username => {
                return Err(SessionError::AlreadyJoined(bound));
            }
            Some(_) => true,
            None => false,
        };

        let newly_subscribed = self.router.subscribe(id, &channel)?;
        if !already_bound {
            self.registry.bind_username(id, username);
        }

        if !newly_subscribed {
            debug!(connection = %id, username = %username, channel = %channel, "Repeated JOIN ignored");
            return Ok(JoinAck {
                username: username.to_string(),
                channel,
                rejoined: true,
            });
        }

        let envelope = Arc::new(Envelope::join(username, &channel));
        let delivered = self.router.publish(&self.registry, &channel, envelope);

        info!(
            connection = %id,
            username = %username,
            channel = %channel,
            delivered,
            "User joined"
        );

        Ok(JoinAck {
            username: username.to_string(),
            channel,
            rejoined: false,
        })
    }

    /// Relay a raw CHAT payload from a client.
    ///
    /// Decodes the payload, validates it, stamps the connection's bound
    /// username as the sender (any client-claimed sender is ignored) and
    /// fans the message out to the channel's subscribers. Returns the
    /// number of deliveries.
    ///
    /// # Errors
    ///
    /// Fails on undecodable payloads, non-CHAT kinds, unjoined (or
    /// unknown) connections, and blank content. No state is mutated on
    /// any failure.
    pub fn send(&self, id: ConnectionId, raw: &str) -> Result<usize, RelayError> {
        let envelope = codec::decode(raw)?;

        if envelope.kind != EventKind::Chat {
            return Err(RelayError::UnexpectedKind(envelope.kind));
        }

        let Some(username) = self.registry.username(id) else {
            return Err(RelayError::NotJoined);
        };

        let content = envelope.content();
        if content.trim().is_empty() {
            return Err(RelayError::EmptyContent);
        }

        let channel = self.resolve_channel(&envelope.channel);
        let outbound = Arc::new(Envelope::chat(username, &channel, content));
        let delivered = self.router.publish(&self.registry, &channel, outbound);

        debug!(connection = %id, channel = %channel, delivered, "Chat relayed");
        Ok(delivered)
    }

    /// Tear down a connection.
    ///
    /// Idempotent: repeated disconnect reports clean up exactly once. If a
    /// username was bound, one synthetic LEAVE is broadcast per channel the
    /// connection was subscribed to, delivered to the remaining
    /// subscribers. Anonymous connections produce no broadcast.
    pub fn disconnect(&self, id: ConnectionId) {
        let Some(session) = self.registry.unregister(id) else {
            debug!(connection = %id, "Disconnect for unknown connection ignored");
            return;
        };

        let channels = self.router.unsubscribe_all(id);

        match session.username() {
            Some(username) => {
                for channel in &channels {
                    let envelope = Arc::new(Envelope::leave(username, channel));
                    let delivered = self.router.publish(&self.registry, channel, envelope);
                    debug!(channel = %channel, delivered, "Broadcast LEAVE");
                }
                info!(connection = %id, username = %username, "User left");
            }
            None => {
                if !channels.is_empty() {
                    warn!(connection = %id, "Anonymous connection held subscriptions");
                }
                debug!(connection = %id, "Anonymous connection closed");
            }
        }
    }

    /// Get the username bound to a connection, if any.
    #[must_use]
    pub fn username(&self, id: ConnectionId) -> Option<String> {
        self.registry.username(id)
    }

    /// Get relay statistics.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.registry.len(),
            channels: self.router.channel_count(),
            subscriptions: self.router.subscription_count(),
        }
    }

    fn resolve_channel(&self, requested: &str) -> String {
        let requested = requested.trim();
        if requested.is_empty() {
            self.config.default_channel.clone()
        } else {
            requested.to_string()
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
