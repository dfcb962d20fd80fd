//! Connection registry for chatrelay.
//!
//! The registry owns every live connection: its session state and the
//! sending half of its outbound queue. Connections are created on
//! transport-level connect and destroyed on disconnect.

use crate::session::Session;
use chatrelay_protocol::Envelope;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

/// Atomic counter for connection IDs, unique within the process.
static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    fn next() -> Self {
        Self(ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value of the ID.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// The receiving half of a connection's outbound queue.
///
/// Yields every message delivered to the connection, in delivery order,
/// for the lifetime of the connection. The sequence is unbounded and not
/// restartable; dropping the inbox silently discards further deliveries.
#[derive(Debug)]
pub struct Inbox {
    receiver: mpsc::UnboundedReceiver<Arc<Envelope>>,
}

impl Inbox {
    /// Receive the next delivered message.
    ///
    /// Returns `None` once the connection has been unregistered and all
    /// pending deliveries have been drained.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.recv().await
    }

    /// Receive a pending message without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.try_recv().ok()
    }
}

/// Per-connection registry entry.
struct ConnectionEntry {
    session: Session,
    outbound: mpsc::UnboundedSender<Arc<Envelope>>,
}

/// Registry of live connections.
///
/// The registry is the single owner of connection state. Lookups and
/// mutations of independent connections do not contend with each other.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if the registry has no connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Register a new connection.
    ///
    /// Returns the connection's ID and the inbox the transport adapter
    /// drains to deliver messages to the client.
    pub fn register(&self) -> (ConnectionId, Inbox) {
        let id = ConnectionId::next();
        let (outbound, receiver) = mpsc::unbounded_channel();

        self.connections.insert(
            id,
            ConnectionEntry {
                session: Session::new(),
                outbound,
            },
        );

        debug!(connection = %id, "Connection registered");
        (id, Inbox { receiver })
    }

    /// Remove a connection, returning its final session state.
    ///
    /// Idempotent: returns `None` if the connection was already removed,
    /// so a disconnect reported twice cleans up exactly once.
    pub fn unregister(&self, id: ConnectionId) -> Option<Session> {
        let entry = self.connections.remove(&id).map(|(_, e)| e.session);
        if entry.is_some() {
            debug!(connection = %id, "Connection unregistered");
        }
        entry
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Get the username bound to a connection.
    ///
    /// Returns `None` if the connection is unknown or has not joined yet.
    #[must_use]
    pub fn username(&self, id: ConnectionId) -> Option<String> {
        self.connections
            .get(&id)
            .and_then(|e| e.session.username().map(String::from))
    }

    /// Bind a username to a connection.
    ///
    /// The binding happens at most once; later calls are no-ops. Returns
    /// `false` if the connection is unknown.
    pub fn bind_username(&self, id: ConnectionId, username: &str) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut entry) => {
                if entry.session.bind(username) {
                    debug!(connection = %id, username = %username, "Username bound");
                }
                true
            }
            None => false,
        }
    }

    /// Push a message into a connection's outbound queue.
    ///
    /// Returns `false` if the connection is gone or its inbox has been
    /// dropped; such subscribers are simply skipped by the caller.
    pub fn deliver(&self, id: ConnectionId, envelope: Arc<Envelope>) -> bool {
        match self.connections.get(&id) {
            Some(entry) => {
                let ok = entry.outbound.send(envelope).is_ok();
                if !ok {
                    trace!(connection = %id, "Delivery to closed inbox dropped");
                }
                ok
            }
            None => false,
        }
    }
}
