//! # chatrelay-core
//!
//! Connection registry, channel routing, and session lifecycle for the
//! chatrelay pub/sub relay.
//!
//! This crate provides the relay's building blocks:
//!
//! - **ConnectionRegistry** - Live connections, their sessions, and their
//!   outbound queues
//! - **ChannelRouter** - Per-channel subscriber sets and message fan-out
//! - **Session** - Username binding and JOIN/LEAVE lifecycle rules
//! - **Relay** - The owned facade composing the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│    Relay    │────▶│   Router    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │  Registry   │◀────│  Channels   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! The transport adapter calls [`Relay::connect`] for each new client,
//! forwards inbound JOIN/CHAT payloads to [`Relay::join`] / [`Relay::send`],
//! drains the returned [`Inbox`] toward the client, and reports the
//! disconnect via [`Relay::disconnect`].

pub mod channel;
pub mod registry;
pub mod relay;
pub mod router;
pub mod session;

pub use registry::{ConnectionId, ConnectionRegistry, Inbox};
pub use relay::{Relay, RelayConfig, RelayError, RelayStats};
pub use router::{ChannelRouter, RouterConfig, RouterError};
pub use session::{JoinAck, Session, SessionError};
