//! # chatrelay-protocol
//!
//! Wire envelope definitions for the chatrelay pub/sub relay.
//!
//! This crate defines the JSON envelope exchanged between chat clients and
//! the relay, plus the codec used on both sides of the transport.
//!
//! ## Event Kinds
//!
//! - `JOIN` - sent by a client to enter a channel; broadcast by the relay
//!   with synthesized content when a user joins
//! - `LEAVE` - synthesized by the relay when a user disconnects
//! - `CHAT` - a regular chat message
//!
//! ## Example
//!
//! ```rust
//! use chatrelay_protocol::{codec, Envelope};
//!
//! let envelope = Envelope::chat("alice", "public", "Hello, world!");
//!
//! let encoded = codec::encode(&envelope).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(envelope, decoded);
//! ```

pub mod codec;
pub mod envelope;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::{Envelope, EventKind};
