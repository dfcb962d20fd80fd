//! # chatrelay-client
//!
//! Client facade for the chatrelay server.
//!
//! This crate gives a UI layer everything it needs and nothing more:
//! connect to a relay, join a channel, send chat messages, and consume
//! the inbound message stream.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatrelay_client::ChatClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = ChatClient::connect("ws://127.0.0.1:8080/ws").await?;
//!     client.join("alice", "public").await?;
//!     client.send("Hello, world!").await?;
//!
//!     while let Some(message) = client.next_message().await {
//!         println!("[{}] {}: {}", message.channel, message.sender, message.content());
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;

pub use client::{ChatClient, ClientError};
