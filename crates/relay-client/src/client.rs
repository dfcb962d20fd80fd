//! WebSocket chat client.
//!
//! [`ChatClient`] is the surface the UI layer talks to: connect, join,
//! send, and a stream of inbound messages. Rendering, view routing, and
//! input collection are the caller's concern.

use chatrelay_protocol::{codec, Envelope, ProtocolError};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A join must happen before sending.
    #[error("Cannot send: no username set, join first")]
    NotJoined,

    /// Username is empty after trimming.
    #[error("Username cannot be empty")]
    EmptyUsername,

    /// Message content is empty after trimming.
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// Envelope encoding/decoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Underlying WebSocket failure.
    #[error("WebSocket error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// A connected chat client.
///
/// Inbound messages are decoded by a background read task and buffered in
/// an unbounded queue; the sequence is not restartable and ends when the
/// server closes the connection.
pub struct ChatClient {
    sink: WsSink,
    messages: mpsc::UnboundedReceiver<Envelope>,
    current_user: Option<String>,
    channel: Option<String>,
    read_task: JoinHandle<()>,
}

impl ChatClient {
    /// Connect to a relay server.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket handshake fails.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _response) = connect_async(url).await?;
        debug!(url = %url, "Connected");

        let (sink, mut stream) = ws.split();
        let (tx, messages) = mpsc::unbounded_channel();

        // Read task: decode inbound frames into the message queue.
        // Malformed frames are logged and skipped.
        let read_task = tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(Message::Text(text)) => match codec::decode(&text) {
                        Ok(envelope) => {
                            if tx.send(envelope).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Invalid message received"),
                    },
                    Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                        Ok(text) => match codec::decode(text) {
                            Ok(envelope) => {
                                if tx.send(envelope).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "Invalid message received"),
                        },
                        Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                    },
                    Ok(Message::Close(_)) => {
                        debug!("Server closed the connection");
                        break;
                    }
                    Ok(_) => {
                        // Ping/pong keepalive, nothing to surface
                    }
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            sink,
            messages,
            current_user: None,
            channel: None,
            read_task,
        })
    }

    /// Join a channel under the given username.
    ///
    /// Remembers the username and channel for subsequent [`send`](Self::send)
    /// calls. An empty channel lets the server fall back to its default.
    ///
    /// # Errors
    ///
    /// Fails if the username trims to empty or the frame cannot be sent.
    pub async fn join(&mut self, username: &str, channel: &str) -> Result<(), ClientError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ClientError::EmptyUsername);
        }

        let channel = channel.trim();
        self.send_envelope(&Envelope::join_request(username, channel))
            .await?;

        debug!(username = %username, channel = %channel, "Join sent");
        self.current_user = Some(username.to_string());
        self.channel = Some(channel.to_string());
        Ok(())
    }

    /// Send a chat message to the joined channel.
    ///
    /// # Errors
    ///
    /// Fails if no join happened yet, the content trims to empty, or the
    /// frame cannot be sent.
    pub async fn send(&mut self, content: &str) -> Result<(), ClientError> {
        let Some(user) = self.current_user.clone() else {
            return Err(ClientError::NotJoined);
        };

        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let channel = self.channel.clone().unwrap_or_default();
        self.send_envelope(&Envelope::chat(user, channel, content))
            .await
    }

    /// Receive the next inbound message.
    ///
    /// Returns `None` once the connection has ended and the queue drained.
    pub async fn next_message(&mut self) -> Option<Envelope> {
        self.messages.recv().await
    }

    /// The username set by a successful [`join`](Self::join), if any.
    #[must_use]
    pub fn current_user(&self) -> Option<&str> {
        self.current_user.as_deref()
    }

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Currently infallible; the close frame is sent best-effort.
    pub async fn close(mut self) -> Result<(), ClientError> {
        let _ = self.sink.send(Message::Close(None)).await;
        Ok(())
    }

    async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let text = codec::encode(envelope)?;
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_protocol::EventKind;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Minimal in-process stand-in for the relay: answers JOIN with the
    /// synthetic broadcast and echoes CHAT back to the sender.
    async fn spawn_stub_relay() -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let envelope = codec::decode(&text).unwrap();
                let reply = match envelope.kind {
                    EventKind::Join => {
                        let channel = if envelope.channel.is_empty() {
                            "public".to_string()
                        } else {
                            envelope.channel
                        };
                        Envelope::join(envelope.sender, channel)
                    }
                    EventKind::Chat => envelope,
                    EventKind::Leave => continue,
                };
                let out = codec::encode(&reply).unwrap();
                if ws.send(Message::Text(out)).await.is_err() {
                    break;
                }
            }
        });

        (format!("ws://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_join_then_chat() {
        let (url, _server) = spawn_stub_relay().await;
        let mut client = ChatClient::connect(&url).await.unwrap();

        client.join("alice", "public").await.unwrap();
        assert_eq!(client.current_user(), Some("alice"));

        let joined = client.next_message().await.unwrap();
        assert_eq!(joined.kind, EventKind::Join);
        assert_eq!(joined.content(), "alice joined!");

        client.send("hello").await.unwrap();
        let chat = client.next_message().await.unwrap();
        assert_eq!(chat.kind, EventKind::Chat);
        assert_eq!(chat.sender, "alice");
        assert_eq!(chat.content(), "hello");
    }

    #[tokio::test]
    async fn test_empty_channel_defaults_on_server() {
        let (url, _server) = spawn_stub_relay().await;
        let mut client = ChatClient::connect(&url).await.unwrap();

        client.join("alice", "  ").await.unwrap();
        let joined = client.next_message().await.unwrap();
        assert_eq!(joined.channel, "public");
    }

    #[tokio::test]
    async fn test_send_before_join() {
        let (url, _server) = spawn_stub_relay().await;
        let mut client = ChatClient::connect(&url).await.unwrap();

        assert!(matches!(
            client.send("hi").await,
            Err(ClientError::NotJoined)
        ));
    }

    #[tokio::test]
    async fn test_empty_username_rejected() {
        let (url, _server) = spawn_stub_relay().await;
        let mut client = ChatClient::connect(&url).await.unwrap();

        assert!(matches!(
            client.join("   ", "public").await,
            Err(ClientError::EmptyUsername)
        ));
        assert!(client.current_user().is_none());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (url, _server) = spawn_stub_relay().await;
        let mut client = ChatClient::connect(&url).await.unwrap();

        client.join("alice", "public").await.unwrap();
        assert!(matches!(
            client.send("   ").await,
            Err(ClientError::EmptyMessage)
        ));
    }
}
