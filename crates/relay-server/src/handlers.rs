//! Connection handlers for the chat relay server.
//!
//! This module handles the connection lifecycle and message processing.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chatrelay_core::{ConnectionId, Relay, RelayConfig, RelayError, RouterConfig, SessionError};
use chatrelay_protocol::{codec, EventKind};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Shared server state.
pub struct AppState {
    /// The chat relay.
    pub relay: Relay,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let relay_config = RelayConfig {
            router: RouterConfig {
                max_channels: config.limits.max_channels,
                max_subscriptions_per_connection: config.limits.max_subscriptions_per_connection,
                auto_delete_empty_channels: true,
            },
            default_channel: config.channels.default_channel.clone(),
        };

        Self {
            relay: Relay::with_config(relay_config),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Chat relay listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    if state.relay.stats().connections >= state.config.limits.max_connections {
        warn!("Connection limit reached, refusing connection");
        metrics::record_error("connection_limit");
        return;
    }

    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (connection_id, mut inbox) = state.relay.connect();
    debug!(connection = %connection_id, "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Message processing loop
    loop {
        tokio::select! {
            biased;

            // Drain the connection's outbound queue toward the client
            Some(envelope) = inbox.recv() => {
                match codec::encode(&envelope) {
                    Ok(text) => {
                        metrics::record_message(text.len(), "outbound");
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Failed to encode outbound message");
                        metrics::record_error("encode");
                    }
                }
            }

            // Receive from the WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&text, connection_id, &state);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // Some clients send JSON in binary frames
                        match std::str::from_utf8(&data) {
                            Ok(text) => handle_inbound(text, connection_id, &state),
                            Err(_) => {
                                warn!(connection = %connection_id, "Dropping non-UTF-8 binary frame");
                                metrics::record_error("malformed");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: exactly-once teardown, LEAVE broadcasts included
    state.relay.disconnect(connection_id);
    metrics::set_active_channels(state.relay.stats().channels);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Handle one inbound payload.
///
/// Bad input is logged and dropped; it never tears down the connection or
/// disturbs other connections.
fn handle_inbound(text: &str, connection_id: ConnectionId, state: &AppState) {
    metrics::record_message(text.len(), "inbound");

    if text.len() > state.config.limits.max_message_size {
        warn!(connection = %connection_id, size = text.len(), "Dropping oversized message");
        metrics::record_error("oversized");
        return;
    }

    let envelope = match codec::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Invalid message received");
            metrics::record_error("malformed");
            return;
        }
    };

    match envelope.kind {
        EventKind::Join => {
            match state
                .relay
                .join(connection_id, &envelope.sender, &envelope.channel)
            {
                Ok(ack) => {
                    if !ack.rejoined {
                        metrics::record_join();
                        metrics::set_active_channels(state.relay.stats().channels);
                    }
                }
                Err(e) => {
                    warn!(connection = %connection_id, error = %e, "Join rejected");
                    metrics::record_error(join_error_type(&e));
                }
            }
        }
        EventKind::Chat => match state.relay.send(connection_id, text) {
            Ok(delivered) => {
                debug!(connection = %connection_id, delivered, "Chat relayed");
            }
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Chat rejected");
                metrics::record_error(send_error_type(&e));
            }
        },
        EventKind::Leave => {
            // LEAVE is only ever synthesized by the relay
            warn!(connection = %connection_id, "Ignoring client-supplied LEAVE");
            metrics::record_error("unexpected_kind");
        }
    }
}

fn join_error_type(e: &SessionError) -> &'static str {
    match e {
        SessionError::EmptyUsername => "empty_username",
        SessionError::UnknownConnection(_) => "unknown_connection",
        SessionError::AlreadyJoined(_) => "already_joined",
        SessionError::Router(_) => "router",
    }
}

fn send_error_type(e: &RelayError) -> &'static str {
    match e {
        RelayError::NotJoined => "not_joined",
        RelayError::EmptyContent => "empty_content",
        RelayError::UnexpectedKind(_) => "unexpected_kind",
        RelayError::Malformed(_) => "malformed",
    }
}
