//! Broker WebSocket endpoint.
//!
//! Text and binary frames both carry the broker's JSON messages. Each
//! socket gets a writer task that drains the connection's outbound queue
//! and sends WebSocket pings; a peer that leaves a ping unanswered until
//! the next one is due is disconnected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use peerlink_broker::{Broker, Connection, ConnectionReceiver};
use tracing::{debug, error, info, warn};

use crate::api::{AppState, ConnectionSlot};

/// WebSocket upgrade handler. Refuses with 503 when the node is full.
pub async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(slot) = state.connections.try_acquire() else {
        warn!(
            active = state.connections.active(),
            "Connection limit reached, refusing upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let broker = state.broker.clone();
    let ping_interval = state.ping_interval;
    ws.on_upgrade(move |socket| handle_socket(socket, broker, ping_interval, slot))
}

/// Serve one WebSocket until it closes, then tear the connection down.
async fn handle_socket(
    socket: WebSocket,
    broker: Arc<Broker>,
    ping_interval: Duration,
    _slot: ConnectionSlot,
) {
    let (connection, receiver) = match broker.connect() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to open broker connection");
            return;
        }
    };
    let connection_id = connection.id.clone();

    let (ws_sender, mut ws_receiver) = socket.split();
    let awaiting_pong = Arc::new(AtomicBool::new(false));
    let mut send_task = tokio::spawn(write_loop(
        ws_sender,
        receiver,
        ping_interval,
        awaiting_pong.clone(),
        connection_id.clone(),
    ));

    loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => broker.handle_message(&connection, text.as_str()),
                Some(Ok(Message::Binary(data))) => handle_binary(&broker, &connection, &data),
                Some(Ok(Message::Pong(_))) => awaiting_pong.store(false, Ordering::Release),
                Some(Ok(Message::Ping(_))) => {
                    // axum answers pings itself
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection_id = %connection_id, "WebSocket closed by peer");
                    break;
                }
                Some(Err(e)) => {
                    warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                    break;
                }
            },
            _ = &mut send_task => {
                debug!(connection_id = %connection_id, "Writer stopped");
                break;
            }
        }
    }

    send_task.abort();
    broker.close(&connection);
    info!(connection_id = %connection_id, "WebSocket disconnected");
}

fn handle_binary(broker: &Broker, connection: &Arc<Connection>, data: &[u8]) {
    match std::str::from_utf8(data) {
        Ok(text) => broker.handle_message(connection, text),
        Err(_) => debug!(connection_id = %connection.id, "Dropping non-UTF-8 binary frame"),
    }
}

/// Drain the outbound queue and keep the socket alive with pings.
async fn write_loop<S>(
    mut ws_sender: S,
    mut receiver: ConnectionReceiver,
    ping_interval: Duration,
    awaiting_pong: Arc<AtomicBool>,
    connection_id: String,
) where
    S: futures_util::Sink<Message> + Unpin,
{
    let start = tokio::time::Instant::now() + ping_interval;
    let mut ping = tokio::time::interval_at(start, ping_interval);

    loop {
        tokio::select! {
            msg = receiver.recv() => {
                let Some(msg) = msg else { break };
                if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if awaiting_pong.swap(true, Ordering::AcqRel) {
                    info!(connection_id = %connection_id, "Ping unanswered, closing");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
                if ws_sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!(connection_id = %connection_id, "Send task ended");
}
