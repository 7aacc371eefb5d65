//! Per-connection handler: register an outbound queue, then pump frames.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use classroom_common::ServerMessage;

use crate::error::RelayError;
use crate::registry::ConnectionId;
use crate::relay::{reply, Relay};

/// Handle a single WebSocket connection until it closes.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    relay: Relay,
    channel_capacity: usize,
) {
    let (mut sink, mut stream) = ws.split();
    let conn = ConnectionId::next();
    let (tx, mut rx) = mpsc::channel::<String>(channel_capacity);

    tracing::info!(peer = %addr, conn = %conn, "Client connected");

    loop {
        tokio::select! {
            // Frames queued for this client → its WebSocket
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            // Frames from this client → relay
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        relay.handle_text(conn, &tx, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let err = RelayError::Unsupported("binary");
                        tracing::debug!(conn = %conn, error = %err, "Ignoring frame");
                        reply(&tx, &ServerMessage::error(err.to_string()));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(peer = %addr, conn = %conn, "Client disconnected");
    relay.disconnect(conn).await;
}
