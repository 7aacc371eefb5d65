//! Background WebSocket connection loop with auto-reconnect.

use std::sync::Arc;
use std::time::Duration;

use classroom_common::{ClientMessage, ServerMessage, SignalingError};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::types::{Membership, SignalingCommand, SignalingConfig, SignalingEvent};

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, PartialEq, Eq)]
enum SessionResult {
    /// The handle asked us to stop, or went away.
    Shutdown,
    Disconnected,
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

pub(crate) async fn connection_loop(
    config: SignalingConfig,
    connected: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<SignalingEvent>,
    mut command_rx: mpsc::UnboundedReceiver<SignalingCommand>,
) {
    let mut membership: Option<Membership> = None;
    let mut delay = config.reconnect_delay;

    loop {
        info!(url = %config.url, "Connecting to relay");

        match tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws, _))) => {
                delay = config.reconnect_delay;
                *connected.write().await = true;
                let _ = event_tx.send(SignalingEvent::Connected).await;

                let result = run_session(ws, &mut membership, &event_tx, &mut command_rx).await;

                *connected.write().await = false;
                let _ = event_tx.send(SignalingEvent::Disconnected).await;
                if result == SessionResult::Shutdown {
                    info!("Signaling stopped");
                    return;
                }
            }
            Ok(Err(e)) => {
                let err = SignalingError::ConnectFailed(e.to_string());
                error!(error = %e, "Failed to connect to relay");
                let _ = event_tx.send(SignalingEvent::Error(err.to_string())).await;
            }
            Err(_elapsed) => {
                let err = SignalingError::Timeout(config.connect_timeout.as_secs());
                error!(error = %err, "Relay connect timed out");
                let _ = event_tx.send(SignalingEvent::Error(err.to_string())).await;
            }
        }

        info!(delay_ms = delay.as_millis() as u64, "Reconnecting to relay");
        if wait_for_retry(delay, &mut membership, &mut command_rx).await
            == SessionResult::Shutdown
        {
            info!("Signaling stopped");
            return;
        }
        delay = next_backoff(delay, config.max_reconnect_delay);
    }
}

/// Double the delay, capped at `max`.
pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Pump one connected socket until it drops or the handle shuts us down.
async fn run_session(
    ws: RelaySocket,
    membership: &mut Option<Membership>,
    event_tx: &mpsc::Sender<SignalingEvent>,
    command_rx: &mut mpsc::UnboundedReceiver<SignalingCommand>,
) -> SessionResult {
    let (mut sink, mut stream) = ws.split();

    if let Some(m) = membership.as_ref() {
        if send_message(&mut sink, &m.join_message()).await.is_err() {
            return SessionResult::Disconnected;
        }
        info!(room = %m.room_id, user = %m.user_id, "Re-joined room");
    }

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                let msg = match cmd {
                    Some(SignalingCommand::Join(m)) => {
                        let msg = m.join_message();
                        *membership = Some(m);
                        msg
                    }
                    Some(SignalingCommand::Leave) => {
                        *membership = None;
                        ClientMessage::LeaveRoom
                    }
                    Some(SignalingCommand::Send(msg)) => msg,
                    Some(SignalingCommand::Disconnect) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionResult::Shutdown;
                    }
                };
                if let Err(e) = send_message(&mut sink, &msg).await {
                    warn!(event = msg.event_name(), error = %e, "Send to relay failed");
                    return SessionResult::Disconnected;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => {
                                if event_tx.send(SignalingEvent::Message(msg)).await.is_err() {
                                    return SessionResult::Shutdown;
                                }
                            }
                            Err(e) => {
                                debug!(error = %e, text = %text, "Unrecognized frame from relay");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Relay closed connection");
                        return SessionResult::Disconnected;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        return SessionResult::Disconnected;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Sleep out the backoff delay while still honouring commands.
async fn wait_for_retry(
    delay: Duration,
    membership: &mut Option<Membership>,
    command_rx: &mut mpsc::UnboundedReceiver<SignalingCommand>,
) -> SessionResult {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return SessionResult::Disconnected,
            cmd = command_rx.recv() => match cmd {
                Some(SignalingCommand::Join(m)) => *membership = Some(m),
                Some(SignalingCommand::Leave) => *membership = None,
                Some(SignalingCommand::Send(msg)) => {
                    debug!(event = msg.event_name(), "Dropping message while disconnected");
                }
                Some(SignalingCommand::Disconnect) | None => return SessionResult::Shutdown,
            },
        }
    }
}

async fn send_message<S>(sink: &mut S, msg: &ClientMessage) -> Result<(), SignalingError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let json = serde_json::to_string(msg).map_err(|e| SignalingError::Relay(e.to_string()))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|_| SignalingError::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::SignalingClient;
    use tokio::net::TcpListener;

    type ServerWs = WebSocketStream<TcpStream>;

    fn test_config(addr: std::net::SocketAddr) -> SignalingConfig {
        SignalingConfig {
            url: format!("ws://{addr}"),
            connect_timeout: Duration::from_secs(2),
            reconnect_delay: Duration::from_millis(50),
            max_reconnect_delay: Duration::from_millis(200),
        }
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("no client connected")
            .unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn next_client_message(ws: &mut ServerWs) -> ClientMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for client frame")
                .expect("stream ended")
                .expect("ws error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<SignalingEvent>) -> SignalingEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for signaling event")
            .expect("event channel closed")
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let max = Duration::from_secs(30);
        let mut delay = Duration::from_secs(1);
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_secs());
            delay = next_backoff(delay, max);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[tokio::test]
    async fn forwards_server_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (client, mut events) = SignalingClient::connect(test_config(listener.local_addr().unwrap()));
        let mut server = accept(&listener).await;
        assert_eq!(next_event(&mut events).await, SignalingEvent::Connected);
        assert!(client.is_connected().await);

        let msg = ServerMessage::UserJoined {
            user_id: "u2".into(),
            user_name: "Grace".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        server.send(Message::Text(json.into())).await.unwrap();

        assert_eq!(next_event(&mut events).await, SignalingEvent::Message(msg));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn reconnect_resends_join() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (client, mut events) = SignalingClient::connect(test_config(listener.local_addr().unwrap()));

        let mut first = accept(&listener).await;
        assert_eq!(next_event(&mut events).await, SignalingEvent::Connected);
        client.join("abc123", "u1", "Ada").await.unwrap();
        let join = next_client_message(&mut first).await;
        assert!(matches!(join, ClientMessage::JoinRoom { ref room_id, .. } if room_id == "abc123"));

        drop(first);
        assert_eq!(next_event(&mut events).await, SignalingEvent::Disconnected);

        let mut second = accept(&listener).await;
        assert_eq!(next_event(&mut events).await, SignalingEvent::Connected);
        assert_eq!(next_client_message(&mut second).await, join);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn leave_forgets_membership() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (client, mut events) = SignalingClient::connect(test_config(listener.local_addr().unwrap()));

        let mut first = accept(&listener).await;
        next_event(&mut events).await;
        client.join("abc123", "u1", "Ada").await.unwrap();
        client.leave().await.unwrap();
        next_client_message(&mut first).await;
        assert_eq!(next_client_message(&mut first).await, ClientMessage::LeaveRoom);

        drop(first);
        let mut second = accept(&listener).await;
        client.send(ClientMessage::ClearWhiteboard).await.unwrap();
        // The first frame after reconnect is ours, not a replayed join.
        loop {
            if next_event(&mut events).await == SignalingEvent::Connected {
                break;
            }
        }
        assert_eq!(
            next_client_message(&mut second).await,
            ClientMessage::ClearWhiteboard
        );
        client.disconnect().await;
    }

    #[tokio::test]
    async fn connect_failure_reports_error_and_disconnect_stops() {
        // Bind then drop to get a port with nothing listening.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let (client, mut events) = SignalingClient::connect(test_config(addr));

        match next_event(&mut events).await {
            SignalingEvent::Error(message) => assert!(message.contains("connect")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!client.is_connected().await);

        client.disconnect().await;
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while events.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "connection task did not stop");
    }
}
