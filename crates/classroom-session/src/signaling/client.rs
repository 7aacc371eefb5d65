//! Public handle for the relay signaling connection.

use std::sync::Arc;

use classroom_common::{ClientMessage, SignalingError};
use tokio::sync::{mpsc, RwLock};

use super::connection::connection_loop;
use super::types::{Membership, SignalingCommand, SignalingConfig, SignalingEvent};

/// Handle for talking to the relay.
///
/// All methods queue a command for the background connection task, which
/// owns the socket and reconnects on its own. Cloning yields another
/// handle to the same connection.
///
/// The command queue is unbounded: the connection task blocks on the
/// event queue, so a bounded queue here would let the two wait on each
/// other.
#[derive(Clone)]
pub struct SignalingClient {
    command_tx: mpsc::UnboundedSender<SignalingCommand>,
    connected: Arc<RwLock<bool>>,
}

impl SignalingClient {
    /// Start the background connection. Returns `(client, event_receiver)`.
    pub fn connect(config: SignalingConfig) -> (Self, mpsc::Receiver<SignalingEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(RwLock::new(false));

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(config, connected, event_tx, command_rx));

        (client, event_rx)
    }

    /// A client whose commands land on `command_tx` instead of a socket.
    #[cfg(test)]
    pub(crate) fn detached(command_tx: mpsc::UnboundedSender<SignalingCommand>) -> Self {
        Self {
            command_tx,
            connected: Arc::new(RwLock::new(true)),
        }
    }

    /// Join a room. The membership is remembered and re-sent after every
    /// reconnect.
    pub async fn join(
        &self,
        room_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<(), SignalingError> {
        self.command(SignalingCommand::Join(Membership {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
        }))
        .await
    }

    /// Leave the current room and forget the membership.
    pub async fn leave(&self) -> Result<(), SignalingError> {
        self.command(SignalingCommand::Leave).await
    }

    /// Send a message to the relay. Messages queued while the transport is
    /// down are dropped.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), SignalingError> {
        self.command(SignalingCommand::Send(msg)).await
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Close the socket and stop reconnecting.
    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(SignalingCommand::Disconnect);
    }

    async fn command(&self, cmd: SignalingCommand) -> Result<(), SignalingError> {
        self.command_tx
            .send(cmd)
            .map_err(|_| SignalingError::Closed)
    }
}
