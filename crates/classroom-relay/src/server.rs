//! TCP accept loop and periodic room statistics.

use std::net::SocketAddr;
use std::time::Duration;

use classroom_config::RelayServerConfig;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::relay::Relay;

pub struct RelayServer {
    listener: TcpListener,
    relay: Relay,
    channel_capacity: usize,
    stats_interval: Option<Duration>,
}

impl RelayServer {
    /// Bind the listener described by `config`.
    pub async fn bind(config: &RelayServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Serve on an already-bound listener.
    pub fn from_listener(listener: TcpListener, config: &RelayServerConfig) -> Self {
        Self {
            listener,
            relay: Relay::default(),
            channel_capacity: config.channel_capacity.max(1),
            stats_interval: (config.stats_interval_secs > 0)
                .then(|| Duration::from_secs(config.stats_interval_secs)),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Accept connections forever.
    pub async fn run(self) {
        if let Some(period) = self.stats_interval {
            let registry = self.relay.registry().clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let rooms = registry.room_count().await;
                    let members = registry.member_count().await;
                    tracing::debug!(rooms, members, "Stats tick");
                }
            });
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let relay = self.relay.clone();
                    let capacity = self.channel_capacity;
                    tokio::spawn(async move {
                        match accept_async(stream).await {
                            Ok(ws) => handle_connection(ws, addr, relay, capacity).await,
                            Err(e) => {
                                tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
}
