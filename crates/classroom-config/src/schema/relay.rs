use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayServerConfig {
    /// Address to bind the WebSocket listener on.
    pub bind: String,
    pub port: u16,
    /// Outbound queue length per connection.
    pub channel_capacity: usize,
    /// Seconds between room statistics log lines (0 disables).
    pub stats_interval_secs: u64,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            channel_capacity: 256,
            stats_interval_secs: 60,
        }
    }
}

impl RelayServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
