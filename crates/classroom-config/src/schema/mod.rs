//! Configuration schema types.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod client;
mod logging;
mod media;
mod relay;

pub use client::*;
pub use logging::*;
pub use media::*;
pub use relay::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration shared by the relay server and classroom clients.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClassroomConfig {
    pub relay: RelayServerConfig,
    pub client: ClientConfig,
    pub media: MediaConfig,
    pub logging: LoggingConfig,
}
