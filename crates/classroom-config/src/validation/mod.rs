//! Configuration validation.
//!
//! Each section is checked independently and every problem is collected
//! into a single `ConfigError`.

mod helpers;


use crate::schema::ClassroomConfig;
use classroom_common::ConfigError;

use helpers::validate_range;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &ClassroomConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_relay(&mut errors, config);
    validate_client(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_relay(errors: &mut Vec<String>, config: &ClassroomConfig) {
    if config.relay.bind.trim().is_empty() {
        errors.push("relay.bind must not be empty".into());
    }
    validate_range(errors, "relay.port", config.relay.port.into(), 1, 65535);
    validate_range(
        errors,
        "relay.channel_capacity",
        config.relay.channel_capacity as u64,
        1,
        65536,
    );
}

fn validate_client(errors: &mut Vec<String>, config: &ClassroomConfig) {
    let url = &config.client.url;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        errors.push(format!("client.url = {url:?} must start with ws:// or wss://"));
    }
    validate_range(
        errors,
        "client.connect_timeout_secs",
        config.client.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "client.reconnect_delay_secs",
        config.client.reconnect_delay_secs,
        1,
        60,
    );
    if config.client.max_reconnect_delay_secs < config.client.reconnect_delay_secs {
        errors.push(format!(
            "client.max_reconnect_delay_secs = {} is below client.reconnect_delay_secs = {}",
            config.client.max_reconnect_delay_secs, config.client.reconnect_delay_secs
        ));
    }
    for server in &config.client.ice_servers {
        if !["stun:", "turn:", "turns:"].iter().any(|p| server.starts_with(p)) {
            errors.push(format!(
                "client.ice_servers entry {server:?} must start with stun:, turn: or turns:"
            ));
        }
    }
}
