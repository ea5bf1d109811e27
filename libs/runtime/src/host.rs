//! Glue between [`RuntimeConfig`] and the runtime
//!
//! Used by the host binary; embedders with their own configuration can build
//! [`ConnectionSettings`] directly.

use crate::error::Result;
use network::{ConnectionSettings, StreamAddress};
use runtime_config::RuntimeConfig;

pub fn connection_settings(config: &RuntimeConfig) -> ConnectionSettings {
    ConnectionSettings {
        runtime_name: config.runtime_name.clone(),
        host_id: config.host_id.clone(),
        user_id: config.user_id.clone(),
        device_id: config.device_id.clone(),
        handshake_timeout: config.handshake_timeout(),
        discovery_timeout: config.discovery_timeout(),
        max_message_size: config.max_message_size,
    }
}

pub fn middleware_address(config: &RuntimeConfig) -> Result<StreamAddress> {
    Ok(config.socket_address.parse()?)
}
