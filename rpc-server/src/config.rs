//! Server configuration surface (§6, §4.12).

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::Server`] instance. All fields have defaults
/// matching §6's configuration surface table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub unique_server_instance_name: String,
    pub network_host: String,
    pub network_port: u16,
    pub key_size_bits: usize,
    pub message_encryption: bool,
    pub authentication_required: bool,
    pub inactive_session_sweep_interval_sec: u64,
    pub maximum_session_inactivity_time_minutes: u64,
    pub is_default: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            unique_server_instance_name: uuid::Uuid::new_v4().to_string(),
            network_host: "0.0.0.0".to_string(),
            network_port: 0,
            key_size_bits: relay_rpc_crypto::rsa::DEFAULT_KEY_SIZE_BITS,
            message_encryption: true,
            authentication_required: false,
            inactive_session_sweep_interval_sec: 60,
            maximum_session_inactivity_time_minutes: 30,
            is_default: false,
        }
    }
}

/// Errors from validating a [`ServerConfig`] before it is used to build a
/// [`crate::Server`].
#[derive(Debug, thiserror::Error)]
pub enum ServerConfigError {
    #[error("key_size_bits must be at least {minimum}, got {actual}")]
    KeySizeTooSmall { actual: usize, minimum: usize },
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ServerConfigError> {
        if self.key_size_bits < relay_rpc_crypto::rsa::MIN_KEY_SIZE_BITS {
            return Err(ServerConfigError::KeySizeTooSmall {
                actual: self.key_size_bits,
                minimum: relay_rpc_crypto::rsa::MIN_KEY_SIZE_BITS,
            });
        }
        Ok(())
    }
}
