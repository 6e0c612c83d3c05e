//! Client configuration surface (§6, §4.12).

use relay_rpc_wire::Credential;
use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::Client`] instance. All fields have defaults
/// matching §6's configuration surface table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub unique_client_instance_name: String,
    pub server_host_name: String,
    pub server_port: u16,
    pub connection_timeout_sec: u64,
    pub authentication_timeout_sec: u64,
    pub invocation_timeout_sec: u64,
    pub send_timeout_sec: u64,
    pub wait_time_for_goodbye_on_disconnect_ms: u64,
    pub keep_session_alive_interval_sec: u64,
    pub key_size_bits: usize,
    pub message_encryption: bool,
    pub credentials: Vec<Credential>,
    pub is_default: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            unique_client_instance_name: uuid::Uuid::new_v4().to_string(),
            server_host_name: "127.0.0.1".to_string(),
            server_port: 0,
            connection_timeout_sec: 120,
            authentication_timeout_sec: 30,
            invocation_timeout_sec: 0,
            send_timeout_sec: 30,
            wait_time_for_goodbye_on_disconnect_ms: 10_000,
            keep_session_alive_interval_sec: 20,
            key_size_bits: relay_rpc_crypto::rsa::DEFAULT_KEY_SIZE_BITS,
            message_encryption: true,
            credentials: Vec::new(),
            is_default: false,
        }
    }
}

/// Errors from validating a [`ClientConfig`] before it is used to build a
/// [`crate::Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientConfigError {
    #[error("key_size_bits must be at least {minimum}, got {actual}")]
    KeySizeTooSmall { actual: usize, minimum: usize },

    #[error("server_port must be nonzero")]
    MissingServerPort,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ClientConfigError> {
        if self.key_size_bits < relay_rpc_crypto::rsa::MIN_KEY_SIZE_BITS {
            return Err(ClientConfigError::KeySizeTooSmall {
                actual: self.key_size_bits,
                minimum: relay_rpc_crypto::rsa::MIN_KEY_SIZE_BITS,
            });
        }
        if self.server_port == 0 {
            return Err(ClientConfigError::MissingServerPort);
        }
        Ok(())
    }
}
