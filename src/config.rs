//! Manager configuration: the typed option set a `BuilderManager` is
//! constructed from, plus the validation rules `BuilderManager::new`
//! runs before doing anything else.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BuilderError, Result};
use crate::port_pool::AllocationStrategy;
use crate::sdp::Direction;

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

fn default_min_port() -> u16 {
    10000
}

fn default_max_port() -> u16 {
    20000
}

fn default_max_concurrent_builders() -> usize {
    500
}

fn default_port_allocation_strategy() -> AllocationStrategy {
    AllocationStrategy::Sequential
}

fn default_port_step() -> u16 {
    2
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_port_release_delay() -> Duration {
    Duration::from_millis(0)
}

fn default_payload_types() -> Vec<u8> {
    vec![0, 8]
}

fn default_ptime() -> u32 {
    20
}

fn default_dtmf_payload_type() -> u8 {
    101
}

fn default_true() -> bool {
    true
}

fn default_direction() -> Direction {
    Direction::SendRecv
}

fn default_transport_buffer_size() -> usize {
    4096
}

fn default_session_name() -> String {
    "media-builder".to_string()
}

fn default_user_agent() -> String {
    "rvoip-media-builder".to_string()
}

/// Typed configuration for a `BuilderManager`.
///
/// Every field carries a `serde(default = ...)` so a caller can
/// deserialize a partial JSON/TOML document and get sane values for
/// everything they didn't specify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_local_host")]
    pub local_host: String,

    #[serde(default = "default_min_port")]
    pub min_port: u16,

    #[serde(default = "default_max_port")]
    pub max_port: u16,

    #[serde(default = "default_max_concurrent_builders")]
    pub max_concurrent_builders: usize,

    #[serde(default = "default_port_allocation_strategy")]
    pub port_allocation_strategy: AllocationStrategy,

    #[serde(default = "default_port_step")]
    pub port_step: u16,

    #[serde(default = "default_session_timeout")]
    pub session_timeout: Duration,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: Duration,

    #[serde(default = "default_port_release_delay")]
    pub port_release_delay: Duration,

    #[serde(default = "default_payload_types")]
    pub default_payload_types: Vec<u8>,

    #[serde(default = "default_ptime")]
    pub default_ptime: u32,

    /// Whether in-band DTMF (RFC 4733) is offered/answered by default.
    #[serde(default = "default_true")]
    pub dtmf_enabled: bool,

    /// Payload type used for `telephone-event` when `dtmf_enabled`.
    #[serde(default = "default_dtmf_payload_type")]
    pub dtmf_payload_type: u8,

    #[serde(default = "default_true")]
    pub default_jitter_enabled: bool,

    #[serde(default = "default_true")]
    pub default_rtcp_enabled: bool,

    #[serde(default = "default_direction")]
    pub default_direction: Direction,

    #[serde(default = "default_transport_buffer_size")]
    pub transport_buffer_size: usize,

    #[serde(default = "default_session_name")]
    pub session_name: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Opaque, forwarded verbatim to the media-session factory.
    #[serde(default)]
    pub default_media_config: serde_json::Value,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            local_host: default_local_host(),
            min_port: default_min_port(),
            max_port: default_max_port(),
            max_concurrent_builders: default_max_concurrent_builders(),
            port_allocation_strategy: default_port_allocation_strategy(),
            port_step: default_port_step(),
            session_timeout: default_session_timeout(),
            cleanup_interval: default_cleanup_interval(),
            port_release_delay: default_port_release_delay(),
            default_payload_types: default_payload_types(),
            default_ptime: default_ptime(),
            dtmf_enabled: default_true(),
            dtmf_payload_type: default_dtmf_payload_type(),
            default_jitter_enabled: default_true(),
            default_rtcp_enabled: default_true(),
            default_direction: default_direction(),
            transport_buffer_size: default_transport_buffer_size(),
            session_name: default_session_name(),
            user_agent: default_user_agent(),
            default_media_config: serde_json::Value::Null,
        }
    }
}

impl ManagerConfig {
    /// Runs every validation rule in order, returning the first violated
    /// rule.
    pub fn validate(&self) -> Result<()> {
        if self.local_host.is_empty() {
            return Err(BuilderError::config("local_host must not be empty"));
        }
        if self.min_port >= self.max_port {
            return Err(BuilderError::config("min_port must be less than max_port"));
        }
        if self.min_port % 2 != 0 || self.max_port % 2 != 0 {
            return Err(BuilderError::config("min_port and max_port must both be even"));
        }
        if self.max_concurrent_builders == 0 {
            return Err(BuilderError::config("max_concurrent_builders must be positive"));
        }
        if self.port_step == 0 {
            return Err(BuilderError::config("port_step must be positive"));
        }
        if self.default_payload_types.is_empty() {
            return Err(BuilderError::config("default_payload_types must not be empty"));
        }
        let pool_capacity =
            ((self.max_port - self.min_port) / self.port_step) as usize + 1;
        if pool_capacity < self.max_concurrent_builders {
            return Err(BuilderError::config(
                "port range too small for max_concurrent_builders",
            ));
        }
        Ok(())
    }
}
