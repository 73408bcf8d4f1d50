//! Error taxonomy for the media builder.
//!
//! Every fallible operation in this crate returns [`Result<T>`], a thin
//! alias over `std::result::Result<T, BuilderError>`. Nothing outside of
//! `#[cfg(test)]` code calls `.unwrap()`/`.expect()` on one of these.

use crate::builder::BuilderMode;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BuilderError>;

/// Error kinds produced by the port pool, SDP codec, `Builder`, and
/// `BuilderManager`.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    /// Surfaced by `BuilderManager::new` / `ManagerConfig::validate`.
    #[error("invalid configuration: {rule}")]
    ConfigInvalid { rule: String },

    /// The port pool has no free ports.
    #[error("port pool exhausted")]
    Exhausted,

    /// `max_concurrent_builders` has been reached.
    #[error("capacity exceeded: at most {limit} concurrent builders allowed")]
    CapacityExceeded { limit: usize },

    /// A builder with this session id already exists.
    #[error("duplicate session id: {session_id}")]
    Duplicate { session_id: String },

    /// No builder is registered under this session id.
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },

    /// The operation isn't valid in the builder's current mode.
    #[error("wrong state: expected {expected}, builder is {actual}")]
    WrongState {
        expected: &'static str,
        actual: &'static str,
    },

    /// SDP failed to parse, or was missing required fields.
    #[error("invalid SDP: {reason}")]
    SdpInvalid { reason: String },

    /// No payload type in the remote offer/answer is locally supported.
    #[error("no common codec")]
    NoCommonCodec,

    /// An answer's m-line count didn't match the offer's.
    #[error("m-line count mismatch: offered {offered}, answered {answered}")]
    MlineCountMismatch { offered: usize, answered: usize },

    /// The RTP transport factory failed to bind/connect.
    #[error("transport error: {source}")]
    TransportError {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The port pool was exhausted while materializing secondary streams.
    #[error("ports exhausted while materializing streams")]
    PortsExhausted,

    /// Operation attempted on a closed `Builder` or a shut-down `BuilderManager`.
    #[error("closed")]
    Closed,

    /// A negotiation step did not complete within its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The port pool rejected a release of a port it did not have on loan.
    #[error("port {port} was not allocated by this pool")]
    NotAllocated { port: u16 },

    /// The port pool rejected a release of a port outside its configured range.
    #[error("port {port} is out of range [{min}, {max}]")]
    OutOfRange { port: u16, min: u16, max: u16 },
}

impl BuilderError {
    pub fn config(rule: impl Into<String>) -> Self {
        Self::ConfigInvalid { rule: rule.into() }
    }

    pub fn sdp_invalid(reason: impl Into<String>) -> Self {
        Self::SdpInvalid {
            reason: reason.into(),
        }
    }

    pub fn wrong_state(expected: &'static str, actual: BuilderMode) -> Self {
        Self::WrongState {
            expected,
            actual: actual.as_str(),
        }
    }

    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::TransportError {
            source: Box::new(source),
        }
    }
}
