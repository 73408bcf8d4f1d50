//! Softphone media-plane negotiation engine: SDP offer/answer (RFC 3264),
//! RTP port pool management, and media-session wiring.
//!
//! The crate owns exactly one subsystem — negotiating a call's media
//! parameters and materializing the streams that carry it — and treats
//! the RTP/RTCP packet engine, the media codec/DTMF implementations, and
//! SIP signaling as external collaborators reached through the traits in
//! [`media::factories`].
//!
//! A host application constructs one [`manager::BuilderManager`] per
//! process (or per listening interface), injecting its own
//! [`media::RtpTransportFactory`], [`media::RtpSessionFactory`], and
//! [`media::MediaSessionFactory`]. Each call gets a
//! [`builder::Builder`], driven through either `create_offer` →
//! `process_answer` (UAC) or `process_offer` → `create_answer` (UAS).

pub mod builder;
pub mod config;
pub mod errors;
pub mod manager;
pub mod media;
pub mod port_pool;
pub mod sdp;

pub use builder::{Builder, BuilderMode, BuilderParams};
pub use config::ManagerConfig;
pub use errors::{BuilderError, Result};
pub use manager::{BuilderHandle, BuilderManager, ManagerStatistics};
pub use port_pool::{AllocationStrategy, PortPool};

/// Re-exports the types most callers need in one place.
pub mod prelude {
    pub use crate::builder::{Builder, BuilderMode};
    pub use crate::config::ManagerConfig;
    pub use crate::errors::{BuilderError, Result};
    pub use crate::manager::{BuilderHandle, BuilderManager, ManagerStatistics};
    pub use crate::media::{
        MediaSession, MediaSessionCallbacks, MediaSessionConfig, MediaSessionFactory,
        MediaStreamSnapshot, RtpSession, RtpSessionFactory, RtpTransport, RtpTransportFactory,
    };
    pub use crate::port_pool::{AllocationStrategy, PortPool};
    pub use crate::sdp::Direction;
}
