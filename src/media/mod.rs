//! Per-m-line media stream state, materialized once a `Builder` has
//! finished negotiating addresses and codecs for that stream.

pub mod factories;

use std::sync::Arc;

pub use factories::{
    MediaSession, MediaSessionCallbacks, MediaSessionConfig, MediaSessionFactory, RtpSession,
    RtpSessionFactory, RtpTransport, RtpTransportFactory,
};

use crate::sdp::Direction;

/// One materialized audio stream: the negotiated parameters for a single
/// m-line, plus the RTP transport/session and media session it owns.
///
/// `is_active ⇔ transport present ∧ session present`; construction only
/// completes once both are in hand, so a `MediaStream` that exists at
/// all is always active.
pub struct MediaStream {
    pub stream_id: String,
    pub media_type: String,
    pub media_index: usize,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    pub payload_type: u8,
    pub direction: Direction,
    pub label: Option<String>,
    pub(crate) transport: Arc<dyn RtpTransport>,
    pub(crate) rtp_session: Arc<dyn RtpSession>,
    pub(crate) media_session: Arc<dyn MediaSession>,
}

impl MediaStream {
    pub fn is_active(&self) -> bool {
        true
    }

    pub fn is_send_enabled(&self) -> bool {
        self.direction.is_send_enabled()
    }

    pub fn is_recv_enabled(&self) -> bool {
        self.direction.is_recv_enabled()
    }

    /// A read-only value-type snapshot, safe to hold across an `.await`
    /// without retaining the `Builder`'s internal lock.
    pub fn snapshot(&self) -> MediaStreamSnapshot {
        MediaStreamSnapshot {
            stream_id: self.stream_id.clone(),
            media_type: self.media_type.clone(),
            media_index: self.media_index,
            local_port: self.local_port,
            remote_host: self.remote_host.clone(),
            remote_port: self.remote_port,
            payload_type: self.payload_type,
            direction: self.direction,
            label: self.label.clone(),
            is_active: self.is_active(),
        }
    }
}

/// Read-only, `Clone`-able view of a [`MediaStream`], returned by
/// `Builder::streams()`. Carries no reference to the underlying
/// transport/session — callers reach those only through
/// `Builder::media_session()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamSnapshot {
    pub stream_id: String,
    pub media_type: String,
    pub media_index: usize,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    pub payload_type: u8,
    pub direction: Direction,
    pub label: Option<String>,
    pub is_active: bool,
}

impl MediaStreamSnapshot {
    pub fn is_send_enabled(&self) -> bool {
        self.direction.is_send_enabled()
    }

    pub fn is_recv_enabled(&self) -> bool {
        self.direction.is_recv_enabled()
    }
}
