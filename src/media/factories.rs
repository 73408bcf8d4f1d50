//! External collaborator contracts.
//!
//! The packet engine, the RTP session layer, and the media-session layer
//! are all out of scope here; the `Builder` only ever talks to them
//! through these trait objects, injected by the host application. Using
//! `#[async_trait]` trait objects (`Arc<dyn ...>`) rather than generics
//! keeps `BuilderManager` from becoming generic over three type
//! parameters.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::Result;

/// A bound RTP/RTCP transport for one media stream.
#[async_trait]
pub trait RtpTransport: Send + Sync {
    fn local_addr(&self) -> SocketAddr;
    fn remote_addr(&self) -> SocketAddr;
    async fn close(&self) -> Result<()>;
}

/// An RTP session running over a transport.
#[async_trait]
pub trait RtpSession: Send + Sync {
    fn ssrc(&self) -> u32;
    fn payload_type(&self) -> u8;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// The media-session handle returned to callers for audio I/O, and held
/// by a `MediaStream` until the stream is torn down.
#[async_trait]
pub trait MediaSession: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Caller-supplied callbacks wired into a materialized media session.
///
/// Audio payloads are handed back as [`bytes::Bytes`] so the callback can
/// retain a zero-copy slice of the decoded frame rather than forcing a
/// fresh allocation per packet.
#[derive(Clone)]
pub struct MediaSessionCallbacks {
    pub on_audio_received: Arc<dyn Fn(Bytes, u8, u32, &str) + Send + Sync>,
    pub on_dtmf_received: Arc<dyn Fn(char, u32, &str) + Send + Sync>,
    pub on_media_error: Arc<dyn Fn(&crate::errors::BuilderError, &str) + Send + Sync>,
}

/// Parameters forwarded to [`MediaSessionFactory::create`], mirroring the
/// per-stream decisions the `Builder` has already made (ptime, direction,
/// DTMF) plus the manager-level defaults the session needs.
pub struct MediaSessionConfig {
    pub session_id: String,
    pub payload_type: u8,
    pub ptime: u32,
    pub direction: crate::sdp::Direction,
    pub dtmf_payload_type: Option<u8>,
    pub jitter_enabled: bool,
    pub rtcp_enabled: bool,
    /// `ManagerConfig::default_media_config`, forwarded verbatim. The core
    /// never interprets this — in particular it never installs a raw-packet
    /// handler on the caller's behalf, it only passes along whatever the
    /// caller put here (see `DESIGN.md`'s raw-packet handler note).
    pub media_config: serde_json::Value,
}

/// Creates a bound RTP transport once both endpoints' addresses are
/// known, avoiding the classic "bind with wrong remote" bug of
/// constructing a transport before negotiation completes.
#[async_trait]
pub trait RtpTransportFactory: Send + Sync {
    async fn create(
        &self,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        buffer_size: usize,
    ) -> Result<Arc<dyn RtpTransport>>;
}

/// Creates an RTP session bound to a transport.
#[async_trait]
pub trait RtpSessionFactory: Send + Sync {
    async fn create(
        &self,
        payload_type: u8,
        clock_rate: u32,
        transport: Arc<dyn RtpTransport>,
        source_description: &str,
    ) -> Result<Arc<dyn RtpSession>>;
}

/// Wraps an RTP session with the media-layer concerns (ptime, direction,
/// DTMF, callbacks) that carry decoded audio to and from the caller.
#[async_trait]
pub trait MediaSessionFactory: Send + Sync {
    async fn create(
        &self,
        config: MediaSessionConfig,
        rtp_session: Arc<dyn RtpSession>,
        callbacks: MediaSessionCallbacks,
    ) -> Result<Arc<dyn MediaSession>>;
}
