//! In-memory test doubles for the three external factory traits, shared
//! by the integration test suites.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rvoip_media_builder::prelude::*;

pub struct MemTransport {
    local: SocketAddr,
    remote: SocketAddr,
}

#[async_trait]
impl RtpTransport for MemTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }
    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MemRtpSession {
    ssrc: u32,
    payload_type: u8,
}

#[async_trait]
impl RtpSession for MemRtpSession {
    fn ssrc(&self) -> u32 {
        self.ssrc
    }
    fn payload_type(&self) -> u8 {
        self.payload_type
    }
    async fn start(&self) -> Result<()> {
        Ok(())
    }
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MemMediaSession;

#[async_trait]
impl MediaSession for MemMediaSession {
    async fn start(&self) -> Result<()> {
        Ok(())
    }
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemTransportFactory;

#[async_trait]
impl RtpTransportFactory for MemTransportFactory {
    async fn create(
        &self,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        _buffer_size: usize,
    ) -> Result<Arc<dyn RtpTransport>> {
        Ok(Arc::new(MemTransport {
            local: local_addr,
            remote: remote_addr,
        }))
    }
}

pub struct MemSessionFactory {
    next_ssrc: AtomicU32,
}

impl Default for MemSessionFactory {
    fn default() -> Self {
        Self {
            next_ssrc: AtomicU32::new(1),
        }
    }
}

#[async_trait]
impl RtpSessionFactory for MemSessionFactory {
    async fn create(
        &self,
        payload_type: u8,
        _clock_rate: u32,
        _transport: Arc<dyn RtpTransport>,
        _source_description: &str,
    ) -> Result<Arc<dyn RtpSession>> {
        let ssrc = self.next_ssrc.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemRtpSession { ssrc, payload_type }))
    }
}

#[derive(Default)]
pub struct MemMediaFactory {
    /// Every `media_config` this factory has seen, in call order — lets
    /// tests assert that `ManagerConfig::default_media_config` reaches
    /// the media-session factory unchanged.
    pub seen_media_configs: std::sync::Mutex<Vec<serde_json::Value>>,
}

#[async_trait]
impl MediaSessionFactory for MemMediaFactory {
    async fn create(
        &self,
        config: MediaSessionConfig,
        _rtp_session: Arc<dyn RtpSession>,
        _callbacks: MediaSessionCallbacks,
    ) -> Result<Arc<dyn MediaSession>> {
        self.seen_media_configs
            .lock()
            .unwrap()
            .push(config.media_config);
        Ok(Arc::new(MemMediaSession))
    }
}

pub fn noop_callbacks() -> MediaSessionCallbacks {
    MediaSessionCallbacks {
        on_audio_received: Arc::new(|_, _, _, _| {}),
        on_dtmf_received: Arc::new(|_, _, _| {}),
        on_media_error: Arc::new(|_, _| {}),
    }
}

/// Builds a `BuilderManager` wired to the in-memory test doubles.
pub fn test_manager(config: ManagerConfig) -> BuilderManager {
    test_manager_with_media_factory(config).0
}

/// Like [`test_manager`], but also hands back the `MemMediaFactory` so a
/// test can inspect what it was called with.
pub fn test_manager_with_media_factory(config: ManagerConfig) -> (BuilderManager, Arc<MemMediaFactory>) {
    let media_factory = Arc::new(MemMediaFactory::default());
    let manager = BuilderManager::new(
        config,
        Arc::new(MemTransportFactory),
        Arc::new(MemSessionFactory::default()),
        media_factory.clone(),
        noop_callbacks(),
    )
    .expect("valid test config");
    (manager, media_factory)
}
