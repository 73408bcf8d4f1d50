//! Registry and factory for `Builder`s: owns the shared `PortPool`,
//! enforces `max_concurrent_builders`, and runs the idle reaper.

mod reaper;
mod stats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;

pub use stats::ManagerStatistics;
use stats::Counters;

use crate::builder::{Builder, BuilderParams};
use crate::config::ManagerConfig;
use crate::errors::{BuilderError, Result};
use crate::media::{MediaSessionCallbacks, MediaSessionFactory, RtpSessionFactory, RtpTransportFactory};
use crate::port_pool::PortPool;

/// A live `Builder`, as handed back by `create_builder`/`get_builder`.
pub type BuilderHandle = Arc<Builder>;

pub(crate) struct Inner {
    config: ManagerConfig,
    port_pool: Arc<PortPool>,
    registry: RwLock<IndexMap<String, Arc<Builder>>>,
    counters: Counters,
    shutdown: AtomicBool,
    reaper_shutdown: Notify,
    reaper_handle: StdMutex<Option<JoinHandle<()>>>,
    transport_factory: Arc<dyn RtpTransportFactory>,
    session_factory: Arc<dyn RtpSessionFactory>,
    media_factory: Arc<dyn MediaSessionFactory>,
    callbacks: MediaSessionCallbacks,
}

/// Factory and registry of `Builder`s, keyed by caller-supplied session
/// id. Cheap to clone — every clone shares the same registry, pool, and
/// reaper task.
#[derive(Clone)]
pub struct BuilderManager {
    inner: Arc<Inner>,
}

impl BuilderManager {
    /// Validates `config`, builds the port pool, and starts the reaper.
    pub fn new(
        config: ManagerConfig,
        transport_factory: Arc<dyn RtpTransportFactory>,
        session_factory: Arc<dyn RtpSessionFactory>,
        media_factory: Arc<dyn MediaSessionFactory>,
        callbacks: MediaSessionCallbacks,
    ) -> Result<Self> {
        config.validate()?;
        let port_pool = Arc::new(PortPool::new(
            config.min_port,
            config.max_port,
            config.port_step,
            config.port_allocation_strategy,
        ));
        let cleanup_interval = config.cleanup_interval;

        let inner = Arc::new(Inner {
            config,
            port_pool,
            registry: RwLock::new(IndexMap::new()),
            counters: Counters::default(),
            shutdown: AtomicBool::new(false),
            reaper_shutdown: Notify::new(),
            reaper_handle: StdMutex::new(None),
            transport_factory,
            session_factory,
            media_factory,
            callbacks,
        });

        let handle = reaper::spawn(Arc::downgrade(&inner), cleanup_interval);
        *inner.reaper_handle.lock().expect("reaper handle mutex poisoned") = Some(handle);

        tracing::info!(
            min_port = inner.config.min_port,
            max_port = inner.config.max_port,
            max_concurrent_builders = inner.config.max_concurrent_builders,
            "builder manager started"
        );

        Ok(Self { inner })
    }

    /// Acquires the primary port and registers a new `Builder` under
    /// `session_id`.
    pub async fn create_builder(&self, session_id: impl Into<String>) -> Result<BuilderHandle> {
        self.create_builder_with_deadline(session_id, None).await
    }

    /// Like [`BuilderManager::create_builder`], but bounds every
    /// negotiation step the returned `Builder` takes to `deadline`.
    /// Negotiation beyond that deadline fails with `DeadlineExceeded`
    /// instead of hanging on a stalled external factory call.
    pub async fn create_builder_with_deadline(
        &self,
        session_id: impl Into<String>,
        deadline: Option<Duration>,
    ) -> Result<BuilderHandle> {
        let session_id = session_id.into();
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(BuilderError::Closed);
        }

        let mut registry = self.inner.registry.write().await;
        if registry.contains_key(&session_id) {
            return Err(BuilderError::Duplicate { session_id });
        }
        if registry.len() >= self.inner.config.max_concurrent_builders {
            return Err(BuilderError::CapacityExceeded {
                limit: self.inner.config.max_concurrent_builders,
            });
        }

        let primary_port = self.inner.port_pool.acquire()?;
        let builder = Arc::new(Builder::new(BuilderParams {
            session_id: session_id.clone(),
            local_host: self.inner.config.local_host.clone(),
            primary_port,
            payload_types: self.inner.config.default_payload_types.clone(),
            ptime: self.inner.config.default_ptime,
            dtmf_payload_type: self
                .inner
                .config
                .dtmf_enabled
                .then_some(self.inner.config.dtmf_payload_type),
            direction: self.inner.config.default_direction,
            transport_buffer_size: self.inner.config.transport_buffer_size,
            jitter_enabled: self.inner.config.default_jitter_enabled,
            rtcp_enabled: self.inner.config.default_rtcp_enabled,
            session_name: self.inner.config.session_name.clone(),
            user_agent: self.inner.config.user_agent.clone(),
            default_media_config: self.inner.config.default_media_config.clone(),
            deadline,
            port_pool: self.inner.port_pool.clone(),
            transport_factory: self.inner.transport_factory.clone(),
            session_factory: self.inner.session_factory.clone(),
            media_factory: self.inner.media_factory.clone(),
            callbacks: self.inner.callbacks.clone(),
        }));

        registry.insert(session_id.clone(), builder.clone());
        self.inner.counters.record_created();
        tracing::info!(session_id = %session_id, primary_port, "builder created");
        Ok(builder)
    }

    /// Removes `session_id` from the registry, closes it, and releases
    /// its primary port.
    pub async fn release_builder(&self, session_id: &str) -> Result<()> {
        release_internal(&self.inner, session_id).await
    }

    /// Returns the live handle for `session_id`, bumping its
    /// last-activity timestamp.
    pub async fn get_builder(&self, session_id: &str) -> Option<BuilderHandle> {
        let registry = self.inner.registry.read().await;
        let builder = registry.get(session_id)?.clone();
        builder.touch();
        Some(builder)
    }

    /// Snapshot of live session ids, in creation order.
    pub async fn active_builders(&self) -> Vec<String> {
        self.inner.registry.read().await.keys().cloned().collect()
    }

    pub fn available_ports(&self) -> usize {
        self.inner.port_pool.available()
    }

    pub async fn statistics(&self) -> ManagerStatistics {
        let active_builders = self.inner.registry.read().await.len();
        ManagerStatistics {
            active_builders,
            total_builders_created: self.inner.counters.total_created(),
            ports_in_use: self.inner.port_pool.in_use(),
            available_ports: self.inner.port_pool.available(),
            session_timeouts: self.inner.counters.session_timeouts(),
            last_cleanup_time: self.inner.counters.last_cleanup_time(),
        }
    }

    /// Stops the reaper, closes every live builder, and empties the
    /// registry. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.reaper_shutdown.notify_waiters();
        let reaper_handle = self
            .inner
            .reaper_handle
            .lock()
            .expect("reaper handle mutex poisoned")
            .take();
        if let Some(handle) = reaper_handle {
            let _ = handle.await;
        }

        let drained: Vec<(String, Arc<Builder>)> = {
            let mut registry = self.inner.registry.write().await;
            registry.drain(..).collect()
        };
        for (session_id, builder) in drained {
            if let Err(e) = builder.close().await {
                tracing::warn!(session_id = %session_id, error = %e, "error closing builder during shutdown");
            }
            if let Err(e) = self.inner.port_pool.release(builder.primary_port()) {
                tracing::warn!(session_id = %session_id, error = %e, "error releasing primary port during shutdown");
            }
        }
        tracing::info!("builder manager shut down");
        Ok(())
    }
}

/// Shared by `release_builder` and the reaper: remove from the registry,
/// close the builder, release its primary port.
pub(crate) async fn release_internal(inner: &Inner, session_id: &str) -> Result<()> {
    let builder = {
        let mut registry = inner.registry.write().await;
        registry
            .shift_remove(session_id)
            .ok_or_else(|| BuilderError::NotFound {
                session_id: session_id.to_string(),
            })?
    };
    let _ = builder.close().await;
    inner.port_pool.release(builder.primary_port())?;
    Ok(())
}
