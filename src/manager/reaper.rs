//! Idle-session reaper: wakes on `cleanup_interval`, snapshots the
//! registry, drops the lock, then closes whatever has been quiet longer
//! than `session_timeout`.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::Inner;

pub(super) fn spawn(weak: Weak<Inner>, cleanup_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_interval);
        ticker.tick().await; // interval's first tick fires immediately; consume it up front

        loop {
            let inner = match weak.upgrade() {
                Some(inner) => inner,
                None => return,
            };

            tokio::select! {
                _ = ticker.tick() => {
                    run_once(&inner).await;
                }
                _ = inner.reaper_shutdown.notified() => return,
            }
        }
    })
}

async fn run_once(inner: &Inner) {
    let snapshot: Vec<(String, std::sync::Arc<crate::builder::Builder>)> = {
        let registry = inner.registry.read().await;
        registry.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    };
    inner.counters.record_cleanup_tick();

    for (session_id, builder) in snapshot {
        if builder.last_activity().elapsed() <= inner.config.session_timeout {
            continue;
        }
        match super::release_internal(inner, &session_id).await {
            Ok(()) => {
                inner.counters.record_timeout();
                tracing::info!(session_id = %session_id, "reaper released idle builder");
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "reaper failed to release idle builder");
            }
        }
    }
}
