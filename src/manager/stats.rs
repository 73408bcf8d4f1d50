//! Observable manager-wide counters.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

/// Snapshot returned by `BuilderManager::statistics()`.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatistics {
    pub active_builders: usize,
    pub total_builders_created: usize,
    pub ports_in_use: usize,
    pub available_ports: usize,
    pub session_timeouts: usize,
    pub last_cleanup_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// The mutable counters backing [`ManagerStatistics`]; all plain atomics
/// except the wall-clock cleanup timestamp, which a `parking_lot::Mutex`
/// protects since `DateTime<Utc>` has no lock-free update path.
#[derive(Default)]
pub(crate) struct Counters {
    total_created: AtomicUsize,
    session_timeouts: AtomicUsize,
    last_cleanup_time: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
}

impl Counters {
    pub fn record_created(&self) {
        self.total_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.session_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cleanup_tick(&self) {
        *self.last_cleanup_time.lock() = Some(chrono::Utc::now());
    }

    pub fn total_created(&self) -> usize {
        self.total_created.load(Ordering::Relaxed)
    }

    pub fn session_timeouts(&self) -> usize {
        self.session_timeouts.load(Ordering::Relaxed)
    }

    pub fn last_cleanup_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        *self.last_cleanup_time.lock()
    }
}
