//! Bounded pool of even-numbered RTP ports, shared by every `Builder` a
//! `BuilderManager` owns.
//!
//! All bookkeeping is plain in-memory set arithmetic, so a single
//! `parking_lot::Mutex` serializes `acquire`/`release`/`available` without
//! ever being held across an `.await` — contention is low because
//! acquisition only happens at `Builder` creation and during answer
//! materialization (see `builder::materialize`).

use std::collections::{BTreeSet, HashSet};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::errors::{BuilderError, Result};

/// How free ports are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStrategy {
    /// Always returns the smallest free port. Releases re-insert in
    /// sorted order, so a pool driven purely by acquire/release pairs is
    /// a deterministic FIFO over the configured range.
    Sequential,
    /// Returns a uniformly-chosen free port. Order is not preserved.
    Random,
}

enum FreeSet {
    Sequential(BTreeSet<u16>),
    Random(Vec<u16>, StdRng),
}

/// A bounded, thread-safe pool of even ports in `[min, max]`.
pub struct PortPool {
    min: u16,
    max: u16,
    step: u16,
    strategy: AllocationStrategy,
    inner: Mutex<Inner>,
}

struct Inner {
    free: FreeSet,
    allocated: HashSet<u16>,
}

impl PortPool {
    /// Builds a pool covering every `min + k*step` up to `max`, inclusive.
    ///
    /// For `AllocationStrategy::Random` the free list is shuffled once,
    /// using a generator seeded at construction time (an injectable seed
    /// is used by tests that need deterministic "randomness"; production
    /// callers get one seeded from the OS).
    pub fn new(min: u16, max: u16, step: u16, strategy: AllocationStrategy) -> Self {
        Self::with_seed(min, max, step, strategy, rand::random())
    }

    /// Like [`PortPool::new`], but with an explicit PRNG seed — used by
    /// tests that need the `Random` strategy to be reproducible.
    pub fn with_seed(
        min: u16,
        max: u16,
        step: u16,
        strategy: AllocationStrategy,
        seed: u64,
    ) -> Self {
        let ports: Vec<u16> = (min..=max).step_by(step as usize).collect();
        let free = match strategy {
            AllocationStrategy::Sequential => FreeSet::Sequential(ports.into_iter().collect()),
            AllocationStrategy::Random => {
                use rand::seq::SliceRandom;
                let mut rng = StdRng::seed_from_u64(seed);
                let mut ports = ports;
                ports.shuffle(&mut rng);
                FreeSet::Random(ports, rng)
            }
        };
        Self {
            min,
            max,
            step,
            strategy,
            inner: Mutex::new(Inner {
                free,
                allocated: HashSet::new(),
            }),
        }
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    /// Total number of ports the pool was constructed to manage.
    pub fn capacity(&self) -> usize {
        ((self.max - self.min) / self.step) as usize + 1
    }

    /// Removes and returns one free port, marking it allocated.
    pub fn acquire(&self) -> Result<u16> {
        let mut inner = self.inner.lock();
        let port = match &mut inner.free {
            FreeSet::Sequential(set) => set.iter().next().copied(),
            FreeSet::Random(vec, rng) => {
                if vec.is_empty() {
                    None
                } else {
                    use rand::Rng;
                    let idx = rng.gen_range(0..vec.len());
                    Some(vec.swap_remove(idx))
                }
            }
        };
        let port = port.ok_or(BuilderError::Exhausted)?;
        if let FreeSet::Sequential(set) = &mut inner.free {
            set.remove(&port);
        }
        inner.allocated.insert(port);
        Ok(port)
    }

    /// Returns a previously acquired port to the pool.
    ///
    /// Rejects ports outside the configured range or not currently on
    /// loan from this pool — an error the caller can observe, never
    /// silently ignored.
    pub fn release(&self, port: u16) -> Result<()> {
        if port < self.min || port > self.max || (port - self.min) % self.step != 0 {
            return Err(BuilderError::OutOfRange {
                port,
                min: self.min,
                max: self.max,
            });
        }
        let mut inner = self.inner.lock();
        if !inner.allocated.remove(&port) {
            return Err(BuilderError::NotAllocated { port });
        }
        match &mut inner.free {
            FreeSet::Sequential(set) => {
                set.insert(port);
            }
            FreeSet::Random(vec, _) => vec.push(port),
        }
        Ok(())
    }

    /// Number of ports currently free.
    pub fn available(&self) -> usize {
        let inner = self.inner.lock();
        match &inner.free {
            FreeSet::Sequential(set) => set.len(),
            FreeSet::Random(vec, _) => vec.len(),
        }
    }

    /// Number of ports currently on loan.
    pub fn in_use(&self) -> usize {
        self.inner.lock().allocated.len()
    }
}
