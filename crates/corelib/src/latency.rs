//! Per-host latency estimation.
//!
//! Each [`LatencyTracker`] keeps a time-decayed running average of request
//! round-trip times. Updates arrive from many I/O completion threads at
//! once, so writers are serialized, but not with one mutex per host:
//! trackers share a small process-wide pool of cache-padded locks selected by
//! hashing the tracker's address. Readers can take a lock-free approximate
//! copy or a consistent one under the writer's lock.
//!
//! # Decay
//!
//! With `x = elapsed / scale` the previous average is weighted by
//! `w(x) = ln(1 + x) / x` and the new sample by `1 - w(x)`. `w` falls
//! strictly from 1 (at `x -> 0`) towards 0 (as `x -> inf`): samples arriving
//! back-to-back barely move the average, while a sample arriving after a long
//! quiet period mostly replaces it.

use crossbeam::utils::CachePadded;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use xxhash_rust::xxh3::xxh3_64;

/// Average value meaning "not enough measurements yet".
pub const UNKNOWN_AVERAGE: i64 = -1;

const LOCK_POOL_SIZE: usize = 64;

static LATENCY_LOCKS: Lazy<LockPool> = Lazy::new(LockPool::new);

static CLOCK_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds on a process-wide monotonic clock.
pub fn monotonic_now_ns() -> u64 {
    u64::try_from(CLOCK_EPOCH.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Weight given to the previous average after `scaled_elapsed` time units.
pub fn decay_weight(scaled_elapsed: f64) -> f64 {
    scaled_elapsed.ln_1p() / scaled_elapsed
}

/// Table of lightweight locks shared by every tracker in the process.
struct LockPool {
    slots: Box<[CachePadded<Mutex<()>>]>,
}

impl LockPool {
    fn new() -> Self {
        let slots = (0..LOCK_POOL_SIZE)
            .map(|_| CachePadded::new(Mutex::new(())))
            .collect();
        Self { slots }
    }

    fn lock_for<T>(&self, object: &T) -> MutexGuard<'_, ()> {
        let key = object as *const T as usize;
        let slot = xxh3_64(&key.to_ne_bytes()) as usize % self.slots.len();
        self.slots[slot].lock()
    }
}

/// Tunables for latency tracking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencySettings {
    /// Time unit the elapsed time between samples is scaled by, in ms.
    pub scale_ms: u64,
    /// Samples to observe before the average is considered meaningful.
    pub min_measured: u64,
}

impl LatencySettings {
    pub fn scale_ns(&self) -> u64 {
        Duration::from_millis(self.scale_ms)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

impl Default for LatencySettings {
    fn default() -> Self {
        Self {
            scale_ms: 100,
            min_measured: 50,
        }
    }
}

/// Point-in-time state of a tracker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimestampedAverage {
    /// Average latency in ns, or [`UNKNOWN_AVERAGE`].
    pub average: i64,
    pub num_measured: u64,
    /// Monotonic ns of the last applied update.
    pub timestamp: u64,
}

impl TimestampedAverage {
    pub fn known_average(&self) -> Option<u64> {
        u64::try_from(self.average).ok()
    }
}

impl Default for TimestampedAverage {
    fn default() -> Self {
        Self {
            average: UNKNOWN_AVERAGE,
            num_measured: 0,
            timestamp: 0,
        }
    }
}

/// Concurrent time-decayed latency average for one host.
#[derive(Debug)]
pub struct LatencyTracker {
    scale_ns: u64,
    threshold_to_account: u64,
    average: AtomicI64,
    num_measured: AtomicU64,
    timestamp: AtomicU64,
}

impl LatencyTracker {
    pub fn new(scale_ns: u64, threshold_to_account: u64) -> Self {
        Self {
            scale_ns: scale_ns.max(1),
            threshold_to_account,
            average: AtomicI64::new(UNKNOWN_AVERAGE),
            num_measured: AtomicU64::new(0),
            timestamp: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &LatencySettings) -> Self {
        Self::new(settings.scale_ns(), settings.min_measured)
    }

    pub fn threshold_to_account(&self) -> u64 {
        self.threshold_to_account
    }

    /// Record a measured round trip, timestamped now.
    pub fn record(&self, latency: Duration) -> bool {
        let latency_ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.record_at(latency_ns, monotonic_now_ns())
    }

    /// Record a measured round trip taken at `now_ns`.
    ///
    /// Returns `false` when the update was dropped because the clock did not
    /// advance past the last applied update.
    pub fn record_at(&self, latency_ns: u64, now_ns: u64) -> bool {
        let _guard = LATENCY_LOCKS.lock_for(self);
        let previous = self.load();
        let latency = i64::try_from(latency_ns).unwrap_or(i64::MAX);

        let average = if previous.num_measured < self.threshold_to_account {
            UNKNOWN_AVERAGE
        } else if previous.average < 0 {
            latency
        } else {
            let elapsed = i128::from(now_ns) - i128::from(previous.timestamp);
            if elapsed <= 0 {
                tracing::trace!(now_ns, last = previous.timestamp, "dropping latency update");
                metrics::counter!("latency.updates_dropped").increment(1);
                return false;
            }

            let weight = decay_weight(elapsed as f64 / self.scale_ns as f64);
            ((1.0 - weight) * latency as f64 + weight * previous.average as f64) as i64
        };

        self.average.store(average, Ordering::Relaxed);
        self.num_measured
            .store(previous.num_measured + 1, Ordering::Relaxed);
        self.timestamp.store(now_ns, Ordering::Relaxed);
        true
    }

    /// Lock-free copy; fields may come from different updates.
    pub fn current(&self) -> TimestampedAverage {
        self.load()
    }

    /// Consistent copy taken under the writers' lock.
    pub fn snapshot(&self) -> TimestampedAverage {
        let _guard = LATENCY_LOCKS.lock_for(self);
        self.load()
    }

    fn load(&self) -> TimestampedAverage {
        TimestampedAverage {
            average: self.average.load(Ordering::Relaxed),
            num_measured: self.num_measured.load(Ordering::Relaxed),
            timestamp: self.timestamp.load(Ordering::Relaxed),
        }
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::from_settings(&LatencySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const MS: u64 = 1_000_000;

    #[test]
    fn test_unknown_until_threshold() {
        let tracker = LatencyTracker::new(100 * MS, 3);
        for i in 1..=3 {
            assert!(tracker.record_at(5 * MS, i * MS));
            let state = tracker.snapshot();
            assert_eq!(state.average, UNKNOWN_AVERAGE);
            assert_eq!(state.known_average(), None);
            assert_eq!(state.num_measured, i);
        }

        // First sample past the threshold seeds the average.
        assert!(tracker.record_at(7 * MS, 4 * MS));
        let state = tracker.snapshot();
        assert_eq!(state.known_average(), Some(7 * MS));
        assert_eq!(state.num_measured, 4);
        assert_eq!(state.timestamp, 4 * MS);
    }

    #[test]
    fn test_identical_samples_converge() {
        let tracker = LatencyTracker::new(100 * MS, 2);
        let latency = 3 * MS;
        for i in 1..=500 {
            tracker.record_at(latency, i * 1_000);
        }
        let average = tracker.snapshot().known_average().unwrap();
        assert!(average.abs_diff(latency) <= 1, "average {average}");
    }

    #[test]
    fn test_sustained_shift_is_followed() {
        let tracker = LatencyTracker::new(100 * MS, 0);
        tracker.record_at(50 * MS, 0);
        let mut now = 0;
        for _ in 0..200 {
            now += 10 * MS;
            tracker.record_at(MS, now);
        }
        let average = tracker.snapshot().known_average().unwrap();
        assert!(average < 2 * MS, "average {average}");
    }

    #[test]
    fn test_non_advancing_clock_is_noop() {
        let tracker = LatencyTracker::new(100 * MS, 0);
        assert!(tracker.record_at(10 * MS, 100));
        let before = tracker.snapshot();

        assert!(!tracker.record_at(99 * MS, 100));
        assert_eq!(tracker.snapshot(), before);

        assert!(!tracker.record_at(99 * MS, 50));
        assert_eq!(tracker.snapshot(), before);

        assert!(tracker.record_at(10 * MS, 101));
        assert_eq!(tracker.snapshot().num_measured, 2);
    }

    #[test]
    fn test_rapid_sample_barely_moves_average() {
        let tracker = LatencyTracker::new(100 * MS, 0);
        tracker.record_at(1_000, 0);
        tracker.record_at(0, 1);
        assert!(tracker.snapshot().average >= 999);
    }

    #[test]
    fn test_stale_average_is_discounted() {
        let tracker = LatencyTracker::new(100 * MS, 0);
        tracker.record_at(1_000_000, 0);
        // 1000 scale units later: weight = ln(1001) / 1000 ~= 0.0069.
        tracker.record_at(0, 1_000 * 100 * MS);
        let average = tracker.snapshot().average;
        assert!((6_000..8_000).contains(&average), "average {average}");
    }

    #[test]
    fn test_decay_weight_bounds_and_monotonicity() {
        let mut previous = 1.0;
        for exp in -9..=9 {
            let x = 10f64.powi(exp);
            let weight = decay_weight(x);
            assert!(weight > 0.0 && weight < 1.0, "w({x}) = {weight}");
            assert!(weight < previous, "w not decreasing at {x}");
            previous = weight;
        }
        assert!((decay_weight(1e-12) - 1.0).abs() < 1e-9);
        assert!(decay_weight(1e12) < 1e-10);
        assert!((decay_weight(1.0) - std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = LatencySettings::default();
        assert_eq!(settings.scale_ns(), 100 * MS);
        let tracker = LatencyTracker::from_settings(&settings);
        assert_eq!(tracker.threshold_to_account(), 50);
    }

    #[test]
    fn test_concurrent_records() {
        let tracker = Arc::new(LatencyTracker::new(MS, 0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    let mut applied = 0u64;
                    for _ in 0..1_000 {
                        if tracker.record(Duration::from_micros(250)) {
                            applied += 1;
                        }
                    }
                    applied
                })
            })
            .collect();
        let applied: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let state = tracker.snapshot();
        assert_eq!(state.num_measured, applied);
        let average = state.known_average().unwrap();
        assert!(average.abs_diff(250_000) <= 1, "average {average}");
    }
}
