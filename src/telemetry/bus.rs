//! Lock-light broadcast of the latest [`TelemetrySnapshot`].
//!
//! Readers never block the publisher: the latest snapshot lives behind an
//! atomic pointer swap, and subscriber callbacks are copied out of the
//! registry before being invoked so a slow callback cannot hold the lock.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use tracing::warn;

use super::snapshot::TelemetrySnapshot;

/// Callback invoked with every published snapshot.
pub type SnapshotCallback = Arc<dyn Fn(Arc<TelemetrySnapshot>) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: SnapshotCallback,
}

/// Single-producer, multi-reader snapshot bus.
///
/// `publish` replaces the latest snapshot and fans it out to subscribers;
/// `latest` gives any thread the most recent snapshot without waiting.
pub struct TelemetryBus {
    latest: ArcSwapOption<TelemetrySnapshot>,
    publish_count: AtomicU64,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryBus {
    pub fn new() -> Self {
        Self {
            latest: ArcSwapOption::const_empty(),
            publish_count: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Publishes a snapshot: stores it as the latest, bumps the publish
    /// counter, then notifies subscribers outside the registry lock.
    /// A panicking callback is caught and ignored; the subscriber stays
    /// registered and is invoked again on the next publish.
    pub fn publish(&self, snapshot: TelemetrySnapshot) {
        let snapshot = Arc::new(snapshot);
        self.latest.store(Some(Arc::clone(&snapshot)));
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        let callbacks: Vec<(u64, SnapshotCallback)> = {
            let subscribers = match self.subscribers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            subscribers
                .iter()
                .map(|s| (s.id, Arc::clone(&s.callback)))
                .collect()
        };

        for (id, callback) in callbacks {
            let snapshot = Arc::clone(&snapshot);
            if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                warn!(subscriber = id, "telemetry subscriber panicked");
            }
        }
    }

    /// Most recently published snapshot, or `None` before the first publish.
    pub fn latest(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.latest.load_full()
    }

    /// Total number of snapshots published so far.
    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }

    /// Registers a callback for future publishes and returns its id.
    pub fn subscribe(&self, callback: SnapshotCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.push(Subscriber { id, callback });
        id
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|s| s.id != id);
    }

    /// Drops every subscriber. The latest snapshot stays available.
    pub fn clear_subscriptions(&self) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::EventState;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn snapshot(t_ns: i64, p: f32) -> TelemetrySnapshot {
        TelemetrySnapshot::new(t_ns, p, EventState::Idle, false, false, Vec::new())
    }

    #[test]
    fn test_latest_none_before_first_publish() {
        let bus = TelemetryBus::new();
        assert!(bus.latest().is_none());
        assert_eq!(bus.publish_count(), 0);
    }

    #[test]
    fn test_latest_reflects_last_publish() {
        let bus = TelemetryBus::new();
        bus.publish(snapshot(1, 0.1));
        bus.publish(snapshot(2, 0.9));

        let latest = bus.latest().unwrap();
        assert_eq!(latest.t_ns, 2);
        assert!((latest.probability - 0.9).abs() < 1e-6);
        assert_eq!(bus.publish_count(), 2);
    }

    #[test]
    fn test_subscriber_sees_every_snapshot() {
        let bus = TelemetryBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        bus.subscribe(Arc::new(move |s| {
            seen_cb.lock().unwrap().push(s.t_ns);
        }));

        for t in 0..5 {
            bus.publish(snapshot(t, 0.5));
        }

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_mid_stream_subscriber_misses_earlier_snapshots() {
        let bus = TelemetryBus::new();
        bus.publish(snapshot(1, 0.1));
        bus.publish(snapshot(2, 0.2));

        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        bus.subscribe(Arc::new(move |_| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(snapshot(3, 0.3));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // The late subscriber can still catch up through `latest`.
        assert_eq!(bus.latest().unwrap().t_ns, 3);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = TelemetryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        let id = bus.subscribe(Arc::new(move |_| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(snapshot(1, 0.1));
        bus.unsubscribe(id);
        bus.publish(snapshot(2, 0.2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_id_is_noop() {
        let bus = TelemetryBus::new();
        bus.unsubscribe(9999);
        bus.publish(snapshot(1, 0.1));
        assert_eq!(bus.publish_count(), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_kill_publisher() {
        let bus = TelemetryBus::new();
        let faults = Arc::new(AtomicUsize::new(0));
        let faults_cb = Arc::clone(&faults);
        bus.subscribe(Arc::new(move |_| {
            faults_cb.fetch_add(1, Ordering::SeqCst);
            panic!("bad subscriber");
        }));

        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        bus.subscribe(Arc::new(move |_| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(snapshot(1, 0.1));
        bus.publish(snapshot(2, 0.2));

        // Well-behaved subscriber keeps receiving, and the faulting one
        // stays registered: it is invoked again on every publish.
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(faults.load(Ordering::SeqCst), 2);
        assert_eq!(bus.publish_count(), 2);
    }

    #[test]
    fn test_concurrent_publishes_all_counted() {
        let bus = Arc::new(TelemetryBus::new());
        let threads = 4;
        let per_thread = 50;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        bus.publish(snapshot((t * per_thread + i) as i64, 0.5));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(bus.publish_count(), (threads * per_thread) as u64);
        assert!(bus.latest().is_some());
    }

    #[test]
    fn test_clear_subscriptions() {
        let bus = TelemetryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        bus.subscribe(Arc::new(move |_| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        }));

        bus.clear_subscriptions();
        bus.publish(snapshot(1, 0.1));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(bus.latest().is_some());
    }
}
