//! Single-slot latest-value cache shared between a producer loop and readers.
//!
//! Publishing builds a new immutable value and swaps the `Arc` in one step
//! under a short lock; readers clone the `Arc` under the same lock and
//! release immediately. Neither side ever observes a partially written
//! value, and a slow reader holding an old snapshot never blocks the
//! producer.
//!
//! ```text
//! producer ──publish(T)──▶ [ Mutex<Option<Arc<T>>> ] ◀──latest()── readers
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe single-slot snapshot store.
#[derive(Debug)]
pub struct SnapshotStore<T> {
    slot: Mutex<Option<Arc<T>>>,
    version: AtomicU64,
}

impl<T> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnapshotStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Replace the current snapshot
    pub fn publish(&self, value: T) {
        self.publish_arc(Arc::new(value));
    }

    /// Replace the current snapshot with an already shared value
    pub fn publish_arc(&self, value: Arc<T>) {
        let previous = {
            let mut slot = self.slot.lock();
            self.version.fetch_add(1, Ordering::Release);
            slot.replace(value)
        };
        // Old snapshot is dropped outside the critical section
        drop(previous);
    }

    /// Latest snapshot, or `None` if nothing was published since the last clear
    pub fn latest(&self) -> Option<Arc<T>> {
        self.slot.lock().clone()
    }

    /// Empty the slot
    pub fn clear(&self) {
        let previous = self.slot.lock().take();
        drop(previous);
    }

    /// Whether a snapshot is currently held
    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Number of publishes since creation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl<T: Clone> SnapshotStore<T> {
    /// Owned copy of the latest snapshot
    pub fn latest_cloned(&self) -> Option<T> {
        self.latest().map(|v| T::clone(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PointCloud;
    use nalgebra::Point3;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_empty_store() {
        let store: SnapshotStore<u32> = SnapshotStore::new();
        assert!(store.latest().is_none());
        assert!(store.is_empty());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_publish_replaces() {
        let store = SnapshotStore::new();
        store.publish(1u32);
        store.publish(2u32);
        assert_eq!(*store.latest().unwrap(), 2);
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_reader_keeps_old_snapshot_after_publish() {
        let store = SnapshotStore::new();
        store.publish(String::from("old"));
        let held = store.latest().unwrap();
        store.publish(String::from("new"));
        assert_eq!(held.as_str(), "old");
        assert_eq!(store.latest().unwrap().as_str(), "new");
    }

    #[test]
    fn test_clear() {
        let store = SnapshotStore::new();
        store.publish(7u8);
        store.clear();
        assert!(store.latest().is_none());
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_concurrent_publish_never_mismatches_lengths() {
        let store = Arc::new(SnapshotStore::<PointCloud>::new());
        let stop = Arc::new(AtomicBool::new(false));

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let mut n = w;
                    while !stop.load(Ordering::Relaxed) {
                        let len = n % 97;
                        let points = vec![Point3::new(n as f32, 0.0, 0.0); len];
                        let depths = vec![n as f32; len];
                        store.publish(PointCloud::from_parts(points, depths).unwrap());
                        n += 4;
                    }
                })
            })
            .collect();

        // Read until the writers have published plenty, bounded by a deadline
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut observed = 0;
        while (observed < 20_000 || store.version() < 1_000) && Instant::now() < deadline {
            if let Some(cloud) = store.latest() {
                assert_eq!(cloud.points().len(), cloud.depths().len());
                observed += 1;
            } else {
                thread::yield_now();
            }
        }
        stop.store(true, Ordering::Relaxed);
        for w in writers {
            w.join().unwrap();
        }
        assert!(observed > 0);
        assert!(store.version() > 0);
    }
}
