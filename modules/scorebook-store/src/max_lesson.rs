//! Largest lesson id applied so far.
//!
//! Monotonic for the process lifetime and persisted across restarts. A
//! bounded channel signals every advance; receivers re-read [`get`] after a
//! wake, so a dropped signal on a full buffer loses nothing.
//!
//! [`get`]: MaxLessonTracker::get

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::StoreError;
use crate::keys;
use crate::store::Store;

const CHANGED_BUFFER: usize = 10;

pub struct MaxLessonTracker {
    current: AtomicU64,
    update_lock: Mutex<()>,
    changed_tx: mpsc::Sender<u64>,
    store: Arc<dyn Store>,
}

impl MaxLessonTracker {
    /// Load the persisted maximum (missing key = 0) and hand back the tracker
    /// together with the single change-signal receiver.
    pub async fn load(
        store: Arc<dyn Store>,
    ) -> Result<(Arc<Self>, mpsc::Receiver<u64>), StoreError> {
        let current = store
            .get(keys::MAX_LESSON_ID_KEY)
            .await?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);

        let (changed_tx, changed_rx) = mpsc::channel(CHANGED_BUFFER);
        let tracker = Arc::new(Self {
            current: AtomicU64::new(current),
            update_lock: Mutex::new(()),
            changed_tx,
            store,
        });
        Ok((tracker, changed_rx))
    }

    pub fn get(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Advance the maximum. Ids at or below the current value are a lock-free
    /// no-op. The persisted write is fire-and-forget: a lost write costs one
    /// redundant advance after a restart, nothing more. Must be called from
    /// within the runtime.
    pub fn set(self: &Arc<Self>, lesson_id: u64) {
        if lesson_id <= self.current.load(Ordering::Acquire) {
            return;
        }

        let updated = {
            let _guard = self.update_lock.lock().unwrap();
            if lesson_id > self.current.load(Ordering::Acquire) {
                self.current.store(lesson_id, Ordering::Release);

                let store = Arc::clone(&self.store);
                tokio::spawn(async move {
                    if let Err(e) = store
                        .set(keys::MAX_LESSON_ID_KEY, &lesson_id.to_string())
                        .await
                    {
                        warn!(error = %e, lesson_id, "failed to persist max lesson id");
                    }
                });
                true
            } else {
                false
            }
        };

        if updated {
            // Full buffer means the receiver is already due for a wake.
            let _ = self.changed_tx.try_send(lesson_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::time::Duration;

    async fn wait_for_persisted(store: &MemoryStore, expected: &str) {
        for _ in 0..200 {
            if store.string(keys::MAX_LESSON_ID_KEY).as_deref() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("max lesson id was never persisted");
    }

    #[tokio::test]
    async fn loads_persisted_value() {
        let store = Arc::new(MemoryStore::new());
        store.seed_string(keys::MAX_LESSON_ID_KEY, "150");

        let (tracker, _rx) = MaxLessonTracker::load(store).await.unwrap();
        assert_eq!(tracker.get(), 150);
    }

    #[tokio::test]
    async fn missing_key_means_zero() {
        let store = Arc::new(MemoryStore::new());
        let (tracker, _rx) = MaxLessonTracker::load(store).await.unwrap();
        assert_eq!(tracker.get(), 0);
    }

    #[tokio::test]
    async fn set_is_monotonic_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let (tracker, mut rx) = MaxLessonTracker::load(Arc::clone(&store) as Arc<dyn Store>)
            .await
            .unwrap();

        // waiting for each persist keeps the fire-and-forget writes ordered
        tracker.set(100);
        wait_for_persisted(&store, "100").await;

        tracker.set(50); // stale id, ignored
        assert_eq!(tracker.get(), 100);

        tracker.set(120);
        assert_eq!(tracker.get(), 120);
        wait_for_persisted(&store, "120").await;

        assert_eq!(rx.recv().await, Some(100));
        assert_eq!(rx.recv().await, Some(120));
    }

    #[tokio::test]
    async fn full_signal_buffer_never_blocks() {
        let store = Arc::new(MemoryStore::new());
        let (tracker, mut rx) = MaxLessonTracker::load(store).await.unwrap();

        for lesson_id in 1..=25u64 {
            tracker.set(lesson_id);
        }
        assert_eq!(tracker.get(), 25);

        // At most the buffer capacity of signals survives; the value does.
        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        assert!(drained <= 10, "drained {drained}");
    }
}
