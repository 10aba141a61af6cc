//! Debounced cart writes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::domain::aggregates::CartSnapshot;
use crate::storage::CartPersistence;

/// Coalesces bursts of cart mutations into a single store write.
///
/// Each [`schedule`](Self::schedule) aborts the write still waiting from the
/// previous call, so only the last snapshot of a burst reaches the store.
/// Every request takes a new generation number and stores happen under the
/// generation lock, so a delayed write that already woke up is skipped once a
/// newer write or [`flush`](Self::flush) has been issued.
#[derive(Debug)]
pub struct DebouncedWriter {
    persistence: CartPersistence,
    delay: Duration,
    generation: Arc<Mutex<u64>>,
    pending: Option<JoinHandle<()>>,
}

impl DebouncedWriter {
    pub fn new(persistence: CartPersistence, delay: Duration) -> Self {
        Self { persistence, delay, generation: Arc::new(Mutex::new(0)), pending: None }
    }

    #[cfg(test)]
    pub fn persistence(&self) -> &CartPersistence { &self.persistence }

    pub fn schedule(&mut self, snapshot: CartSnapshot) {
        self.cancel();
        let generation = {
            let mut latest = lock(&self.generation);
            *latest += 1;
            *latest
        };
        match Handle::try_current() {
            Ok(handle) => {
                let persistence = self.persistence.clone();
                let latest = self.generation.clone();
                let delay = self.delay;
                self.pending = Some(handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let current = lock(&latest);
                    if *current != generation {
                        tracing::trace!(generation, "skipping superseded cart write");
                        return;
                    }
                    persistence.save(&snapshot);
                    tracing::trace!(items = snapshot.items.len(), "cart persisted");
                }));
            }
            // No runtime to defer on; write through.
            Err(_) => {
                let _current = lock(&self.generation);
                self.persistence.save(&snapshot);
            }
        }
    }

    /// Writes `snapshot` now. A pending write is dropped, and one already in
    /// progress finishes first.
    pub fn flush(&mut self, snapshot: &CartSnapshot) {
        self.cancel();
        let mut latest = lock(&self.generation);
        *latest += 1;
        self.persistence.save(snapshot);
    }

    /// Removes the stored cart, dropping any pending write.
    pub fn discard(&mut self) {
        self.cancel();
        let mut latest = lock(&self.generation);
        *latest += 1;
        self.persistence.clear();
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

/// A poisoned lock still orders writes.
fn lock(generation: &Mutex<u64>) -> MutexGuard<'_, u64> {
    generation.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Cart, CartProduct, QuantityPolicy};
    use crate::storage::persistence::ITEMS_KEY;
    use crate::storage::{KeyValueStore, MemoryStore};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn read(&self, key: &str) -> Option<String> { self.inner.read(key) }
        fn write(&self, key: &str, value: &str) {
            if key == ITEMS_KEY { self.writes.fetch_add(1, Ordering::SeqCst); }
            self.inner.write(key, value);
        }
        fn remove(&self, key: &str) { self.inner.remove(key) }
    }

    /// Blocks the first items write until released.
    struct GatedStore {
        inner: MemoryStore,
        entered: AtomicBool,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl KeyValueStore for GatedStore {
        fn read(&self, key: &str) -> Option<String> { self.inner.read(key) }
        fn write(&self, key: &str, value: &str) {
            if key == ITEMS_KEY {
                let gate = self.gate.lock().unwrap().take();
                if let Some(release) = gate {
                    self.entered.store(true, Ordering::SeqCst);
                    release.recv().ok();
                }
            }
            self.inner.write(key, value);
        }
        fn remove(&self, key: &str) { self.inner.remove(key) }
    }

    fn snapshot_with(qty: u32) -> CartSnapshot {
        let mut cart = Cart::new("INR", QuantityPolicy::Advisory);
        cart.add_item(CartProduct { product_id: "P1".into(), name: "Tea".into(), unit_price: Decimal::new(99, 0), max_quantity: None, selected_options: None }, qty).unwrap();
        cart.snapshot()
    }

    fn writer(store: &Arc<CountingStore>) -> DebouncedWriter {
        DebouncedWriter::new(CartPersistence::new(store.clone()), Duration::from_millis(300))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_last_write() {
        let store = Arc::new(CountingStore::default());
        let mut writer = writer(&store);
        for qty in 1..=5 {
            writer.schedule(snapshot_with(qty));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert!(writer.is_pending());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        let saved = writer.persistence().load();
        assert_eq!(saved.items[0].quantity.value(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_cancels_pending_write() {
        let store = Arc::new(CountingStore::default());
        let mut writer = writer(&store);
        writer.schedule(snapshot_with(1));
        writer.flush(&snapshot_with(2));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(writer.persistence().load().items[0].quantity.value(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_flush_lands_after_write_in_progress() {
        let (release, gate) = mpsc::channel();
        let store = Arc::new(GatedStore { inner: MemoryStore::new(), entered: AtomicBool::new(false), gate: Mutex::new(Some(gate)) });
        let mut writer = DebouncedWriter::new(CartPersistence::new(store.clone()), Duration::from_millis(10));
        writer.schedule(snapshot_with(1));
        while !store.entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let flushing = tokio::task::spawn_blocking(move || {
            writer.flush(&snapshot_with(2));
            writer
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.send(()).unwrap();
        let writer = flushing.await.unwrap();

        assert_eq!(writer.persistence().load().items[0].quantity.value(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_drops_pending_write() {
        let store = Arc::new(CountingStore::default());
        let mut writer = writer(&store);
        writer.flush(&snapshot_with(1));
        writer.schedule(snapshot_with(2));
        writer.discard();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert!(writer.persistence().load().items.is_empty());
        assert!(!writer.is_pending());
    }

    #[test]
    fn test_writes_through_without_runtime() {
        let store = Arc::new(CountingStore::default());
        let mut writer = writer(&store);
        writer.schedule(snapshot_with(3));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert!(!writer.is_pending());
    }
}
