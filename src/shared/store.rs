//! Latest-snapshot store with change notification
//!
//! Readers get the current `Arc<PipelineState>` without waiting on the
//! writer; a published snapshot is swapped in whole. Only the
//! [`StatePublisher`], owned by the pipeline controller, can publish.

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use super::state::PipelineState;

type Subscriber = Arc<dyn Fn(&Arc<PipelineState>) + Send + Sync>;

/// Handle returned by [`StateStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct StoreInner {
    current: RwLock<Arc<PipelineState>>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

/// Read and subscribe side of the store; cheap to clone
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

/// Sole write side of the store
pub struct StatePublisher {
    inner: Arc<StoreInner>,
}

impl StateStore {
    /// Create a store holding `initial`, plus its only publisher
    pub fn with_publisher(initial: PipelineState) -> (StatePublisher, StateStore) {
        let inner = Arc::new(StoreInner {
            current: RwLock::new(Arc::new(initial)),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        });
        (
            StatePublisher {
                inner: inner.clone(),
            },
            StateStore { inner },
        )
    }

    /// Latest published snapshot
    pub fn current(&self) -> Arc<PipelineState> {
        self.inner.current.read().clone()
    }

    /// Call `callback` with every snapshot published from now on.
    ///
    /// Callbacks run synchronously on the publishing task, in publish order.
    /// They must return quickly and must not call back into the pipeline
    /// controller.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Arc<PipelineState>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Stop notifications for `id`; returns false if it was not subscribed.
    ///
    /// Once this returns the callback is not started again. A call already
    /// running on another thread may still be finishing.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Subscribe through a channel, for consumers draining on another thread
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<Arc<PipelineState>>) {
        let (tx, rx) = unbounded();
        let id = self.subscribe(move |state| {
            let _ = tx.send(state.clone());
        });
        (id, rx)
    }
}

impl StatePublisher {
    /// Install `state` as the current snapshot and notify subscribers
    pub fn publish(&mut self, state: PipelineState) -> Arc<PipelineState> {
        let snapshot = Arc::new(state);
        *self.inner.current.write() = snapshot.clone();

        let subscribers: Vec<(SubscriptionId, Subscriber)> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(id, callback)| (*id, callback.clone()))
            .collect();
        trace!(
            "Published {} snapshot to {} subscribers",
            snapshot.phase,
            subscribers.len()
        );
        for (id, callback) in subscribers {
            // Skip callbacks unsubscribed while earlier ones ran
            if self.is_subscribed(id) {
                callback(&snapshot);
            }
        }
        snapshot
    }

    /// Latest published snapshot
    pub fn current(&self) -> Arc<PipelineState> {
        self.inner.current.read().clone()
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.inner
            .subscribers
            .lock()
            .iter()
            .any(|(sub_id, _)| *sub_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::state::Phase;

    #[test]
    fn test_current_returns_initial() {
        let (_publisher, store) = StateStore::with_publisher(PipelineState::idle());
        assert_eq!(store.current().phase, Phase::Idle);
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let (mut publisher, store) = StateStore::with_publisher(PipelineState::idle());
        let before = store.current();

        publisher.publish(PipelineState::idle().with_text("E330".to_string()));

        let after = store.current();
        assert_eq!(after.phase, Phase::Ready);
        // Snapshots held by readers are never modified
        assert_eq!(before.phase, Phase::Idle);
        assert!(before.extracted_codes.is_empty());
    }

    #[test]
    fn test_subscribers_see_every_publish_in_order() {
        let (mut publisher, store) = StateStore::with_publisher(PipelineState::idle());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |state| sink.lock().push(state.phase));

        let base = PipelineState::idle();
        publisher.publish(base.with_phase(Phase::Capturing));
        publisher.publish(base.with_phase(Phase::Recognizing));
        publisher.publish(base.with_text(String::new()));

        assert_eq!(
            *seen.lock(),
            vec![Phase::Capturing, Phase::Recognizing, Phase::Ready]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let (mut publisher, store) = StateStore::with_publisher(PipelineState::idle());
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let id = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        publisher.publish(PipelineState::idle());
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        publisher.publish(PipelineState::idle());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribed_during_publish_is_not_called() {
        let (mut publisher, store) = StateStore::with_publisher(PipelineState::idle());
        let later = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        store.subscribe({
            let store = store.clone();
            let later = later.clone();
            move |_| {
                if let Some(id) = later.lock().take() {
                    assert!(store.unsubscribe(id));
                }
            }
        });
        let counter = calls.clone();
        let id = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        *later.lock() = Some(id);

        publisher.publish(PipelineState::idle());
        publisher.publish(PipelineState::idle());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscribe_channel() {
        let (mut publisher, store) = StateStore::with_publisher(PipelineState::idle());
        let (_id, rx) = store.subscribe_channel();

        publisher.publish(PipelineState::idle().with_phase(Phase::Capturing));
        let handle = std::thread::spawn(move || rx.recv().unwrap().phase);
        assert_eq!(handle.join().unwrap(), Phase::Capturing);
    }
}
