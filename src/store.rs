//! Authoritative list of items, published as immutable snapshots.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: u32,
    pub title: String,
    pub download_progress: u8,
}

impl Item {
    fn new(id: u32) -> Self {
        Self {
            id,
            title: format!("Download File {}", id),
            download_progress: 0,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.download_progress >= 100
    }
}

pub type Snapshot = Arc<[Item]>;

pub type ObserverId = u64;

type Observer = Arc<dyn Fn(&Snapshot) + Send + Sync>;

struct Inner {
    snapshot: Snapshot,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: ObserverId,
}

/// Owns the ordered items. Every change replaces the whole snapshot and is
/// pushed to callbacks and watch receivers before `update` returns.
///
/// Callbacks run outside the data lock and may read the store, but must not
/// call `update` or `subscribe`.
pub struct ItemStore {
    inner: Mutex<Inner>,
    // Held across a whole publish so callbacks see snapshots in order.
    publish: Mutex<()>,
    tx: watch::Sender<Snapshot>,
}

impl ItemStore {
    pub fn initialize(count: u32) -> Self {
        let snapshot: Snapshot = (1..=count).map(Item::new).collect();
        let (tx, _) = watch::channel(snapshot.clone());

        Self {
            inner: Mutex::new(Inner {
                snapshot,
                observers: Vec::new(),
                next_observer: 0,
            }),
            publish: Mutex::new(()),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_publish(&self) -> MutexGuard<'_, ()> {
        self.publish.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u32) -> Option<Item> {
        self.lock().snapshot.iter().find(|i| i.id == id).cloned()
    }

    pub fn index_of(&self, id: u32) -> Option<usize> {
        self.lock().snapshot.iter().position(|i| i.id == id)
    }

    pub fn update(&self, index: usize, progress: u8) -> Result<()> {
        if progress > 100 {
            return Err(Error::InvalidProgress(progress));
        }

        let _publish = self.lock_publish();
        let (snapshot, observers) = {
            let mut inner = self.lock();
            let len = inner.snapshot.len();
            if index >= len {
                warn!("Rejected update for index {} (snapshot has {} items)", index, len);
                return Err(Error::IndexOutOfRange { index, len });
            }

            let mut items = inner.snapshot.to_vec();
            items[index].download_progress = progress;
            let snapshot: Snapshot = items.into();
            inner.snapshot = snapshot.clone();

            let observers: Vec<Observer> = inner.observers.iter().map(|(_, o)| o.clone()).collect();
            (snapshot, observers)
        };

        for observer in observers {
            observer(&snapshot);
        }
        self.tx.send_replace(snapshot);

        Ok(())
    }

    /// Registers `observer` and immediately calls it with the current snapshot.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let _publish = self.lock_publish();
        let current = self.snapshot();
        observer(&current);

        let mut inner = self.lock();
        let id = inner.next_observer;
        inner.next_observer += 1;
        inner.observers.push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut inner = self.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(oid, _)| *oid != id);
        inner.observers.len() != before
    }

    /// Async subscription; the receiver starts out holding the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_of(snapshot: &Snapshot) -> Vec<u8> {
        snapshot.iter().map(|i| i.download_progress).collect()
    }

    #[test]
    fn test_initialize_sequential_ids() {
        let store = ItemStore::initialize(20);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 20);
        assert_eq!(snapshot[0].id, 1);
        assert_eq!(snapshot[19].id, 20);
        assert_eq!(snapshot[4].title, "Download File 5");
        assert!(snapshot.iter().all(|i| i.download_progress == 0));
    }

    #[test]
    fn test_update_replaces_only_target() {
        let store = ItemStore::initialize(3);
        let before = store.snapshot();
        store.update(1, 40).unwrap();
        let after = store.snapshot();

        assert_eq!(progress_of(&after), vec![0, 40, 0]);
        assert_eq!(after[1].title, before[1].title);
        // earlier snapshots are never mutated in place
        assert_eq!(progress_of(&before), vec![0, 0, 0]);
    }

    #[test]
    fn test_update_rejects_bad_input() {
        let store = ItemStore::initialize(2);
        assert_eq!(
            store.update(2, 10),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        );
        assert_eq!(store.update(0, 101), Err(Error::InvalidProgress(101)));
        assert_eq!(progress_of(&store.snapshot()), vec![0, 0]);
    }

    #[test]
    fn test_subscribe_replays_latest() {
        let store = ItemStore::initialize(2);
        store.update(0, 25).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |s| sink.lock().unwrap().push(progress_of(s)));

        store.update(1, 10).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![vec![25, 0], vec![25, 10]]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let store = ItemStore::initialize(1);
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let id = store.subscribe(move |_| *sink.lock().unwrap() += 1);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.update(0, 50).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_observer_can_read_store() {
        let store = Arc::new(ItemStore::initialize(2));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reader = store.clone();
        let sink = seen.clone();
        store.subscribe(move |_| {
            let item = reader.get(2).unwrap();
            sink.lock().unwrap().push((reader.len(), item.download_progress));
        });

        store.update(1, 55).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(2, 0), (2, 55)]);
    }

    #[tokio::test]
    async fn test_watch_sees_latest() {
        let store = ItemStore::initialize(2);
        store.update(0, 30).unwrap();

        let mut rx = store.watch();
        assert_eq!(progress_of(&rx.borrow_and_update()), vec![30, 0]);

        store.update(1, 60).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(progress_of(&rx.borrow()), vec![30, 60]);
        assert_eq!(store.len(), 2);
    }
}
