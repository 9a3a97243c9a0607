//! Snapshot fan-out to collection subscribers

use std::collections::HashMap;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::StoredDocument;

/// Snapshots buffered per collection before slow subscribers start lagging
const SNAPSHOT_CAPACITY: usize = 64;

/// Complete contents of one collection at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub collection: String,
    /// Ordered by document id
    pub documents: Vec<StoredDocument>,
}

/// Per-collection broadcast senders.
///
/// Owned by a backend and only touched while the backend's write lock is held,
/// so snapshots go out in write order.
#[derive(Default)]
pub struct SnapshotHub {
    senders: HashMap<String, broadcast::Sender<CollectionSnapshot>>,
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if anyone is listening on `collection`.
    pub fn has_subscribers(&self, collection: &str) -> bool {
        self.senders
            .get(collection)
            .map(|tx| tx.receiver_count() > 0)
            .unwrap_or(false)
    }

    pub fn subscribe(&mut self, current: CollectionSnapshot) -> Subscription {
        let tx = self
            .senders
            .entry(current.collection.clone())
            .or_insert_with(|| broadcast::channel(SNAPSHOT_CAPACITY).0);
        Subscription {
            collection: current.collection.clone(),
            rx: tx.subscribe(),
            pending: Some(current),
        }
    }

    pub fn publish(&mut self, snapshot: CollectionSnapshot) {
        let collection = snapshot.collection.clone();
        if let Some(tx) = self.senders.get(&collection) {
            if tx.send(snapshot).is_err() {
                // Last receiver went away
                self.senders.remove(&collection);
            }
        }
    }
}

/// A live feed of collection snapshots.
///
/// The first snapshot is the collection as it was at subscribe time. Dropping
/// the subscription (or calling [`Subscription::cancel`]) unsubscribes.
pub struct Subscription {
    collection: String,
    rx: broadcast::Receiver<CollectionSnapshot>,
    pending: Option<CollectionSnapshot>,
}

impl Subscription {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Next snapshot, or `None` once the store side has gone away.
    ///
    /// Lagging skips straight to newer snapshots; each one is complete, so
    /// nothing is lost but intermediate states.
    pub async fn next(&mut self) -> Option<CollectionSnapshot> {
        if let Some(first) = self.pending.take() {
            return Some(first);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(collection = %self.collection, skipped, "Subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Unsubscribe now instead of at end of scope.
    pub fn cancel(self) {
        drop(self);
    }
}
