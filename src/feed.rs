//! Live candidate feed
//!
//! Subscribes to the `users` collection and turns every snapshot into a fresh
//! candidate set for one owner. Snapshots are processed in the order the store
//! delivers them; there is no coalescing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{ActorDocument, ActorId, CandidateSet, USERS};
use crate::proximity::ProximityIndex;
use crate::store::{CollectionSnapshot, DocumentStore, Subscription};

/// Pause before retrying a failed resubscribe
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Handle to a running feed for one owner.
///
/// Dropping the handle cancels the feed.
pub struct LiveCandidateFeed {
    owner: ActorId,
    rx: mpsc::Receiver<CandidateSet>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl LiveCandidateFeed {
    /// Subscribe and start recomputing.
    ///
    /// The first emission reflects the collection as it is right now.
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        owner: ActorId,
        index: ProximityIndex,
        buffer: usize,
    ) -> Result<Self> {
        let subscription = store.subscribe(USERS).await?;
        let radius_m = index.radius_m();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = FeedWorker {
            store,
            owner: owner.clone(),
            index,
            tx,
        };
        let task = tokio::spawn(worker.run(subscription, shutdown_rx));

        info!(owner = %owner, radius_m, "Candidate feed started");
        Ok(Self {
            owner,
            rx,
            shutdown_tx,
            task: Some(task),
        })
    }

    pub fn owner(&self) -> &ActorId {
        &self.owner
    }

    /// Next candidate set; `None` once cancelled.
    pub async fn next(&mut self) -> Option<CandidateSet> {
        if self.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    /// A candidate set that is already waiting, without blocking.
    pub fn try_next(&mut self) -> Option<CandidateSet> {
        if self.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Stop the feed and drop the store subscription. Sets already buffered
    /// are discarded.
    pub fn cancel(&mut self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        info!(owner = %self.owner, "Candidate feed cancelled");
    }
}

impl Drop for LiveCandidateFeed {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct FeedWorker {
    store: Arc<dyn DocumentStore>,
    owner: ActorId,
    index: ProximityIndex,
    tx: mpsc::Sender<CandidateSet>,
}

impl FeedWorker {
    async fn run(self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = subscription.next() => next,
            };

            let Some(snapshot) = next else {
                warn!(
                    owner = %self.owner,
                    collection = subscription.collection(),
                    "Subscription ended, resubscribing"
                );
                match self.resubscribe(&mut shutdown).await {
                    Some(fresh) => {
                        subscription = fresh;
                        continue;
                    }
                    None => break,
                }
            };

            let set = self.recompute(&snapshot);
            debug!(owner = %self.owner, candidates = set.len(), "Emitting candidate set");
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                sent = self.tx.send(set) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(owner = %self.owner, "Candidate feed worker stopped");
    }

    /// Retry until subscribed again or shut down.
    async fn resubscribe(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Subscription> {
        loop {
            match self.store.subscribe(USERS).await {
                Ok(subscription) => return Some(subscription),
                Err(e) => {
                    warn!(owner = %self.owner, error = %e, "Resubscribe failed");
                }
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => return None,
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }
    }

    fn recompute(&self, snapshot: &CollectionSnapshot) -> CandidateSet {
        let documents: Vec<ActorDocument> = snapshot
            .documents
            .iter()
            .filter_map(|doc| match ActorDocument::from_stored(doc) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    debug!(doc_id = %doc.id, error = %e, "Skipping malformed actor document");
                    None
                }
            })
            .collect();
        self.index.candidates(&self.owner, &documents)
    }
}
