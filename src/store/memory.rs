//! In-process document store

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::hub::{CollectionSnapshot, SnapshotHub, Subscription};
use super::{merge_into, union_into, Document, DocumentStore, StoredDocument};
use crate::error::{HeartwaveError, Result};

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Document>>,
    hub: SnapshotHub,
}

impl MemoryState {
    fn snapshot(&self, collection: &str) -> CollectionSnapshot {
        let documents = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| StoredDocument {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        CollectionSnapshot {
            collection: collection.to_string(),
            documents,
        }
    }

    fn notify(&mut self, collection: &str) {
        if self.hub.has_subscribers(collection) {
            let snapshot = self.snapshot(collection);
            self.hub.publish(snapshot);
        }
    }
}

/// Document store held entirely in memory.
///
/// All operations run under one async mutex, which makes each of them atomic
/// and keeps snapshot delivery in write order.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing the connection: every call fails with `Unavailable`
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(HeartwaveError::Unavailable("document store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.ensure_online()?;
        let state = self.state.lock().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn put(&self, collection: &str, id: &str, fields: Document, merge: bool) -> Result<()> {
        self.ensure_online()?;
        let mut state = self.state.lock().await;
        let doc = state
            .collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        if merge {
            merge_into(doc, fields);
        } else {
            *doc = fields;
        }
        debug!(collection, id, merge, "Put document");
        state.notify(collection);
        Ok(())
    }

    async fn put_if_absent(&self, collection: &str, id: &str, fields: Document) -> Result<bool> {
        self.ensure_online()?;
        let mut state = self.state.lock().await;
        let docs = state.collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Ok(false);
        }
        docs.insert(id.to_string(), fields);
        debug!(collection, id, "Created document");
        state.notify(collection);
        Ok(true)
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool> {
        self.ensure_online()?;
        let mut state = self.state.lock().await;
        let doc = state
            .collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        let added = union_into(doc, field, value);
        if added {
            debug!(collection, id, field, "Array union added value");
            state.notify(collection);
        }
        Ok(added)
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        self.ensure_online()?;
        let state = self.state.lock().await;
        Ok(state.snapshot(collection).documents)
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription> {
        self.ensure_online()?;
        let mut state = self.state.lock().await;
        let current = state.snapshot(collection);
        Ok(state.hub.subscribe(current))
    }
}
