//! Synchronized document store
//!
//! Handles:
//! - Keyed JSON documents grouped in collections
//! - Merge writes, create-if-absent writes and atomic array unions
//! - Full-collection snapshots pushed to live subscribers
//!
//! Two backends: [`MemoryStore`] for single-process use and tests, and
//! [`SqliteStore`] for durable local state.

pub mod hub;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;

pub use hub::{CollectionSnapshot, Subscription};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Field map of one document
pub type Document = serde_json::Map<String, Value>;

/// A document together with its id
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Document,
}

/// Interface for the shared document store.
///
/// Every method is a single atomic operation against the backing store;
/// callers never need a read-then-write pair to get the documented effect.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document, `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Write a document. With `merge`, fields not present in `fields` are
    /// preserved; without it the document is replaced.
    async fn put(&self, collection: &str, id: &str, fields: Document, merge: bool) -> Result<()>;

    /// Create the document only if no document exists under `id`.
    ///
    /// Returns `true` for the single call that created it.
    async fn put_if_absent(&self, collection: &str, id: &str, fields: Document) -> Result<bool>;

    /// Add `value` to the array at `field` unless already present, creating
    /// the document or the array as needed.
    ///
    /// Returns `true` if the value was added.
    async fn array_union(&self, collection: &str, id: &str, field: &str, value: Value)
        -> Result<bool>;

    /// All documents of a collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>>;

    /// Live snapshots of a collection, starting with the current contents.
    ///
    /// Dropping the returned subscription unsubscribes.
    async fn subscribe(&self, collection: &str) -> Result<Subscription>;
}

/// Open the backend selected in the configuration.
pub fn open(config: &StoreConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::new(&config.data_dir).with_context(|| {
                format!("opening sqlite store in {}", config.data_dir.display())
            })?;
            Ok(Arc::new(store))
        }
    }
}

/// Shallow merge: top-level fields of `incoming` overwrite those of `target`.
pub(crate) fn merge_into(target: &mut Document, incoming: Document) {
    for (key, value) in incoming {
        target.insert(key, value);
    }
}

/// Set-add on an array field. A missing or non-array field becomes `[value]`.
pub(crate) fn union_into(target: &mut Document, field: &str, value: Value) -> bool {
    match target.get_mut(field) {
        Some(Value::Array(items)) => {
            if items.contains(&value) {
                false
            } else {
                items.push(value);
                true
            }
        }
        _ => {
            target.insert(field.to_string(), Value::Array(vec![value]));
            true
        }
    }
}
