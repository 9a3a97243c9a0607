//! SQLite-backed document store
//!
//! Documents are stored as JSON text in a single table keyed by
//! `(collection, doc_id)`. The connection sits behind an async mutex; each
//! trait method runs as one critical section, so conditional writes are
//! atomic and snapshots are published in write order.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::hub::{CollectionSnapshot, SnapshotHub, Subscription};
use super::{merge_into, union_into, Document, DocumentStore, StoredDocument};
use crate::error::{HeartwaveError, Result};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (collection, doc_id)
);";

const SQL_UPSERT: &str = "INSERT INTO documents (collection, doc_id, data, updated_at)
     VALUES (?1, ?2, ?3, strftime('%s', 'now'))
     ON CONFLICT(collection, doc_id) DO UPDATE SET data = ?3, updated_at = strftime('%s', 'now')";

const SQL_INSERT_IF_ABSENT: &str = "INSERT INTO documents (collection, doc_id, data, updated_at)
     VALUES (?1, ?2, ?3, strftime('%s', 'now'))
     ON CONFLICT(collection, doc_id) DO NOTHING";

struct SqliteState {
    db: Connection,
    hub: SnapshotHub,
}

impl SqliteState {
    fn load(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let mut stmt = self
            .db
            .prepare_cached("SELECT data FROM documents WHERE collection = ?1 AND doc_id = ?2")?;
        let data: Option<String> = stmt
            .query_row([collection, id], |row| row.get(0))
            .optional()?;
        data.map(|text| parse_document(&text)).transpose()
    }

    fn save(&self, collection: &str, id: &str, doc: &Document) -> Result<()> {
        let data = serde_json::to_string(doc)?;
        self.db
            .execute(SQL_UPSERT, rusqlite::params![collection, id, data])?;
        Ok(())
    }

    fn snapshot(&self, collection: &str) -> Result<CollectionSnapshot> {
        let mut stmt = self.db.prepare_cached(
            "SELECT doc_id, data FROM documents WHERE collection = ?1 ORDER BY doc_id",
        )?;
        let rows = stmt.query_map([collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, data) = row?;
            documents.push(StoredDocument {
                id,
                fields: parse_document(&data)?,
            });
        }
        Ok(CollectionSnapshot {
            collection: collection.to_string(),
            documents,
        })
    }

    fn notify(&mut self, collection: &str) -> Result<()> {
        if self.hub.has_subscribers(collection) {
            let snapshot = self.snapshot(collection)?;
            self.hub.publish(snapshot);
        }
        Ok(())
    }
}

fn parse_document(text: &str) -> Result<Document> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(HeartwaveError::Storage(format!(
            "stored document is not an object: {}",
            other
        ))),
    }
}

/// Durable document store in a local SQLite database.
pub struct SqliteStore {
    state: Mutex<SqliteState>,
}

impl SqliteStore {
    /// Open or create `heartwave.db` inside `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| HeartwaveError::Storage(format!("creating data directory: {}", e)))?;
        let db_path = data_dir.join("heartwave.db");
        let db = Connection::open(&db_path)?;

        // WAL lets readers proceed while a write is in progress
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        db.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), "Document store initialized");
        Ok(Self::from_connection(db))
    }

    /// Private database that disappears with the store.
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        db.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(db))
    }

    fn from_connection(db: Connection) -> Self {
        Self {
            state: Mutex::new(SqliteState {
                db,
                hub: SnapshotHub::new(),
            }),
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let state = self.state.lock().await;
        state.load(collection, id)
    }

    async fn put(&self, collection: &str, id: &str, fields: Document, merge: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let doc = if merge {
            let mut existing = state.load(collection, id)?.unwrap_or_default();
            merge_into(&mut existing, fields);
            existing
        } else {
            fields
        };
        state.save(collection, id, &doc)?;
        debug!(collection, id, merge, "Put document");
        state.notify(collection)
    }

    async fn put_if_absent(&self, collection: &str, id: &str, fields: Document) -> Result<bool> {
        let mut state = self.state.lock().await;
        let data = serde_json::to_string(&fields)?;
        let inserted = state
            .db
            .execute(SQL_INSERT_IF_ABSENT, rusqlite::params![collection, id, data])?;
        if inserted == 0 {
            return Ok(false);
        }
        debug!(collection, id, "Created document");
        state.notify(collection)?;
        Ok(true)
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let mut doc = state.load(collection, id)?.unwrap_or_default();
        if !union_into(&mut doc, field, value) {
            return Ok(false);
        }
        state.save(collection, id, &doc)?;
        debug!(collection, id, field, "Array union added value");
        state.notify(collection)?;
        Ok(true)
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let state = self.state.lock().await;
        Ok(state.snapshot(collection)?.documents)
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription> {
        let mut state = self.state.lock().await;
        let current = state.snapshot(collection)?;
        Ok(state.hub.subscribe(current))
    }
}
