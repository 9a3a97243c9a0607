//! Heart ledger: directed interest edges
//!
//! An actor's outgoing hearts are the `heartsSent` array of its `users`
//! document. Edges are only ever added, through the store's atomic array
//! union, so retries and concurrent hearts from one actor are harmless.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{HeartwaveError, Result};
use crate::identity::IdentityProvider;
use crate::models::{ActorDocument, ActorId, HEARTS_SENT, USERS};
use crate::store::{DocumentStore, StoredDocument};

#[derive(Clone)]
pub struct HeartLedger {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl HeartLedger {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Record the edge `from → to`.
    ///
    /// Returns `true` if the edge is new, `false` if it already existed.
    /// Only the signed-in actor may send hearts as itself.
    pub async fn send_heart(&self, from: &ActorId, to: &ActorId) -> Result<bool> {
        match self.identity.current_actor_id() {
            Some(current) if &current == from => {}
            _ => return Err(HeartwaveError::NotAuthenticated),
        }
        if from == to {
            return Err(HeartwaveError::InvalidTarget(format!(
                "{} cannot heart itself",
                from
            )));
        }

        let added = self
            .store
            .array_union(USERS, from.as_str(), HEARTS_SENT, Value::from(to.as_str()))
            .await?;
        debug!(from = %from, to = %to, added, "Heart recorded");
        Ok(added)
    }

    /// Whether the edge `from → to` exists.
    pub async fn has_hearted(&self, from: &ActorId, to: &ActorId) -> Result<bool> {
        Ok(self.load(from).await?.has_hearted(to))
    }

    /// Every actor `actor` has hearted.
    pub async fn hearts_sent(&self, actor: &ActorId) -> Result<BTreeSet<ActorId>> {
        Ok(self.load(actor).await?.hearts_sent.into_iter().collect())
    }

    async fn load(&self, actor: &ActorId) -> Result<ActorDocument> {
        match self.store.get(USERS, actor.as_str()).await? {
            Some(fields) => ActorDocument::from_stored(&StoredDocument {
                id: actor.to_string(),
                fields,
            }),
            None => Ok(ActorDocument::default()),
        }
    }
}
