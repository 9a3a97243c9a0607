//! Mutual-match detection
//!
//! A match between A and B is the document `matches/{sorted(A,B)}`. It is
//! written with the store's create-if-absent operation, so when both actors
//! heart each other at the same moment exactly one of them creates it.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{HeartwaveError, Result};
use crate::ledger::HeartLedger;
use crate::models::{now_millis, ActorId, MatchId, MatchRecord, MATCHES};
use crate::store::{DocumentStore, StoredDocument};

#[derive(Clone)]
pub struct MatchDetector {
    ledger: HeartLedger,
    store: Arc<dyn DocumentStore>,
}

impl MatchDetector {
    pub fn new(ledger: HeartLedger, store: Arc<dyn DocumentStore>) -> Self {
        Self { ledger, store }
    }

    pub fn ledger(&self) -> &HeartLedger {
        &self.ledger
    }

    /// Heart `to` as `from`, then create the match if the heart is returned.
    ///
    /// Returns `true` only for the call that created the match record.
    /// Safe to retry: a repeated heart neither duplicates the edge nor the
    /// match.
    pub async fn register_heart_and_check_match(
        &self,
        from: &ActorId,
        to: &ActorId,
    ) -> Result<bool> {
        self.ledger.send_heart(from, to).await?;

        if !self.ledger.has_hearted(to, from).await? {
            debug!(from = %from, to = %to, "Heart not returned yet");
            return Ok(false);
        }

        let record = MatchRecord::new(from, to, now_millis());
        let match_id = MatchId::for_pair(from, to);
        let created = self
            .store
            .put_if_absent(MATCHES, match_id.as_str(), record.to_fields()?)
            .await?;

        if created {
            info!(match_id = %match_id, "New match");
            return Ok(true);
        }

        // The key is taken; it must be taken by this pair
        if let Some(existing) = self.match_between(from, to).await? {
            if !(existing.includes(from) && existing.includes(to)) {
                return Err(HeartwaveError::Storage(format!(
                    "match {} is recorded for a different pair",
                    match_id
                )));
            }
        }
        debug!(match_id = %match_id, "Match already recorded");
        Ok(false)
    }

    /// The match between `a` and `b`, if there is one.
    pub async fn match_between(&self, a: &ActorId, b: &ActorId) -> Result<Option<MatchRecord>> {
        let match_id = MatchId::for_pair(a, b);
        match self.store.get(MATCHES, match_id.as_str()).await? {
            Some(fields) => Ok(Some(MatchRecord::from_stored(&StoredDocument {
                id: match_id.to_string(),
                fields,
            })?)),
            None => Ok(None),
        }
    }

    /// All matches `actor` is part of, oldest first. Malformed records are
    /// skipped.
    pub async fn matches_for(&self, actor: &ActorId) -> Result<Vec<MatchRecord>> {
        let mut matches = Vec::new();
        for doc in self.store.list(MATCHES).await? {
            let record = match MatchRecord::from_stored(&doc) {
                Ok(record) => record,
                Err(e) => {
                    debug!(doc_id = %doc.id, error = %e, "Skipping malformed match record");
                    continue;
                }
            };
            if record.includes(actor) {
                matches.push(record);
            }
        }
        matches.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.match_id.cmp(&b.match_id))
        });
        Ok(matches)
    }
}
