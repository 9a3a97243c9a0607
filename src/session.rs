//! Client session
//!
//! One signed-in actor's view of the world: an initial position publish, a
//! recurring refresh, a live candidate feed, and heart/match actions. Every
//! collaborator arrives through [`Services`]; nothing is global.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{HeartwaveError, Result};
use crate::feed::LiveCandidateFeed;
use crate::identity::IdentityProvider;
use crate::ledger::HeartLedger;
use crate::matching::MatchDetector;
use crate::models::{ActorId, CandidateSet, MatchRecord, PositionRecord};
use crate::position::PositionSource;
use crate::proximity::ProximityIndex;
use crate::scheduler::{LocationRefreshScheduler, RefreshState};
use crate::store::DocumentStore;

/// Handles to the external collaborators
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub positions: Arc<dyn PositionSource>,
}

impl Services {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        positions: Arc<dyn PositionSource>,
    ) -> Self {
        Self {
            store,
            identity,
            positions,
        }
    }
}

pub struct Session {
    session_id: String,
    actor: ActorId,
    matcher: MatchDetector,
    feed: LiveCandidateFeed,
    scheduler: LocationRefreshScheduler,
    active: bool,
}

impl Session {
    /// Start a session for the currently signed-in actor.
    ///
    /// Fails with `NotAuthenticated` when nobody is signed in and with
    /// `PermissionDenied` when location access is refused. The first position
    /// is published before the feed starts, so the first candidate set already
    /// has a reference point.
    pub async fn begin(services: Services, config: &Config) -> Result<Self> {
        let actor = services
            .identity
            .current_actor_id()
            .ok_or(HeartwaveError::NotAuthenticated)?;

        if !services.positions.request_permission().await? {
            return Err(HeartwaveError::PermissionDenied);
        }

        let mut scheduler = LocationRefreshScheduler::new(
            actor.clone(),
            services.positions.clone(),
            services.store.clone(),
            config.refresh.interval(),
        );
        scheduler.refresh_now().await?;

        let feed = LiveCandidateFeed::start(
            services.store.clone(),
            actor.clone(),
            ProximityIndex::new(config.proximity.radius_m),
            config.feed.buffer,
        )
        .await?;
        scheduler.start()?;

        let ledger = HeartLedger::new(services.store.clone(), services.identity.clone());
        let matcher = MatchDetector::new(ledger, services.store.clone());

        let session_id = Uuid::new_v4().to_string();
        info!(session = %session_id, actor = %actor, "Session started");

        Ok(Self {
            session_id,
            actor,
            matcher,
            feed,
            scheduler,
            active: true,
        })
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Next candidate set from the live feed; `None` after the session ended.
    pub async fn next_candidates(&mut self) -> Option<CandidateSet> {
        if !self.active {
            return None;
        }
        self.feed.next().await
    }

    /// Heart `target`. Returns `true` if this heart completed a new match.
    pub async fn send_heart(&self, target: &ActorId) -> Result<bool> {
        self.ensure_active()?;
        let is_new_match = self
            .matcher
            .register_heart_and_check_match(&self.actor, target)
            .await?;
        if is_new_match {
            info!(session = %self.session_id, actor = %self.actor, partner = %target, "It's a match");
        }
        Ok(is_new_match)
    }

    /// Publish the current position now, outside the refresh schedule.
    pub async fn refresh_now(&self) -> Result<PositionRecord> {
        self.ensure_active()?;
        self.scheduler.refresh_now().await
    }

    pub async fn matches(&self) -> Result<Vec<MatchRecord>> {
        self.ensure_active()?;
        self.matcher.matches_for(&self.actor).await
    }

    pub async fn hearts_sent(&self) -> Result<BTreeSet<ActorId>> {
        self.ensure_active()?;
        self.matcher.ledger().hearts_sent(&self.actor).await
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.scheduler.state()
    }

    /// Tear down: stop the refresh timer and cancel the feed.
    pub fn end(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.scheduler.stop();
        self.feed.cancel();
        info!(session = %self.session_id, actor = %self.actor, "Session ended");
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(HeartwaveError::InvalidState(format!(
                "session {} has ended",
                self.session_id
            )))
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}
