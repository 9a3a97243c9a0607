//! Identity provider
//!
//! Supplies the verified actor id of whoever is using this client.

use std::sync::RwLock;

use tracing::info;
use uuid::Uuid;

use crate::models::ActorId;

/// Source of the current verified actor id
pub trait IdentityProvider: Send + Sync {
    /// `None` while nobody is signed in.
    fn current_actor_id(&self) -> Option<ActorId>;
}

/// Local identity with anonymous sign-in and sign-out.
#[derive(Debug, Default)]
pub struct LocalIdentity {
    current: RwLock<Option<ActorId>>,
}

impl LocalIdentity {
    /// Nobody signed in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Already signed in as `actor`.
    pub fn signed_in(actor: impl Into<ActorId>) -> Self {
        Self {
            current: RwLock::new(Some(actor.into())),
        }
    }

    /// Sign in under a fresh random actor id and return it.
    pub fn sign_in_anonymously(&self) -> ActorId {
        let actor = ActorId::new(Uuid::new_v4().to_string());
        self.set(Some(actor.clone()));
        info!(actor = %actor, "Signed in anonymously");
        actor
    }

    pub fn sign_out(&self) {
        if let Some(actor) = self.current_actor_id() {
            info!(actor = %actor, "Signed out");
        }
        self.set(None);
    }

    fn set(&self, actor: Option<ActorId>) {
        match self.current.write() {
            Ok(mut guard) => *guard = actor,
            Err(poisoned) => *poisoned.into_inner() = actor,
        }
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_actor_id(&self) -> Option<ActorId> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
