//! The signed-in actor.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use edusync_protocol::{from_cbor, to_cbor, RecordId};
use edusync_storage::LocalStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const ACTOR_KEY: &str = "session.actor";

/// What the actor may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Sees every record.
    Admin,
    /// Sees the records of the assigned classes.
    Staff {
        /// Assigned classes.
        class_ids: Vec<RecordId>,
    },
    /// Sees their own records and their class's shared records.
    Member {
        /// Enrolled class.
        class_id: RecordId,
        /// Enrolled section.
        section_id: Option<RecordId>,
    },
}

/// The person a sync pass runs for.
///
/// `id` is also the id of the actor's own `Users` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor id.
    pub id: RecordId,
    /// Role and scope.
    pub role: Role,
}

impl Actor {
    /// Creates an actor.
    pub fn new(id: RecordId, role: Role) -> Self {
        Self { id, role }
    }
}

/// Answers "who is signed in and with which role".
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the current actor.
    ///
    /// # Errors
    ///
    /// Returns `Identity` if nobody is signed in.
    async fn current_actor(&self) -> SyncResult<Actor>;

    /// Forgets the current actor. Called on logout.
    async fn forget_actor(&self) -> SyncResult<()>;
}

/// Identity cached in the local key-value store.
///
/// The actor survives restarts so an offline device can keep syncing its
/// outbox and reading its mirror without signing in again.
pub struct SessionIdentity {
    store: Arc<dyn LocalStore>,
    cached: RwLock<Option<Actor>>,
}

impl SessionIdentity {
    /// Creates a session over a local store.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
        }
    }

    /// Records the signed-in actor.
    pub fn sign_in(&self, actor: Actor) -> SyncResult<()> {
        self.store.put_value(ACTOR_KEY, to_cbor(&actor)?)?;
        tracing::info!(actor = %actor.id, "signed in");
        *self.cached.write() = Some(actor);
        Ok(())
    }

    /// Forgets the signed-in actor.
    pub fn sign_out(&self) -> SyncResult<()> {
        *self.cached.write() = None;
        self.store.remove_value(ACTOR_KEY)?;
        Ok(())
    }

    /// Returns the actor, reading the cache cell if needed.
    pub fn actor(&self) -> SyncResult<Option<Actor>> {
        if let Some(actor) = self.cached.read().clone() {
            return Ok(Some(actor));
        }

        let Some(bytes) = self.store.get_value(ACTOR_KEY)? else {
            return Ok(None);
        };
        let actor: Actor = from_cbor(&bytes)?;
        *self.cached.write() = Some(actor.clone());
        Ok(Some(actor))
    }
}

#[async_trait]
impl IdentityProvider for SessionIdentity {
    async fn current_actor(&self) -> SyncResult<Actor> {
        self.actor()
            .map_err(|e| SyncError::Identity(e.to_string()))?
            .ok_or_else(|| SyncError::Identity("no signed-in actor".into()))
    }

    async fn forget_actor(&self) -> SyncResult<()> {
        self.sign_out()
    }
}
