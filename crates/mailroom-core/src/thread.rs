//! Thread-root resolution for replies and drafts.
//!
//! A reply must carry exactly one thread id. The resolver reuses an existing thread
//! whenever a valid one can be found and only creates a thread as a last resort:
//!
//! 1. A client-supplied thread id is tried first, but only kept if binding it to
//!    the root message succeeds.
//! 2. Otherwise the root message's own binding is reused if it points at a live
//!    thread.
//! 3. Otherwise a thread rooted at the root message is created and bound.
//!
//! Step 3 can race with a concurrent reply. The store keeps one thread per root
//! message, so the loser of the race receives the winner's thread instead of a
//! duplicate.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::model::{MessageId, ProfileId, ThreadId};
use crate::store::{MailStore, ThreadBinding, ThreadCreation};
use crate::validation::ValidationError;
use crate::{Error, Result};

/// How the thread for a reply was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadResolution {
    /// An existing thread was reused.
    Reused(ThreadId),
    /// A new thread was created for the root message.
    Created(ThreadId),
}

impl ThreadResolution {
    /// The resolved thread id.
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        match self {
            Self::Reused(id) | Self::Created(id) => *id,
        }
    }
}

/// Decides which thread a message joins.
#[derive(Clone)]
pub struct ThreadResolver {
    store: Arc<dyn MailStore>,
}

impl ThreadResolver {
    /// Creates a resolver over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }

    /// Resolve the thread a reply to `root` must carry.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `root` is absent or not a positive id, and
    /// `NotFound` if the replying profile cannot see the root message.
    pub async fn resolve_reply(
        &self,
        profile_id: ProfileId,
        root: Option<MessageId>,
        candidate: Option<ThreadId>,
    ) -> Result<ThreadResolution> {
        let root = match root {
            Some(id) if id.0 > 0 => id,
            _ => return Err(ValidationError::MissingRootMessage.into()),
        };

        match self.store.profile_message(profile_id, root).await? {
            Some(view) if !view.is_deleted && !view.is_draft => {}
            _ => return Err(Error::not_found("message", root)),
        }

        if let Some(candidate) = candidate.filter(|id| id.0 > 0) {
            if self.store.attach_thread(candidate, root).await? {
                debug!(root = %root, thread_id = %candidate, "reusing supplied thread");
                return Ok(ThreadResolution::Reused(candidate));
            }
            debug!(root = %root, thread_id = %candidate, "supplied thread rejected");
        }

        if let Some(bound) = self.store.thread_of(root).await? {
            if self.store.thread(bound).await?.is_some() {
                debug!(root = %root, thread_id = %bound, "reusing root thread");
                return Ok(ThreadResolution::Reused(bound));
            }
            warn!(root = %root, thread_id = %bound, "root bound to missing thread, recreating");
        }

        match self.store.create_thread(root).await? {
            ThreadCreation::Created(id) => {
                info!(root = %root, thread_id = %id, "thread created");
                Ok(ThreadResolution::Created(id))
            }
            ThreadCreation::Existing(id) => {
                warn!(root = %root, thread_id = %id, "thread already created concurrently");
                Ok(ThreadResolution::Reused(id))
            }
        }
    }

    /// Thread binding for a newly saved draft.
    ///
    /// Without an explicit thread the draft starts its own conversation. An
    /// explicit thread must hold at least one sent message the profile can see.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the thread does not exist or is not visible to the
    /// profile.
    pub async fn binding_for_draft(
        &self,
        profile_id: ProfileId,
        thread: Option<ThreadId>,
    ) -> Result<ThreadBinding> {
        let Some(id) = thread.filter(|id| id.0 > 0) else {
            return Ok(ThreadBinding::NewRoot);
        };

        if self.store.thread(id).await?.is_some() {
            for message_id in self.store.thread_messages(profile_id, id).await? {
                if let Some(view) = self.store.profile_message(profile_id, message_id).await?
                    && !view.is_draft
                {
                    return Ok(ThreadBinding::Existing(id));
                }
            }
            debug!(profile_id = %profile_id, thread_id = %id, "draft thread not visible");
        }
        Err(Error::not_found("thread", id))
    }
}
