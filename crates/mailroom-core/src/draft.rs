//! Draft lifecycle: save, update, send and delete.
//!
//! A draft is an ordinary message whose only per-profile row carries the draft
//! flag and sits in the author's `drafts` folder. Only that author may touch it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::folder::FolderManager;
use crate::model::{FolderType, MessageId, ProfileId, SavedDraft, SentMessage, ThreadId};
use crate::store::{Delivery, DraftContent, MailStore, NewMessage};
use crate::thread::ThreadResolver;
use crate::validation::{Compose, RequestKind, validate, validate_receivers};
use crate::{Error, Result};

/// Manages drafts on behalf of their author.
#[derive(Clone)]
pub struct DraftManager {
    store: Arc<dyn MailStore>,
    folders: FolderManager,
    threads: ThreadResolver,
}

impl DraftManager {
    /// Creates a manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self {
            folders: FolderManager::new(Arc::clone(&store)),
            threads: ThreadResolver::new(Arc::clone(&store)),
            store,
        }
    }

    /// Create a draft, or update it in place when `draft_id` is given.
    ///
    /// A new draft joins `thread_id` when supplied and otherwise starts its own
    /// thread. Updating never changes the thread or folder.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad content, `NotFound` for an unknown draft
    /// or a thread the profile cannot see, and `PermissionDenied` for someone else's draft.
    pub async fn save_draft(
        &self,
        profile_id: ProfileId,
        draft_id: Option<MessageId>,
        thread_id: Option<ThreadId>,
        compose: &Compose,
    ) -> Result<SavedDraft> {
        let clean = validate(RequestKind::Draft, compose)?;

        if let Some(id) = draft_id {
            self.is_draft_belongs_to_user(profile_id, id).await?;
            self.store
                .update_draft(
                    id,
                    &DraftContent {
                        topic: clean.topic,
                        text: clean.text,
                        receivers: clean.receivers,
                        files: clean.files,
                    },
                )
                .await?;
            debug!(profile_id = %profile_id, draft_id = %id, "draft updated");
            return Ok(SavedDraft {
                id,
                thread_id: self.store.thread_of(id).await?,
                created: false,
            });
        }

        let thread = self.threads.binding_for_draft(profile_id, thread_id).await?;
        let drafts = self
            .folders
            .get_folder_by_type(profile_id, FolderType::Drafts)
            .await?;

        let stored = self
            .store
            .insert_message(&NewMessage {
                sender_id: profile_id,
                topic: clean.topic,
                text: clean.text,
                receivers: clean.receivers,
                files: clean.files,
                thread,
                deliveries: vec![Delivery {
                    profile_id,
                    folder_id: drafts.id,
                    is_read: true,
                    is_draft: true,
                }],
            })
            .await?;

        info!(profile_id = %profile_id, draft_id = %stored.id, "draft created");
        Ok(SavedDraft {
            id: stored.id,
            thread_id: Some(stored.thread_id),
            created: true,
        })
    }

    /// Send a draft to its stored receivers.
    ///
    /// The message keeps its id and thread; the author's row moves to `sent` and
    /// every receiver gets an unread copy in `inbox`.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for someone else's draft, `NotFound` for an unknown
    /// draft or receiver, and a validation error if the draft has no receivers.
    pub async fn send_draft(&self, profile_id: ProfileId, draft_id: MessageId) -> Result<SentMessage> {
        self.is_draft_belongs_to_user(profile_id, draft_id).await?;

        let message = self
            .store
            .message(draft_id)
            .await?
            .ok_or_else(|| Error::not_found("draft", draft_id))?;
        let receivers = validate_receivers(RequestKind::Send, &message.receivers)?;
        let routing = self.folders.route_outgoing(profile_id, &receivers).await?;

        let thread_id = match message.thread_id {
            Some(id) if self.store.thread(id).await?.is_some() => id,
            bound => {
                warn!(draft_id = %draft_id, thread_id = ?bound, "draft has no live thread, creating one");
                self.store.create_thread(draft_id).await?.id()
            }
        };

        let created_at = self
            .store
            .promote_draft(draft_id, routing.sender.folder_id, &routing.inbound)
            .await?;

        info!(
            profile_id = %profile_id,
            message_id = %draft_id,
            receivers = routing.inbound.len(),
            "draft sent"
        );
        Ok(SentMessage {
            id: draft_id,
            thread_id,
            created_at,
        })
    }

    /// Delete a draft together with its attachments.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown draft and `PermissionDenied` for someone
    /// else's draft.
    pub async fn delete_draft(&self, profile_id: ProfileId, draft_id: MessageId) -> Result<()> {
        self.is_draft_belongs_to_user(profile_id, draft_id).await?;
        self.store.delete_draft(draft_id).await?;
        info!(profile_id = %profile_id, draft_id = %draft_id, "draft deleted");
        Ok(())
    }

    /// Check that `draft_id` is a draft authored by `profile_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such draft exists and `PermissionDenied` if it
    /// belongs to another profile.
    pub async fn is_draft_belongs_to_user(
        &self,
        profile_id: ProfileId,
        draft_id: MessageId,
    ) -> Result<()> {
        match self.store.draft_owner(draft_id).await? {
            Some(owner) if owner == profile_id => Ok(()),
            Some(_) => Err(Error::PermissionDenied(format!(
                "draft {draft_id} belongs to another profile"
            ))),
            None => Err(Error::not_found("draft", draft_id)),
        }
    }
}
