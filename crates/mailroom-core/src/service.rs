//! The engine facade.
//!
//! [`MailService`] wires the components together behind one handle. Every public
//! operation logs storage failures with full detail before handing the error on;
//! callers only need [`Error::kind`](crate::Error::kind) to build a response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::avatar::{AvatarEnricher, BlobStore};
use crate::config::EngineConfig;
use crate::draft::DraftManager;
use crate::folder::FolderManager;
use crate::model::{
    Folder, FolderId, FolderSummary, MailboxInfo, MessageId, MessageView, Profile, ProfileId,
    SavedDraft, SentMessage, ThreadId,
};
use crate::pagination::{Cursor, Page, PaginationEngine, Scope};
use crate::store::{MailStore, NewMessage, NewProfile, SqliteStore, ThreadBinding};
use crate::thread::{ThreadResolution, ThreadResolver};
use crate::validation::{Compose, RequestKind, validate, validate_identity};
use crate::{Error, Result};

/// A mailbox listing page together with the view's counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderPage {
    /// The requested page.
    pub page: Page,
    /// Total and unread counts for the whole view.
    pub info: MailboxInfo,
}

/// Entry point for all message engine operations.
#[derive(Clone)]
pub struct MailService {
    store: Arc<dyn MailStore>,
    folders: FolderManager,
    threads: ThreadResolver,
    drafts: DraftManager,
    pages: PaginationEngine,
    avatars: AvatarEnricher,
}

impl MailService {
    /// Creates a service over an existing store.
    #[must_use]
    pub fn new(store: Arc<dyn MailStore>, avatars: AvatarEnricher, config: &EngineConfig) -> Self {
        Self {
            folders: FolderManager::new(Arc::clone(&store)),
            threads: ThreadResolver::new(Arc::clone(&store)),
            drafts: DraftManager::new(Arc::clone(&store)),
            pages: PaginationEngine::new(Arc::clone(&store), avatars.clone(), config),
            avatars,
            store,
        }
    }

    /// Open the SQLite database named in `config`.
    ///
    /// Without a blob store avatars are returned as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(config: &EngineConfig, blobs: Option<Arc<dyn BlobStore>>) -> Result<Self> {
        let store: Arc<dyn MailStore> = Arc::new(SqliteStore::new(&config.database_path).await?);
        let avatars = blobs.map_or_else(AvatarEnricher::disabled, |blobs| {
            AvatarEnricher::new(blobs, config.avatar_url_ttl())
        });
        info!(database = %config.database_path, "mail service opened");
        Ok(Self::new(store, avatars, config))
    }

    /// Parse a raw page size parameter using the configured bounds.
    #[must_use]
    pub fn parse_limit(&self, raw: Option<&str>) -> u32 {
        self.pages.parse_limit(raw)
    }

    /// Register a profile and provision its system folders.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed identity and `AlreadyExists` for
    /// a taken email.
    pub async fn create_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let result: Result<Profile> = async {
            let (email, display_name) = validate_identity(&profile.email, &profile.display_name)?;
            let created = self
                .store
                .create_profile(&NewProfile {
                    email,
                    display_name,
                    avatar: profile.avatar.clone(),
                })
                .await?;
            info!(profile_id = %created.id, "profile created");
            Ok(created)
        }
        .await;
        logged("create_profile", result)
    }

    /// Look up a profile by email.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown address.
    pub async fn profile_by_email(&self, email: &str) -> Result<Profile> {
        let result = self
            .store
            .profile_by_email(email.trim())
            .await
            .and_then(|found| found.ok_or_else(|| Error::not_found("profile", email)));
        logged("profile_by_email", result)
    }

    /// Start a new conversation.
    ///
    /// The message gets a fresh thread rooted at itself, lands in the sender's
    /// `sent` folder and in every receiver's `inbox`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad content and `NotFound` for an unknown
    /// receiver. Nothing is written in either case.
    pub async fn send(&self, profile_id: ProfileId, compose: &Compose) -> Result<SentMessage> {
        let result: Result<SentMessage> = async {
            let clean = validate(RequestKind::Send, compose)?;
            let routing = self
                .folders
                .route_outgoing(profile_id, &clean.receivers)
                .await?;

            let stored = self
                .store
                .insert_message(&NewMessage {
                    sender_id: profile_id,
                    topic: clean.topic,
                    text: clean.text,
                    receivers: clean.receivers,
                    files: clean.files,
                    thread: ThreadBinding::NewRoot,
                    deliveries: routing.into_deliveries(),
                })
                .await?;

            info!(
                profile_id = %profile_id,
                message_id = %stored.id,
                thread_id = %stored.thread_id,
                "message sent"
            );
            Ok(SentMessage {
                id: stored.id,
                thread_id: stored.thread_id,
                created_at: stored.created_at,
            })
        }
        .await;
        logged("send", result)
    }

    /// Reply inside the conversation of `root`.
    ///
    /// `thread_id` is an optional hint from the client; it is only used if it
    /// binds to the root message.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad content or a missing root, and `NotFound`
    /// if the caller cannot see the root message or a receiver is unknown.
    pub async fn reply(
        &self,
        profile_id: ProfileId,
        root: Option<MessageId>,
        thread_id: Option<ThreadId>,
        compose: &Compose,
    ) -> Result<SentMessage> {
        let result: Result<SentMessage> = async {
            let clean = validate(RequestKind::Reply, compose)?;
            let routing = self
                .folders
                .route_outgoing(profile_id, &clean.receivers)
                .await?;
            let resolution = self
                .threads
                .resolve_reply(profile_id, root, thread_id)
                .await?;
            if let ThreadResolution::Created(id) = resolution {
                debug!(thread_id = %id, "reply started a thread for an unthreaded root");
            }

            let thread_id = resolution.thread_id();
            let stored = self
                .store
                .insert_message(&NewMessage {
                    sender_id: profile_id,
                    topic: clean.topic,
                    text: clean.text,
                    receivers: clean.receivers,
                    files: clean.files,
                    thread: ThreadBinding::Existing(thread_id),
                    deliveries: routing.into_deliveries(),
                })
                .await?;

            info!(
                profile_id = %profile_id,
                message_id = %stored.id,
                thread_id = %thread_id,
                "reply sent"
            );
            Ok(SentMessage {
                id: stored.id,
                thread_id,
                created_at: stored.created_at,
            })
        }
        .await;
        logged("reply", result)
    }

    /// Create or update a draft. See [`DraftManager::save_draft`].
    ///
    /// # Errors
    ///
    /// Propagates the draft manager's errors.
    pub async fn save_draft(
        &self,
        profile_id: ProfileId,
        draft_id: Option<MessageId>,
        thread_id: Option<ThreadId>,
        compose: &Compose,
    ) -> Result<SavedDraft> {
        logged(
            "save_draft",
            self.drafts
                .save_draft(profile_id, draft_id, thread_id, compose)
                .await,
        )
    }

    /// Send a draft. See [`DraftManager::send_draft`].
    ///
    /// # Errors
    ///
    /// Propagates the draft manager's errors.
    pub async fn send_draft(&self, profile_id: ProfileId, draft_id: MessageId) -> Result<SentMessage> {
        logged(
            "send_draft",
            self.drafts.send_draft(profile_id, draft_id).await,
        )
    }

    /// Delete a draft. See [`DraftManager::delete_draft`].
    ///
    /// # Errors
    ///
    /// Propagates the draft manager's errors.
    pub async fn delete_draft(&self, profile_id: ProfileId, draft_id: MessageId) -> Result<()> {
        logged(
            "delete_draft",
            self.drafts.delete_draft(profile_id, draft_id).await,
        )
    }

    /// Create a custom folder.
    ///
    /// # Errors
    ///
    /// See [`FolderManager::create_folder`].
    pub async fn create_folder(&self, profile_id: ProfileId, name: &str) -> Result<Folder> {
        logged(
            "create_folder",
            self.folders.create_folder(profile_id, name).await,
        )
    }

    /// Rename a custom folder.
    ///
    /// # Errors
    ///
    /// See [`FolderManager::rename_folder`].
    pub async fn rename_folder(
        &self,
        profile_id: ProfileId,
        folder_id: FolderId,
        new_name: &str,
    ) -> Result<Folder> {
        logged(
            "rename_folder",
            self.folders
                .rename_folder(profile_id, folder_id, new_name)
                .await,
        )
    }

    /// Delete a custom folder.
    ///
    /// # Errors
    ///
    /// See [`FolderManager::delete_folder`].
    pub async fn delete_folder(&self, profile_id: ProfileId, folder_id: FolderId) -> Result<()> {
        logged(
            "delete_folder",
            self.folders.delete_folder(profile_id, folder_id).await,
        )
    }

    /// Move a message into another folder.
    ///
    /// # Errors
    ///
    /// See [`FolderManager::move_to_folder`].
    pub async fn move_to_folder(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
        folder_id: FolderId,
    ) -> Result<()> {
        logged(
            "move_to_folder",
            self.folders
                .move_to_folder(profile_id, message_id, folder_id)
                .await,
        )
    }

    /// Flag a message as spam.
    ///
    /// # Errors
    ///
    /// See [`FolderManager::mark_as_spam`].
    pub async fn mark_as_spam(&self, profile_id: ProfileId, message_id: MessageId) -> Result<()> {
        logged(
            "mark_as_spam",
            self.folders.mark_as_spam(profile_id, message_id).await,
        )
    }

    /// Remove a message from a folder.
    ///
    /// # Errors
    ///
    /// See [`FolderManager::delete_from_folder`].
    pub async fn delete_message_from_folder(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
        folder_id: FolderId,
    ) -> Result<()> {
        logged(
            "delete_message_from_folder",
            self.folders
                .delete_from_folder(profile_id, message_id, folder_id)
                .await,
        )
    }

    /// All folders of a profile with their counts, system folders first.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn get_folders(&self, profile_id: ProfileId) -> Result<Vec<FolderSummary>> {
        logged("get_folders", self.folders.get_folders(profile_id).await)
    }

    /// One page of a mailbox view plus the view's counts.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a folder the profile does not own.
    pub async fn get_folder(
        &self,
        profile_id: ProfileId,
        scope: Scope,
        cursor: Cursor,
        limit: u32,
    ) -> Result<FolderPage> {
        let result: Result<FolderPage> = async {
            let page = self
                .pages
                .list_messages(profile_id, scope, cursor, limit)
                .await?;
            let info = self.pages.messages_info(profile_id, scope).await?;
            Ok(FolderPage { page, info })
        }
        .await;
        logged("get_folder", result)
    }

    /// Open a message. The caller's copy is marked read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the caller has no visible copy of the message.
    pub async fn message_page(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
    ) -> Result<MessageView> {
        let result: Result<MessageView> = async {
            let view = self.visible_message(profile_id, message_id).await?;
            if !view.is_draft {
                self.store.mark_read(profile_id, message_id).await?;
            }
            debug!(profile_id = %profile_id, message_id = %message_id, "message opened");
            Ok(view)
        }
        .await;
        logged("message_page", result)
    }

    /// Messages of a conversation the caller can see, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown thread or one the caller has no visible
    /// message in.
    pub async fn thread_messages(
        &self,
        profile_id: ProfileId,
        thread_id: ThreadId,
    ) -> Result<Vec<MessageView>> {
        let result: Result<Vec<MessageView>> = async {
            if self.store.thread(thread_id).await?.is_none() {
                return Err(Error::not_found("thread", thread_id));
            }

            let ids = self.store.thread_messages(profile_id, thread_id).await?;
            if ids.is_empty() {
                return Err(Error::not_found("thread", thread_id));
            }
            let mut views = Vec::with_capacity(ids.len());
            for id in ids {
                views.push(self.visible_message(profile_id, id).await?);
            }
            Ok(views)
        }
        .await;
        logged("thread_messages", result)
    }

    async fn visible_message(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
    ) -> Result<MessageView> {
        let row = match self.store.profile_message(profile_id, message_id).await? {
            Some(row) if !row.is_deleted => row,
            _ => return Err(Error::not_found("message", message_id)),
        };
        let mut message = self
            .store
            .message(message_id)
            .await?
            .ok_or_else(|| Error::not_found("message", message_id))?;
        self.avatars.enrich(&mut message.sender).await;

        Ok(MessageView {
            message,
            folder_id: row.folder_id,
            is_draft: row.is_draft,
            is_spam: row.is_spam,
        })
    }
}

/// Log a failed operation at the boundary. Internal failures carry full detail
/// here; the caller only sees the classification.
fn logged<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_internal() {
            error!(operation, error = %e, "operation failed");
        } else {
            debug!(operation, kind = ?e.kind(), error = %e, "operation rejected");
        }
    }
    result
}
