//! Persistence boundary for the engine.
//!
//! The engine only ever talks to storage through [`MailStore`]. Each method is a
//! single unit of work: methods that write several rows run them in one
//! transaction, so a failed call leaves nothing half-written.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::model::{
    File, Folder, FolderId, FolderSummary, FolderType, MailboxInfo, Message, MessageId,
    MessageRow, Profile, ProfileId, ProfileMessage, Thread, ThreadId,
};
use crate::pagination::Cursor;

pub use sqlite::SqliteStore;

/// A profile to register with the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    /// Mail address.
    pub email: String,
    /// Display name.
    pub display_name: String,
    /// Avatar object locator.
    pub avatar: Option<String>,
}

impl NewProfile {
    /// Creates a profile without an avatar.
    #[must_use]
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: display_name.into(),
            avatar: None,
        }
    }

    /// Sets the avatar locator.
    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// Placement of a message in one profile's folder view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Profile receiving the view.
    pub profile_id: ProfileId,
    /// Folder the message lands in.
    pub folder_id: FolderId,
    /// Initial read state.
    pub is_read: bool,
    /// Whether the view is an unsent draft.
    pub is_draft: bool,
}

/// How a new message joins a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadBinding {
    /// Start a new thread rooted at the inserted message.
    NewRoot,
    /// Join an existing thread.
    Existing(ThreadId),
}

/// A message to insert, with its thread binding and per-profile placements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Author profile.
    pub sender_id: ProfileId,
    /// Escaped topic.
    pub topic: String,
    /// Escaped text.
    pub text: String,
    /// Receiver addresses.
    pub receivers: Vec<String>,
    /// Attachments.
    pub files: Vec<File>,
    /// Thread the message joins.
    pub thread: ThreadBinding,
    /// Folder placements; the first entry wins if a profile appears twice.
    pub deliveries: Vec<Delivery>,
}

/// Identifiers assigned to an inserted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredMessage {
    /// New message id.
    pub id: MessageId,
    /// Thread the message was bound to.
    pub thread_id: ThreadId,
    /// Stored timestamp.
    pub created_at: DateTime<Utc>,
}

/// Outcome of creating a thread for a root message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadCreation {
    /// A new thread row was inserted.
    Created(ThreadId),
    /// Another writer already created the thread for this root.
    Existing(ThreadId),
}

impl ThreadCreation {
    /// The thread id, whichever way it was obtained.
    #[must_use]
    pub const fn id(&self) -> ThreadId {
        match self {
            Self::Created(id) | Self::Existing(id) => *id,
        }
    }
}

/// Replacement content for a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftContent {
    /// Escaped topic.
    pub topic: String,
    /// Escaped text.
    pub text: String,
    /// Receiver addresses.
    pub receivers: Vec<String>,
    /// Attachments.
    pub files: Vec<File>,
}

/// Repository for profiles, folders, threads and messages.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Register a profile and provision its system folders.
    async fn create_profile(&self, profile: &NewProfile) -> Result<Profile>;

    /// Get a profile by id.
    async fn profile(&self, id: ProfileId) -> Result<Option<Profile>>;

    /// Get a profile by mail address (case-insensitive).
    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>>;

    /// Insert a folder. Name and type collisions are reported as `AlreadyExists`.
    async fn insert_folder(
        &self,
        profile_id: ProfileId,
        name: &str,
        folder_type: FolderType,
    ) -> Result<Folder>;

    /// Get a folder by id.
    async fn folder(&self, id: FolderId) -> Result<Option<Folder>>;

    /// Get a profile's folder of the given type.
    async fn folder_by_type(
        &self,
        profile_id: ProfileId,
        folder_type: FolderType,
    ) -> Result<Option<Folder>>;

    /// Get a profile's folder by name (case-insensitive).
    async fn folder_by_name(&self, profile_id: ProfileId, name: &str) -> Result<Option<Folder>>;

    /// List a profile's folders with counts, system folders first.
    async fn list_folders(&self, profile_id: ProfileId) -> Result<Vec<FolderSummary>>;

    /// Rename a folder.
    async fn rename_folder(&self, id: FolderId, name: &str) -> Result<()>;

    /// Delete a folder, moving its messages into `reassign_to`.
    async fn delete_folder(&self, id: FolderId, reassign_to: FolderId) -> Result<()>;

    /// Total and unread counts for a profile's folder.
    async fn folder_info(&self, profile_id: ProfileId, folder_id: FolderId)
    -> Result<MailboxInfo>;

    /// Insert a message with its thread binding, files and placements.
    async fn insert_message(&self, message: &NewMessage) -> Result<StoredMessage>;

    /// Get a full message.
    async fn message(&self, id: MessageId) -> Result<Option<Message>>;

    /// Get one profile's view of a message.
    async fn profile_message(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
    ) -> Result<Option<ProfileMessage>>;

    /// Move a profile's view of a message into a folder, setting the spam flag
    /// to match the target folder.
    async fn set_folder(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
        folder_id: FolderId,
        is_spam: bool,
    ) -> Result<()>;

    /// Mark a profile's view of a message read.
    async fn mark_read(&self, profile_id: ProfileId, message_id: MessageId) -> Result<()>;

    /// Flag a profile's view of a message as spam and move it to `spam_folder`.
    async fn mark_spam(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
        spam_folder: FolderId,
    ) -> Result<()>;

    /// Hide a profile's view of a message from every listing.
    async fn mark_deleted(&self, profile_id: ProfileId, message_id: MessageId) -> Result<()>;

    /// Newest-first page of a folder, strictly after `cursor`.
    async fn list_page(
        &self,
        profile_id: ProfileId,
        folder_id: FolderId,
        cursor: &Cursor,
        fetch: u32,
    ) -> Result<Vec<MessageRow>>;

    /// Get a thread by id.
    async fn thread(&self, id: ThreadId) -> Result<Option<Thread>>;

    /// Thread currently bound to a message.
    async fn thread_of(&self, message_id: MessageId) -> Result<Option<ThreadId>>;

    /// Bind a thread to a message.
    ///
    /// Returns `false` when the thread or message does not exist, or the message is
    /// already bound to a different thread. Rebinding the same pair succeeds.
    async fn attach_thread(&self, thread_id: ThreadId, message_id: MessageId) -> Result<bool>;

    /// Create the thread rooted at `root` and bind it to `root`.
    async fn create_thread(&self, root: MessageId) -> Result<ThreadCreation>;

    /// Ids of the thread's messages visible to a profile, oldest first.
    async fn thread_messages(
        &self,
        profile_id: ProfileId,
        thread_id: ThreadId,
    ) -> Result<Vec<MessageId>>;

    /// Owner of a draft, or `None` if no draft with this id exists.
    async fn draft_owner(&self, message_id: MessageId) -> Result<Option<ProfileId>>;

    /// Replace a draft's content in place.
    async fn update_draft(&self, message_id: MessageId, content: &DraftContent) -> Result<()>;

    /// Turn a draft into a sent message and deliver it. Returns the send time.
    async fn promote_draft(
        &self,
        message_id: MessageId,
        sent_folder: FolderId,
        deliveries: &[Delivery],
    ) -> Result<DateTime<Utc>>;

    /// Remove a draft with its attachments and any thread it solely roots.
    async fn delete_draft(&self, message_id: MessageId) -> Result<()>;
}
