//! Domain model types shared by the engine components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw database id.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a profile (a mailbox owner), resolved upstream from the caller's token.
    ProfileId
);
id_type!(
    /// Identifier of a physical message.
    MessageId
);
id_type!(
    /// Identifier of a conversation thread.
    ThreadId
);
id_type!(
    /// Identifier of a folder.
    FolderId
);

/// Kind of folder. Every profile owns exactly one folder of each system kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    /// Received messages.
    Inbox,
    /// Messages sent by the profile.
    Sent,
    /// Unsent drafts.
    Drafts,
    /// Messages removed from other folders.
    Trash,
    /// Messages flagged as spam.
    Spam,
    /// User-created folder.
    Custom,
}

impl FolderType {
    /// The system folder kinds, in display order.
    pub const SYSTEM: [Self; 5] = [
        Self::Inbox,
        Self::Sent,
        Self::Drafts,
        Self::Trash,
        Self::Spam,
    ];

    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inbox" => Some(Self::Inbox),
            "sent" => Some(Self::Sent),
            "drafts" => Some(Self::Drafts),
            "trash" => Some(Self::Trash),
            "spam" => Some(Self::Spam),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Trash => "trash",
            Self::Spam => "spam",
            Self::Custom => "custom",
        }
    }

    /// Returns true for the fixed per-profile folders.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        !matches!(self, Self::Custom)
    }

    /// Display name used when provisioning the folder.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::Sent => "Sent",
            Self::Drafts => "Drafts",
            Self::Trash => "Trash",
            Self::Spam => "Spam",
            Self::Custom => "Custom",
        }
    }

    /// Returns true if `name` collides with a folder type keyword.
    #[must_use]
    pub fn is_reserved_name(name: &str) -> bool {
        Self::parse(name.trim()).is_some()
    }
}

impl std::fmt::Display for FolderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A folder owned by a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Unique identifier.
    pub id: FolderId,
    /// Owning profile.
    pub profile_id: ProfileId,
    /// Display name.
    pub name: String,
    /// Folder kind.
    pub folder_type: FolderType,
}

impl Folder {
    /// Returns true if this folder cannot be renamed or deleted.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        self.folder_type.is_system()
    }
}

/// A folder together with its message counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSummary {
    /// The folder.
    pub folder: Folder,
    /// Total counts for the folder.
    pub info: MailboxInfo,
}

/// Total and unread counts for a mailbox view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxInfo {
    /// Visible messages in the view.
    pub total: u32,
    /// Visible unread messages in the view.
    pub unread: u32,
}

/// A profile as known to the message engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique identifier.
    pub id: ProfileId,
    /// Mail address (unique, case-insensitive).
    pub email: String,
    /// Display name.
    pub display_name: String,
    /// Avatar object locator, if the profile has one.
    pub avatar: Option<String>,
}

/// Denormalized sender identity attached to messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Sender profile.
    pub profile_id: ProfileId,
    /// Sender address.
    pub email: String,
    /// Sender display name.
    pub display_name: String,
    /// Avatar locator, or a display URL once enriched.
    pub avatar: Option<String>,
}

impl From<Profile> for Sender {
    fn from(profile: Profile) -> Self {
        Self {
            profile_id: profile.id,
            email: profile.email,
            display_name: profile.display_name,
            avatar: profile.avatar,
        }
    }
}

/// An attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Base file name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Object locator in blob storage.
    pub locator: String,
}

/// A stored message with its sender, receivers and attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Who wrote the message.
    pub sender: Sender,
    /// Subject line (escaped).
    pub topic: String,
    /// Body text (escaped).
    pub text: String,
    /// Send time, or last save time for drafts.
    pub created_at: DateTime<Utc>,
    /// Conversation this message belongs to.
    pub thread_id: Option<ThreadId>,
    /// Receiver addresses.
    pub receivers: Vec<String>,
    /// Attached files.
    pub files: Vec<File>,
}

/// Per-recipient view of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProfileMessage {
    /// Profile the view belongs to.
    pub profile_id: ProfileId,
    /// Shared message.
    pub message_id: MessageId,
    /// Folder the message currently sits in for this profile.
    pub folder_id: Option<FolderId>,
    /// Whether the profile has read it.
    pub is_read: bool,
    /// Whether the profile deleted it from trash.
    pub is_deleted: bool,
    /// Whether it is still an unsent draft.
    pub is_draft: bool,
    /// Whether the profile flagged it as spam.
    pub is_spam: bool,
}

/// A conversation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Unique identifier.
    pub id: ThreadId,
    /// Message that started the conversation.
    pub root_message_id: MessageId,
    /// When the thread was created.
    pub created_at: DateTime<Utc>,
    /// When a message was last bound to the thread.
    pub updated_at: DateTime<Utc>,
}

/// One row of a mailbox listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    /// Message identifier.
    pub id: MessageId,
    /// Who wrote the message.
    pub sender: Sender,
    /// Subject line.
    pub topic: String,
    /// Send time.
    pub created_at: DateTime<Utc>,
    /// Conversation the message belongs to.
    pub thread_id: Option<ThreadId>,
    /// Whether the listing profile has read it.
    pub is_read: bool,
    /// Number of attached files.
    pub file_count: u32,
}

/// A full message as shown to one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    /// The message content.
    pub message: Message,
    /// Folder the message sits in for the viewing profile.
    pub folder_id: Option<FolderId>,
    /// Whether it is a draft.
    pub is_draft: bool,
    /// Whether the viewing profile flagged it as spam.
    pub is_spam: bool,
}

/// Result of sending a message or a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Message identifier.
    pub id: MessageId,
    /// Thread the message belongs to.
    pub thread_id: ThreadId,
    /// Send time.
    pub created_at: DateTime<Utc>,
}

/// Result of saving a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDraft {
    /// Draft identifier, stable across updates.
    pub id: MessageId,
    /// Thread the draft is attached to.
    pub thread_id: Option<ThreadId>,
    /// Whether this save created the draft.
    pub created: bool,
}
