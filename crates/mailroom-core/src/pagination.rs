//! Keyset pagination for mailbox listings.
//!
//! Pages are addressed by the sort key of the last row seen, never by offset, so
//! messages arriving between two page fetches neither shift nor duplicate rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::avatar::AvatarEnricher;
use crate::config::EngineConfig;
use crate::folder::FolderManager;
use crate::model::{Folder, FolderId, FolderType, MailboxInfo, MessageId, MessageRow, ProfileId};
use crate::store::MailStore;
use crate::Result;

/// Which mailbox view to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// The profile's inbox.
    Inbox,
    /// The profile's sent folder.
    Sent,
    /// Any folder the profile owns.
    Folder(FolderId),
}

/// Position after which the next page starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Id of the last message on the previous page, `0` for the first page.
    pub last_message_id: MessageId,
    /// Timestamp of the last message on the previous page.
    pub last_datetime: DateTime<Utc>,
}

impl Cursor {
    /// Cursor for the most recent page.
    #[must_use]
    pub fn start() -> Self {
        Self {
            last_message_id: MessageId::new(0),
            last_datetime: DateTime::<Utc>::default(),
        }
    }

    /// Returns true if this cursor addresses the first page.
    #[must_use]
    pub const fn is_start(&self) -> bool {
        self.last_message_id.0 == 0
    }

    /// Cursor positioned after `row`.
    #[must_use]
    pub const fn after(row: &MessageRow) -> Self {
        Self {
            last_message_id: row.id,
            last_datetime: row.created_at,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::start()
    }
}

/// One page of a mailbox listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Rows, newest first.
    pub messages: Vec<MessageRow>,
    /// Cursor to request the following page with.
    pub next_cursor: Cursor,
    /// Whether at least one more row follows this page.
    pub has_next: bool,
}

/// Serves cursor-based mailbox listings.
#[derive(Clone)]
pub struct PaginationEngine {
    store: Arc<dyn MailStore>,
    folders: FolderManager,
    avatars: AvatarEnricher,
    default_limit: u32,
    max_limit: u32,
}

impl PaginationEngine {
    /// Creates an engine using the page size bounds from `config`.
    #[must_use]
    pub fn new(store: Arc<dyn MailStore>, avatars: AvatarEnricher, config: &EngineConfig) -> Self {
        Self {
            folders: FolderManager::new(Arc::clone(&store)),
            store,
            avatars,
            default_limit: config.page_size_default,
            max_limit: config.page_size_max,
        }
    }

    /// Parse a raw limit parameter.
    ///
    /// Missing, unparsable or out-of-range values fall back to the default page size.
    #[must_use]
    pub fn parse_limit(&self, raw: Option<&str>) -> u32 {
        raw.and_then(|s| s.trim().parse::<u32>().ok())
            .map_or(self.default_limit, |limit| self.clamp_limit(limit))
    }

    fn clamp_limit(&self, limit: u32) -> u32 {
        if (1..=self.max_limit).contains(&limit) {
            limit
        } else {
            self.default_limit
        }
    }

    /// List one page of a mailbox view, newest first, strictly after `cursor`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the scope names a folder the profile does not own, or a
    /// storage error.
    pub async fn list_messages(
        &self,
        profile_id: ProfileId,
        scope: Scope,
        cursor: Cursor,
        limit: u32,
    ) -> Result<Page> {
        let limit = self.clamp_limit(limit);
        let folder = self.resolve_scope(profile_id, scope).await?;

        // One extra row tells whether another page exists
        let mut messages = self
            .store
            .list_page(profile_id, folder.id, &cursor, limit.saturating_add(1))
            .await?;
        let has_next = messages.len() > limit as usize;
        messages.truncate(limit as usize);

        let next_cursor = messages.last().map_or(cursor, Cursor::after);
        self.avatars.enrich_rows(&mut messages).await;

        debug!(
            profile_id = %profile_id,
            folder_id = %folder.id,
            rows = messages.len(),
            has_next,
            "mailbox page served"
        );

        Ok(Page {
            messages,
            next_cursor,
            has_next,
        })
    }

    /// Total and unread counts for a mailbox view.
    ///
    /// Computed independently of any page; the two are not read in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a foreign folder, or a storage error.
    pub async fn messages_info(&self, profile_id: ProfileId, scope: Scope) -> Result<MailboxInfo> {
        let folder = self.resolve_scope(profile_id, scope).await?;
        self.store.folder_info(profile_id, folder.id).await
    }

    async fn resolve_scope(&self, profile_id: ProfileId, scope: Scope) -> Result<Folder> {
        match scope {
            Scope::Inbox => {
                self.folders
                    .get_folder_by_type(profile_id, FolderType::Inbox)
                    .await
            }
            Scope::Sent => {
                self.folders
                    .get_folder_by_type(profile_id, FolderType::Sent)
                    .await
            }
            Scope::Folder(id) => self.folders.owned_folder(profile_id, id).await,
        }
    }
}
