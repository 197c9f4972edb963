//! Folder lifecycle and message classification.
//!
//! All folder-name checks live here: no code path can create or rename a folder
//! into a reserved or duplicate name without passing through [`FolderManager`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::model::{Folder, FolderId, FolderSummary, FolderType, MessageId, ProfileId, ProfileMessage};
use crate::store::{Delivery, MailStore};
use crate::validation::validate_folder_name;
use crate::{Error, Result};

/// Owns folder CRUD and the placement of messages into folders.
#[derive(Clone)]
pub struct FolderManager {
    store: Arc<dyn MailStore>,
}

impl FolderManager {
    /// Creates a manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }

    /// Create a custom folder.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank, overlong or forbidden names, and
    /// `AlreadyExists` for reserved names or a name the profile already uses.
    pub async fn create_folder(&self, profile_id: ProfileId, name: &str) -> Result<Folder> {
        let name = validate_folder_name(name)?;
        self.ensure_name_available(profile_id, &name, None).await?;

        let folder = self
            .store
            .insert_folder(profile_id, &name, FolderType::Custom)
            .await?;
        info!(profile_id = %profile_id, folder_id = %folder.id, "folder created");
        Ok(folder)
    }

    /// Rename a custom folder.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the profile does not own the folder, `Protected` for
    /// system folders, and the same name errors as [`Self::create_folder`].
    pub async fn rename_folder(
        &self,
        profile_id: ProfileId,
        folder_id: FolderId,
        new_name: &str,
    ) -> Result<Folder> {
        let folder = self.owned_folder(profile_id, folder_id).await?;
        if folder.is_protected() {
            return Err(Error::Protected(format!("{} folder", folder.folder_type)));
        }

        let name = validate_folder_name(new_name)?;
        self.ensure_name_available(profile_id, &name, Some(folder.id))
            .await?;

        self.store.rename_folder(folder.id, &name).await?;
        info!(profile_id = %profile_id, folder_id = %folder.id, "folder renamed");
        Ok(Folder { name, ..folder })
    }

    /// Delete a custom folder. Its messages move to the profile's inbox.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the profile does not own the folder and `Protected`
    /// for system folders.
    pub async fn delete_folder(&self, profile_id: ProfileId, folder_id: FolderId) -> Result<()> {
        let folder = self.owned_folder(profile_id, folder_id).await?;
        if folder.is_protected() {
            return Err(Error::Protected(format!("{} folder", folder.folder_type)));
        }

        let inbox = self.get_folder_by_type(profile_id, FolderType::Inbox).await?;
        self.store.delete_folder(folder.id, inbox.id).await?;
        info!(profile_id = %profile_id, folder_id = %folder.id, "folder deleted");
        Ok(())
    }

    /// Move a profile's view of a message into one of its folders.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the profile has no visible copy of the message or does
    /// not own the folder, and `Protected` when a draft would leave `drafts` or a
    /// sent message would enter it.
    pub async fn move_to_folder(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
        folder_id: FolderId,
    ) -> Result<()> {
        let folder = self.owned_folder(profile_id, folder_id).await?;
        let view = self.visible_view(profile_id, message_id).await?;

        let into_drafts = folder.folder_type == FolderType::Drafts;
        if into_drafts != view.is_draft {
            return Err(Error::Protected(format!(
                "message {message_id} cannot move to {} folder",
                folder.folder_type
            )));
        }

        let is_spam = folder.folder_type == FolderType::Spam;
        self.store
            .set_folder(profile_id, message_id, folder.id, is_spam)
            .await?;
        debug!(profile_id = %profile_id, message_id = %message_id, folder_id = %folder.id, "message moved");
        Ok(())
    }

    /// Flag a message as spam for this profile and move it to `spam`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the profile has no visible copy of the message.
    pub async fn mark_as_spam(&self, profile_id: ProfileId, message_id: MessageId) -> Result<()> {
        let view = self.visible_view(profile_id, message_id).await?;
        if view.is_draft {
            return Err(Error::Protected(format!("draft {message_id}")));
        }

        let spam = self.get_folder_by_type(profile_id, FolderType::Spam).await?;
        self.store
            .mark_spam(profile_id, message_id, spam.id)
            .await?;
        info!(profile_id = %profile_id, message_id = %message_id, "message marked as spam");
        Ok(())
    }

    /// Remove a message from a folder.
    ///
    /// Outside `trash` the message moves to `trash`; inside `trash` it is deleted
    /// for this profile and disappears from every listing.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the message is not currently in that folder.
    pub async fn delete_from_folder(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
        folder_id: FolderId,
    ) -> Result<()> {
        let folder = self.owned_folder(profile_id, folder_id).await?;
        let view = self.visible_view(profile_id, message_id).await?;
        if view.folder_id != Some(folder.id) {
            return Err(Error::NotFound(format!(
                "message {message_id} in folder {folder_id}"
            )));
        }
        if view.is_draft {
            return Err(Error::Protected(format!("draft {message_id}")));
        }

        if folder.folder_type == FolderType::Trash {
            self.store.mark_deleted(profile_id, message_id).await?;
            info!(profile_id = %profile_id, message_id = %message_id, "message deleted");
        } else {
            let trash = self.get_folder_by_type(profile_id, FolderType::Trash).await?;
            self.store
                .set_folder(profile_id, message_id, trash.id, false)
                .await?;
            debug!(profile_id = %profile_id, message_id = %message_id, "message moved to trash");
        }
        Ok(())
    }

    /// Resolve a profile's system folder.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the profile has no folder of that type.
    pub async fn get_folder_by_type(
        &self,
        profile_id: ProfileId,
        folder_type: FolderType,
    ) -> Result<Folder> {
        self.store
            .folder_by_type(profile_id, folder_type)
            .await?
            .ok_or_else(|| Error::not_found(folder_type.as_str(), format!("folder of profile {profile_id}")))
    }

    /// Resolve a folder id, requiring that the profile owns it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the folder does not exist or belongs to someone else.
    pub async fn owned_folder(&self, profile_id: ProfileId, folder_id: FolderId) -> Result<Folder> {
        match self.store.folder(folder_id).await? {
            Some(folder) if folder.profile_id == profile_id => Ok(folder),
            _ => Err(Error::not_found("folder", folder_id)),
        }
    }

    /// List the profile's folders with counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub async fn get_folders(&self, profile_id: ProfileId) -> Result<Vec<FolderSummary>> {
        self.store.list_folders(profile_id).await
    }

    /// Classify an outgoing message: the sender keeps it in `sent`, every receiver
    /// gets it unread in `inbox`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if a receiver address has no profile.
    pub(crate) async fn route_outgoing(
        &self,
        sender_id: ProfileId,
        receivers: &[String],
    ) -> Result<Routing> {
        let sent = self.get_folder_by_type(sender_id, FolderType::Sent).await?;

        let mut inbound = Vec::with_capacity(receivers.len());
        for address in receivers {
            let profile = self
                .store
                .profile_by_email(address)
                .await?
                .ok_or_else(|| Error::not_found("receiver", address))?;
            if profile.id == sender_id {
                continue;
            }
            let inbox = self.get_folder_by_type(profile.id, FolderType::Inbox).await?;
            inbound.push(Delivery {
                profile_id: profile.id,
                folder_id: inbox.id,
                is_read: false,
                is_draft: false,
            });
        }

        Ok(Routing {
            sender: Delivery {
                profile_id: sender_id,
                folder_id: sent.id,
                is_read: true,
                is_draft: false,
            },
            inbound,
        })
    }

    async fn visible_view(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
    ) -> Result<ProfileMessage> {
        match self.store.profile_message(profile_id, message_id).await? {
            Some(view) if !view.is_deleted => Ok(view),
            _ => Err(Error::not_found("message", message_id)),
        }
    }

    async fn ensure_name_available(
        &self,
        profile_id: ProfileId,
        name: &str,
        renaming: Option<FolderId>,
    ) -> Result<()> {
        if FolderType::is_reserved_name(name) {
            return Err(Error::AlreadyExists(format!("folder name {name} is reserved")));
        }

        match self.store.folder_by_name(profile_id, name).await? {
            Some(existing) if Some(existing.id) != renaming => {
                Err(Error::AlreadyExists(format!("folder {name}")))
            }
            _ => Ok(()),
        }
    }
}

/// Folder placements for an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Routing {
    /// The sender's `sent` placement.
    pub sender: Delivery,
    /// One `inbox` placement per receiver.
    pub inbound: Vec<Delivery>,
}

impl Routing {
    /// All placements, sender first.
    pub fn into_deliveries(self) -> Vec<Delivery> {
        std::iter::once(self.sender).chain(self.inbound).collect()
    }
}
