//! # mailroom-core
//!
//! Message engine for the `Mailroom` internal mail system.
//!
//! This crate provides:
//! - Content validation and HTML escaping
//! - Thread resolution for replies and drafts
//! - Folder management with system-folder protection
//! - Draft lifecycle (save, update, send, delete)
//! - Keyset pagination over mailbox views
//! - Best-effort avatar URL enrichment
//! - Local storage (`SQLite`)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod avatar;
pub mod config;
pub mod draft;
mod error;
pub mod folder;
pub mod model;
pub mod pagination;
pub mod service;
pub mod store;
pub mod thread;
pub mod validation;

pub use avatar::{AvatarEnricher, BlobError, BlobStore};
pub use config::EngineConfig;
pub use draft::DraftManager;
pub use error::{Error, ErrorKind, Result};
pub use folder::FolderManager;
pub use model::{
    File, Folder, FolderId, FolderSummary, FolderType, MailboxInfo, Message, MessageId,
    MessageRow, MessageView, Profile, ProfileId, ProfileMessage, SavedDraft, Sender, SentMessage,
    Thread, ThreadId,
};
pub use pagination::{Cursor, Page, PaginationEngine, Scope};
pub use service::{FolderPage, MailService};
pub use store::{MailStore, NewProfile, SqliteStore};
pub use thread::{ThreadResolution, ThreadResolver};
pub use validation::{Compose, RequestKind, ValidationError};
