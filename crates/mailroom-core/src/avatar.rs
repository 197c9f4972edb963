//! Best-effort avatar URL enrichment.
//!
//! Avatars are stored as object locators. At read time they are swapped for a
//! short-lived display URL from blob storage. Any failure leaves the original
//! locator in place and is only logged; the calling operation never fails
//! because of an avatar.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use url::Url;

use crate::model::{MessageRow, Sender};

const AVATAR_PREFIX: &str = "avatars/";

/// Errors reported by blob storage.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// No object stored under the key.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Storage could not be reached or refused the request.
    #[error("Blob storage unavailable: {0}")]
    Unavailable(String),
}

/// Object storage holding avatars and attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Resolve an object key to a display URL valid for `ttl`.
    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String, BlobError>;
}

/// Rewrites sender avatar locators into display URLs.
#[derive(Clone)]
pub struct AvatarEnricher {
    blobs: Option<Arc<dyn BlobStore>>,
    ttl: Duration,
}

impl AvatarEnricher {
    /// Creates an enricher backed by `blobs`.
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>, ttl: Duration) -> Self {
        Self {
            blobs: Some(blobs),
            ttl,
        }
    }

    /// Creates an enricher that leaves avatars untouched.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            blobs: None,
            ttl: Duration::ZERO,
        }
    }

    /// Replace the sender's avatar locator with a display URL, if possible.
    pub async fn enrich(&self, sender: &mut Sender) {
        let Some(blobs) = &self.blobs else {
            return;
        };
        let Some(locator) = sender.avatar.as_deref() else {
            return;
        };
        let Some(key) = object_key(locator) else {
            warn!(profile_id = %sender.profile_id, locator, "avatar locator has no object key");
            return;
        };

        match blobs.presigned_url(&key, self.ttl).await {
            Ok(url) => sender.avatar = Some(url),
            Err(e) => {
                warn!(profile_id = %sender.profile_id, key = %key, error = %e, "avatar enrichment failed");
            }
        }
    }

    /// Enrich the sender of every listing row.
    pub async fn enrich_rows(&self, rows: &mut [MessageRow]) {
        for row in rows {
            self.enrich(&mut row.sender).await;
        }
    }
}

impl std::fmt::Debug for AvatarEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarEnricher")
            .field("enabled", &self.blobs.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Derive the blob object key from a stored avatar locator.
///
/// Full URLs contribute their path. A leading `avatars/` segment is dropped.
#[must_use]
pub fn object_key(locator: &str) -> Option<String> {
    let locator = locator.trim();
    let path = match Url::parse(locator) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.path().to_string(),
        _ => locator.to_string(),
    };

    let path = path.trim_start_matches('/');
    let key = path.strip_prefix(AVATAR_PREFIX).unwrap_or(path);
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}
