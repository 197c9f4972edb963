//! End-to-end tests for the message engine.
//!
//! Every test runs against a fresh in-memory `SQLite` store through the public
//! [`MailService`] API.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use mailroom_core::{
    AvatarEnricher, BlobError, BlobStore, Compose, Cursor, EngineConfig, ErrorKind, File,
    FolderType, MailService, MailStore, NewProfile, Profile, Scope, SqliteStore, ThreadId,
};

/// Blob storage that always fails.
struct UnreachableBlobs;

#[async_trait]
impl BlobStore for UnreachableBlobs {
    async fn presigned_url(&self, _key: &str, _ttl: Duration) -> Result<String, BlobError> {
        Err(BlobError::Unavailable("connection refused".into()))
    }
}

/// Blob storage that signs every key.
struct SigningBlobs;

#[async_trait]
impl BlobStore for SigningBlobs {
    async fn presigned_url(&self, key: &str, _ttl: Duration) -> Result<String, BlobError> {
        Ok(format!("https://cdn.example.com/{key}?sig=1"))
    }
}

struct Harness {
    service: MailService,
    alice: Profile,
    bob: Profile,
}

async fn harness_with(avatars: impl FnOnce() -> AvatarEnricher) -> Harness {
    let store: Arc<dyn MailStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
    let service = MailService::new(store, avatars(), &EngineConfig::default());
    let alice = service
        .create_profile(
            &NewProfile::new("a@x.com", "Alice").with_avatar("avatars/alice.png"),
        )
        .await
        .unwrap();
    let bob = service
        .create_profile(&NewProfile::new("bob@x.com", "Bob"))
        .await
        .unwrap();
    Harness {
        service,
        alice,
        bob,
    }
}

async fn harness() -> Harness {
    harness_with(AvatarEnricher::disabled).await
}

impl Harness {
    async fn folder(&self, profile: &Profile, folder_type: FolderType) -> mailroom_core::Folder {
        self.service
            .get_folders(profile.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.folder)
            .find(|f| f.folder_type == folder_type)
            .unwrap()
    }

    async fn total(&self, profile: &Profile, scope: Scope) -> u32 {
        self.service
            .get_folder(profile.id, scope, Cursor::start(), 100)
            .await
            .unwrap()
            .info
            .total
    }
}

#[tokio::test]
async fn test_send_then_reply_shares_thread() {
    let h = harness().await;

    let m1 = h
        .service
        .send(h.bob.id, &Compose::new("Hi", "hello", ["a@x.com"]))
        .await
        .unwrap();
    let m2 = h
        .service
        .reply(
            h.alice.id,
            Some(m1.id),
            None,
            &Compose::new("Re: Hi", "re", ["bob@x.com"]),
        )
        .await
        .unwrap();

    assert_eq!(m2.thread_id, m1.thread_id);

    let thread = h.service.thread_messages(h.bob.id, m1.thread_id).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].message.id, m1.id);
    assert_eq!(thread[0].message.thread_id, Some(m1.thread_id));
}

#[tokio::test]
async fn test_each_send_starts_one_thread() {
    let h = harness().await;

    let first = h
        .service
        .send(h.alice.id, &Compose::new("one", "x", ["bob@x.com"]))
        .await
        .unwrap();
    let second = h
        .service
        .send(h.alice.id, &Compose::new("two", "x", ["bob@x.com"]))
        .await
        .unwrap();
    assert_ne!(first.thread_id, second.thread_id);

    let members = h
        .service
        .thread_messages(h.alice.id, first.thread_id)
        .await
        .unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].message.id, first.id);
}

#[tokio::test]
async fn test_repeated_thread_hint_is_idempotent() {
    let h = harness().await;
    let root = h
        .service
        .send(h.bob.id, &Compose::new("Hi", "hello", ["a@x.com"]))
        .await
        .unwrap();

    for _ in 0..2 {
        let reply = h
            .service
            .reply(
                h.alice.id,
                Some(root.id),
                Some(root.thread_id),
                &Compose::new("Re", "again", ["bob@x.com"]),
            )
            .await
            .unwrap();
        assert_eq!(reply.thread_id, root.thread_id);
    }

    let members = h
        .service
        .thread_messages(h.alice.id, root.thread_id)
        .await
        .unwrap();
    assert_eq!(members.len(), 3);
}

#[tokio::test]
async fn test_concurrent_replies_share_thread() {
    let h = harness().await;
    let root = h
        .service
        .send(h.bob.id, &Compose::new("Hi", "hello", ["a@x.com"]))
        .await
        .unwrap();

    let reply = Compose::new("Re", "same time", ["bob@x.com"]);
    let (a, b) = tokio::join!(
        h.service.reply(h.alice.id, Some(root.id), None, &reply),
        h.service.reply(h.bob.id, Some(root.id), Some(ThreadId::new(9999)), &reply),
    );
    assert_eq!(a.unwrap().thread_id, root.thread_id);
    assert_eq!(b.unwrap().thread_id, root.thread_id);
}

#[tokio::test]
async fn test_reply_without_root_rejected() {
    let h = harness().await;

    let err = h
        .service
        .reply(h.alice.id, None, None, &Compose::new("Re", "x", ["bob@x.com"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.total(&h.alice, Scope::Sent).await, 0);
}

#[tokio::test]
async fn test_system_folders_protected() {
    let h = harness().await;

    for folder_type in FolderType::SYSTEM {
        let folder = h.folder(&h.alice, folder_type).await;

        let err = h
            .service
            .rename_folder(h.alice.id, folder.id, "Renamed")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protected, "rename {folder_type}");

        let err = h
            .service
            .delete_folder(h.alice.id, folder.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protected, "delete {folder_type}");
    }
}

#[tokio::test]
async fn test_folder_name_unique_per_profile() {
    let h = harness().await;

    h.service.create_folder(h.alice.id, "Work").await.unwrap();
    let err = h
        .service
        .create_folder(h.alice.id, "work")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Same name for another profile is fine
    h.service.create_folder(h.bob.id, "Work").await.unwrap();

    let err = h
        .service
        .create_folder(h.alice.id, "Spam")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_foreign_folder_delete_not_found() {
    let h = harness().await;
    let folder = h.service.create_folder(h.alice.id, "Private").await.unwrap();

    let err = h
        .service
        .delete_folder(h.bob.id, folder.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_deleted_folder_returns_messages_to_inbox() {
    let h = harness().await;
    let sent = h
        .service
        .send(h.alice.id, &Compose::new("Invoice", "x", ["bob@x.com"]))
        .await
        .unwrap();
    let receipts = h.service.create_folder(h.bob.id, "Receipts").await.unwrap();

    h.service
        .move_to_folder(h.bob.id, sent.id, receipts.id)
        .await
        .unwrap();
    assert_eq!(h.total(&h.bob, Scope::Inbox).await, 0);

    h.service.delete_folder(h.bob.id, receipts.id).await.unwrap();
    assert_eq!(h.total(&h.bob, Scope::Inbox).await, 1);
}

#[tokio::test]
async fn test_draft_ownership_enforced() {
    let h = harness().await;
    let draft = h
        .service
        .save_draft(
            h.alice.id,
            None,
            None,
            &Compose::new("secret", "x", ["bob@x.com"]),
        )
        .await
        .unwrap();

    let err = h.service.send_draft(h.bob.id, draft.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    let err = h.service.delete_draft(h.bob.id, draft.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    // Nothing moved: still a draft, nothing delivered
    let drafts = h.folder(&h.alice, FolderType::Drafts).await;
    assert_eq!(h.total(&h.alice, Scope::Folder(drafts.id)).await, 1);
    assert_eq!(h.total(&h.bob, Scope::Inbox).await, 0);
}

#[tokio::test]
async fn test_draft_lifecycle() {
    let h = harness().await;
    let drafts = h.folder(&h.alice, FolderType::Drafts).await;

    let created = h
        .service
        .save_draft(h.alice.id, None, None, &Compose::new("v1", "x", [""]))
        .await
        .unwrap();
    let updated = h
        .service
        .save_draft(
            h.alice.id,
            Some(created.id),
            None,
            &Compose::new("v2", "y", ["bob@x.com"]),
        )
        .await
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(h.total(&h.alice, Scope::Folder(drafts.id)).await, 1);

    let sent = h.service.send_draft(h.alice.id, created.id).await.unwrap();
    assert_eq!(Some(sent.thread_id), created.thread_id);
    assert_eq!(h.total(&h.alice, Scope::Folder(drafts.id)).await, 0);
    assert_eq!(h.total(&h.alice, Scope::Sent).await, 1);

    let view = h.service.message_page(h.bob.id, sent.id).await.unwrap();
    assert_eq!(view.message.topic, "v2");
    assert!(!view.is_draft);

    let gone = h
        .service
        .save_draft(h.alice.id, None, None, &Compose::new("tmp", "", Vec::<String>::new()))
        .await
        .unwrap();
    h.service.delete_draft(h.alice.id, gone.id).await.unwrap();
    let err = h.service.message_page(h.alice.id, gone.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_outsider_cannot_join_thread() {
    let h = harness().await;
    let carol = h
        .service
        .create_profile(&NewProfile::new("carol@x.com", "Carol"))
        .await
        .unwrap();
    let sent = h
        .service
        .send(h.alice.id, &Compose::new("secret", "for bob", ["bob@x.com"]))
        .await
        .unwrap();

    let err = h
        .service
        .save_draft(
            carol.id,
            None,
            Some(sent.thread_id),
            &Compose::new("Re: secret", "me too", ["bob@x.com"]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let drafts = h.folder(&carol, FolderType::Drafts).await;
    assert_eq!(h.total(&carol, Scope::Folder(drafts.id)).await, 0);

    let thread = h
        .service
        .thread_messages(h.bob.id, sent.thread_id)
        .await
        .unwrap();
    assert_eq!(thread.len(), 1);

    let err = h
        .service
        .thread_messages(carol.id, sent.thread_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_drafts_stay_in_drafts() {
    let h = harness().await;
    let draft = h
        .service
        .save_draft(h.alice.id, None, None, &Compose::new("wip", "x", [""]))
        .await
        .unwrap();
    let inbox = h.folder(&h.alice, FolderType::Inbox).await;
    let drafts = h.folder(&h.alice, FolderType::Drafts).await;

    let err = h
        .service
        .move_to_folder(h.alice.id, draft.id, inbox.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protected);

    let err = h
        .service
        .mark_as_spam(h.alice.id, draft.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protected);

    let sent = h
        .service
        .send(h.alice.id, &Compose::new("done", "x", ["bob@x.com"]))
        .await
        .unwrap();
    let err = h
        .service
        .move_to_folder(h.alice.id, sent.id, drafts.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protected);
}

#[tokio::test]
async fn test_mark_as_spam_moves_row() {
    let h = harness().await;
    let sent = h
        .service
        .send(h.alice.id, &Compose::new("offer", "x", ["bob@x.com"]))
        .await
        .unwrap();
    let spam = h.folder(&h.bob, FolderType::Spam).await;

    h.service.mark_as_spam(h.bob.id, sent.id).await.unwrap();

    let view = h.service.message_page(h.bob.id, sent.id).await.unwrap();
    assert!(view.is_spam);
    assert_eq!(view.folder_id, Some(spam.id));
    assert_eq!(h.total(&h.bob, Scope::Inbox).await, 0);

    // Only the receiver's copy is flagged
    let own = h.service.message_page(h.alice.id, sent.id).await.unwrap();
    assert!(!own.is_spam);
}

#[tokio::test]
async fn test_pagination_three_pages() {
    let h = harness().await;
    for i in 0..25 {
        h.service
            .send(h.alice.id, &Compose::new(format!("m{i}"), "x", ["bob@x.com"]))
            .await
            .unwrap();
    }

    let mut cursor = Cursor::start();
    let mut seen = HashSet::new();
    let mut shape = Vec::new();
    for _ in 0..3 {
        let listing = h
            .service
            .get_folder(h.bob.id, Scope::Inbox, cursor, 10)
            .await
            .unwrap();
        assert_eq!(listing.info.total, 25);
        for row in &listing.page.messages {
            assert!(seen.insert(row.id));
        }
        shape.push((listing.page.messages.len(), listing.page.has_next));
        cursor = listing.page.next_cursor;
    }

    assert_eq!(shape, vec![(10, true), (10, true), (5, false)]);
    assert_eq!(seen.len(), 25);
}

#[tokio::test]
async fn test_out_of_range_limit_uses_default() {
    let h = harness().await;
    for i in 0..25 {
        h.service
            .send(h.alice.id, &Compose::new(format!("m{i}"), "x", ["bob@x.com"]))
            .await
            .unwrap();
    }

    let limit = h.service.parse_limit(Some("500"));
    let listing = h
        .service
        .get_folder(h.bob.id, Scope::Inbox, Cursor::start(), limit)
        .await
        .unwrap();
    assert_eq!(listing.page.messages.len(), 20);
    assert!(listing.page.has_next);
}

#[tokio::test]
async fn test_dangerous_input_rejected_before_persistence() {
    let h = harness().await;

    let duplicate = Compose::new("Hi", "x", ["bob@x.com", "BOB@x.com"]);
    let long_topic = Compose::new("t".repeat(256), "x", ["bob@x.com"]);
    let traversal = Compose::new("Hi", "x", ["bob@x.com"]).with_files(vec![File {
        name: "../etc/passwd".to_string(),
        mime_type: "text/plain".to_string(),
        size: 10,
        locator: "files/1".to_string(),
    }]);

    for compose in [duplicate, long_topic, traversal] {
        let err = h.service.send(h.alice.id, &compose).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert_eq!(h.total(&h.alice, Scope::Sent).await, 0);
    assert_eq!(h.total(&h.bob, Scope::Inbox).await, 0);
}

#[tokio::test]
async fn test_content_is_escaped() {
    let h = harness().await;
    let sent = h
        .service
        .send(
            h.alice.id,
            &Compose::new("Tom & Jerry", "<script>alert(1)</script>", ["bob@x.com"]),
        )
        .await
        .unwrap();

    let view = h.service.message_page(h.bob.id, sent.id).await.unwrap();
    assert_eq!(view.message.topic, "Tom &amp; Jerry");
    assert!(!view.message.text.contains('<'));
}

#[tokio::test]
async fn test_enrichment_failure_is_not_fatal() {
    let h = harness_with(|| {
        AvatarEnricher::new(Arc::new(UnreachableBlobs), Duration::from_secs(60))
    })
    .await;
    let sent = h
        .service
        .send(h.alice.id, &Compose::new("Hi", "hello", ["bob@x.com"]))
        .await
        .unwrap();

    let view = h.service.message_page(h.bob.id, sent.id).await.unwrap();
    assert_eq!(view.message.text, "hello");
    assert_eq!(view.message.sender.avatar.as_deref(), Some("avatars/alice.png"));

    let listing = h
        .service
        .get_folder(h.bob.id, Scope::Inbox, Cursor::start(), 10)
        .await
        .unwrap();
    assert_eq!(
        listing.page.messages[0].sender.avatar.as_deref(),
        Some("avatars/alice.png")
    );
}

#[tokio::test]
async fn test_enrichment_rewrites_at_read_time_only() {
    let h = harness_with(|| AvatarEnricher::new(Arc::new(SigningBlobs), Duration::from_secs(60)))
        .await;
    let sent = h
        .service
        .send(h.alice.id, &Compose::new("Hi", "hello", ["bob@x.com"]))
        .await
        .unwrap();

    let view = h.service.message_page(h.bob.id, sent.id).await.unwrap();
    assert_eq!(
        view.message.sender.avatar.as_deref(),
        Some("https://cdn.example.com/alice.png?sig=1")
    );

    // The stored locator is untouched
    let profile = h.service.profile_by_email("a@x.com").await.unwrap();
    assert_eq!(profile.avatar.as_deref(), Some("avatars/alice.png"));
}
