//! `SQLite` implementation of [`MailStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use super::{
    Delivery, DraftContent, MailStore, NewMessage, NewProfile, StoredMessage, ThreadBinding,
    ThreadCreation,
};
use crate::model::{
    File, Folder, FolderId, FolderSummary, FolderType, MailboxInfo, Message, MessageId,
    MessageRow, Profile, ProfileId, ProfileMessage, Sender, Thread, ThreadId,
};
use crate::pagination::Cursor;
use crate::{Error, Result};

/// Repository backed by a `SQLite` database.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        let statements = [
            r"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                display_name TEXT NOT NULL DEFAULT '',
                avatar TEXT
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                folder_type TEXT NOT NULL
            )
            ",
            // Custom names are unique per profile regardless of case
            r"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_profile_name
            ON folders(profile_id, name COLLATE NOCASE)
            ",
            // One folder of each system type per profile
            r"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_profile_system
            ON folders(profile_id, folder_type) WHERE folder_type <> 'custom'
            ",
            r"
            CREATE TABLE IF NOT EXISTS threads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                root_message_id INTEGER NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER NOT NULL,
                topic TEXT NOT NULL DEFAULT '',
                text TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                thread_id INTEGER
            )
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages(thread_id)
            ",
            r"
            CREATE TABLE IF NOT EXISTS message_receivers (
                message_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                email TEXT NOT NULL,
                PRIMARY KEY (message_id, position)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                locator TEXT NOT NULL
            )
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_files_message
            ON files(message_id)
            ",
            r"
            CREATE TABLE IF NOT EXISTS profile_messages (
                profile_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                folder_id INTEGER,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                is_draft INTEGER NOT NULL DEFAULT 0,
                is_spam INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (profile_id, message_id)
            )
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_profile_messages_folder
            ON profile_messages(profile_id, folder_id, is_deleted)
            ",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl MailStore for SqliteStore {
    async fn create_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO profiles (email, display_name, avatar)
            VALUES (?, ?, ?)
            ",
        )
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(profile.avatar.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, || format!("profile {}", profile.email)))?;

        let id = ProfileId::new(inserted.last_insert_rowid());
        for folder_type in FolderType::SYSTEM {
            sqlx::query("INSERT INTO folders (profile_id, name, folder_type) VALUES (?, ?, ?)")
                .bind(id.0)
                .bind(folder_type.display_name())
                .bind(folder_type.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(profile_id = %id, "profile provisioned");

        Ok(Profile {
            id,
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            avatar: profile.avatar.clone(),
        })
    }

    async fn profile(&self, id: ProfileId) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT id, email, display_name, avatar FROM profiles WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let row = sqlx::query(
            "SELECT id, email, display_name, avatar FROM profiles WHERE email = ? COLLATE NOCASE",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn insert_folder(
        &self,
        profile_id: ProfileId,
        name: &str,
        folder_type: FolderType,
    ) -> Result<Folder> {
        let inserted =
            sqlx::query("INSERT INTO folders (profile_id, name, folder_type) VALUES (?, ?, ?)")
                .bind(profile_id.0)
                .bind(name)
                .bind(folder_type.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| conflict_or(e, || format!("folder {name}")))?;

        Ok(Folder {
            id: FolderId::new(inserted.last_insert_rowid()),
            profile_id,
            name: name.to_string(),
            folder_type,
        })
    }

    async fn folder(&self, id: FolderId) -> Result<Option<Folder>> {
        let row = sqlx::query("SELECT id, profile_id, name, folder_type FROM folders WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_folder).transpose()
    }

    async fn folder_by_type(
        &self,
        profile_id: ProfileId,
        folder_type: FolderType,
    ) -> Result<Option<Folder>> {
        let row = sqlx::query(
            r"
            SELECT id, profile_id, name, folder_type
            FROM folders
            WHERE profile_id = ? AND folder_type = ?
            ORDER BY id
            LIMIT 1
            ",
        )
        .bind(profile_id.0)
        .bind(folder_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_folder).transpose()
    }

    async fn folder_by_name(&self, profile_id: ProfileId, name: &str) -> Result<Option<Folder>> {
        let row = sqlx::query(
            r"
            SELECT id, profile_id, name, folder_type
            FROM folders
            WHERE profile_id = ? AND name = ? COLLATE NOCASE
            ",
        )
        .bind(profile_id.0)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_folder).transpose()
    }

    async fn list_folders(&self, profile_id: ProfileId) -> Result<Vec<FolderSummary>> {
        let rows = sqlx::query(
            r"
            SELECT f.id, f.profile_id, f.name, f.folder_type,
                   (SELECT COUNT(*) FROM profile_messages pm
                    WHERE pm.profile_id = f.profile_id AND pm.folder_id = f.id
                      AND pm.is_deleted = 0) AS total,
                   (SELECT COUNT(*) FROM profile_messages pm
                    WHERE pm.profile_id = f.profile_id AND pm.folder_id = f.id
                      AND pm.is_deleted = 0 AND pm.is_read = 0) AS unread
            FROM folders f
            WHERE f.profile_id = ?
            ORDER BY f.folder_type = 'custom', f.id
            ",
        )
        .bind(profile_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FolderSummary {
                    folder: row_to_folder(row)?,
                    info: row_to_info(row),
                })
            })
            .collect()
    }

    async fn rename_folder(&self, id: FolderId, name: &str) -> Result<()> {
        sqlx::query("UPDATE folders SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, || format!("folder {name}")))?;

        Ok(())
    }

    async fn delete_folder(&self, id: FolderId, reassign_to: FolderId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE profile_messages SET folder_id = ? WHERE folder_id = ?")
            .bind(reassign_to.0)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn folder_info(
        &self,
        profile_id: ProfileId,
        folder_id: FolderId,
    ) -> Result<MailboxInfo> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN is_read = 0 THEN 1 ELSE 0 END), 0) AS unread
            FROM profile_messages
            WHERE profile_id = ? AND folder_id = ? AND is_deleted = 0
            ",
        )
        .bind(profile_id.0)
        .bind(folder_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_info(&row))
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<StoredMessage> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing_thread = match message.thread {
            ThreadBinding::Existing(id) => Some(id.0),
            ThreadBinding::NewRoot => None,
        };

        let inserted = sqlx::query(
            r"
            INSERT INTO messages (sender_id, topic, text, created_at, thread_id)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(message.sender_id.0)
        .bind(&message.topic)
        .bind(&message.text)
        .bind(now.timestamp_micros())
        .bind(existing_thread)
        .execute(&mut *tx)
        .await?;
        let id = MessageId::new(inserted.last_insert_rowid());

        let thread_id = match message.thread {
            ThreadBinding::Existing(thread_id) => {
                touch_thread(&mut tx, thread_id, now).await?;
                thread_id
            }
            ThreadBinding::NewRoot => {
                let created = insert_thread(&mut tx, id, now).await?;
                bind_thread(&mut tx, created.id(), id).await?;
                created.id()
            }
        };

        write_receivers(&mut tx, id, &message.receivers).await?;
        write_files(&mut tx, id, &message.files).await?;
        write_deliveries(&mut tx, id, &message.deliveries).await?;

        tx.commit().await?;

        Ok(StoredMessage {
            id,
            thread_id,
            created_at: now,
        })
    }

    async fn message(&self, id: MessageId) -> Result<Option<Message>> {
        let Some(row) = sqlx::query(
            r"
            SELECT m.id, m.topic, m.text, m.created_at, m.thread_id,
                   p.id AS sender_id, p.email, p.display_name, p.avatar
            FROM messages m
            JOIN profiles p ON p.id = m.sender_id
            WHERE m.id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let receivers = sqlx::query(
            "SELECT email FROM message_receivers WHERE message_id = ? ORDER BY position",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| r.get::<String, _>("email"))
        .collect();

        let files = sqlx::query(
            "SELECT name, mime_type, size, locator FROM files WHERE message_id = ? ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_file)
        .collect();

        Ok(Some(Message {
            id,
            sender: row_to_sender(&row),
            topic: row.get("topic"),
            text: row.get("text"),
            created_at: from_micros(row.get("created_at"))?,
            thread_id: row.get::<Option<i64>, _>("thread_id").map(ThreadId::new),
            receivers,
            files,
        }))
    }

    async fn profile_message(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
    ) -> Result<Option<ProfileMessage>> {
        let row = sqlx::query(
            r"
            SELECT profile_id, message_id, folder_id, is_read, is_deleted, is_draft, is_spam
            FROM profile_messages
            WHERE profile_id = ? AND message_id = ?
            ",
        )
        .bind(profile_id.0)
        .bind(message_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ProfileMessage {
            profile_id: ProfileId::new(r.get("profile_id")),
            message_id: MessageId::new(r.get("message_id")),
            folder_id: r.get::<Option<i64>, _>("folder_id").map(FolderId::new),
            is_read: r.get("is_read"),
            is_deleted: r.get("is_deleted"),
            is_draft: r.get("is_draft"),
            is_spam: r.get("is_spam"),
        }))
    }

    async fn set_folder(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
        folder_id: FolderId,
        is_spam: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE profile_messages SET folder_id = ?, is_spam = ? WHERE profile_id = ? AND message_id = ?",
        )
        .bind(folder_id.0)
        .bind(is_spam)
        .bind(profile_id.0)
        .bind(message_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_read(&self, profile_id: ProfileId, message_id: MessageId) -> Result<()> {
        sqlx::query(
            "UPDATE profile_messages SET is_read = 1 WHERE profile_id = ? AND message_id = ?",
        )
        .bind(profile_id.0)
        .bind(message_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_spam(
        &self,
        profile_id: ProfileId,
        message_id: MessageId,
        spam_folder: FolderId,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE profile_messages
            SET is_spam = 1, folder_id = ?
            WHERE profile_id = ? AND message_id = ?
            ",
        )
        .bind(spam_folder.0)
        .bind(profile_id.0)
        .bind(message_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_deleted(&self, profile_id: ProfileId, message_id: MessageId) -> Result<()> {
        sqlx::query(
            "UPDATE profile_messages SET is_deleted = 1 WHERE profile_id = ? AND message_id = ?",
        )
        .bind(profile_id.0)
        .bind(message_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_page(
        &self,
        profile_id: ProfileId,
        folder_id: FolderId,
        cursor: &Cursor,
        fetch: u32,
    ) -> Result<Vec<MessageRow>> {
        let after = cursor.last_datetime.timestamp_micros();
        let rows = sqlx::query(
            r"
            SELECT m.id, m.topic, m.created_at, m.thread_id, pm.is_read,
                   p.id AS sender_id, p.email, p.display_name, p.avatar,
                   (SELECT COUNT(*) FROM files f WHERE f.message_id = m.id) AS file_count
            FROM profile_messages pm
            JOIN messages m ON m.id = pm.message_id
            JOIN profiles p ON p.id = m.sender_id
            WHERE pm.profile_id = ? AND pm.folder_id = ? AND pm.is_deleted = 0
              AND (? = 0 OR m.created_at < ? OR (m.created_at = ? AND m.id < ?))
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT ?
            ",
        )
        .bind(profile_id.0)
        .bind(folder_id.0)
        .bind(cursor.last_message_id.0)
        .bind(after)
        .bind(after)
        .bind(cursor.last_message_id.0)
        .bind(i64::from(fetch))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message_row).collect()
    }

    async fn thread(&self, id: ThreadId) -> Result<Option<Thread>> {
        let row = sqlx::query(
            "SELECT id, root_message_id, created_at, updated_at FROM threads WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(Thread {
                id: ThreadId::new(r.get("id")),
                root_message_id: MessageId::new(r.get("root_message_id")),
                created_at: from_micros(r.get("created_at"))?,
                updated_at: from_micros(r.get("updated_at"))?,
            })
        })
        .transpose()
    }

    async fn thread_of(&self, message_id: MessageId) -> Result<Option<ThreadId>> {
        let thread_id: Option<Option<i64>> =
            sqlx::query_scalar("SELECT thread_id FROM messages WHERE id = ?")
                .bind(message_id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(thread_id.flatten().map(ThreadId::new))
    }

    async fn attach_thread(&self, thread_id: ThreadId, message_id: MessageId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let attached = bind_thread(&mut conn, thread_id, message_id).await?;
        if attached {
            touch_thread(&mut conn, thread_id, Utc::now()).await?;
        }
        Ok(attached)
    }

    async fn create_thread(&self, root: MessageId) -> Result<ThreadCreation> {
        let mut tx = self.pool.begin().await?;

        let created = insert_thread(&mut tx, root, Utc::now()).await?;
        // Rebind unconditionally so a lost binding is repaired even on conflict
        sqlx::query("UPDATE messages SET thread_id = ? WHERE id = ?")
            .bind(created.id().0)
            .bind(root.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn thread_messages(
        &self,
        profile_id: ProfileId,
        thread_id: ThreadId,
    ) -> Result<Vec<MessageId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r"
            SELECT m.id
            FROM messages m
            JOIN profile_messages pm ON pm.message_id = m.id AND pm.profile_id = ?
            WHERE m.thread_id = ? AND pm.is_deleted = 0
            ORDER BY m.created_at ASC, m.id ASC
            ",
        )
        .bind(profile_id.0)
        .bind(thread_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(MessageId::new).collect())
    }

    async fn draft_owner(&self, message_id: MessageId) -> Result<Option<ProfileId>> {
        let owner: Option<i64> = sqlx::query_scalar(
            "SELECT profile_id FROM profile_messages WHERE message_id = ? AND is_draft = 1",
        )
        .bind(message_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner.map(ProfileId::new))
    }

    async fn update_draft(&self, message_id: MessageId, content: &DraftContent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE messages SET topic = ?, text = ?, created_at = ? WHERE id = ?")
            .bind(&content.topic)
            .bind(&content.text)
            .bind(Utc::now().timestamp_micros())
            .bind(message_id.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM message_receivers WHERE message_id = ?")
            .bind(message_id.0)
            .execute(&mut *tx)
            .await?;
        write_receivers(&mut tx, message_id, &content.receivers).await?;

        sqlx::query("DELETE FROM files WHERE message_id = ?")
            .bind(message_id.0)
            .execute(&mut *tx)
            .await?;
        write_files(&mut tx, message_id, &content.files).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn promote_draft(
        &self,
        message_id: MessageId,
        sent_folder: FolderId,
        deliveries: &[Delivery],
    ) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            UPDATE profile_messages
            SET is_draft = 0, is_read = 1, folder_id = ?
            WHERE message_id = ? AND is_draft = 1
            ",
        )
        .bind(sent_folder.0)
        .bind(message_id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE messages SET created_at = ? WHERE id = ?")
            .bind(now.timestamp_micros())
            .bind(message_id.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            UPDATE threads SET updated_at = ?
            WHERE id = (SELECT thread_id FROM messages WHERE id = ?)
            ",
        )
        .bind(now.timestamp_micros())
        .bind(message_id.0)
        .execute(&mut *tx)
        .await?;

        write_deliveries(&mut tx, message_id, deliveries).await?;

        tx.commit().await?;
        Ok(now)
    }

    async fn delete_draft(&self, message_id: MessageId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for statement in [
            "DELETE FROM profile_messages WHERE message_id = ?",
            "DELETE FROM files WHERE message_id = ?",
            "DELETE FROM message_receivers WHERE message_id = ?",
            "DELETE FROM messages WHERE id = ?",
        ] {
            sqlx::query(statement)
                .bind(message_id.0)
                .execute(&mut *tx)
                .await?;
        }

        // A thread the draft started is gone once nothing references it
        sqlx::query(
            r"
            DELETE FROM threads
            WHERE root_message_id = ?
              AND NOT EXISTS (SELECT 1 FROM messages m WHERE m.thread_id = threads.id)
            ",
        )
        .bind(message_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Insert the thread for `root`, or find the one another writer created first.
async fn insert_thread(
    conn: &mut SqliteConnection,
    root: MessageId,
    now: DateTime<Utc>,
) -> Result<ThreadCreation> {
    let inserted = sqlx::query(
        r"
        INSERT INTO threads (root_message_id, created_at, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(root_message_id) DO NOTHING
        ",
    )
    .bind(root.0)
    .bind(now.timestamp_micros())
    .bind(now.timestamp_micros())
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() == 1 {
        return Ok(ThreadCreation::Created(ThreadId::new(
            inserted.last_insert_rowid(),
        )));
    }

    let existing: i64 = sqlx::query_scalar("SELECT id FROM threads WHERE root_message_id = ?")
        .bind(root.0)
        .fetch_one(&mut *conn)
        .await?;
    Ok(ThreadCreation::Existing(ThreadId::new(existing)))
}

async fn bind_thread(
    conn: &mut SqliteConnection,
    thread_id: ThreadId,
    message_id: MessageId,
) -> Result<bool> {
    let updated = sqlx::query(
        r"
        UPDATE messages SET thread_id = ?
        WHERE id = ?
          AND (thread_id IS NULL OR thread_id = ?)
          AND EXISTS (SELECT 1 FROM threads WHERE id = ?)
        ",
    )
    .bind(thread_id.0)
    .bind(message_id.0)
    .bind(thread_id.0)
    .bind(thread_id.0)
    .execute(&mut *conn)
    .await?;

    Ok(updated.rows_affected() > 0)
}

async fn touch_thread(
    conn: &mut SqliteConnection,
    thread_id: ThreadId,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE threads SET updated_at = ? WHERE id = ?")
        .bind(now.timestamp_micros())
        .bind(thread_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn write_receivers(
    conn: &mut SqliteConnection,
    message_id: MessageId,
    receivers: &[String],
) -> Result<()> {
    for (position, email) in (0_i64..).zip(receivers) {
        sqlx::query("INSERT INTO message_receivers (message_id, position, email) VALUES (?, ?, ?)")
            .bind(message_id.0)
            .bind(position)
            .bind(email)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn write_files(conn: &mut SqliteConnection, message_id: MessageId, files: &[File]) -> Result<()> {
    for file in files {
        let size = i64::try_from(file.size)
            .map_err(|_| Error::Internal(format!("file {} size out of range", file.name)))?;
        sqlx::query(
            r"
            INSERT INTO files (message_id, name, mime_type, size, locator)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(message_id.0)
        .bind(&file.name)
        .bind(&file.mime_type)
        .bind(size)
        .bind(&file.locator)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn write_deliveries(
    conn: &mut SqliteConnection,
    message_id: MessageId,
    deliveries: &[Delivery],
) -> Result<()> {
    for delivery in deliveries {
        sqlx::query(
            r"
            INSERT INTO profile_messages (profile_id, message_id, folder_id, is_read, is_draft)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(profile_id, message_id) DO NOTHING
            ",
        )
        .bind(delivery.profile_id.0)
        .bind(message_id.0)
        .bind(delivery.folder_id.0)
        .bind(delivery.is_read)
        .bind(delivery.is_draft)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Map a unique-constraint violation to `AlreadyExists`, anything else to `Database`.
fn conflict_or(err: sqlx::Error, what: impl FnOnce() -> String) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => Error::AlreadyExists(what()),
        _ => Error::Database(err),
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::Internal(format!("timestamp {micros} out of range")))
}

fn row_to_profile(row: &SqliteRow) -> Profile {
    Profile {
        id: ProfileId::new(row.get("id")),
        email: row.get("email"),
        display_name: row.get("display_name"),
        avatar: row.get("avatar"),
    }
}

fn row_to_sender(row: &SqliteRow) -> Sender {
    Sender {
        profile_id: ProfileId::new(row.get("sender_id")),
        email: row.get("email"),
        display_name: row.get("display_name"),
        avatar: row.get("avatar"),
    }
}

fn row_to_folder(row: &SqliteRow) -> Result<Folder> {
    let raw_type: String = row.get("folder_type");
    let folder_type = FolderType::parse(&raw_type)
        .ok_or_else(|| Error::Internal(format!("unknown folder type {raw_type}")))?;

    Ok(Folder {
        id: FolderId::new(row.get("id")),
        profile_id: ProfileId::new(row.get("profile_id")),
        name: row.get("name"),
        folder_type,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_info(row: &SqliteRow) -> MailboxInfo {
    MailboxInfo {
        total: row.get::<i64, _>("total") as u32,
        unread: row.get::<i64, _>("unread") as u32,
    }
}

#[allow(clippy::cast_sign_loss)]
fn row_to_file(row: &SqliteRow) -> File {
    File {
        name: row.get("name"),
        mime_type: row.get("mime_type"),
        size: row.get::<i64, _>("size") as u64,
        locator: row.get("locator"),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_message_row(row: &SqliteRow) -> Result<MessageRow> {
    Ok(MessageRow {
        id: MessageId::new(row.get("id")),
        sender: row_to_sender(row),
        topic: row.get("topic"),
        created_at: from_micros(row.get("created_at"))?,
        thread_id: row.get::<Option<i64>, _>("thread_id").map(ThreadId::new),
        is_read: row.get("is_read"),
        file_count: row.get::<i64, _>("file_count") as u32,
    })
}
