//! SQLite-backed settings and message store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

use super::{
    AttachmentMeta, MessageStore, NewAttachment, NewMessage, SettingsStore, StoredAttachment,
    StoredMessage,
};
use crate::error::{MailError, Result};

/// Settings, messages and attachments in one SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open (creating if missing) the database at `database_url` and
    /// initialize the schema
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database only exists on its own connection
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let db = pool_options.connect_with(options).await?;

        let store = Self::new(db);
        store.init_db().await?;
        info!("Opened message store at {}", database_url);
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.db)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                direction TEXT NOT NULL CHECK (direction IN ('received', 'sent')),
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                cc TEXT,
                bcc TEXT,
                subject TEXT,
                body_text TEXT,
                body_html TEXT,
                headers TEXT,
                raw_size INTEGER,
                is_read BOOLEAN NOT NULL DEFAULT 0,
                is_starred BOOLEAN NOT NULL DEFAULT 0,
                provider_message_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attachments (
                id TEXT PRIMARY KEY,
                email_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (email_id) REFERENCES emails(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_emails_direction_created
            ON emails(direction, created_at)
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_attachments_email
            ON attachments(email_id)
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn set_read(&self, id: &str, is_read: bool) -> Result<()> {
        self.update_flag("is_read", id, is_read).await
    }

    pub async fn set_starred(&self, id: &str, is_starred: bool) -> Result<()> {
        self.update_flag("is_starred", id, is_starred).await
    }

    /// Delete a message and, through the foreign key, its attachments
    pub async fn delete_message(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM emails WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MailError::NotFound(format!("Message {}", id)));
        }

        debug!("Deleted message {}", id);
        Ok(())
    }

    async fn update_flag(&self, column: &'static str, id: &str, value: bool) -> Result<()> {
        let sql = format!("UPDATE emails SET {} = ? WHERE id = ?", column);
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MailError::NotFound(format!("Message {}", id)));
        }

        Ok(())
    }

    fn row_to_message(row: SqliteRow) -> Result<StoredMessage> {
        let direction: String = row.try_get("direction")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(StoredMessage {
            id: row.try_get("id")?,
            direction: direction.parse()?,
            from_address: row.try_get("from_address")?,
            to_address: row.try_get("to_address")?,
            cc: row.try_get("cc")?,
            bcc: row.try_get("bcc")?,
            subject: row.try_get("subject")?,
            body_text: row.try_get("body_text")?,
            body_html: row.try_get("body_html")?,
            headers: row.try_get("headers")?,
            raw_size: row.try_get("raw_size")?,
            is_read: row.try_get("is_read")?,
            is_starred: row.try_get("is_starred")?,
            provider_message_id: row.try_get("provider_message_id")?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn row_to_attachment(row: SqliteRow) -> Result<StoredAttachment> {
        let created_at: String = row.try_get("created_at")?;

        Ok(StoredAttachment {
            id: row.try_get("id")?,
            message_id: row.try_get("email_id")?,
            filename: row.try_get("filename")?,
            content_type: row.try_get("content_type")?,
            size: row.try_get("size")?,
            content: row.try_get("content")?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| MailError::Parse(format!("Invalid timestamp '{}': {}", value, e)))
}

const UPSERT_SETTING: &str = r#"
    INSERT INTO settings (key, value, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        updated_at = excluded.updated_at
"#;

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT_SETTING)
            .bind(key)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;

        for (key, value) in entries {
            sqlx::query(UPSERT_SETTING)
                .bind(key)
                .bind(value)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Stored {} settings", entries.len());
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.db)
            .await?;

        let mut settings = HashMap::with_capacity(rows.len());
        for row in rows {
            settings.insert(row.try_get("key")?, row.try_get("value")?);
        }

        Ok(settings)
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(&self, message: &NewMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO emails (
                id, direction, from_address, to_address, cc, bcc, subject,
                body_text, body_html, headers, raw_size, is_read, is_starred,
                provider_message_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(message.direction.as_str())
        .bind(&message.from_address)
        .bind(&message.to_address)
        .bind(&message.cc)
        .bind(&message.bcc)
        .bind(&message.subject)
        .bind(&message.body_text)
        .bind(&message.body_html)
        .bind(&message.headers)
        .bind(message.raw_size)
        .bind(&message.provider_message_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn insert_attachment(&self, attachment: &NewAttachment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attachments (id, email_id, filename, content_type, size, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attachment.id)
        .bind(&attachment.message_id)
        .bind(&attachment.filename)
        .bind(&attachment.content_type)
        .bind(attachment.size)
        .bind(&attachment.content)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn get_message(&self, id: &str) -> Result<Option<StoredMessage>> {
        let row = sqlx::query(
            r#"
            SELECT id, direction, from_address, to_address, cc, bcc, subject,
                   body_text, body_html, headers, raw_size, is_read, is_starred,
                   provider_message_id, created_at
            FROM emails
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::row_to_message).transpose()
    }

    async fn get_attachment(&self, id: &str) -> Result<Option<StoredAttachment>> {
        let row = sqlx::query(
            r#"
            SELECT id, email_id, filename, content_type, size, content, created_at
            FROM attachments
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::row_to_attachment).transpose()
    }

    async fn list_attachments(&self, message_id: &str) -> Result<Vec<AttachmentMeta>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, content_type, size
            FROM attachments
            WHERE email_id = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(message_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AttachmentMeta {
                    id: row.try_get("id")?,
                    filename: row.try_get("filename")?,
                    content_type: row.try_get("content_type")?,
                    size: row.try_get("size")?,
                })
            })
            .collect()
    }
}
