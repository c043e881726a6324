//! Persistence for settings, messages and attachments
//!
//! The intake pipeline and the provisioning workflow only see the
//! [`SettingsStore`] and [`MessageStore`] traits; [`SqliteStore`] is the
//! production implementation.

pub mod settings;
pub mod sqlite;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{MailError, Result};

pub use settings::{keys, SetupConfig, SetupState};
pub use sqlite::SqliteStore;

/// Whether a message was received by this system or sent from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Received,
    Sent,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Received => "received",
            Direction::Sent => "sent",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "received" => Ok(Direction::Received),
            "sent" => Ok(Direction::Sent),
            other => Err(MailError::Parse(format!("Unknown direction: {}", other))),
        }
    }
}

/// A message row about to be inserted
///
/// Read and starred flags start cleared and the creation timestamp is
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub direction: Direction,
    pub from_address: String,
    pub to_address: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    /// JSON array of `{key, value}` header pairs
    pub headers: Option<String>,
    pub raw_size: Option<i64>,
    /// Message id assigned by an upstream sending provider
    pub provider_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub direction: Direction,
    pub from_address: String,
    pub to_address: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub headers: Option<String>,
    pub raw_size: Option<i64>,
    pub is_read: bool,
    pub is_starred: bool,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An attachment row about to be inserted
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub id: String,
    pub message_id: String,
    pub filename: String,
    pub content_type: String,
    /// Decoded byte length
    pub size: i64,
    /// Standard base64 of the decoded bytes
    pub content: String,
}

impl NewAttachment {
    /// Build a row from decoded bytes, encoding the content as base64
    pub fn from_bytes(
        id: String,
        message_id: String,
        filename: String,
        content_type: String,
        bytes: &[u8],
    ) -> Self {
        Self {
            id,
            message_id,
            filename,
            content_type,
            size: bytes.len() as i64,
            content: STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredAttachment {
    pub id: String,
    pub message_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredAttachment {
    /// Decoded attachment bytes
    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.content)
            .map_err(|e| MailError::Parse(format!("Attachment {} content: {}", self.id, e)))
    }
}

/// Attachment listing entry without content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentMeta {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
}

/// Key/value settings table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write several keys atomically: either all are stored or none
    async fn set_many(&self, entries: &[(String, String)]) -> Result<()>;

    async fn get_all(&self) -> Result<HashMap<String, String>>;
}

/// Durable message and attachment storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &NewMessage) -> Result<()>;

    async fn insert_attachment(&self, attachment: &NewAttachment) -> Result<()>;

    async fn get_message(&self, id: &str) -> Result<Option<StoredMessage>>;

    async fn get_attachment(&self, id: &str) -> Result<Option<StoredAttachment>>;

    async fn list_attachments(&self, message_id: &str) -> Result<Vec<AttachmentMeta>>;
}
