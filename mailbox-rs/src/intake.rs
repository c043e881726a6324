//! Inbound message intake
//!
//! Decodes a raw message, stores it with its attachments and, when a
//! destination address is configured, relays the original bytes onward.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::mime::MimeParser;
use crate::store::{keys, Direction, MessageStore, NewAttachment, NewMessage, SettingsStore};

const DEFAULT_FILENAME: &str = "unnamed";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Forwards a message to another address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Relay: Send + Sync {
    async fn forward(&self, raw: &[u8], from: &str, to: &str) -> Result<()>;
}

/// Outcome of one intake
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntakeReceipt {
    pub message_id: String,
    pub attachments_stored: usize,
    pub attachments_skipped: usize,
    /// Address the message was relayed to, if any
    pub relayed_to: Option<String>,
}

/// Decode, store and optionally relay inbound messages
///
/// Holds no per-message state: concurrent intakes are independent.
#[derive(Clone)]
pub struct IntakePipeline {
    messages: Arc<dyn MessageStore>,
    settings: Arc<dyn SettingsStore>,
    relay: Arc<dyn Relay>,
    max_attachment_size: usize,
}

impl IntakePipeline {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        settings: Arc<dyn SettingsStore>,
        relay: Arc<dyn Relay>,
        max_attachment_size: usize,
    ) -> Self {
        Self {
            messages,
            settings,
            relay,
            max_attachment_size,
        }
    }

    /// Handle one inbound message
    ///
    /// Attachments over the size ceiling are skipped; every other failure
    /// is returned so the transport can report the message as undelivered.
    /// Nothing is retried.
    pub async fn handle_inbound(&self, raw: &[u8], from: &str, to: &str) -> Result<IntakeReceipt> {
        let parsed = MimeParser::parse(raw);
        let message_id = Uuid::new_v4().to_string();

        debug!(
            "Intake {}: {} bytes from {} to {}, {} attachment(s)",
            message_id,
            raw.len(),
            from,
            to,
            parsed.attachment_count()
        );

        let message = NewMessage {
            id: message_id.clone(),
            direction: Direction::Received,
            from_address: from.to_string(),
            to_address: to.to_string(),
            cc: (!parsed.cc.is_empty()).then(|| parsed.cc.join(", ")),
            bcc: None,
            subject: parsed.subject.clone(),
            body_text: parsed.text_body.clone(),
            body_html: parsed.html_body.clone(),
            headers: Some(parsed.headers_json()?),
            raw_size: Some(raw.len() as i64),
            provider_message_id: None,
        };

        self.messages.insert_message(&message).await?;

        let mut attachments_stored = 0;
        let mut attachments_skipped = 0;

        for part in &parsed.attachments {
            let filename = part.filename.as_deref().unwrap_or(DEFAULT_FILENAME);

            if part.size() > self.max_attachment_size {
                warn!(
                    "Skipping attachment {} on message {}: {} bytes exceeds limit of {}",
                    filename,
                    message_id,
                    part.size(),
                    self.max_attachment_size
                );
                attachments_skipped += 1;
                continue;
            }

            let attachment = NewAttachment::from_bytes(
                Uuid::new_v4().to_string(),
                message_id.clone(),
                filename.to_string(),
                part.mime_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                &part.content,
            );

            self.messages.insert_attachment(&attachment).await?;
            attachments_stored += 1;
        }

        let destination = self
            .settings
            .get(keys::DESTINATION_EMAIL)
            .await?
            .filter(|d| !d.trim().is_empty());

        if let Some(ref destination) = destination {
            self.relay.forward(raw, from, destination).await?;
        }

        info!(
            "Stored message {} from {} to {} ({} attachment(s), {} skipped{})",
            message_id,
            from,
            to,
            attachments_stored,
            attachments_skipped,
            destination
                .as_ref()
                .map(|d| format!(", relayed to {}", d))
                .unwrap_or_default()
        );

        Ok(IntakeReceipt {
            message_id,
            attachments_stored,
            attachments_skipped,
            relayed_to: destination,
        })
    }
}
