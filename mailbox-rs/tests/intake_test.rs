//! Intake pipeline against a real SQLite store

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use mailbox_rs::intake::{IntakePipeline, Relay};
use mailbox_rs::store::{keys, Direction, MessageStore, SettingsStore, SqliteStore};
use mailbox_rs::Result;
use std::sync::{Arc, Mutex};

/// Relay that records every forward instead of sending
#[derive(Default)]
struct RecordingRelay {
    calls: Mutex<Vec<(Vec<u8>, String, String)>>,
}

#[async_trait]
impl Relay for RecordingRelay {
    async fn forward(&self, raw: &[u8], from: &str, to: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((raw.to_vec(), from.to_string(), to.to_string()));
        Ok(())
    }
}

fn pdf_bytes(size: usize) -> Vec<u8> {
    let mut pdf = b"%PDF-1.4\n".to_vec();
    pdf.extend((0..size - pdf.len()).map(|i| (i % 251) as u8));
    pdf
}

fn message_with_pdf(pdf: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(pdf);
    let mut body = String::new();
    for chunk in encoded.as_bytes().chunks(76) {
        body.push_str(std::str::from_utf8(chunk).unwrap());
        body.push_str("\r\n");
    }

    format!(
        "From: Alice <a@x.com>\r\n\
         To: b@domain.com\r\n\
         Subject: Quarterly report\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
         \r\n\
         --b1\r\n\
         Content-Type: multipart/alternative; boundary=\"b2\"\r\n\
         \r\n\
         --b2\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Report attached.\r\n\
         --b2\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         \r\n\
         <p>Report attached.</p>\r\n\
         --b2--\r\n\
         --b1\r\n\
         Content-Type: application/pdf; name=\"report.pdf\"\r\n\
         Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
         Content-Transfer-Encoding: base64\r\n\
         \r\n\
         {}--b1--\r\n",
        body
    )
    .into_bytes()
}

async fn pipeline() -> (IntakePipeline, SqliteStore, Arc<RecordingRelay>) {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    let relay = Arc::new(RecordingRelay::default());
    let pipeline = IntakePipeline::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        relay.clone(),
        5 * 1024 * 1024,
    );
    (pipeline, store, relay)
}

#[tokio::test]
async fn test_message_with_pdf_is_stored_without_forward() {
    let (pipeline, store, relay) = pipeline().await;
    let pdf = pdf_bytes(10 * 1024);
    let raw = message_with_pdf(&pdf);

    let receipt = pipeline
        .handle_inbound(&raw, "a@x.com", "b@domain.com")
        .await
        .unwrap();

    let message = store.get_message(&receipt.message_id).await.unwrap().unwrap();
    assert_eq!(message.direction, Direction::Received);
    assert!(!message.is_read);
    assert!(!message.is_starred);
    assert_eq!(message.from_address, "a@x.com");
    assert_eq!(message.to_address, "b@domain.com");
    assert_eq!(message.subject.as_deref(), Some("Quarterly report"));
    assert_eq!(message.body_text.as_deref().map(str::trim), Some("Report attached."));
    assert!(message.body_html.unwrap().contains("<p>Report attached.</p>"));

    let attachments = store.list_attachments(&receipt.message_id).await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].filename, "report.pdf");
    assert_eq!(attachments[0].content_type, "application/pdf");
    assert_eq!(attachments[0].size, 10240);

    let stored = store
        .get_attachment(&attachments[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.decode().unwrap(), pdf);

    assert!(relay.calls.lock().unwrap().is_empty());
    assert_eq!(receipt.relayed_to, None);
}

#[tokio::test]
async fn test_forward_carries_original_bytes_and_envelope_sender() {
    let (pipeline, store, relay) = pipeline().await;
    store
        .set(keys::DESTINATION_EMAIL, "me@personal.org")
        .await
        .unwrap();
    let raw = message_with_pdf(&pdf_bytes(2048));

    pipeline
        .handle_inbound(&raw, "a@x.com", "b@domain.com")
        .await
        .unwrap();

    let calls = relay.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, raw);
    assert_eq!(calls[0].1, "a@x.com");
    assert_eq!(calls[0].2, "me@personal.org");
}

#[tokio::test]
async fn test_concurrent_intakes_are_independent() {
    let (pipeline, store, _relay) = pipeline().await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let raw = format!("From: a@x.com\r\nSubject: n{}\r\n\r\nbody {}", i, i);
                pipeline
                    .handle_inbound(raw.as_bytes(), "a@x.com", "b@domain.com")
                    .await
                    .unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let receipt = handle.await.unwrap();
        let message = store.get_message(&receipt.message_id).await.unwrap().unwrap();
        assert_eq!(message.subject, Some(format!("n{}", i)));
    }
}
