//! mailbox-rs: self-hosted mailbox intake and routing provisioning
//!
//! Receives mail for a custom domain, stores it with its attachments and
//! optionally relays a copy to a personal address. The provisioning side
//! configures the routing provider so the domain's mail reaches this
//! system in the first place.
//!
//! # Example
//!
//! ```no_run
//! use mailbox_rs::intake::IntakePipeline;
//! use mailbox_rs::smtp::SmtpRelay;
//! use mailbox_rs::store::SqliteStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::connect("sqlite://mailbox.db?mode=rwc").await?;
//!     let relay = SmtpRelay::new("127.0.0.1:25".to_string(), "mail.example.com".to_string());
//!     let intake = IntakePipeline::new(
//!         Arc::new(store.clone()),
//!         Arc::new(store),
//!         Arc::new(relay),
//!         5 * 1024 * 1024,
//!     );
//!
//!     let raw = b"From: a@x.com\r\nSubject: Hi\r\n\r\nHello";
//!     let receipt = intake.handle_inbound(raw, "a@x.com", "me@example.com").await?;
//!     println!("stored {}", receipt.message_id);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`mime`]: raw message decoding
//! - [`intake`]: store and relay pipeline
//! - [`store`]: SQLite persistence and setup settings
//! - [`provider`]: routing and sending provider clients
//! - [`provisioning`]: domain setup workflow
//! - [`smtp`]: inbound SMTP listener and relay client
//! - [`api`]: HTTP setup and intake endpoints
//! - [`config`]: configuration management

pub mod api;
pub mod config;
pub mod error;
pub mod intake;
pub mod mime;
pub mod provider;
pub mod provisioning;
pub mod smtp;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{MailError, Result};
