//! SMTP transport (RFC 5321)
//!
//! - [`server`]: accepts inbound mail and feeds it to intake
//! - [`session`]: per-connection state machine
//! - [`commands`]: command line parsing
//! - [`client`]: relay to a smarthost

pub mod client;
pub mod commands;
pub mod server;
pub mod session;

pub use client::SmtpRelay;
pub use commands::SmtpCommand;
pub use server::SmtpServer;
pub use session::SmtpSession;
