//! REST API module for mailbox-rs
//!
//! Provides the setup endpoints and HTTP intake

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::{router, ApiServer};
