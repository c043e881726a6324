//! Utility modules
//!
//! - [`email`]: address and domain validation

pub mod email;

pub use email::{normalize_domain, validate_domain, validate_email};
