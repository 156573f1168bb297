//! Monitoring credentials.
//!
//! # Design Decisions
//! - The sentinel password is never rendered; it is swapped for a generated one
//! - A generated password is sticky: reused on every later pass and persisted
//!   in the engine state file, never recovered from the rendered config
//! - Passwords never appear in `Debug` output

pub mod manager;

pub use manager::{CredentialManager, Credentials, Resolved, SENTINEL_PASSWORD};
