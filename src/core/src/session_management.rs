//! Session management core module.
//!
//! This module provides the request handler of the gateway: it creates a
//! session per try-on request, drives synthesis and artifact collection, and
//! builds the public URLs returned to the caller.

use serde::{Deserialize, Serialize};

/// Submodule for building externally reachable artifact URLs.
pub mod public_url;
/// Submodule for session data structures.
pub mod session;
/// Submodule for the request handler implementation.
pub mod session_manager;

pub use session::Session;
pub use session_manager::{SessionManager, SessionStats, TryOnOutcome, TryOnRequest};

/// Represents the current status of a session.
///
/// Variants:
/// - `Pending`: inputs are being persisted.
/// - `Running`: synthesis is in progress.
/// - `Completed`: artifacts were collected.
/// - `Failed`: synthesis failed; no artifacts were collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}
