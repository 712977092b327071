//! Storage Trait
//!
//! This module defines the `Storage` trait, the interface between the request
//! handler and the directories it works in.
//!
//! Implementors of this trait are responsible for:
//! - Persisting uploaded inputs under session-unique names
//! - Creating per-session public and collaborator directories
//! - Copying collaborator artifacts into the public directory
//! - Cleaning up expired sessions
//!
//! All methods return a `Result` to handle potential storage errors.

use crate::configuration::OutputLayout;
use crate::error_handling::types::StorageError;
use crate::storage::types::{CollectedArtifact, UploadKind};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub trait Storage: Send + Sync {
    /// Creates `<public>/<session_id>` and returns its path.
    fn create_session_dir(&self, session_id: Uuid) -> Result<PathBuf, StorageError>;

    /// Writes an uploaded image to the scratch root and returns its path.
    fn save_upload(
        &self,
        session_id: Uuid,
        kind: UploadKind,
        data: &[u8],
    ) -> Result<PathBuf, StorageError>;

    /// Directory the collaborator writes to for this session. In
    /// `PerSession` layout the directory is created.
    fn collaborator_dir_for(
        &self,
        session_id: Uuid,
        layout: OutputLayout,
    ) -> Result<PathBuf, StorageError>;

    /// Removes leftover collaborator artifacts from `dir`, returning how many
    /// were removed.
    fn clear_stale_outputs(&self, dir: &Path) -> Result<usize, StorageError>;

    /// Copies `out_hd_<i>.png` for every `i < sample` that exists in `source`
    /// into the session's public directory as `result_<i>.png`.
    /// Missing indices are skipped.
    fn collect_artifacts(
        &self,
        session_id: Uuid,
        source: &Path,
        sample: u32,
    ) -> Result<Vec<CollectedArtifact>, StorageError>;

    /// Deletes the scratch inputs of a session.
    fn remove_inputs(&self, session_id: Uuid) -> Result<(), StorageError>;

    /// Deletes a session-private collaborator directory.
    fn discard_collaborator_dir(&self, dir: &Path) -> Result<(), StorageError>;

    /// Removes session directories and scratch files last modified before
    /// `older_than`. Returns the number of session directories removed.
    fn cleanup_old_sessions(&self, older_than: DateTime<Utc>) -> Result<usize, StorageError>;
}
