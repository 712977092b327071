//! Storage subsystem
//!
//! Filesystem layout of the gateway and every operation that touches it.
//!
//! Components:
//! - `storage_trait`: the Storage trait defining a uniform API.
//! - `types`: upload kinds, artifact naming and collected artifact records.
//! - `file_storage`: the filesystem-backed implementation.

pub mod file_storage;
pub mod storage_trait;
pub mod types;

pub use file_storage::FileStorage;
pub use storage_trait::Storage;
pub use types::{CollectedArtifact, UploadKind};
