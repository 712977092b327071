use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::configuration::{Config, OutputLayout};
use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{
    collaborator_artifact_name, is_collaborator_artifact, public_artifact_name, CollectedArtifact,
    UploadKind,
};

/// Filesystem storage rooted at three directories: the scratch input root,
/// the public output root (one subdirectory per session) and the
/// collaborator's output root.
pub struct FileStorage {
    input_dir: PathBuf,
    public_dir: PathBuf,
    collaborator_dir: PathBuf,
}

fn create_dir(path: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(path).map_err(|e| {
        error!("Failed to create directory {}: {}", path.display(), e);
        StorageError::CreateDirFailed(path.to_path_buf(), e)
    })
}

/// Creates a root and resolves it to an absolute path, so every path handed
/// to the collaborator is independent of its working directory.
fn create_root(path: &Path) -> Result<PathBuf, StorageError> {
    create_dir(path)?;
    fs::canonicalize(path).map_err(|e| {
        error!("Failed to resolve directory {}: {}", path.display(), e);
        StorageError::ReadFailed(path.to_path_buf(), e)
    })
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .ok()
}

impl FileStorage {
    /// Creates the three roots if needed.
    pub fn new<P: AsRef<Path>>(
        input_dir: P,
        public_dir: P,
        collaborator_dir: P,
    ) -> Result<Self, StorageError> {
        let input_dir = create_root(input_dir.as_ref())?;
        let public_dir = create_root(public_dir.as_ref())?;
        let collaborator_dir = create_root(collaborator_dir.as_ref())?;
        info!(
            "FileStorage initialized (inputs: {}, public: {}, collaborator: {})",
            input_dir.display(),
            public_dir.display(),
            collaborator_dir.display()
        );

        Ok(Self {
            input_dir,
            public_dir,
            collaborator_dir,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        Self::new(
            &config.input_dir,
            &config.public_dir,
            &config.collaborator.output_dir,
        )
    }

    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    fn session_dir(&self, session_id: Uuid) -> PathBuf {
        self.public_dir.join(session_id.to_string())
    }

    fn input_path(&self, session_id: Uuid, kind: UploadKind) -> PathBuf {
        self.input_dir.join(kind.file_name(session_id))
    }

    /// Removes every direct child directory of `root` named by a session id
    /// and older than the cutoff.
    fn remove_expired_session_dirs(
        root: &Path,
        older_than: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let mut removed = 0usize;
        let entries = fs::read_dir(root).map_err(|e| {
            error!("Failed to read directory {}: {}", root.display(), e);
            StorageError::ReadFailed(root.to_path_buf(), e)
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let is_session = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| Uuid::parse_str(n).is_ok())
                .unwrap_or(false);
            if !is_session {
                continue;
            }
            match modified_at(&path) {
                Some(ts) if ts < older_than => match fs::remove_dir_all(&path) {
                    Ok(()) => {
                        debug!("Removed expired directory {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                },
                _ => {}
            }
        }
        Ok(removed)
    }
}

impl Storage for FileStorage {
    fn create_session_dir(&self, session_id: Uuid) -> Result<PathBuf, StorageError> {
        let dir = self.session_dir(session_id);
        create_dir(&dir)?;
        debug!("Created session directory {}", dir.display());
        Ok(dir)
    }

    fn save_upload(
        &self,
        session_id: Uuid,
        kind: UploadKind,
        data: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.input_path(session_id, kind);
        fs::write(&path, data).map_err(|e| {
            error!("Failed to write upload {}: {}", path.display(), e);
            StorageError::WriteFailed(path.clone(), e)
        })?;
        debug!("Saved {} byte(s) to {}", data.len(), path.display());
        Ok(path)
    }

    fn collaborator_dir_for(
        &self,
        session_id: Uuid,
        layout: OutputLayout,
    ) -> Result<PathBuf, StorageError> {
        match layout {
            OutputLayout::Shared => Ok(self.collaborator_dir.clone()),
            OutputLayout::PerSession => {
                let dir = self.collaborator_dir.join(session_id.to_string());
                create_dir(&dir)?;
                Ok(dir)
            }
        }
    }

    fn clear_stale_outputs(&self, dir: &Path) -> Result<usize, StorageError> {
        let entries = fs::read_dir(dir).map_err(|e| {
            error!("Failed to read directory {}: {}", dir.display(), e);
            StorageError::ReadFailed(dir.to_path_buf(), e)
        })?;
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let stale = name.to_str().map(is_collaborator_artifact).unwrap_or(false);
            if !stale || !entry.path().is_file() {
                continue;
            }
            let path = entry.path();
            fs::remove_file(&path).map_err(|e| {
                error!("Failed to remove stale output {}: {}", path.display(), e);
                StorageError::RemoveFailed(path.clone(), e)
            })?;
            removed += 1;
        }
        if removed > 0 {
            debug!("Removed {} stale output(s) from {}", removed, dir.display());
        }
        Ok(removed)
    }

    fn collect_artifacts(
        &self,
        session_id: Uuid,
        source: &Path,
        sample: u32,
    ) -> Result<Vec<CollectedArtifact>, StorageError> {
        let session_dir = self.session_dir(session_id);
        let mut collected = Vec::new();
        for index in 0..sample {
            let original = source.join(collaborator_artifact_name(index));
            if !original.is_file() {
                debug!("No output for sample {} at {}", index, original.display());
                continue;
            }
            let file_name = public_artifact_name(index);
            let target = session_dir.join(&file_name);
            let bytes = fs::copy(&original, &target).map_err(|e| {
                error!(
                    "Failed to copy {} to {}: {}",
                    original.display(),
                    target.display(),
                    e
                );
                StorageError::CopyFailed(original.clone(), e)
            })?;
            collected.push(CollectedArtifact {
                index,
                file_name,
                path: target,
                bytes,
            });
        }
        info!(
            "Collected {}/{} artifact(s) for session {}",
            collected.len(),
            sample,
            session_id
        );
        Ok(collected)
    }

    fn remove_inputs(&self, session_id: Uuid) -> Result<(), StorageError> {
        for kind in [UploadKind::Model, UploadKind::Cloth] {
            let path = self.input_path(session_id, kind);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed input {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!("Failed to remove input {}: {}", path.display(), e);
                    return Err(StorageError::RemoveFailed(path, e));
                }
            }
        }
        Ok(())
    }

    fn discard_collaborator_dir(&self, dir: &Path) -> Result<(), StorageError> {
        if dir == self.collaborator_dir {
            return Ok(());
        }
        match fs::remove_dir_all(dir) {
            Ok(()) => {
                debug!("Removed collaborator directory {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Failed to remove {}: {}", dir.display(), e);
                Err(StorageError::RemoveFailed(dir.to_path_buf(), e))
            }
        }
    }

    fn cleanup_old_sessions(&self, older_than: DateTime<Utc>) -> Result<usize, StorageError> {
        let removed = Self::remove_expired_session_dirs(&self.public_dir, older_than)?;
        let orphaned = Self::remove_expired_session_dirs(&self.collaborator_dir, older_than)?;

        let mut inputs = 0usize;
        let entries = fs::read_dir(&self.input_dir).map_err(|e| {
            error!("Failed to read directory {}: {}", self.input_dir.display(), e);
            StorageError::ReadFailed(self.input_dir.clone(), e)
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(ts) = modified_at(&path) {
                if ts < older_than && fs::remove_file(&path).is_ok() {
                    inputs += 1;
                }
            }
        }

        info!(
            "Removed {} expired session(s), {} orphaned collaborator dir(s), {} scratch file(s) (cutoff: {})",
            removed,
            orphaned,
            inputs,
            older_than.to_rfc3339()
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn storage_in(dir: &TempDir) -> FileStorage {
        FileStorage::new(
            dir.path().join("temp_inputs"),
            dir.path().join("served_outputs"),
            dir.path().join("images_output"),
        )
        .unwrap()
    }

    #[test]
    fn test_new_creates_roots() {
        let dir = TempDir::new().unwrap();
        let _storage = storage_in(&dir);
        assert!(dir.path().join("temp_inputs").is_dir());
        assert!(dir.path().join("served_outputs").is_dir());
        assert!(dir.path().join("images_output").is_dir());
    }

    #[test]
    fn test_save_upload_uses_session_names() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        let id = Uuid::new_v4();
        let model = storage.save_upload(id, UploadKind::Model, b"model").unwrap();
        let cloth = storage.save_upload(id, UploadKind::Cloth, b"cloth").unwrap();

        assert!(model.is_absolute());
        assert_eq!(
            model.file_name().and_then(|n| n.to_str()),
            Some(format!("model_{}.jpg", id).as_str())
        );
        assert_eq!(fs::read(&model).unwrap(), b"model");
        assert_eq!(fs::read(&cloth).unwrap(), b"cloth");

        storage.remove_inputs(id).unwrap();
        assert!(!model.exists());
        assert!(!cloth.exists());
        // second removal is a no-op
        storage.remove_inputs(id).unwrap();
    }

    #[test]
    fn test_collect_artifacts_copies_existing_and_skips_missing() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        let id = Uuid::new_v4();
        storage.create_session_dir(id).unwrap();
        let source = storage.collaborator_dir_for(id, OutputLayout::Shared).unwrap();
        fs::write(source.join("out_hd_0.png"), b"first").unwrap();
        fs::write(source.join("out_hd_2.png"), b"third").unwrap();

        let collected = storage.collect_artifacts(id, &source, 3).unwrap();

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].index, 0);
        assert_eq!(collected[1].file_name, "result_2.png");
        let session_dir = dir.path().join("served_outputs").join(id.to_string());
        assert_eq!(fs::read(session_dir.join("result_0.png")).unwrap(), b"first");
        assert_eq!(fs::read(session_dir.join("result_2.png")).unwrap(), b"third");
        assert!(!session_dir.join("result_1.png").exists());
        assert_eq!(collected[1].bytes, 5);
    }

    #[test]
    fn test_collect_ignores_indices_beyond_sample() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        let id = Uuid::new_v4();
        storage.create_session_dir(id).unwrap();
        let source = storage.collaborator_dir_for(id, OutputLayout::Shared).unwrap();
        fs::write(source.join("out_hd_0.png"), b"a").unwrap();
        fs::write(source.join("out_hd_1.png"), b"b").unwrap();

        let collected = storage.collect_artifacts(id, &source, 1).unwrap();
        assert_eq!(collected.len(), 1);
    }

    #[test]
    fn test_clear_stale_outputs_only_touches_artifacts() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        let shared = dir.path().join("images_output");
        fs::write(shared.join("out_hd_0.png"), b"old").unwrap();
        fs::write(shared.join("out_hd_7.png"), b"old").unwrap();
        fs::write(shared.join("notes.txt"), b"keep").unwrap();

        assert_eq!(storage.clear_stale_outputs(&shared).unwrap(), 2);
        assert!(shared.join("notes.txt").exists());
        assert!(!shared.join("out_hd_0.png").exists());
    }

    #[test]
    fn test_per_session_collaborator_dir_is_private_and_discardable() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        let a = storage
            .collaborator_dir_for(Uuid::new_v4(), OutputLayout::PerSession)
            .unwrap();
        let b = storage
            .collaborator_dir_for(Uuid::new_v4(), OutputLayout::PerSession)
            .unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir());

        storage.discard_collaborator_dir(&a).unwrap();
        assert!(!a.exists());

        // the shared root is never removed
        let shared = storage
            .collaborator_dir_for(Uuid::new_v4(), OutputLayout::Shared)
            .unwrap();
        storage.discard_collaborator_dir(&shared).unwrap();
        assert!(shared.is_dir());
    }

    #[test]
    fn test_cleanup_old_sessions_respects_cutoff() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        let id = Uuid::new_v4();
        let session_dir = storage.create_session_dir(id).unwrap();
        storage.save_upload(id, UploadKind::Model, b"m").unwrap();
        fs::create_dir_all(dir.path().join("served_outputs").join("not-a-session")).unwrap();

        let removed = storage
            .cleanup_old_sessions(Utc::now() - Duration::hours(1))
            .unwrap();
        assert_eq!(removed, 0);
        assert!(session_dir.exists());

        let removed = storage
            .cleanup_old_sessions(Utc::now() + Duration::minutes(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!session_dir.exists());
        assert!(dir.path().join("served_outputs").join("not-a-session").exists());
        assert_eq!(fs::read_dir(dir.path().join("temp_inputs")).unwrap().count(), 0);
    }
}
