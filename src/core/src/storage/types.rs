use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

const COLLABORATOR_PREFIX: &str = "out_hd_";
const PUBLIC_PREFIX: &str = "result_";
const ARTIFACT_EXTENSION: &str = "png";

/// The two images a try-on request uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Model,
    Cloth,
}

impl UploadKind {
    /// Scratch file name, unique per session so concurrent uploads never collide.
    pub fn file_name(&self, session_id: Uuid) -> String {
        match self {
            UploadKind::Model => format!("model_{}.jpg", session_id),
            UploadKind::Cloth => format!("cloth_{}.jpg", session_id),
        }
    }

    pub fn form_field(&self) -> &'static str {
        match self {
            UploadKind::Model => "model_image",
            UploadKind::Cloth => "cloth_image",
        }
    }
}

/// Name the collaborator gives the image of sample `index`.
pub fn collaborator_artifact_name(index: u32) -> String {
    format!("{}{}.{}", COLLABORATOR_PREFIX, index, ARTIFACT_EXTENSION)
}

/// Name of sample `index` inside a session's public directory.
pub fn public_artifact_name(index: u32) -> String {
    format!("{}{}.{}", PUBLIC_PREFIX, index, ARTIFACT_EXTENSION)
}

pub fn is_collaborator_artifact(file_name: &str) -> bool {
    file_name.starts_with(COLLABORATOR_PREFIX)
        && file_name.ends_with(&format!(".{}", ARTIFACT_EXTENSION))
}

/// One artifact copied into a session's public directory.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollectedArtifact {
    pub index: u32,
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: u64,
}
