use crate::synthesis::GenerationParams;
use crate::SessionStatus;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

/// State of one `/tryon/` request. Only the public output directory outlives it.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub model_path: PathBuf,
    pub cloth_path: PathBuf,
    pub params: GenerationParams,
    pub output_dir: PathBuf,
    pub results: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(id: Uuid, params: GenerationParams, output_dir: PathBuf) -> Self {
        Self {
            id,
            model_path: PathBuf::new(),
            cloth_path: PathBuf::new(),
            params,
            output_dir,
            results: Vec::new(),
            created_at: Utc::now(),
            status: SessionStatus::Pending,
        }
    }
}
