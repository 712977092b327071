use serde::{Deserialize, Serialize};

use crate::session_management::SessionStats;
use crate::synthesis::{GenerationParams, SynthesisRuntime, SynthesisStats};

/// Body of every `/tryon/` response and of every error reply.
///
/// Serialized as `{"status":"success","results":[...]}` or
/// `{"status":"error","message":"..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TryOnResponse {
    Success { results: Vec<String> },
    Error { message: String },
}

impl TryOnResponse {
    pub fn error<S: Into<String>>(message: S) -> Self {
        TryOnResponse::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mode: SynthesisRuntime,
    pub sessions: SessionStats,
    pub synthesis: SynthesisStats,
}

/// Decoded multipart body of a `/tryon/` request.
#[derive(Debug)]
pub struct TryOnForm {
    pub model_image: Vec<u8>,
    pub cloth_image: Vec<u8>,
    pub params: GenerationParams,
}
