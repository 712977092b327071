use crate::configuration::{Config, OutputLayout};
use crate::error_handling::types::TryOnError;
use crate::session_management::public_url::artifact_url;
use crate::session_management::session::Session;
use crate::storage::{Storage, UploadKind};
use crate::synthesis::{GenerationParams, SynthesisJob, SynthesisManager};
use crate::SessionStatus;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One try-on request as handed over by the web layer.
#[derive(Debug, Clone)]
pub struct TryOnRequest {
    pub model_image: Vec<u8>,
    pub cloth_image: Vec<u8>,
    pub params: GenerationParams,
    /// Base of the result URLs, already resolved from config or request.
    pub base_url: String,
}

/// Result of a request that reached the synthesis step.
#[derive(Debug, Clone, PartialEq)]
pub enum TryOnOutcome {
    /// Synthesis succeeded. `produced` may be lower than `expected` when the
    /// collaborator skipped some samples.
    Success {
        session_id: Uuid,
        results: Vec<String>,
        expected: u32,
        produced: u32,
    },
    /// Synthesis failed; nothing was collected.
    Failed { session_id: Uuid, message: String },
}

/// Counters over all sessions handled since start-up.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SessionStats {
    pub total: u64,
    pub completed: u64,
    pub partial: u64,
    pub failed: u64,
}

/// The request handler.
///
/// Each call to [`SessionManager::handle_tryon`] creates a session, persists
/// its inputs, runs synthesis, copies the produced artifacts into the
/// session's public directory and returns their URLs.
///
/// # Fields Overview
///
/// - `storage`: every filesystem operation
/// - `synthesis`: collaborator runs, including the shared-output slot
/// - `keep_inputs`: keep scratch uploads after the run
/// - `max_samples`: upper bound for the requested sample count
/// - `shutdown`: parent of every run's cancellation token
pub struct SessionManager {
    storage: Arc<dyn Storage>,
    synthesis: Arc<SynthesisManager>,
    keep_inputs: bool,
    max_samples: u32,
    shutdown: CancellationToken,
    stats: Mutex<SessionStats>,
}

impl SessionManager {
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        synthesis: Arc<SynthesisManager>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            storage,
            synthesis,
            keep_inputs: config.retention.keep_inputs,
            max_samples: config.max_samples,
            shutdown,
            stats: Mutex::new(SessionStats::default()),
        }
    }

    pub fn synthesis(&self) -> &SynthesisManager {
        &self.synthesis
    }

    pub fn get_stats(&self) -> SessionStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn update_stats<F: FnOnce(&mut SessionStats)>(&self, f: F) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    pub async fn handle_tryon(&self, request: TryOnRequest) -> Result<TryOnOutcome, TryOnError> {
        request
            .params
            .validate(self.max_samples)
            .map_err(TryOnError::InvalidParameter)?;

        let session_id = Uuid::new_v4();
        self.update_stats(|s| s.total += 1);
        // also runs when the request future is dropped mid-run
        let mut guard = SessionGuard {
            manager: self,
            session_id,
            settled: false,
        };

        let outcome = self.run_session(session_id, &request).await;

        match &outcome {
            Ok(TryOnOutcome::Success {
                expected, produced, ..
            }) => {
                let partial = produced < expected;
                self.update_stats(|s| {
                    s.completed += 1;
                    if partial {
                        s.partial += 1;
                    }
                });
            }
            Ok(TryOnOutcome::Failed { .. }) | Err(_) => self.update_stats(|s| s.failed += 1),
        }
        guard.settled = true;
        outcome
    }

    async fn run_session(
        &self,
        session_id: Uuid,
        request: &TryOnRequest,
    ) -> Result<TryOnOutcome, TryOnError> {
        let output_dir = self.storage.create_session_dir(session_id)?;
        let mut session = Session::new(session_id, request.params, output_dir);
        info!(
            "Session {} created (sample: {}, scale: {})",
            session.id, session.params.sample, session.params.scale
        );

        self.persist_inputs(&mut session, request)?;
        let outcome = self
            .synthesize_and_collect(&mut session, &request.base_url)
            .await;
        debug!("Session {} ended with status {:?}", session.id, session.status);
        outcome
    }

    fn persist_inputs(
        &self,
        session: &mut Session,
        request: &TryOnRequest,
    ) -> Result<(), TryOnError> {
        session.model_path =
            self.storage
                .save_upload(session.id, UploadKind::Model, &request.model_image)?;
        session.cloth_path =
            self.storage
                .save_upload(session.id, UploadKind::Cloth, &request.cloth_image)?;
        Ok(())
    }

    async fn synthesize_and_collect(
        &self,
        session: &mut Session,
        base_url: &str,
    ) -> Result<TryOnOutcome, TryOnError> {
        // held until collection is done so no other session touches the
        // shared output directory in between
        let slot = self.synthesis.acquire_slot().await;
        let collaborator_dir = self
            .storage
            .collaborator_dir_for(session.id, self.synthesis.layout())?;
        if slot.is_some() {
            self.storage.clear_stale_outputs(&collaborator_dir)?;
        }

        let job = SynthesisJob {
            session_id: session.id,
            model_path: session.model_path.clone(),
            cloth_path: session.cloth_path.clone(),
            params: session.params,
            output_dir: collaborator_dir.clone(),
        };
        session.status = SessionStatus::Running;

        let cancel = self.shutdown.child_token();
        if let Err(e) = self.synthesis.run(&job, &cancel).await {
            drop(slot);
            self.discard_collaborator_dir(&collaborator_dir);
            session.status = SessionStatus::Failed;
            return Ok(TryOnOutcome::Failed {
                session_id: session.id,
                message: format!("Processing failed: {}", e),
            });
        }

        let collected =
            self.storage
                .collect_artifacts(session.id, &collaborator_dir, session.params.sample);
        drop(slot);
        self.discard_collaborator_dir(&collaborator_dir);
        let collected = collected?;

        session.results = collected
            .iter()
            .map(|artifact| artifact_url(base_url, session.id, &artifact.file_name))
            .collect();
        session.status = SessionStatus::Completed;

        let expected = session.params.sample;
        let produced = session.results.len() as u32;
        if produced < expected {
            warn!(
                "Session {} produced {} of {} requested image(s)",
                session.id, produced, expected
            );
        }

        Ok(TryOnOutcome::Success {
            session_id: session.id,
            results: session.results.clone(),
            expected,
            produced,
        })
    }

    fn discard_collaborator_dir(&self, dir: &Path) {
        if self.synthesis.layout() != OutputLayout::PerSession {
            return;
        }
        if let Err(e) = self.storage.discard_collaborator_dir(dir) {
            warn!("Leaving collaborator directory behind: {}", e);
        }
    }

    fn release_inputs(&self, session_id: Uuid) {
        if self.keep_inputs {
            return;
        }
        if let Err(e) = self.storage.remove_inputs(session_id) {
            warn!("Leaving inputs of session {} behind: {}", session_id, e);
        }
    }
}

/// Purges a session's scratch inputs however `handle_tryon` ends, and counts
/// the session as failed when it ends before an outcome was recorded.
struct SessionGuard<'a> {
    manager: &'a SessionManager,
    session_id: Uuid,
    settled: bool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_inputs(self.session_id);
        if !self.settled {
            warn!("Session {} abandoned before completion", self.session_id);
            self.manager.update_stats(|s| s.failed += 1);
        }
    }
}
