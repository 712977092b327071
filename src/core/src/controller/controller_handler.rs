use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::configuration::Config;
use crate::error_handling::types::*;
use crate::session_management::SessionManager;
use crate::storage::{FileStorage, Storage};
use crate::synthesis::{SynthesisManager, SynthesisRuntime};
use crate::web_interface::WebServer;

/// Owns every long-lived component of the gateway.
///
/// # Fields Overview
///
/// - `config`: validated process configuration
/// - `storage`: filesystem layout, shared with the session manager
/// - `session_manager`: request handler used by the web server
/// - `shutdown`: cancelled on Ctrl-C or [`Controller::shutdown`]; parent of
///   every in-flight run's token
pub struct Controller {
    config: Arc<Config>,
    storage: Arc<FileStorage>,
    session_manager: Arc<SessionManager>,
    shutdown: CancellationToken,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;

        let storage = Arc::new(FileStorage::from_config(&config)?);
        let synthesis = Arc::new(SynthesisManager::new(&config));
        let shutdown = CancellationToken::new();
        let session_manager = Arc::new(SessionManager::new(
            &config,
            storage.clone(),
            synthesis,
            shutdown.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            storage,
            session_manager,
            shutdown,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn session_manager(&self) -> Arc<SessionManager> {
        self.session_manager.clone()
    }

    /// Serves requests until shutdown is requested.
    pub async fn run(&self) -> Result<(), ControllerError> {
        match self.session_manager.synthesis().runtime() {
            SynthesisRuntime::Simulation => warn!(
                "Simulation mode: placeholder images after {} ms",
                self.config.simulation_delay_ms
            ),
            SynthesisRuntime::External => info!(
                "Collaborator: {} {} (output: {}, layout: {:?})",
                self.config.collaborator.program,
                self.config.collaborator.script().unwrap_or(""),
                self.config.collaborator.output_dir.display(),
                self.config.collaborator.output_layout
            ),
        }

        let janitor = self.spawn_janitor();
        let signal = self.spawn_signal_listener();

        let server = WebServer::new(
            self.config.clone(),
            self.session_manager.clone(),
            self.storage.public_dir().to_path_buf(),
        );
        let result = server.start(self.shutdown.clone()).await;

        self.shutdown.cancel();
        signal.abort();
        if let Some(janitor) = janitor {
            if let Err(e) = janitor.await {
                error!("Janitor task ended abnormally: {}", e);
            }
        }

        let stats = self.session_manager.get_stats();
        info!(
            "Handled {} session(s): {} completed ({} partial), {} failed",
            stats.total, stats.completed, stats.partial, stats.failed
        );
        result.map_err(ControllerError::from)
    }

    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.cancel();
    }

    /// Removes every session directory last modified before `cutoff`.
    pub fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        self.storage.cleanup_old_sessions(cutoff)
    }

    fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, shutting down");
                    shutdown.cancel();
                }
                Err(e) => error!("Unable to listen for interrupt: {}", e),
            }
        })
    }

    fn spawn_janitor(&self) -> Option<JoinHandle<()>> {
        let Some(retention) = self.config.retention.retention() else {
            info!("Retention disabled, session outputs are kept forever");
            return None;
        };
        let period = self.config.retention.cleanup_interval();
        let storage = self.storage.clone();
        let shutdown = self.shutdown.clone();
        info!(
            "Removing session outputs older than {}s every {}s",
            retention.num_seconds(),
            period.as_secs()
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let storage = storage.clone();
                        let cutoff = Utc::now() - retention;
                        let pass = tokio::task::spawn_blocking(move || {
                            storage.cleanup_old_sessions(cutoff)
                        })
                        .await;
                        match pass {
                            Ok(Ok(0)) => debug!("Janitor found nothing to remove"),
                            Ok(Ok(removed)) => info!("Janitor removed {} expired entries", removed),
                            Ok(Err(e)) => warn!("Janitor pass failed: {}", e),
                            Err(e) => error!("Janitor pass panicked: {}", e),
                        }
                    }
                }
            }
            debug!("Janitor stopped");
        }))
    }
}
