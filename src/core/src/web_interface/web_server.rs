use log::info;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use warp::{Filter, Reply};

use super::routes::{handle_rejection, health_route, served_outputs_route, tryon_route};
use crate::configuration::Config;
use crate::error_handling::types::WebError;
use crate::session_management::SessionManager;

/// Full route table of the gateway, with every rejection mapped to JSON.
pub fn routes(
    session_manager: Arc<SessionManager>,
    config: Arc<Config>,
    public_dir: PathBuf,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    tryon_route(session_manager.clone(), config)
        .or(served_outputs_route(public_dir))
        .or(health_route(session_manager))
        .recover(handle_rejection)
}

/// HTTP front of the gateway
pub struct WebServer {
    config: Arc<Config>,
    session_manager: Arc<SessionManager>,
    public_dir: PathBuf,
}

impl WebServer {
    pub fn new(
        config: Arc<Config>,
        session_manager: Arc<SessionManager>,
        public_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            session_manager,
            public_dir,
        }
    }

    /// Binds the configured address and serves until `shutdown` is cancelled.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<(), WebError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|e| WebError::BindFailed(e.to_string()))?;

        let routes = routes(
            self.session_manager.clone(),
            self.config.clone(),
            self.public_dir.clone(),
        );

        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;

        info!("Listening on http://{}", bound);
        info!(
            "Results are served from {} at /served_outputs",
            self.public_dir.display()
        );
        server.await;
        info!("Web server stopped");
        Ok(())
    }
}
