use std::future::Future;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// Notary HTTP server.
pub struct NotaryServer {
    state: AppState,
}

impl NotaryServer {
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        Ok(Self {
            state: AppState::from_config(config)?,
        })
    }

    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn config(&self) -> &ServerConfig {
        self.state.config()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "could not listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves. Background anchoring stops with it.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config().bind_addr;
        let listener = TcpListener::bind(addr).await?;
        let _background = BackgroundTasks::spawn(&self.state);
        info!("Notary server listening on {addr}");
        axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        info!("Notary server stopped");
        Ok(())
    }
}

/// Calendar sealer and registration sweeper. Aborted on drop.
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn spawn(state: &AppState) -> Self {
        let sealer = {
            let state = state.clone();
            let period = state.config().seal_interval();
            tokio::spawn(every(period, move || {
                match state.calendar().seal() {
                    Ok(Some(block)) => debug!(height = block.height, leaves = block.leaf_count, "calendar block sealed"),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "calendar seal failed"),
                }
                std::future::ready(())
            }))
        };

        let sweeper = {
            let state = state.clone();
            let period = state.config().sweep_interval();
            tokio::spawn(every(period, move || {
                let state = state.clone();
                async move {
                    if let Err(e) = state.pipeline().sweep().await {
                        warn!(error = %e, "registration sweep failed");
                    }
                }
            }))
        };

        Self {
            handles: vec![sealer, sweeper],
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn every<F, Fut>(period: Duration, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        tick().await;
    }
}
