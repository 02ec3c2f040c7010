//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::directory::{self, Directory};
use crate::drain::{drain_and_disconnect, DrainOutcome};
use crate::error::{DaemonError, DaemonResult};
use crate::roster::{self, Roster};
use crate::scheduler::{Reconciler, Scheduler};
use std::future::Future;
use std::sync::Arc;
use teamrole_types::TeamSide;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

/// teamrole daemon server
pub struct Server {
    config: DaemonConfig,
    directory: Arc<dyn Directory>,
    scheduler: Arc<Scheduler>,
    reconcile_rx: mpsc::Receiver<()>,
}

impl Server {
    /// Validate the configuration and connect to the directory.
    ///
    /// Fails without starting anything when a required value is missing or
    /// the directory rejects the connection.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate()?;

        let directory = directory::connect(&config.directory, &config.guild()).await?;
        let roster = roster::from_config(&config.roster);

        Ok(Self::with_components(config, directory, roster))
    }

    /// Assemble a server around already-built collaborators
    pub fn with_components(
        config: DaemonConfig,
        directory: Arc<dyn Directory>,
        roster: Arc<dyn Roster>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(directory.clone(), roster, &config));
        let (scheduler, reconcile_rx) = Scheduler::new(config.scheduler.clone(), reconciler);

        Self {
            config,
            directory,
            scheduler,
            reconcile_rx,
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` resolves, then drain managed roles and disconnect
    pub async fn run_until<F>(self, signal: F) -> DaemonResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            config,
            directory,
            scheduler,
            reconcile_rx,
        } = self;

        let api = if config.api.enabled {
            let addr = config.api.listen_addr;
            let listener = match TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    directory.shutdown_now();
                    return Err(DaemonError::Server(format!("Failed to bind {}: {}", addr, e)));
                }
            };
            tracing::info!(%addr, "Status API listening");

            let app = create_router(AppState::new(scheduler.clone()));
            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let handle = tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = stop_rx.await;
                    })
                    .await
            });
            Some((stop_tx, handle))
        } else {
            None
        };

        let scheduler_handle = tokio::spawn(scheduler.clone().start(reconcile_rx));

        signal.await;
        tracing::info!("teamrole daemon shutting down");

        scheduler.stop();
        if let Err(e) = scheduler_handle.await {
            tracing::warn!(error = %e, "Scheduler task ended abnormally");
        }

        if let Some((stop_tx, handle)) = api {
            let _ = stop_tx.send(());
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Status API exited with error"),
                Err(e) => tracing::warn!(error = %e, "Status API task ended abnormally"),
            }
        }

        let outcome = drain_and_disconnect(
            directory.as_ref(),
            scheduler.reconciler().dispatcher(),
            &config.guild(),
            &config.binding(TeamSide::Red).role,
            &config.binding(TeamSide::Blue).role,
            config.scheduler.drain_timeout(),
        )
        .await;
        if let DrainOutcome::Completed(report) = &outcome {
            tracing::debug!(?report, "Teardown complete");
        }

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
