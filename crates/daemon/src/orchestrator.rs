//! Daemon orchestrator for wiring together all components.
//!
//! This module provides the `DaemonOrchestrator` that canonicalizes the
//! shared root once, builds the file services over it, and runs the HTTP
//! server until shutdown is requested.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::files::RootBoundary;
use crate::router::{build_router, AppState};

/// How long in-flight requests may keep running after shutdown is requested.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Daemon orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Initial state, not started.
    Stopped,
    /// Starting up, binding the listener.
    Starting,
    /// Running and accepting connections.
    Running,
    /// Shutting down gracefully.
    ShuttingDown,
}

/// Events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Orchestrator state changed.
    StateChanged(OrchestratorState),
    /// The HTTP server is accepting connections.
    Listening { addr: SocketAddr },
    /// Error occurred.
    Error { message: String },
}

/// Daemon orchestrator that manages the HTTP server.
pub struct DaemonOrchestrator {
    /// Configuration.
    config: Config,
    /// Services shared by every request.
    app_state: AppState,
    /// Current state.
    state: Arc<RwLock<OrchestratorState>>,
    /// Address the server is bound to while running.
    local_addr: Option<SocketAddr>,
    /// Server task.
    server: Option<JoinHandle<()>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
    /// Event sender.
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

impl DaemonOrchestrator {
    /// Creates a new daemon orchestrator.
    ///
    /// Fails if the configured root directory does not exist or is not a
    /// directory.
    pub fn new(config: Config) -> Result<Self> {
        let root = RootBoundary::new(&config.files.root_dir).with_context(|| {
            format!(
                "Invalid root directory: {}",
                config.files.root_dir.display()
            )
        })?;
        info!("Serving folders under {}", root.path().display());

        let app_state = AppState::new(Arc::new(root), &config.files);
        let (event_tx, _) = broadcast::channel(64);

        Ok(Self {
            config,
            app_state,
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            local_addr: None,
            server: None,
            shutdown_token: CancellationToken::new(),
            event_tx,
        })
    }

    /// Returns the current state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Subscribes to orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// Returns the bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Starts the HTTP server and returns the address it listens on.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                anyhow::bail!("Orchestrator is already running");
            }
            *state = OrchestratorState::Starting;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Starting));

        info!("Starting daemon orchestrator...");

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                *self.state.write().await = OrchestratorState::Stopped;
                self.emit_event(OrchestratorEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        let addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        let app = build_router(self.app_state.clone(), self.config.server.request_timeout());
        let token = self.shutdown_token.clone();
        let event_tx = self.event_tx.clone();

        self.server = Some(tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
                let _ = event_tx.send(OrchestratorEvent::Error {
                    message: e.to_string(),
                });
            }
            debug!("HTTP server task finished");
        }));
        self.local_addr = Some(addr);

        {
            let mut state = self.state.write().await;
            *state = OrchestratorState::Running;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Running));
        self.emit_event(OrchestratorEvent::Listening { addr });

        info!("Listening on http://{}", addr);
        Ok(addr)
    }

    async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.server.socket_addr()?;
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))
    }

    /// Stops the server, letting in-flight requests finish within the
    /// grace period.
    pub async fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == OrchestratorState::Stopped {
                return Ok(());
            }
            if *state == OrchestratorState::ShuttingDown {
                anyhow::bail!("Orchestrator is already shutting down");
            }
            *state = OrchestratorState::ShuttingDown;
        }
        self.emit_event(OrchestratorEvent::StateChanged(
            OrchestratorState::ShuttingDown,
        ));

        info!("Stopping daemon orchestrator...");

        // Signal shutdown to the server task
        self.shutdown_token.cancel();

        if let Some(mut server) = self.server.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, &mut server).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("HTTP server task failed: {}", e),
                Err(_) => {
                    warn!("In-flight requests did not finish in time, aborting");
                    server.abort();
                }
            }
        }

        self.local_addr = None;
        self.shutdown_token = CancellationToken::new();

        {
            let mut state = self.state.write().await;
            *state = OrchestratorState::Stopped;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Stopped));

        info!("Daemon orchestrator stopped");
        Ok(())
    }

    /// Emits an orchestrator event.
    fn emit_event(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }
}
