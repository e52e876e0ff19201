//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all pipeline stages:
//! - Ingest API (gate + buffer front door)
//! - Relay (buffer to bus)
//! - Orchestrator worker (bus to event log)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Wire buffer, bus, and event log
//! 3. Start API server
//! 4. Spawn the orchestrator worker, then the relay
//! 5. Graceful shutdown on SIGINT

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use inlet_buffer::{Buffer, MemoryBuffer};
use inlet_eventlog::{EventLog, MemoryEventLog};
use inlet_gate::DecisionCache;
use inlet_orchestrator::Orchestrator;
use inlet_relay::{BusReceiver, EventBus, Relay};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::worker::OrchestratorWorker;

// =============================================================================
// Daemon
// =============================================================================

/// The main Inlet daemon.
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Ingestion buffer
    buffer: Arc<dyn Buffer>,
    /// Event bus
    bus: Arc<EventBus>,
    /// The bus consumer, handed to the worker at startup
    receiver: Option<BusReceiver>,
    /// Event log
    log: Arc<dyn EventLog>,
}

impl Daemon {
    /// Create a daemon over in-memory backends (testing and
    /// single-process deployments).
    pub fn new_memory(config: Config) -> Self {
        let buffer = Arc::new(MemoryBuffer::with_config(config.memory_buffer_config()));
        let log = Arc::new(MemoryEventLog::new());
        Self::new(config, buffer, log)
    }

    /// Create a daemon over provided backends.
    pub fn new(config: Config, buffer: Arc<dyn Buffer>, log: Arc<dyn EventLog>) -> Self {
        let (bus, receiver) = EventBus::new(config.bus_capacity);

        Self {
            config,
            buffer,
            bus: Arc::new(bus),
            receiver: Some(receiver),
            log,
        }
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(mut self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting Inlet daemon"
        );

        let shutdown = CancellationToken::new();

        // 1. Start API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 2. Spawn the pipeline workers. The worker goes first: the
        //    relay deletes buffer entries once published, so its
        //    consumer must already be in place when the relay starts
        //    draining a backlog that survived a restart.
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| DaemonError::Task("bus receiver already taken".to_string()))?;
        let orchestrator = Orchestrator::new(self.log.clone(), self.config.retry_policy());
        let worker = OrchestratorWorker::new(receiver, orchestrator, self.buffer.clone());
        let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

        let relay = Relay::new(
            self.buffer.clone(),
            self.bus.clone(),
            self.config.relay_config(),
        );
        let relay_handle = tokio::spawn(relay.run(shutdown.clone()));

        // 3. Wait for shutdown signal
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| DaemonError::Task(e.to_string()))?;
        info!("Received shutdown signal");

        // 4. Graceful shutdown: stop the workers, then report
        shutdown.cancel();

        relay_handle
            .await
            .map_err(|e| DaemonError::Task(e.to_string()))??;
        worker_handle
            .await
            .map_err(|e| DaemonError::Task(e.to_string()))??;

        self.report_shutdown().await?;
        Ok(())
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            gate: self.config.gate(),
            decision_cache: DecisionCache::new(self.config.auth.cache_ttl),
            buffer: self.buffer.clone(),
            log: self.log.clone(),
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| DaemonError::Config(format!("Failed to get local address: {}", e)))?;

        // Spawn the server task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    /// Log what is left in the pipeline at shutdown.
    ///
    /// Buffered messages survive the process in durable deployments;
    /// with in-memory backends this is the operator's only record.
    async fn report_shutdown(&self) -> DaemonResult<()> {
        let depth = self.buffer.depth().await?;
        let dead = self.buffer.dead_letters().await?.len();
        info!(
            buffered_messages = depth,
            dead_letters = dead,
            "Shutdown complete"
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_memory_creation() {
        let config = Config::test();
        let daemon = Daemon::new_memory(config);

        assert_eq!(daemon.buffer.depth().await.unwrap(), 0);
        // The consumer side exists from construction, so nothing
        // published before the worker spawns can be shed.
        assert!(!daemon.bus.is_closed());
        assert!(daemon.receiver.is_some());
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let config = Config::test();
        let daemon = Daemon::new_memory(config);

        let addr = daemon.start_api_server().await.unwrap();

        // Server should be running on a port
        assert!(addr.port() > 0);

        // Can make a health check request
        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_daemon_report_shutdown_empty() {
        let config = Config::test();
        let daemon = Daemon::new_memory(config);

        // Should not fail with an empty pipeline
        daemon.report_shutdown().await.unwrap();
    }
}
