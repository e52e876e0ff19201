//! Inlet Daemon
//!
//! Webhook ingestion-to-event-log pipeline.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p inletd
//!
//! # Start with custom environment
//! INLET_ENV=test INLET_API_PORT=8081 cargo run -p inletd
//! ```
//!
//! # Environment Variables
//!
//! - `INLET_ENV`: Environment (test, development, production)
//! - `INLET_API_HOST`: API host (default: 0.0.0.0)
//! - `INLET_API_PORT`: API port (default: 8080)
//! - `INLET_WEBHOOK_TOKEN`: Shared ingest token (default: unset, any credential passes)
//! - `INLET_AUTH_CACHE_TTL_SECS`: Decision cache TTL (default: 3600)
//! - `INLET_BUFFER_MAX_DEPTH`: Buffer capacity ceiling (default: 10000)
//! - `INLET_MAX_RECEIVE_COUNT`: Deliveries before dead-lettering (default: 3)
//! - `INLET_RELAY_BATCH_SIZE`: Messages per drain pass (default: 10)
//! - `INLET_VISIBILITY_TIMEOUT_SECS`: Buffer lease duration (default: 30)
//! - `INLET_POLL_INTERVAL_MS`: Relay poll interval (default: 100)
//! - `INLET_APPEND_MAX_ATTEMPTS`: Append retry budget (default: 5)

use inletd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("inletd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Inlet Daemon"
    );

    // Create and run daemon
    #[cfg(feature = "postgres")]
    let daemon = Daemon::new_postgres(config, inletd::db::connect_from_env().await?);
    #[cfg(not(feature = "postgres"))]
    let daemon = Daemon::new_memory(config);
    daemon.run().await?;

    Ok(())
}
