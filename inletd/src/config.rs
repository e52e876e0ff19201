//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use inlet_buffer::{MemoryBufferConfig, DEFAULT_MAX_RECEIVE_COUNT};
use inlet_gate::Gate;
use inlet_orchestrator::RetryPolicy;
use inlet_relay::RelayConfig;
use std::env;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Authorization configuration
    pub auth: AuthConfig,

    /// Ingestion buffer configuration
    pub buffer: BufferConfig,

    /// Relay worker configuration
    pub relay: RelaySettings,

    /// Conditional-append retry configuration
    pub retry: RetrySettings,

    /// Event bus channel capacity
    pub bus_capacity: usize,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Authorization configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Shared webhook token; when unset, any present credential passes
    pub webhook_token: Option<String>,
    /// How long a gate decision stays cached per credential
    pub cache_ttl: Duration,
}

/// Ingestion buffer configuration.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Ceiling on buffered messages before ingest returns 503
    pub max_depth: usize,
    /// Deliveries allowed before a message is dead-lettered
    pub max_receive_count: u32,
}

/// Relay worker configuration.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Messages dequeued per drain pass
    pub batch_size: usize,
    /// Lease duration for dequeued messages
    pub visibility_timeout: Duration,
    /// Delay between drain passes
    pub poll_interval: Duration,
}

/// Conditional-append retry configuration.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Write attempts before an event is escalated
    pub max_attempts: u32,
    /// Back-off before the second attempt
    pub base_delay: Duration,
    /// Back-off ceiling
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to every back-off
    pub jitter: Duration,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Ok(Self {
            api: Self::load_api_config()?,
            auth: Self::load_auth_config()?,
            buffer: Self::load_buffer_config()?,
            relay: Self::load_relay_settings()?,
            retry: Self::load_retry_settings()?,
            bus_capacity: Self::load_usize_env("INLET_BUS_CAPACITY", 1000)?,
            environment: Self::load_environment()?,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            auth: AuthConfig {
                webhook_token: None,
                cache_ttl: Duration::from_secs(3600),
            },
            buffer: BufferConfig {
                max_depth: 1000,
                max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            },
            relay: RelaySettings {
                batch_size: 10,
                visibility_timeout: Duration::from_secs(30),
                poll_interval: Duration::from_millis(10),
            },
            retry: RetrySettings {
                max_attempts: 5,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                jitter: Duration::ZERO,
            },
            bus_capacity: 100,
            environment: Environment::Test,
        }
    }

    /// Gate wired from the configured webhook token.
    pub fn gate(&self) -> Gate {
        match &self.auth.webhook_token {
            Some(token) => Gate::with_token(token.clone()),
            None => Gate::permissive(),
        }
    }

    /// Buffer configuration in the form the in-memory buffer takes.
    pub fn memory_buffer_config(&self) -> MemoryBufferConfig {
        MemoryBufferConfig {
            max_depth: self.buffer.max_depth,
            max_receive_count: self.buffer.max_receive_count,
        }
    }

    /// Relay configuration in the form the relay worker takes.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            batch_size: self.relay.batch_size,
            visibility_timeout: self.relay.visibility_timeout,
            poll_interval: self.relay.poll_interval,
        }
    }

    /// Retry policy in the form the orchestrator takes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: self.retry.base_delay,
            max_delay: self.retry.max_delay,
            jitter: self.retry.jitter,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("INLET_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid INLET_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("INLET_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("INLET_API_PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| DaemonError::Config(format!("Invalid INLET_API_PORT: {}", port_str)))?;

        Ok(ApiConfig { host, port })
    }

    fn load_auth_config() -> DaemonResult<AuthConfig> {
        let webhook_token = env::var("INLET_WEBHOOK_TOKEN").ok().filter(|t| !t.is_empty());
        let ttl_secs = Self::load_u64_env("INLET_AUTH_CACHE_TTL_SECS", 3600)?;

        Ok(AuthConfig {
            webhook_token,
            cache_ttl: Duration::from_secs(ttl_secs),
        })
    }

    fn load_buffer_config() -> DaemonResult<BufferConfig> {
        Ok(BufferConfig {
            max_depth: Self::load_usize_env("INLET_BUFFER_MAX_DEPTH", 10_000)?,
            max_receive_count: Self::load_u64_env(
                "INLET_MAX_RECEIVE_COUNT",
                DEFAULT_MAX_RECEIVE_COUNT as u64,
            )? as u32,
        })
    }

    fn load_relay_settings() -> DaemonResult<RelaySettings> {
        Ok(RelaySettings {
            batch_size: Self::load_usize_env("INLET_RELAY_BATCH_SIZE", 10)?,
            visibility_timeout: Duration::from_secs(Self::load_u64_env(
                "INLET_VISIBILITY_TIMEOUT_SECS",
                30,
            )?),
            poll_interval: Duration::from_millis(Self::load_u64_env(
                "INLET_POLL_INTERVAL_MS",
                100,
            )?),
        })
    }

    fn load_retry_settings() -> DaemonResult<RetrySettings> {
        Ok(RetrySettings {
            max_attempts: Self::load_u64_env("INLET_APPEND_MAX_ATTEMPTS", 5)? as u32,
            base_delay: Duration::from_millis(Self::load_u64_env(
                "INLET_APPEND_BASE_DELAY_MS",
                100,
            )?),
            max_delay: Duration::from_millis(Self::load_u64_env(
                "INLET_APPEND_MAX_DELAY_MS",
                5000,
            )?),
            jitter: Duration::from_millis(Self::load_u64_env("INLET_APPEND_JITTER_MS", 50)?),
        })
    }

    fn load_u64_env(key: &str, default: u64) -> DaemonResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_usize_env(key: &str, default: usize) -> DaemonResult<usize> {
        match env::var(key) {
            Ok(val) => val
                .parse::<usize>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            auth: AuthConfig {
                webhook_token: None,
                cache_ttl: Duration::from_secs(3600),
            },
            buffer: BufferConfig {
                max_depth: 10_000,
                max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            },
            relay: RelaySettings {
                batch_size: 10,
                visibility_timeout: Duration::from_secs(30),
                poll_interval: Duration::from_millis(100),
            },
            retry: RetrySettings {
                max_attempts: 5,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(5),
                jitter: Duration::from_millis(50),
            },
            bus_capacity: 1000,
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
