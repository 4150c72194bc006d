//! Audit server configuration
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | DATABASE_URL | (required) | PostgreSQL URL |
//! | HTTP_PORT | 8080 | HTTP + WebSocket port |
//! | ENVIRONMENT | development | development / staging / production |
//! | JWT_SECRET | dev fallback | HS256 secret for handshake tokens |
//! | AUDIT_BATCH_SIZE | 10 | queue length that flushes synchronously |
//! | AUDIT_FLUSH_DELAY_MS | 1000 | coalesced delayed flush |
//! | AUDIT_FLUSH_INTERVAL_SECS | 30 | periodic safety-net flush |
//! | AUDIT_BACKLOG_WARN | 1000 | queue length that raises a backlog alert |
//! | DB_MAX_CONNECTIONS | 10 | pool size |
//! | DB_WRITE_TIMEOUT_MS | 5000 | bound on each store step |
//! | WS_OUTBOUND_CAPACITY | 64 | per-connection outbound frame slots |
//! | WS_PING_INTERVAL_SECS | 30 | keepalive ping |
//! | LOG_LEVEL / LOG_JSON / LOG_DIR | info / false / - | logging |

use std::time::Duration;

use crate::error::BoxError;

/// Batching knobs for the recorder and flusher
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Queue length at which `record` flushes synchronously
    pub batch_size: usize,
    /// Delay of the coalesced deferred flush
    pub flush_delay: Duration,
    /// Period of the safety-net flush
    pub flush_interval: Duration,
    /// Queue length after a failed flush that triggers a backlog alert
    pub backlog_warn: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_delay: Duration::from_millis(1000),
            flush_interval: Duration::from_secs(30),
            backlog_warn: 1000,
        }
    }
}

/// Realtime gateway knobs
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Frames buffered per connection before pushes are dropped
    pub outbound_capacity: usize,
    pub ping_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// JWT secret for handshake and admin tokens
    pub jwt_secret: String,
    pub db_max_connections: u32,
    /// Bound on acquire / insert / commit / rollback
    pub db_write_timeout: Duration,
    pub recorder: RecorderConfig,
    pub gateway: GatewayConfig,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
}

impl Config {
    /// Require a secret env var: must be set and non-empty outside development.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let recorder_defaults = RecorderConfig::default();
        let gateway_defaults = GatewayConfig::default();

        let batch_size = Self::env_or("AUDIT_BATCH_SIZE", recorder_defaults.batch_size);
        if batch_size == 0 {
            return Err("AUDIT_BATCH_SIZE must be at least 1".into());
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: Self::env_or("HTTP_PORT", 8080),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            environment,
            db_max_connections: Self::env_or("DB_MAX_CONNECTIONS", 10),
            db_write_timeout: Duration::from_millis(Self::env_or("DB_WRITE_TIMEOUT_MS", 5000)),
            recorder: RecorderConfig {
                batch_size,
                flush_delay: Duration::from_millis(Self::env_or(
                    "AUDIT_FLUSH_DELAY_MS",
                    recorder_defaults.flush_delay.as_millis() as u64,
                )),
                flush_interval: Duration::from_secs(Self::env_or(
                    "AUDIT_FLUSH_INTERVAL_SECS",
                    recorder_defaults.flush_interval.as_secs(),
                )
                .max(1)),
                backlog_warn: Self::env_or("AUDIT_BACKLOG_WARN", recorder_defaults.backlog_warn),
            },
            gateway: GatewayConfig {
                outbound_capacity: Self::env_or(
                    "WS_OUTBOUND_CAPACITY",
                    gateway_defaults.outbound_capacity,
                )
                .max(1),
                ping_interval: Duration::from_secs(Self::env_or(
                    "WS_PING_INTERVAL_SECS",
                    gateway_defaults.ping_interval.as_secs(),
                )),
            },
            log_level: std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| crate::logger::DEFAULT_FILTER.into()),
            log_json: Self::env_or("LOG_JSON", false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
        })
    }
}
