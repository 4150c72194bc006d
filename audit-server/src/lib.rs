//! audit-server: audit trail pipeline with a realtime log gateway
//!
//! - [`audit`]: batching recorder, transactional flusher, stores
//! - [`bus`]: in-process publish/subscribe between persistence and delivery
//! - [`gateway`]: authenticated WebSocket rooms and per-connection filters
//! - [`api`]: HTTP router (health, WebSocket upgrade, admin operations)

pub mod api;
pub mod audit;
pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logger;
pub mod state;
pub mod tasks;

pub use audit::{AuditContext, AuditRecorder, FlushOutcome, Outcome, RequestContext};
pub use bus::EventBus;
pub use config::{Config, GatewayConfig, RecorderConfig};
pub use error::{AuditError, AuditResult, BoxError};
pub use gateway::{GatewayStats, RealtimeGateway};
pub use state::AppState;
