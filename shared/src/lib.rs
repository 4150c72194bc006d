//! Shared types for the audit pipeline
//!
//! Domain and protocol types used by the audit server and by realtime
//! dashboard clients: audit entries, the gateway wire protocol, and the
//! unified error system.

pub mod audit;
pub mod error;
pub mod realtime;

// Re-exports
pub use audit::{AuditAction, AuditCategory, AuditEntry, AuditLogView, Details, ResourceRef};
pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
pub use realtime::{GatewayCommand, GatewayEvent, LogFilter, LogStream};
