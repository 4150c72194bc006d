//! Audit domain types
//!
//! ```text
//! caller ──▶ AuditEntry ──▶ queue ──▶ audit_logs (commit) ──▶ AuditLogView ──▶ realtime
//! ```

pub mod action;
pub mod entry;

pub use action::{
    AccessAction, AdministrativeAction, AuditAction, AuditCategory, AuthenticationAction,
    DataAction, SecurityAction, SystemAction,
};
pub use entry::{AuditEntry, AuditLogView, Details, ResourceRef};
